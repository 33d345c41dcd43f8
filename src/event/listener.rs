//! Typed event listeners.

use std::sync::Arc;

/// Marker for values that can travel through the event bus.
///
/// Events are cloned once per listener they are delivered to.
pub trait Event: Clone + Send + 'static {}

impl<T> Event for T where T: Clone + Send + 'static {}

/// Receives events of type `E`.
///
/// Any `Fn(&E) + Send + Sync` closure is a listener, which covers delegates
/// bound to a method of another object.
pub trait EventListener<E>: Send + Sync {
    fn on_event_received(&self, event: &E);
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event_received(&self, event: &E) {
        self(event)
    }
}

pub type EventListenerRef<E> = Arc<dyn EventListener<E>>;

/// Identifies a listener registration inside one event support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);
