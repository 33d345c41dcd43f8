//! Controllers: a handler object bound to a closed set of event types.
//!
//! A [`Controller<H, L>`] owns one [`EventSupport`] per event type of the
//! tuple `L`, with the handler `H` registered as listener of each. The type
//! list is checked at compile time: `H` must implement [`EventListener<E>`]
//! for every `E` in `L`.
//!
//! ```
//! use eventcore::{Controller, EventListener, Thread};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Add(u32);
//!
//! #[derive(Clone)]
//! struct Reset;
//!
//! #[derive(Default)]
//! struct Counter(AtomicU32);
//!
//! impl EventListener<Add> for Counter {
//!     fn on_event_received(&self, event: &Add) {
//!         self.0.fetch_add(event.0, Ordering::SeqCst);
//!     }
//! }
//!
//! impl EventListener<Reset> for Counter {
//!     fn on_event_received(&self, _: &Reset) {
//!         self.0.store(0, Ordering::SeqCst);
//!     }
//! }
//!
//! let mut thread = Thread::new().unwrap();
//! thread.run().unwrap();
//!
//! let controller: Controller<Counter, (Add, Reset)> = Controller::new(Counter::default());
//! controller.switch_to_thread(Some(&thread.thread_ref()));
//!
//! controller.post_sync(Add(2)).unwrap();
//! controller.post_sync(Add(3)).unwrap();
//! assert_eq!(controller.handler().0.load(Ordering::SeqCst), 5);
//!
//! thread.quit().unwrap();
//! ```

use super::listener::{Event, EventListener, EventListenerRef, ListenerId};
use super::support::{EmitMode, EventSupport};
use crate::error::ThreadResult;
use crate::thread::{Thread, ThreadRef};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Type-erased handler slot of a controller.
#[doc(hidden)]
pub trait AnyHandler: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn bind(&self, thread: Option<&ThreadRef>);
}

/// Support and registration of one event type for a handler `H`.
struct ControllerEventHandler<E, H> {
    support: EventSupport<E>,
    handler: Arc<H>,
    listener: Mutex<Option<ListenerId>>,
}

impl<E, H> ControllerEventHandler<E, H>
where
    E: Event,
    H: EventListener<E> + 'static,
{
    fn new(handler: Arc<H>) -> Self {
        Self {
            support: EventSupport::new(),
            handler,
            listener: Mutex::new(None),
        }
    }
}

impl<E, H> AnyHandler for ControllerEventHandler<E, H>
where
    E: Event,
    H: EventListener<E> + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bind(&self, thread: Option<&ThreadRef>) {
        let mut listener = self.listener.lock().unwrap();

        match *listener {
            Some(id) => self.support.switch_listener_to_thread(id, thread),
            None => {
                let handler: EventListenerRef<E> = self.handler.clone();
                *listener = Some(self.support.add_listener_with_thread(handler, thread.cloned()));
            }
        }
    }
}

/// Handler slots keyed by event type.
pub type HandlerSlots = HashMap<TypeId, Box<dyn AnyHandler>>;

/// A tuple of event types a controller of `H` handles.
///
/// Implemented for tuples of up to eight event types.
pub trait EventTypeList<H> {
    #[doc(hidden)]
    fn build_slots(handler: &Arc<H>) -> HandlerSlots;
}

macro_rules! impl_event_type_list {
    ($($event:ident),+) => {
        impl<H, $($event),+> EventTypeList<H> for ($($event,)+)
        where
            H: Send + Sync + 'static $(+ EventListener<$event>)+,
            $($event: Event),+
        {
            fn build_slots(handler: &Arc<H>) -> HandlerSlots {
                let mut slots = HandlerSlots::new();
                $(
                    slots.insert(
                        TypeId::of::<$event>(),
                        Box::new(ControllerEventHandler::<$event, H>::new(handler.clone())),
                    );
                )+
                slots
            }
        }
    };
}

impl_event_type_list!(A);
impl_event_type_list!(A, B);
impl_event_type_list!(A, B, C);
impl_event_type_list!(A, B, C, D);
impl_event_type_list!(A, B, C, D, E);
impl_event_type_list!(A, B, C, D, E, F);
impl_event_type_list!(A, B, C, D, E, F, G);
impl_event_type_list!(A, B, C, D, E, F, G, I);

/// A handler object receiving the event types of `L` on a chosen thread.
///
/// Events can only be posted once the controller is bound, through
/// [`touch`](Self::touch) or [`switch_to_thread`](Self::switch_to_thread).
pub struct Controller<H, L> {
    handler: Arc<H>,
    slots: HandlerSlots,
    touched: AtomicBool,
    _types: PhantomData<fn() -> L>,
}

impl<H, L> Controller<H, L>
where
    H: Send + Sync + 'static,
    L: EventTypeList<H>,
{
    pub fn new(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    pub fn from_arc(handler: Arc<H>) -> Self {
        let slots = L::build_slots(&handler);

        Self {
            handler,
            slots,
            touched: AtomicBool::new(false),
            _types: PhantomData,
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Binds every handler to the calling thread (inline when called from an
    /// unmanaged thread).
    pub fn touch(&self) {
        self.switch_to_thread(Thread::current().as_ref());
    }

    /// Binds every handler to `thread`, or to inline delivery for `None`.
    pub fn switch_to_thread(&self, thread: Option<&ThreadRef>) {
        for slot in self.slots.values() {
            slot.bind(thread);
        }

        self.touched.store(true, Ordering::Release);
        tracing::debug!(thread = ?thread.map(ThreadRef::id), "controller switched");
    }

    pub fn is_touched(&self) -> bool {
        self.touched.load(Ordering::Acquire)
    }

    /// Queues `event` for the handler.
    ///
    /// # Panics
    /// Panics if the controller is not bound yet, or if `E` is not one of
    /// its declared event types.
    pub fn post<E>(&self, event: E) -> ThreadResult<()>
    where
        E: Event,
        H: EventListener<E>,
    {
        self.support::<E>().emit_event(event, EmitMode::Queued)
    }

    /// Queues `event` for the handler once `delay` has elapsed.
    ///
    /// # Panics
    /// Same conditions as [`post`](Self::post).
    pub fn post_timed<E>(&self, event: E, delay: Duration) -> ThreadResult<()>
    where
        E: Event,
        H: EventListener<E>,
    {
        self.support::<E>().emit_event(event, EmitMode::Deferred(delay))
    }

    /// Delivers `event` and returns once the handler has run.
    ///
    /// # Panics
    /// Same conditions as [`post`](Self::post).
    pub fn post_sync<E>(&self, event: E) -> ThreadResult<()>
    where
        E: Event,
        H: EventListener<E>,
    {
        self.support::<E>().emit_event(event, EmitMode::Blocking)
    }

    fn support<E>(&self) -> &EventSupport<E>
    where
        E: Event,
        H: EventListener<E>,
    {
        assert!(self.is_touched(), "controller must be touched before posting events");

        self.slots
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.as_any().downcast_ref::<ControllerEventHandler<E, H>>())
            .map(|slot| &slot.support)
            .unwrap_or_else(|| {
                panic!("{} is not declared by this controller", std::any::type_name::<E>())
            })
    }
}

impl<H, L> fmt::Debug for Controller<H, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("event_types", &self.slots.len())
            .field("touched", &self.touched.load(Ordering::Acquire))
            .finish()
    }
}
