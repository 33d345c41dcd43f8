//! Type-erased units of queued work.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A unit of work a thread queue can hold without knowing its concrete type.
///
/// The queue owns the call from the moment it is pushed. `call` consumes it;
/// a call that is dropped without being called does nothing.
pub trait BoxedCall: Send {
    /// Runs the call, unless it has been disabled.
    fn call(self: Box<Self>);

    /// Makes the call inert. It stays queued and is still dequeued in order.
    fn disable(&self);
}

/// Shared switch disabling a call from outside the queue holding it.
#[derive(Debug, Default)]
pub struct CallToken {
    disabled: AtomicBool,
}

impl CallToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Release);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }
}

/// A closure wrapped as a [`BoxedCall`].
pub struct FnCall<F> {
    function: F,
    token: Arc<CallToken>,
}

impl<F> FnCall<F>
where
    F: FnOnce() + Send + 'static,
{
    pub fn new(function: F) -> Self {
        Self {
            function,
            token: CallToken::new(),
        }
    }

    /// Token that disables this call once it has been queued.
    pub fn token(&self) -> Arc<CallToken> {
        self.token.clone()
    }
}

impl<F> BoxedCall for FnCall<F>
where
    F: FnOnce() + Send + 'static,
{
    fn call(self: Box<Self>) {
        if self.token.is_disabled() {
            tracing::trace!("skipping disabled call");
            return;
        }

        (self.function)()
    }

    fn disable(&self) {
        self.token.disable();
    }
}

impl<F> fmt::Debug for FnCall<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCall")
            .field("disabled", &self.token.is_disabled())
            .finish()
    }
}
