//! Thread-local context identifying the managed thread running the caller.
//!
//! Set by the dispatch loop of every [`Thread`](crate::Thread) for its whole
//! lifetime. Listeners registered without an explicit thread inherit it, and
//! blocking emissions use it to decide whether a nested loop can be pumped.

use super::core::ThreadRef;

use std::cell::RefCell;

thread_local! {
    /// The managed thread owning the current OS thread, if any.
    ///
    /// Set by [`enter_context`] when a thread loop starts.
    pub(crate) static CURRENT_THREAD: RefCell<Option<ThreadRef>> = const { RefCell::new(None) };
}

/// Runs `function` with `thread` installed as the current managed thread.
///
/// The previous context is restored on exit.
pub(crate) fn enter_context<F, R>(thread: ThreadRef, function: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = CURRENT_THREAD.with(|current| current.borrow_mut().replace(thread));

    let result = function();

    CURRENT_THREAD.with(|current| *current.borrow_mut() = previous);

    result
}

/// The managed thread owning the calling OS thread.
pub(crate) fn current_thread() -> Option<ThreadRef> {
    CURRENT_THREAD.with(|current| current.borrow().clone())
}
