//! Re-entrant loop coordination.
//!
//! A [`NestedLoopManager`] keeps a stack of loop contexts on top of a
//! [`RunLoop`]. `begin` pushes a context and runs the loop recursively until
//! that context is exited; `exit` may be called in any order, but a level
//! only unwinds once it is on top of the stack. At most one unwind request is
//! pending at any time.
//!
//! Every [`Thread`](crate::Thread) owns a manager bound to its own dispatch
//! loop, reachable through [`ThreadRef::nested_loop`](crate::ThreadRef::nested_loop).

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Value handed from `exit` to the matching `begin`.
pub type LoopPayload = Box<dyn Any + Send>;

/// A dispatch loop that can be entered recursively.
pub trait RunLoop: Send + Sync {
    /// Runs one more level of the loop until [`quit`](Self::quit) is called.
    fn begin(&self);

    /// Makes the innermost running level return.
    fn quit(&self);

    /// Schedules `call` to run inside the loop.
    fn post(&self, call: Box<dyn FnOnce() + Send>);

    /// Whether the caller is running on the loop's thread.
    fn is_current(&self) -> bool;
}

/// Identifies one nested loop context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopHandle(u64);

struct LoopContext {
    handle: LoopHandle,
    exited: bool,
    payload: Option<LoopPayload>,
}

#[derive(Default)]
struct ManagerState {
    contexts: Vec<LoopContext>,
    exit_pending: bool,
    next_handle: u64,
}

pub struct NestedLoopManager {
    state: Arc<Mutex<ManagerState>>,
    run_loop: Arc<dyn RunLoop>,
}

impl NestedLoopManager {
    pub fn new(run_loop: Arc<dyn RunLoop>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::default())),
            run_loop,
        }
    }

    /// Allocates a handle for a future [`begin`](Self::begin).
    pub fn new_handle(&self) -> LoopHandle {
        let mut state = self.state.lock().unwrap();

        state.next_handle += 1;
        LoopHandle(state.next_handle)
    }

    /// Number of nested levels currently running.
    pub fn level(&self) -> usize {
        self.state.lock().unwrap().contexts.len()
    }

    /// Runs a nested level of the loop until `handle` is exited.
    ///
    /// # Returns
    /// The payload given to [`exit`](Self::exit).
    ///
    /// # Panics
    /// Panics if called outside the loop's thread, or if `handle` is already
    /// running.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin(&self, handle: LoopHandle) -> Option<LoopPayload> {
        assert!(self.run_loop.is_current(), "nested loop must begin on its own thread");

        {
            let mut state = self.state.lock().unwrap();

            assert!(
                state.contexts.iter().all(|context| context.handle != handle),
                "nested loop {handle:?} is already running"
            );

            state.contexts.push(LoopContext {
                handle,
                exited: false,
                payload: None,
            });
        }

        tracing::debug!(?handle, "nested loop begin");
        self.run_loop.begin();

        let payload = {
            let mut state = self.state.lock().unwrap();
            let context = state
                .contexts
                .pop()
                .unwrap_or_else(|| panic!("nested loop stack is empty after {handle:?} returned"));

            assert_eq!(context.handle, handle, "nested loops unwound out of order");
            assert!(context.exited, "nested loop {handle:?} returned without being exited");

            if state.contexts.last().is_some_and(|next| next.exited) {
                self.request_unwind(&mut state);
            }

            context.payload
        };

        tracing::debug!(?handle, "nested loop end");
        payload
    }

    /// Marks `handle` as exited and stores `payload` for its `begin`.
    ///
    /// # Panics
    /// Panics if `handle` is not running or has already been exited.
    pub fn exit(&self, handle: LoopHandle, payload: LoopPayload) {
        let mut state = self.state.lock().unwrap();

        let context = state
            .contexts
            .iter_mut()
            .find(|context| context.handle == handle)
            .unwrap_or_else(|| panic!("unknown nested loop {handle:?}"));

        assert!(!context.exited, "nested loop {handle:?} exited twice");

        context.exited = true;
        context.payload = Some(payload);
        tracing::debug!(?handle, "nested loop exit");

        if state.contexts.last().is_some_and(|top| top.exited) {
            self.request_unwind(&mut state);
        }
    }

    fn request_unwind(&self, state: &mut ManagerState) {
        if state.exit_pending {
            return;
        }

        state.exit_pending = true;

        let shared = self.state.clone();
        let run_loop = self.run_loop.clone();

        self.run_loop.post(Box::new(move || {
            shared.lock().unwrap().exit_pending = false;
            run_loop.quit();
        }));
    }
}

impl fmt::Debug for NestedLoopManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();

        f.debug_struct("NestedLoopManager")
            .field("level", &state.contexts.len())
            .field("exit_pending", &state.exit_pending)
            .finish()
    }
}
