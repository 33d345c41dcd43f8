//! Dedicated OS threads running an event dispatch loop.
//!
//! A [`Thread`] owns one OS thread, a [`WaitableSignal`] used to wake it and
//! an [`EventQueue`]. Each loop iteration waits on the wake signal plus every
//! watched handle, dispatches watch listeners of ready handles, promotes due
//! timed calls and then runs the calls that were ready when the iteration
//! started.
//!
//! [`ThreadRef`] is the cloneable handle other threads use to post work; the
//! owning [`Thread`] value controls the lifecycle.

use super::builder::ThreadBuilder;
use super::context::{current_thread, enter_context};
use super::queue::EventQueue;
use crate::error::{ThreadError, ThreadResult};
use crate::event::call::{BoxedCall, FnCall};
use crate::event::nested_loop::{NestedLoopManager, RunLoop};
use crate::waitable::watch::{WaitableHandleListenerRef, WatchSupport};
use crate::waitable::{
    WaitMode, WaitableHandle, WaitableHandleEntry, WaitableSignal, wait_for_multiple_handles,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Thread`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Created,
    Running,
    Quitting,
    Stopped,
}

pub(crate) struct ThreadShared {
    id: u64,
    name: Option<String>,
    state: Mutex<ThreadState>,
    signal: WaitableSignal,
    queue: EventQueue,
    watches: WatchSupport,
    // Quit flags of the nested levels currently running, innermost last.
    levels: Mutex<Vec<bool>>,
    nested_loop: NestedLoopManager,
}

impl ThreadShared {
    fn state(&self) -> ThreadState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ThreadState) {
        *self.state.lock().unwrap() = state;
    }

    // Running -> Quitting. A loop that already stopped keeps its state.
    fn request_quit(&self) {
        let mut state = self.state.lock().unwrap();

        if *state == ThreadState::Running {
            *state = ThreadState::Quitting;
        }
    }

    fn wake(&self) -> ThreadResult<()> {
        self.signal.signal()?;
        Ok(())
    }

    fn run_loop(&self) {
        tracing::debug!(thread = self.id, "thread loop started");

        while self.state() == ThreadState::Running {
            if !self.iterate(&|| false) {
                break;
            }
        }

        tracing::debug!(thread = self.id, "thread loop finished");
    }

    fn run_nested_level(&self) {
        self.levels.lock().unwrap().push(false);

        let level_done = || self.levels.lock().unwrap().last().copied().unwrap_or(true);

        while !level_done() {
            if !self.iterate(&level_done) {
                break;
            }
        }

        self.levels.lock().unwrap().pop();
    }

    fn quit_nested_level(&self) {
        match self.levels.lock().unwrap().last_mut() {
            Some(done) => *done = true,
            None => tracing::warn!(thread = self.id, "quit requested without a nested level"),
        }
    }

    // One wait and dispatch pass. Returns false when the loop cannot continue.
    fn iterate(&self, interrupted: &dyn Fn() -> bool) -> bool {
        let mut entries: Vec<WaitableHandleEntry> = vec![self.signal.entry()];
        entries.extend(self.watches.entries());

        let timeout = self.queue.wait_timeout(Instant::now());

        let ready = match wait_for_multiple_handles(&entries, timeout) {
            Ok(ready) => ready,
            Err(error) => {
                tracing::error!(thread = self.id, %error, "thread wait failed, stopping loop");
                return false;
            }
        };

        for index in ready {
            let (handle, mode) = entries[index];

            if index == 0 {
                if let Err(error) = self.signal.reset() {
                    tracing::warn!(thread = self.id, %error, "spurious wake-up");
                }
                continue;
            }

            self.watches.dispatch(handle, mode);
        }

        self.queue.promote_due(Instant::now());
        self.dispatch_ready(interrupted);

        true
    }

    fn dispatch_ready(&self, interrupted: &dyn Fn() -> bool) {
        // Calls queued while dispatching wait for the next iteration.
        let budget = self.queue.ready_len();

        for _ in 0..budget {
            let Some(call) = self.queue.pop() else {
                break;
            };

            tracing::trace!(thread = self.id, "dispatching call");
            call.call();

            if interrupted() {
                break;
            }
        }
    }

    fn drop_pending_calls(&self) {
        let calls = self.queue.close();

        if !calls.is_empty() {
            tracing::warn!(
                thread = self.id,
                count = calls.len(),
                "dropping calls left at thread stop"
            );
        }

        drop(calls);
    }
}

// Drops what is left in the queue and marks the loop as stopped, on return
// and on unwind alike. Pushes after the queue is closed are rejected.
struct LoopExit {
    shared: Arc<ThreadShared>,
}

impl Drop for LoopExit {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(thread = self.shared.id, "thread loop panicked");
        }

        self.shared.drop_pending_calls();
        self.shared.set_state(ThreadState::Stopped);
    }
}

// The loop a thread's nested loop manager drives. Weak to avoid a cycle
// through the manager stored in the shared state.
struct ThreadRunLoop {
    shared: Weak<ThreadShared>,
}

impl RunLoop for ThreadRunLoop {
    fn begin(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.run_nested_level();
        }
    }

    fn quit(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.quit_nested_level();
        }
    }

    fn post(&self, call: Box<dyn FnOnce() + Send>) {
        if let Some(shared) = self.shared.upgrade() {
            let thread = ThreadRef { shared };

            if let Err(error) = thread.push_event(Box::new(FnCall::new(call))) {
                tracing::error!(thread = thread.id(), %error, "failed to post nested loop call");
            }
        }
    }

    fn is_current(&self) -> bool {
        current_thread().is_some_and(|current| {
            Weak::ptr_eq(&Arc::downgrade(&current.shared), &self.shared)
        })
    }
}

/// Cloneable handle to a [`Thread`], usable from any thread.
#[derive(Clone)]
pub struct ThreadRef {
    pub(crate) shared: Arc<ThreadShared>,
}

impl ThreadRef {
    /// Unique identifier of the thread.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    pub fn state(&self) -> ThreadState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Whether the caller is executing on this thread.
    pub fn is_current(&self) -> bool {
        current_thread().is_some_and(|current| current == *self)
    }

    /// Appends `call` to the tail of the queue and wakes the thread.
    ///
    /// # Errors
    /// - [`ThreadError::NotRunning`] if the thread loop has stopped. The call
    ///   is dropped without running.
    /// - [`ThreadError::SignalFailed`] if the thread cannot be woken. The call
    ///   stays queued and runs on the next wake-up.
    pub fn push_event(&self, call: Box<dyn BoxedCall>) -> ThreadResult<()> {
        tracing::trace!(thread = self.id(), "push event");

        if let Err(call) = self.shared.queue.push(call) {
            return self.reject(call);
        }

        self.shared.wake()
    }

    /// Queues `call` to run once `delay` has elapsed. A delay too large to
    /// represent never elapses.
    ///
    /// # Errors
    /// Same as [`push_event`](Self::push_event).
    pub fn push_timed_event(&self, call: Box<dyn BoxedCall>, delay: Duration) -> ThreadResult<()> {
        tracing::trace!(thread = self.id(), ?delay, "push timed event");

        let due = Instant::now().checked_add(delay);
        if due.is_none() {
            tracing::debug!(
                thread = self.id(),
                ?delay,
                "delay out of range, call will never be due"
            );
        }

        if let Err(call) = self.shared.queue.push_timed(call, due) {
            return self.reject(call);
        }

        self.shared.wake()
    }

    fn reject(&self, call: Box<dyn BoxedCall>) -> ThreadResult<()> {
        tracing::warn!(thread = self.id(), "thread is not running, dropping call");

        drop(call);
        Err(ThreadError::NotRunning)
    }

    /// Queues a closure.
    pub fn post<F>(&self, function: F) -> ThreadResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push_event(Box::new(FnCall::new(function)))
    }

    /// Queues a closure to run once `delay` has elapsed.
    pub fn post_timed<F>(&self, function: F, delay: Duration) -> ThreadResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push_timed_event(Box::new(FnCall::new(function)), delay)
    }

    /// Number of calls waiting in the queue, timed ones included.
    pub fn pending_calls(&self) -> usize {
        self.shared.queue.len()
    }

    /// Calls `listener` on this thread whenever `handle` is ready for `mode`.
    ///
    /// # Panics
    /// Panics if `listener` already watches `handle` for `mode`.
    pub fn add_waitable_handle_watch(
        &self,
        listener: WaitableHandleListenerRef,
        handle: WaitableHandle,
        mode: WaitMode,
    ) -> ThreadResult<()> {
        self.shared.watches.add(listener, handle, mode);
        self.shared.wake()
    }

    /// Stops calling `listener` for `handle` and `mode`.
    ///
    /// A listener removed while its handle is being dispatched is not called.
    ///
    /// # Panics
    /// Panics if `listener` does not watch `handle` for `mode`.
    pub fn remove_waitable_handle_watch(
        &self,
        listener: &WaitableHandleListenerRef,
        handle: WaitableHandle,
        mode: WaitMode,
    ) -> ThreadResult<()> {
        self.shared.watches.remove(listener, handle, mode);
        self.shared.wake()
    }

    /// The nested loop manager driving this thread's dispatch loop.
    pub fn nested_loop(&self) -> &NestedLoopManager {
        &self.shared.nested_loop
    }
}

impl PartialEq for ThreadRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for ThreadRef {}

impl fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRef")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// A dedicated OS thread running an event loop.
///
/// Must be stopped with [`quit`](Self::quit) before being dropped.
///
/// # Example
/// ```
/// use eventcore::Thread;
/// use std::sync::mpsc;
///
/// let mut thread = Thread::new().unwrap();
/// thread.run().unwrap();
///
/// let (sender, receiver) = mpsc::channel();
/// thread.thread_ref().post(move || sender.send(42).unwrap()).unwrap();
/// assert_eq!(receiver.recv().unwrap(), 42);
///
/// thread.quit().unwrap();
/// ```
pub struct Thread {
    thread: ThreadRef,
    stack_size: Option<usize>,
    join: Option<JoinHandle<()>>,
}

impl Thread {
    /// Creates a stopped thread with the default configuration.
    ///
    /// # Errors
    /// [`ThreadError::SignalFailed`] if the wake-up signal cannot be created.
    pub fn new() -> ThreadResult<Self> {
        ThreadBuilder::new().build()
    }

    pub(crate) fn with_config(
        name: Option<String>,
        stack_size: Option<usize>,
    ) -> ThreadResult<Self> {
        let signal = WaitableSignal::new()?;
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);

        let shared = Arc::new_cyclic(|weak: &Weak<ThreadShared>| {
            let run_loop = Arc::new(ThreadRunLoop { shared: weak.clone() });

            ThreadShared {
                id,
                name,
                state: Mutex::new(ThreadState::Created),
                signal,
                queue: EventQueue::new(),
                watches: WatchSupport::new(),
                levels: Mutex::new(Vec::new()),
                nested_loop: NestedLoopManager::new(run_loop),
            }
        });

        Ok(Self {
            thread: ThreadRef { shared },
            stack_size,
            join: None,
        })
    }

    /// The managed thread the caller is running on, if any.
    pub fn current() -> Option<ThreadRef> {
        current_thread()
    }

    /// Cloneable handle for posting work to this thread.
    pub fn thread_ref(&self) -> ThreadRef {
        self.thread.clone()
    }

    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    pub fn nested_loop(&self) -> &NestedLoopManager {
        self.thread.nested_loop()
    }

    /// Spawns the OS thread and starts the loop. Does nothing if already
    /// started and not quit yet.
    ///
    /// # Errors
    /// [`ThreadError::CreateFailed`] if the OS thread cannot be spawned.
    #[tracing::instrument(level = "debug", skip(self), fields(thread = self.thread.id()))]
    pub fn run(&mut self) -> ThreadResult<()> {
        if self.join.is_some() {
            return Ok(());
        }

        let shared = self.thread.shared.clone();
        shared.queue.reopen();
        shared.set_state(ThreadState::Running);

        let mut builder = std::thread::Builder::new();
        if let Some(name) = &shared.name {
            builder = builder.name(name.clone());
        }
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let spawned = builder.spawn(move || {
            let _exit = LoopExit { shared: shared.clone() };
            let thread = ThreadRef { shared: shared.clone() };

            enter_context(thread, || shared.run_loop());
        });

        match spawned {
            Ok(join) => {
                self.join = Some(join);
                tracing::debug!("thread running");
                Ok(())
            }
            Err(error) => {
                self.thread.shared.set_state(ThreadState::Created);
                Err(ThreadError::CreateFailed(error))
            }
        }
    }

    /// Stops the loop after the calls currently ready and joins the OS
    /// thread. Does nothing if the thread was never run or is already quit.
    ///
    /// # Errors
    /// [`ThreadError::SignalFailed`] if the thread cannot be woken, and
    /// [`ThreadError::QuitFailed`] if it terminated by panicking.
    ///
    /// # Panics
    /// Panics if called from the thread itself.
    #[tracing::instrument(level = "debug", skip(self), fields(thread = self.thread.id()))]
    pub fn quit(&mut self) -> ThreadResult<()> {
        if self.join.is_none() {
            return Ok(());
        }

        assert!(!self.thread.is_current(), "a thread cannot quit itself");

        self.thread.shared.request_quit();
        self.thread.shared.wake()?;

        let joined = self.join.take().map_or(Ok(()), JoinHandle::join);

        self.thread.shared.set_state(ThreadState::Stopped);

        match joined {
            Ok(()) => {
                tracing::debug!("thread stopped");
                Ok(())
            }
            Err(_) => {
                tracing::error!("thread terminated by a panic");
                Err(ThreadError::QuitFailed)
            }
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert!(
            self.join.is_none(),
            "thread {} dropped while running; call quit() first",
            self.thread.id()
        );
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("thread", &self.thread).finish()
    }
}
