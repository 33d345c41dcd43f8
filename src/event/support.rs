//! Listener registry and emission of one event type.
//!
//! An [`EventSupport<E>`] maps listeners to an optional thread affinity. An
//! emission snapshots the registry, releases its lock and then, per listener,
//! either calls it directly or builds an event call and queues it on the
//! listener's thread. Removing a listener disables the calls already queued
//! for it, and dropping the support disables every call it still has queued.

use super::call::{BoxedCall, CallToken};
use super::listener::{Event, EventListenerRef, ListenerId};
use super::nested_loop::LoopHandle;
use crate::error::ThreadResult;
use crate::thread::{Thread, ThreadRef};
use crate::waitable::{WaitMode, WaitableSignal, wait_for_single_handle};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// How an emitted event reaches its listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitMode {
    /// Direct call when the emitter runs on the listener's thread, queued
    /// otherwise.
    Auto,
    /// Queued on the listener's thread; returns immediately.
    Queued,
    /// Queued on the listener's thread once the delay has elapsed.
    Deferred(Duration),
    /// Queued on the listener's thread; returns once every listener has run.
    Blocking,
}

struct Registration<E> {
    id: ListenerId,
    listener: EventListenerRef<E>,
    affinity: Mutex<Option<ThreadRef>>,
}

impl<E> Registration<E> {
    fn affinity(&self) -> Option<ThreadRef> {
        self.affinity.lock().unwrap().clone()
    }
}

struct PendingCall {
    listener: ListenerId,
    token: Weak<CallToken>,
}

struct SupportState<E> {
    registrations: Vec<Arc<Registration<E>>>,
    pending: Vec<PendingCall>,
    next_id: u64,
}

/// Releases a blocked emitter once the last of its calls is gone.
///
/// Runs on drop, so a call that is disabled, dropped by a stopped thread or
/// whose listener panicked still counts as finished.
enum Completion {
    Nested {
        caller: ThreadRef,
        handle: LoopHandle,
        remaining: Arc<AtomicUsize>,
    },
    Barrier {
        signal: Arc<WaitableSignal>,
        remaining: Arc<AtomicUsize>,
    },
}

impl Drop for Completion {
    fn drop(&mut self) {
        match self {
            Completion::Nested {
                caller,
                handle,
                remaining,
            } => {
                if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                    return;
                }

                let handle = *handle;
                let posted = caller.post(move || {
                    if let Some(current) = Thread::current() {
                        current.nested_loop().exit(handle, Box::new(()));
                    }
                });

                if let Err(error) = posted {
                    tracing::error!(%error, "failed to release blocked emitter");
                }
            }
            Completion::Barrier { signal, remaining } => {
                if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                    return;
                }

                if let Err(error) = signal.signal() {
                    tracing::error!(%error, "failed to release blocked emitter");
                }
            }
        }
    }
}

struct EventCall<E> {
    event: E,
    registration: Arc<Registration<E>>,
    token: Arc<CallToken>,
    _completion: Option<Completion>,
}

impl<E: Event> BoxedCall for EventCall<E> {
    fn call(self: Box<Self>) {
        if self.token.is_disabled() {
            tracing::trace!(listener = ?self.registration.id, "skipping disabled event call");
            return;
        }

        // The listener may have been switched to another thread after this
        // call was queued.
        if let Some(target) = self.registration.affinity()
            && !target.is_current()
        {
            if !target.is_running() {
                tracing::warn!(
                    listener = ?self.registration.id,
                    thread = target.id(),
                    "listener thread is not running, dropping event"
                );
                return;
            }

            tracing::trace!(
                listener = ?self.registration.id,
                thread = target.id(),
                "re-routing event call"
            );
            if let Err(error) = target.push_event(self) {
                tracing::error!(thread = target.id(), %error, "failed to re-route event call");
            }
            return;
        }

        self.registration.listener.on_event_received(&self.event);
    }

    fn disable(&self) {
        self.token.disable();
    }
}

/// Registry and emitter for events of type `E`.
pub struct EventSupport<E> {
    state: Mutex<SupportState<E>>,
}

impl<E: Event> EventSupport<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SupportState {
                registrations: Vec::new(),
                pending: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Registers `listener`, delivering on the thread calling this method
    /// (inline when called from an unmanaged thread).
    pub fn add_listener(&self, listener: EventListenerRef<E>) -> ListenerId {
        self.add_listener_with_thread(listener, Thread::current())
    }

    /// Registers `listener` with an explicit affinity. `None` delivers inline.
    ///
    /// # Panics
    /// Panics if `listener` is already registered.
    pub fn add_listener_with_thread(
        &self,
        listener: EventListenerRef<E>,
        thread: Option<ThreadRef>,
    ) -> ListenerId {
        let mut state = self.state.lock().unwrap();

        let duplicate = state.registrations.iter().any(|registration| {
            std::ptr::addr_eq(Arc::as_ptr(&registration.listener), Arc::as_ptr(&listener))
        });
        assert!(!duplicate, "listener is already registered");

        let id = ListenerId(state.next_id);
        state.next_id += 1;

        tracing::debug!(
            listener = ?id,
            thread = ?thread.as_ref().map(ThreadRef::id),
            "listener added"
        );

        state.registrations.push(Arc::new(Registration {
            id,
            listener,
            affinity: Mutex::new(thread),
        }));

        id
    }

    /// Unregisters a listener and disables the calls already queued for it.
    ///
    /// Safe to call from inside a delivery of this same event type.
    ///
    /// # Panics
    /// Panics if `id` is not registered.
    pub fn remove_listener(&self, id: ListenerId) {
        let mut state = self.state.lock().unwrap();

        let position = state
            .registrations
            .iter()
            .position(|registration| registration.id == id)
            .unwrap_or_else(|| panic!("listener {id:?} is not registered"));

        state.registrations.remove(position);

        let mut disabled = 0;
        state.pending.retain(|pending| {
            let Some(token) = pending.token.upgrade() else {
                return false;
            };

            if pending.listener == id {
                token.disable();
                disabled += 1;
                return false;
            }

            true
        });

        tracing::debug!(listener = ?id, disabled, "listener removed");
    }

    /// Changes where the events of one listener are delivered.
    ///
    /// # Panics
    /// Panics if `id` is not registered.
    pub fn switch_listener_to_thread(&self, id: ListenerId, thread: Option<&ThreadRef>) {
        let state = self.state.lock().unwrap();

        let registration = state
            .registrations
            .iter()
            .find(|registration| registration.id == id)
            .unwrap_or_else(|| panic!("listener {id:?} is not registered"));

        *registration.affinity.lock().unwrap() = thread.cloned();
        tracing::debug!(listener = ?id, thread = ?thread.map(ThreadRef::id), "listener switched");
    }

    /// Changes where the events of every registered listener are delivered.
    pub fn switch_all_listeners_to_thread(&self, thread: Option<&ThreadRef>) {
        let state = self.state.lock().unwrap();

        for registration in &state.registrations {
            *registration.affinity.lock().unwrap() = thread.cloned();
        }

        tracing::debug!(
            count = state.registrations.len(),
            thread = ?thread.map(ThreadRef::id),
            "listeners switched"
        );
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().registrations.len()
    }

    /// Delivers `event` to every registered listener according to `mode`.
    ///
    /// # Errors
    /// A [`ThreadError`](crate::ThreadError) when a target thread has stopped
    /// or cannot be woken, or when a blocking emission from an unmanaged
    /// thread cannot wait for completion. Every listener is still attempted;
    /// the first error is returned.
    ///
    /// A listener removed by an earlier listener of the same emission is
    /// skipped.
    ///
    /// # Panics
    /// Panics on a deferred emission to an inline listener from an unmanaged
    /// thread, which has no queue to defer on.
    pub fn emit_event(&self, event: E, mode: EmitMode) -> ThreadResult<()> {
        let registrations = self.state.lock().unwrap().registrations.clone();
        let current = Thread::current();

        tracing::trace!(listeners = registrations.len(), ?mode, "emit event");

        if mode == EmitMode::Blocking {
            return self.emit_blocking(event, registrations, current);
        }

        let mut result = Ok(());

        for registration in registrations {
            let target = registration.affinity();

            let pushed = match (mode, target) {
                (EmitMode::Deferred(delay), Some(target)) => {
                    self.push_call(&registration, &event, None, |call| {
                        target.push_timed_event(call, delay)
                    })
                }
                (EmitMode::Deferred(delay), None) => {
                    let Some(current) = current.as_ref() else {
                        panic!("deferred inline delivery requires a managed calling thread");
                    };

                    self.push_call(&registration, &event, None, |call| {
                        current.push_timed_event(call, delay)
                    })
                }
                (EmitMode::Auto, Some(target)) if Some(&target) != current.as_ref() => {
                    self.push_call(&registration, &event, None, |call| target.push_event(call))
                }
                (EmitMode::Queued, Some(target)) => {
                    self.push_call(&registration, &event, None, |call| target.push_event(call))
                }
                _ => {
                    if self.is_registered(registration.id) {
                        registration.listener.on_event_received(&event);
                    }
                    Ok(())
                }
            };

            if let Err(error) = pushed
                && result.is_ok()
            {
                result = Err(error);
            }
        }

        result
    }

    fn emit_blocking(
        &self,
        event: E,
        registrations: Vec<Arc<Registration<E>>>,
        current: Option<ThreadRef>,
    ) -> ThreadResult<()> {
        let mut remote = Vec::new();

        for registration in registrations {
            match registration.affinity() {
                Some(target) if Some(&target) != current.as_ref() => {
                    remote.push((registration, target));
                }
                _ => {
                    if self.is_registered(registration.id) {
                        registration.listener.on_event_received(&event);
                    }
                }
            }
        }

        if remote.is_empty() {
            return Ok(());
        }

        let remaining = Arc::new(AtomicUsize::new(remote.len()));
        let mut result = Ok(());

        match current {
            Some(caller) => {
                let handle = caller.nested_loop().new_handle();

                for (registration, target) in remote {
                    let completion = Completion::Nested {
                        caller: caller.clone(),
                        handle,
                        remaining: remaining.clone(),
                    };

                    let pushed = self.push_call(&registration, &event, Some(completion), |call| {
                        target.push_event(call)
                    });
                    if let Err(error) = pushed
                        && result.is_ok()
                    {
                        result = Err(error);
                    }
                }

                caller.nested_loop().begin(handle);
            }
            None => {
                let signal = Arc::new(WaitableSignal::new()?);

                for (registration, target) in remote {
                    let completion = Completion::Barrier {
                        signal: signal.clone(),
                        remaining: remaining.clone(),
                    };

                    let pushed = self.push_call(&registration, &event, Some(completion), |call| {
                        target.push_event(call)
                    });
                    if let Err(error) = pushed
                        && result.is_ok()
                    {
                        result = Err(error);
                    }
                }

                wait_for_single_handle(signal.handle(), WaitMode::Read, None)?;
                signal.reset()?;
            }
        }

        result
    }

    // An earlier listener of the same emission may have removed this one.
    fn is_registered(&self, id: ListenerId) -> bool {
        let state = self.state.lock().unwrap();
        let registered = state.registrations.iter().any(|registration| registration.id == id);

        if !registered {
            tracing::trace!(listener = ?id, "listener removed before emission");
        }

        registered
    }

    // Builds the call and hands it to `push`. A listener removed since the
    // snapshot gets no call; its completion is dropped right away.
    fn push_call<P>(
        &self,
        registration: &Arc<Registration<E>>,
        event: &E,
        completion: Option<Completion>,
        push: P,
    ) -> ThreadResult<()>
    where
        P: FnOnce(Box<dyn BoxedCall>) -> ThreadResult<()>,
    {
        let token = CallToken::new();

        {
            let mut state = self.state.lock().unwrap();

            if !state.registrations.iter().any(|current| current.id == registration.id) {
                tracing::trace!(listener = ?registration.id, "listener removed before emission");
                return Ok(());
            }

            state.pending.retain(|pending| pending.token.strong_count() > 0);
            state.pending.push(PendingCall {
                listener: registration.id,
                token: Arc::downgrade(&token),
            });
        }

        push(Box::new(EventCall {
            event: event.clone(),
            registration: registration.clone(),
            token,
            _completion: completion,
        }))
    }
}

impl<E: Event> Default for EventSupport<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Drop for EventSupport<E> {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        for pending in state.pending.drain(..) {
            if let Some(token) = pending.token.upgrade() {
                token.disable();
            }
        }
    }
}

impl<E> fmt::Debug for EventSupport<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();

        f.debug_struct("EventSupport")
            .field("listeners", &state.registrations.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
