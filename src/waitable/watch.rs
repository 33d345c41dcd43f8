//! Per-thread registry of handle watches.
//!
//! Collaborators (pipes, sockets) register a listener for a (handle, mode)
//! pair on a thread; the thread adds every watched handle to its multiplexer
//! wait and calls the listeners of each handle that becomes ready.

use super::handle::{WaitMode, WaitableHandle, WaitableHandleEntry};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Receives readiness notifications for watched handles.
pub trait WaitableHandleListener: Send + Sync {
    fn on_waitable_handle_event(&self, handle: WaitableHandle, mode: WaitMode);
}

impl<F> WaitableHandleListener for F
where
    F: Fn(WaitableHandle, WaitMode) + Send + Sync,
{
    fn on_waitable_handle_event(&self, handle: WaitableHandle, mode: WaitMode) {
        self(handle, mode)
    }
}

pub type WaitableHandleListenerRef = Arc<dyn WaitableHandleListener>;

/// Listener registry keyed by (handle, mode).
#[derive(Default)]
pub(crate) struct WatchSupport {
    watches: Mutex<BTreeMap<WaitableHandleEntry, Vec<WaitableHandleListenerRef>>>,
}

impl WatchSupport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// Panics if `listener` is already watching `handle` for `mode`.
    pub(crate) fn add(
        &self,
        listener: WaitableHandleListenerRef,
        handle: WaitableHandle,
        mode: WaitMode,
    ) {
        let mut watches = self.watches.lock().unwrap();
        let listeners = watches.entry((handle, mode)).or_default();

        assert!(
            !listeners.iter().any(|existing| same_listener(existing, &listener)),
            "listener is already watching {handle:?} for {mode:?}"
        );

        listeners.push(listener);
        tracing::debug!(?handle, ?mode, "waitable handle watch added");
    }

    /// # Panics
    /// Panics if `listener` is not watching `handle` for `mode`.
    pub(crate) fn remove(
        &self,
        listener: &WaitableHandleListenerRef,
        handle: WaitableHandle,
        mode: WaitMode,
    ) {
        let mut watches = self.watches.lock().unwrap();

        let listeners = watches
            .get_mut(&(handle, mode))
            .unwrap_or_else(|| panic!("no watch registered for {handle:?} {mode:?}"));

        let position = listeners
            .iter()
            .position(|existing| same_listener(existing, listener))
            .unwrap_or_else(|| panic!("listener is not watching {handle:?} for {mode:?}"));

        listeners.remove(position);

        if listeners.is_empty() {
            watches.remove(&(handle, mode));
        }

        tracing::debug!(?handle, ?mode, "waitable handle watch removed");
    }

    /// Snapshot of every watched (handle, mode) pair.
    pub(crate) fn entries(&self) -> Vec<WaitableHandleEntry> {
        self.watches.lock().unwrap().keys().copied().collect()
    }

    /// Calls every listener still watching `handle` for `mode`.
    ///
    /// The registry lock is not held during calls, so listeners may add or
    /// remove watches. A listener removed by an earlier listener of the same
    /// dispatch is skipped.
    pub(crate) fn dispatch(&self, handle: WaitableHandle, mode: WaitMode) {
        let snapshot = match self.watches.lock().unwrap().get(&(handle, mode)) {
            Some(listeners) => listeners.clone(),
            None => return,
        };

        for listener in snapshot {
            if !self.is_watching(&listener, handle, mode) {
                tracing::trace!(?handle, ?mode, "skipping removed watch listener");
                continue;
            }

            listener.on_waitable_handle_event(handle, mode);
        }
    }

    fn is_watching(
        &self,
        listener: &WaitableHandleListenerRef,
        handle: WaitableHandle,
        mode: WaitMode,
    ) -> bool {
        self.watches
            .lock()
            .unwrap()
            .get(&(handle, mode))
            .is_some_and(|listeners| {
                listeners.iter().any(|existing| same_listener(existing, listener))
            })
    }
}

// Identity is the allocation, not the vtable.
fn same_listener(left: &WaitableHandleListenerRef, right: &WaitableHandleListenerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right))
}
