//! Waitable handle subsystem.
//!
//! - `handle`: readiness handles and the `poll(2)` multiplexer.
//! - `signal`: the pipe-backed wake-up signal.
//! - `watch`: per-thread handle watch registry.

mod handle;
mod signal;
pub(crate) mod watch;

pub use handle::{
    WaitMode, WaitableHandle, WaitableHandleEntry, set_nonblocking, wait_for_multiple_handles,
    wait_for_single_handle,
};
pub use signal::WaitableSignal;
pub use watch::{WaitableHandleListener, WaitableHandleListenerRef};
