//! Waitable input/output collaborators.
//!
//! - `pipe`: an anonymous non-blocking [`Pipe`].
//! - `stream`: [`StreamSupport`], moving bytes between a waitable
//!   input/output and byte queues from a thread's handle watches.

mod pipe;
mod stream;

pub use pipe::Pipe;
pub use stream::{StreamListener, StreamSupport};

use crate::buffer::ByteQueue;
use crate::error::IoResult;
use crate::waitable::WaitableHandle;

/// A byte source and sink exposing readiness handles.
pub trait WaitableInputOutput: Send + Sync {
    /// Handle becoming ready when [`read`](Self::read) can make progress.
    fn waitable_read_handle(&self) -> WaitableHandle;

    /// Handle becoming ready when [`write`](Self::write) can make progress.
    fn waitable_write_handle(&self) -> WaitableHandle;

    /// Reads up to `size` bytes without blocking.
    ///
    /// # Returns
    /// `None` when no data is available yet, an empty queue at end of stream.
    fn read(&self, size: usize) -> IoResult<Option<ByteQueue>>;

    /// Writes up to `size` bytes from the head of `buffer` without blocking.
    ///
    /// # Returns
    /// The number of bytes written, zero when the sink is full. `buffer` is
    /// not modified.
    fn write(&self, buffer: &ByteQueue, size: usize) -> IoResult<usize>;
}
