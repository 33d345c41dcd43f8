//! Fluent builder for [`Thread`] construction.

use super::core::Thread;
use crate::error::ThreadResult;

/// Builder for configuring a [`Thread`] before it is created.
///
/// # Example
/// ```
/// use eventcore::ThreadBuilder;
///
/// let thread = ThreadBuilder::new()
///     .name("io")
///     .stack_size(256 * 1024)
///     .build()
///     .unwrap();
///
/// assert_eq!(thread.thread_ref().name(), Some("io"));
/// ```
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the OS thread, so that logs and panics identify it.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stack size of the OS thread, in bytes.
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Creates the thread in the `Created` state.
    ///
    /// # Errors
    /// [`ThreadError::SignalFailed`](crate::ThreadError::SignalFailed) if the
    /// wake-up signal cannot be created.
    pub fn build(self) -> ThreadResult<Thread> {
        Thread::with_config(self.name, self.stack_size)
    }
}
