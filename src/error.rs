//! Error types for every subsystem of the crate.
//!
//! Each subsystem reports its own error enum so that callers can tell a
//! recoverable data condition (a [`BufferError::OutOfData`] usually means
//! "wait for more input") apart from an operating system failure. Contract
//! violations are not represented here: they panic.

use std::io;
use thiserror::Error;

/// Errors reported by [`ByteQueue`](crate::ByteQueue).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("queue holds {available} bytes but {requested} were requested")]
    OutOfData { requested: usize, available: usize },
}

/// Errors reported by the handle multiplexer.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("waiting for waitable handles failed")]
    WaitFailed(#[source] io::Error),
}

/// Errors reported by [`WaitableSignal`](crate::WaitableSignal).
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to create waitable signal")]
    CreateFailed(#[source] io::Error),

    #[error("failed to signal waitable signal")]
    SignalFailed(#[source] io::Error),

    /// Raised when `reset()` finds no pending pulse.
    #[error("failed to reset waitable signal")]
    ResetFailed(#[source] io::Error),
}

/// Errors reported by [`Thread`](crate::Thread).
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("failed to create thread")]
    CreateFailed(#[source] io::Error),

    #[error("thread signal failed")]
    SignalFailed(#[from] SignalError),

    #[error("waiting for a blocking emission failed")]
    WaitFailed(#[from] WaitError),

    #[error("thread terminated abnormally")]
    QuitFailed,

    /// The thread loop has stopped; the call was dropped.
    #[error("thread is not running")]
    NotRunning,
}

/// Errors reported by the waitable input/output helpers in [`io`](crate::io).
#[derive(Debug, Error)]
pub enum IoError {
    #[error("stream support is already opened")]
    AlreadyOpened,

    #[error("stream support is not opened")]
    NotOpened,

    #[error("failed to open waitable input/output")]
    OpenFailed(#[source] io::Error),

    #[error("read from waitable input failed")]
    ReadFailed(#[source] io::Error),

    #[error("write to waitable output failed")]
    WriteFailed(#[source] io::Error),

    #[error("connection was broken")]
    ConnectionBroken,

    #[error("stream buffer error")]
    Buffer(#[from] BufferError),

    #[error("stream thread failed")]
    Thread(#[from] ThreadError),
}

pub type BufferResult<T> = Result<T, BufferError>;
pub type WaitResult<T> = Result<T, WaitError>;
pub type SignalResult<T> = Result<T, SignalError>;
pub type ThreadResult<T> = Result<T, ThreadError>;
pub type IoResult<T> = Result<T, IoError>;
