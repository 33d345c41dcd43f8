//! Thread-and-event concurrency core.
//!
//! This crate provides dedicated event-loop threads, a typed publish/subscribe
//! event bus with per-listener thread affinity, a `poll(2)` based handle
//! multiplexer and a chunked byte queue used to move data between threads and
//! across pipes and sockets.
//!
//! # Architecture
//!
//! - **ByteQueue**: ordered bytes backed by discrete chunks, with zero-copy
//!   adoption of owned or unmanaged memory
//! - **Multiplexer**: waits until waitable handles are ready or a timeout elapses
//! - **WaitableSignal**: pulse signal waking a thread blocked in the multiplexer
//! - **Thread**: OS thread running a loop over a FIFO and timed work queue,
//!   plus handle watches
//! - **EventSupport / Controller**: typed listeners delivered inline, queued,
//!   deferred or blocking
//! - **NestedLoopManager**: re-entrant loops letting blocking emissions wait
//!   without stalling the caller's own queue
//! - **io**: pipe and stream helpers moving bytes through byte queues

pub mod buffer;
pub mod error;
pub mod event;
pub mod io;
pub mod thread;
pub mod waitable;

pub use buffer::ByteQueue;
pub use error::{BufferError, IoError, SignalError, ThreadError, WaitError};
pub use event::{
    BoxedCall, Controller, EmitMode, Event, EventListener, EventListenerRef, EventSupport,
    ListenerId, NestedLoopManager,
};
pub use thread::{Thread, ThreadBuilder, ThreadRef, ThreadState};
pub use waitable::{WaitMode, WaitableHandle, WaitableHandleListener, WaitableSignal};
