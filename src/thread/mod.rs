//! Thread subsystem modules.
//!
//! - `core`: [`Thread`], [`ThreadRef`] and the dispatch loop.
//! - `queue`: the FIFO plus timed work queue.
//! - `context`: thread-local current thread.
//! - `builder`: [`ThreadBuilder`].

mod builder;
pub(crate) mod context;
mod core;
pub(crate) mod queue;

pub use builder::ThreadBuilder;
pub use self::core::{Thread, ThreadRef, ThreadState};
