//! Byte buffer subsystem.
//!
//! - `chunk`: storage units (owned copies, adopted owners, unmanaged memory).
//! - `queue`: the [`ByteQueue`] built on top of them.

mod chunk;
mod queue;

pub use chunk::ReleaseFn;
pub use queue::ByteQueue;
