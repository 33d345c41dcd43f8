//! Event bus modules.
//!
//! - `call`: type-erased queued calls.
//! - `listener`: listener traits and identifiers.
//! - `support`: per-type registry and emission.
//! - `controller`: handler objects bound to a list of event types.
//! - `generic`: the [`generic_event!`](crate::generic_event) declaration macro.
//! - `nested_loop`: re-entrant loop coordination for blocking emissions.

pub mod call;
pub mod controller;
mod generic;
mod listener;
pub mod nested_loop;
mod support;

pub use call::{BoxedCall, CallToken, FnCall};
pub use controller::{Controller, EventTypeList};
pub use listener::{Event, EventListener, EventListenerRef, ListenerId};
pub use nested_loop::{LoopHandle, LoopPayload, NestedLoopManager, RunLoop};
pub use support::{EmitMode, EventSupport};
