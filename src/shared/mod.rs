//! Messaging between the session coordinator and its observers
//!
//! Signals travel over a crossbeam channel so the presentation layer can
//! drain them from whatever thread it renders on.

pub mod messages;

pub use messages::{ClearReason, SessionSignal};
