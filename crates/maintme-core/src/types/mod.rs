//! Core types for maintme.

mod event;
mod subscriber;

pub use event::*;
pub use subscriber::*;
