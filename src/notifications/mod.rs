//! Outgoing notifications.

mod email;

pub use email::*;
