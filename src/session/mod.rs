//! Long-poll sessions: one pending response per client.
//!
//! A session is resolved exactly once, by whichever of notification,
//! timeout, replacement or cancellation first removes it from the session
//! map. The atomic check-and-remove on that map is the only arbitration
//! point; the loser of a race finds nothing to remove and does nothing.

mod manager;

pub use manager::*;
