//! Bridges the persistent store to the event bus.
//!
//! The scanner polls the store on a watermark, keeps the read-through cache
//! in step with what it reads and publishes one [`ConfigFileReleased`] per
//! genuine release transition.
//!
//! [`ConfigFileReleased`]: crate::ConfigFileReleased

mod release_scanner;

pub use release_scanner::*;
