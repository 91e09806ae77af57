//! Change-notification pipeline of a configuration center.
//!
//! Turns durable release writes into one wakeup per state transition for
//! every long-polling client watching the affected file:
//!
//! ```text
//! ReleaseStore --scan--> ReleaseScanner --publish--> EventBus
//!                                                       |
//!                              WatchRegistry <----------+
//!                                   | version-gated fan-out
//!                              SessionManager --one response--> caller
//! ```
//!
//! New requests first try a [`WatchContext::quick_check`] against the
//! read-through cache and only open a long-poll session when the client is
//! already up to date. [`Notifier`] wires everything together.

mod config;
mod errors;
mod event_bus;
mod model;
mod notifier;
mod quick_check;
mod scanner;
mod session;
mod storage;
mod watch;

pub mod metrics;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use event_bus::*;
pub use model::*;
pub use notifier::*;
pub use quick_check::*;
pub use scanner::*;
pub use session::*;
pub use storage::*;
pub use watch::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
