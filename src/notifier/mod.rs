//! Entry points for the RPC layer and the wiring of the pipeline.
//!
//! ```text
//! ReleaseStore -> ReleaseScanner -> EventBus -> WatchRegistry -> SessionManager -> caller
//!                      |                                              ^
//!                      +--------> ReleaseCache <---- quick check -----+
//! ```

mod builder;
mod notifier;

pub use builder::*;
pub use notifier::*;
