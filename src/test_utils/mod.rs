//! Shared builders for unit tests.
mod common;

pub use common::*;
