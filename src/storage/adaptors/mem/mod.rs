mod mem_release_store;

pub use mem_release_store::*;
