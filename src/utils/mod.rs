mod panic;
pub mod time;

pub(crate) use panic::*;
