#![forbid(unsafe_code)]

pub mod codec;
pub mod model;
pub mod status;
pub mod time;

pub use time::Clock;
