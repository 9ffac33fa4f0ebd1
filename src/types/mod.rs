pub mod cell;
pub mod payload;

pub use cell::*;
pub use payload::*;
