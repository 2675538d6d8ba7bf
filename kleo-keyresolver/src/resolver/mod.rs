//! The key resolution engine and its result types.
mod address_map;
pub use address_map::*;
mod solution;
pub use solution::*;
mod core;
pub use self::core::*;
