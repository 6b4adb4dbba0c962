//! Helper Utilities
//!
//! Common utilities used across the application.

mod clock;
mod fs;

pub use clock::*;
pub use fs::*;
