//! Progress reporting module
//!
//! Provides progress visualization for pipeline stages with support
//! for multiple bars and throughput display.

mod reporter;

pub use reporter::*;
