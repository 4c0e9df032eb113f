//! Filesystem operations module
//!
//! Shard decompression and input discovery.

mod decompress;
mod scanner;

pub use decompress::*;
pub use scanner::*;
