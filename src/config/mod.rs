//! Configuration module for the Dolma runner
//!
//! Provides configuration management including CLI arguments,
//! per-stage YAML config files, and path templating.

mod settings;
mod stages;
mod template;

pub use settings::*;
pub use stages::*;
pub use template::*;
