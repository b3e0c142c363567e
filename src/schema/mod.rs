//! Schema module - configuration types for the engine and for CLI run files.

mod config;
mod run;

pub use config::*;
pub use run::*;
