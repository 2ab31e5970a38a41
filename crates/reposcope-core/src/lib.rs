//! Configuration and component wiring for reposcope.

pub mod analyzer;
pub mod config;
pub mod secret;

pub use analyzer::Analyzer;
pub use config::{Config, ConfigError};
pub use secret::Secret;
