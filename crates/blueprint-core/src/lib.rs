pub mod analyze;
pub mod clock;
pub mod config;
pub mod console;
pub mod context;
pub mod drift;
pub mod error;
pub mod fs;
pub mod generate;
pub mod http;
pub mod infra;
pub mod manifest;
pub mod paths;
pub mod resolve;
pub mod runner;
pub mod tracking;

pub use error::{BlueprintError, Result};
