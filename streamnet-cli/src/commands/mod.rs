//! CLI command implementations.

pub mod config;
pub mod run;

pub use config::{load_config, show_config};
pub use run::{run_demo, Demo};
