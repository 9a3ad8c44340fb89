pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::storage::LocalStorage;
pub use config::TomlConfig;
pub use core::{engine::FlowMapEngine, pipeline::FlowMapPipeline};
pub use utils::error::{FlowMapError, Result};
