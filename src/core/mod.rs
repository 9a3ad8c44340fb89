pub mod aggregate;
pub mod engine;
pub mod filter;
pub mod loader;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod schema;

pub use crate::domain::model::{Datasets, FlowRecord};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
