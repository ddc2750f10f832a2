// Core pipeline functionality without the HTTP surface or CLI

pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod turn;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{PipeOutput, Pipeline, PipelineMode};
