pub mod cli;
pub mod commands;
pub mod server;

pub use wren_pipeline_core::{api, config, format, pipeline, session, turn, utils};
