use std::time::Duration;

use clap::Parser;
use eyre::Result;
use wren_pipeline::cli::{Cli, Commands};
use wren_pipeline::commands::{
    Command, ask::AskCommand, explain::ExplainCommand, serve::ServeCommand,
};
use wren_pipeline_core::PipelineMode;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load .env file if it exists
    wren_pipeline::cli::config::load_env()?;

    // Level configured via RUST_LOG; WREN_PIPELINE_LOG_DIR sends logs to a file
    wren_pipeline_core::utils::tracing::init_tracing()?;

    let config = wren_pipeline::cli::config::resolve_config(cli.base_url.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            mode,
            evict_every,
        } => {
            let command = ServeCommand {
                config,
                port,
                bind,
                mode,
                evict_every: Duration::from_secs(evict_every.max(1)),
            };
            command.execute().await
        }
        Commands::Ask {
            question,
            chat_id,
            one_shot,
        } => {
            let command = AskCommand {
                config,
                question,
                chat_id,
                mode: if one_shot {
                    PipelineMode::OneShot
                } else {
                    PipelineMode::Streaming
                },
            };
            command.execute().await
        }
        Commands::Explain { query_id } => {
            let command = ExplainCommand { config, query_id };
            command.execute().await
        }
    }
}
