use clap::{Parser, Subcommand};
use wren_pipeline_core::PipelineMode;

/// Answer database questions in a chat host by relaying them to Wren-UI.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Wren-UI base URL (overrides WREN_UI_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Serve the pipeline over an OpenAI-compatible HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "9099")]
        port: u16,
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Answer with streamed reasoning or a single one-shot document
        #[arg(long, default_value = "streaming")]
        mode: PipelineMode,
        /// Seconds between idle-session sweeps
        #[arg(long, default_value = "300")]
        evict_every: u64,
    },
    /// Ask one question and print the answer
    Ask {
        /// The question; "Show chart" charts the previous answer in the same process only
        question: String,
        /// Chat id used to key the Wren-UI thread
        #[arg(long, default_value = "cli")]
        chat_id: String,
        /// Use the one-shot ask endpoint instead of streaming
        #[arg(long)]
        one_shot: bool,
    },
    /// Stream the explanation for a non-SQL question id
    Explain {
        /// The explanationQueryId returned by Wren-UI
        query_id: String,
    },
}
