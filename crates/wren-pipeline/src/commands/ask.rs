use std::io::Write;

use async_trait::async_trait;
use eyre::{Result, eyre};
use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wren_pipeline_core::{Pipeline, PipelineConfig, PipelineMode};

use super::Command;

/// Run one turn and write its fragments to stdout as they arrive.
pub struct AskCommand {
    pub config: PipelineConfig,
    pub question: String,
    pub chat_id: String,
    pub mode: PipelineMode,
}

#[async_trait]
impl Command for AskCommand {
    async fn execute(&self) -> Result<()> {
        let pipeline = Pipeline::new(self.config.clone())
            .map_err(|e| eyre!("Failed to create pipeline: {}", e))?
            .with_mode(self.mode);

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        let body = json!({ "metadata": { "chat_id": self.chat_id } });
        let mut fragments = pipeline
            .pipe_with_cancel(&self.question, "cli", &[], &body, cancel)
            .await
            .into_stream();

        while let Some(fragment) = fragments.next().await {
            let mut out = std::io::stdout().lock();
            out.write_all(fragment.as_bytes())?;
            out.flush()?;
        }
        writeln!(std::io::stdout())?;
        Ok(())
    }
}
