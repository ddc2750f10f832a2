use std::io::Write;

use async_trait::async_trait;
use eyre::{Result, eyre};
use futures_util::StreamExt;
use tracing::warn;
use wren_pipeline_core::PipelineConfig;
use wren_pipeline_core::api::{Upstream, WrenClient};
use wren_pipeline_core::format::clean_escapes;

use super::Command;

pub struct ExplainCommand {
    pub config: PipelineConfig,
    pub query_id: String,
}

#[async_trait]
impl Command for ExplainCommand {
    async fn execute(&self) -> Result<()> {
        let client = WrenClient::new(&self.config)
            .map_err(|e| eyre!("Failed to create Wren-UI client: {}", e))?;
        let mut frames = client
            .stream_explanation(&self.query_id)
            .await
            .map_err(|e| eyre!("Failed to open explanation stream: {}", e))?;

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(target: "wren::cli", error = %e, "Explanation stream failed");
                    return Err(eyre!("Explanation stream failed: {}", e));
                }
            };
            if let Some(message) = frame.message.as_deref() {
                let mut out = std::io::stdout().lock();
                out.write_all(clean_escapes(message).as_bytes())?;
                out.flush()?;
            }
            if frame.done {
                break;
            }
        }
        writeln!(std::io::stdout())?;
        Ok(())
    }
}
