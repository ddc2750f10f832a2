use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::info;
use wren_pipeline_core::{Pipeline, PipelineConfig, PipelineMode};

use super::Command;
use crate::server;

pub struct ServeCommand {
    pub config: PipelineConfig,
    pub port: u16,
    pub bind: String,
    pub mode: PipelineMode,
    pub evict_every: Duration,
}

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self) -> Result<()> {
        let addr: std::net::SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| eyre!("Invalid bind address: {}", e))?;

        let pipeline = Arc::new(
            Pipeline::new(self.config.clone())
                .map_err(|e| eyre!("Failed to create pipeline: {}", e))?
                .with_mode(self.mode),
        );
        pipeline.on_startup().await;

        let cancel = CancellationToken::new();
        let evictor = server::spawn_evictor(
            Arc::clone(pipeline.sessions()),
            self.evict_every,
            cancel.clone(),
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(target: "wren::server", %addr, "HTTP server listening");
        {
            let mut out = std::io::stdout().lock();
            writeln!(out, "Server listening on http://{addr}")?;
            writeln!(out, "Press Ctrl+C to shutdown")?;
        }

        axum::serve(listener, server::router(Arc::clone(&pipeline)))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!(target: "wren::server", "Shutdown signal received");
            })
            .await?;

        cancel.cancel();
        evictor
            .await
            .map_err(|e| eyre!("Session evictor failed: {}", e))?;
        pipeline.on_shutdown().await;
        Ok(())
    }
}
