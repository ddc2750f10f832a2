use async_trait::async_trait;
use eyre::Result;

pub mod ask;
pub mod explain;
pub mod serve;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
