use dotenvy::dotenv;
use eyre::{Result, eyre};
use wren_pipeline_core::PipelineConfig;

pub fn load_env() -> Result<()> {
    dotenv().ok();
    Ok(())
}

/// Configuration from the environment, with `--base-url` taking precedence
/// over `WREN_UI_URL`.
pub fn resolve_config(base_url: Option<&str>) -> Result<PipelineConfig> {
    resolve_with(base_url, |key| std::env::var(key).ok())
}

fn resolve_with<F>(base_url: Option<&str>, lookup: F) -> Result<PipelineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    PipelineConfig::from_lookup(|key| match (key, base_url) {
        ("WREN_UI_URL", Some(url)) => Some(url.to_string()),
        _ => lookup(key),
    })
    .map_err(|e| eyre!("{e}"))
}
