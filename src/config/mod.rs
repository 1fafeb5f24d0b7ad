pub mod persist;
mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./reelcast.toml",
        "~/.config/reelcast/config.toml",
        "/etc/reelcast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.pipeline.max_concurrent_sessions == 0 {
        anyhow::bail!("pipeline.max_concurrent_sessions cannot be 0");
    }

    if config.pipeline.min_video_bytes == 0 {
        anyhow::bail!("pipeline.min_video_bytes cannot be 0");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts cannot be 0");
    }

    if config.retry.multiplier < 1.0 {
        anyhow::bail!("retry.multiplier must be >= 1.0");
    }

    if config.transform.speed <= 0.0 {
        anyhow::bail!("transform.speed must be positive");
    }

    if let Some(music) = &config.transform.music_path {
        if !music.exists() {
            tracing::warn!("transform.music_path does not exist: {:?}", music);
        }
    }

    if config.storage.max_upload_bytes == 0 {
        anyhow::bail!("storage.max_upload_bytes cannot be 0");
    }

    Ok(())
}
