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

    let default_paths = [
        "./config.toml",
        "./camcast.toml",
        "~/.config/camcast/config.toml",
        "/etc/camcast/config.toml",
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
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if let Some(ref url) = config.server.public_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("public_url must start with http:// or https://: {}", url);
        }
    }

    if config.store.dir.as_os_str().is_empty() {
        anyhow::bail!("Store directory cannot be empty");
    }

    if config.transcoder.segment_duration_secs == 0 {
        anyhow::bail!("Segment duration cannot be 0");
    }

    if config.transcoder.list_size == 0 {
        anyhow::bail!("Playlist list size cannot be 0");
    }

    let sup = &config.supervisor;
    if sup.startup_timeout_ms == 0 || sup.poll_interval_ms == 0 {
        anyhow::bail!("Startup timeout and poll interval must be non-zero");
    }
    if sup.termination_timeout_ms == 0 {
        anyhow::bail!("Termination timeout cannot be 0");
    }
    if sup.settle_attempts == 0 {
        anyhow::bail!("settle_attempts must be at least 1");
    }

    if let Some(ref path) = config.transcoder.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    Ok(())
}
