mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config)?;
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
        "./vidfusion.toml",
        "~/.config/vidfusion/config.toml",
        "/etc/vidfusion/config.toml",
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

fn expand_paths(config: &mut Config) -> Result<()> {
    let engine = &mut config.engine;
    for path in [&mut engine.ffmpeg, &mut engine.ffprobe, &mut engine.temp_dir] {
        let raw = path.to_string_lossy().into_owned();
        let expanded = shellexpand::full(&raw)
            .with_context(|| format!("Failed to expand path: {}", raw))?;
        *path = expanded.as_ref().into();
    }
    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let engine = &config.engine;

    if engine.frame_rate == 0 {
        anyhow::bail!("Engine frame rate cannot be 0");
    }

    if engine.ffmpeg.as_os_str().is_empty() {
        anyhow::bail!("Engine ffmpeg path cannot be empty");
    }

    if engine.ffprobe.as_os_str().is_empty() {
        anyhow::bail!("Engine ffprobe path cannot be empty");
    }

    if engine.timeout_secs == Some(0) {
        anyhow::bail!("Engine timeout must be at least one second");
    }

    if !engine.temp_dir.exists() {
        tracing::warn!(
            "Temp directory does not exist and will be created: {:?}",
            engine.temp_dir
        );
    }

    Ok(())
}
