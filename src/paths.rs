use anyhow::{Context, Result};
use std::path::PathBuf;

/// Configuration for overriding default config-file locations.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (host-provided or from ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from a host-provided directory and environment.
    ///
    /// Priority: explicit dir -> ENV var (PREVUE_CONFIG_DIR) -> None (defaults)
    pub fn from_env_and_override(dir: Option<PathBuf>) -> Self {
        let config_dir = dir.or_else(|| std::env::var("PREVUE_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file.
///
/// Priority:
/// 1. PathConfig override (host-provided directory)
/// 2. PREVUE_CONFIG_DIR environment variable (via PathConfig)
/// 3. Platform-specific config directory from dirs-next
///
/// Platform paths:
/// - Linux: ~/.config/prevue/{name}
/// - macOS: ~/Library/Application Support/prevue/{name}
/// - Windows: %APPDATA%\prevue\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Ensure the configuration directory exists.
pub fn ensure_config_dir(config: &PathConfig) -> Result<()> {
    let dir = config_dir(config);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    Ok(())
}

fn config_dir(config: &PathConfig) -> PathBuf {
    if let Some(ref dir) = config.config_dir {
        return dir.clone();
    }

    dirs_next::config_dir()
        .map(|d| d.join("prevue"))
        .unwrap_or_else(|| PathBuf::from("."))
}
