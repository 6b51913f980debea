//! Engine configuration files.
//!
//! Configs are TOML. Any key may be omitted; missing keys take their
//! defaults.

use oc_engine::EngineConfig;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    Io(std::io::Error),
    /// The file is not valid config TOML
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {}", e),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

/// `<config dir>/octavo/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("octavo").join("config.toml"))
}

pub fn parse_config(text: &str) -> Result<EngineConfig, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load the platform default config, falling back to defaults when the
/// file does not exist.
pub fn load_default_config() -> Result<EngineConfig, ConfigError> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(EngineConfig::default()),
    }
}

pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [core]
            lookahead_ms = 150

            [voice.envelope]
            release = 0.5

            [metronome]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.core.lookahead_ms, 150);
        assert_eq!(config.core.tick_interval_ms, 25);
        assert_eq!(config.voice.envelope.release, 0.5);
        assert_eq!(config.voice.envelope.attack, 0.01);
        assert!(config.metronome.enabled);
        assert_eq!(config.metronome.accent_hz, 1800.0);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(parse_config("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(parse_config("[core"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            parse_config("[core]\nlookahead_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("octavo-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = EngineConfig::default();
        config.core.master_volume = 0.5;
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }
}
