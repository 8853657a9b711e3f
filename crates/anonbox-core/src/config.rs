use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Default location of the CLI config file, before `~` expansion.
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/anonbox/config.toml";

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonboxConfig {
    pub log: LogConfig,
    pub keys: KeysConfig,
    pub output: OutputConfig,
    /// Warn if the config file is group/world-readable (default: true)
    pub config_file_mode_check: bool,
}

impl Default for AnonboxConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            keys: KeysConfig::default(),
            output: OutputConfig::default(),
            config_file_mode_check: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or EnvFilter directive (default: warn)
    pub level: String,
    /// Log format: "text" or "json"
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Key files used when a command is not given a key explicitly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Base64 private key file (one line)
    pub private_key_file: Option<PathBuf>,
    /// Base64 public key file of the default recipient (one line)
    pub public_key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Envelope output form: "json" or "hex" (0x-prefixed hex of the JSON)
    pub armor: Armor,
    /// Pretty-print JSON output (default: true)
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Armor {
    #[default]
    Json,
    Hex,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: LogFormat::Text,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            armor: Armor::Json,
            pretty: true,
        }
    }
}

impl AnonboxConfig {
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> CoreResult<String> {
        toml::to_string(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn private_key_file(&self) -> Option<PathBuf> {
        self.keys.private_key_file.as_deref().map(expand_tilde)
    }

    pub fn public_key_file(&self) -> Option<PathBuf> {
        self.keys.public_key_file.as_deref().map(expand_tilde)
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{home}/{rest}"))
    } else {
        path.to_path_buf()
    }
}

/// Returns true (and logs a warning) when `path` is readable by group or others.
///
/// Always false on non-Unix platforms.
pub fn check_file_mode(path: &Path) -> CoreResult<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                "{} is accessible by other users (mode {:o}); consider chmod 600",
                path.display(),
                mode & 0o777
            );
            return Ok(true);
        }
        Ok(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(false)
    }
}
