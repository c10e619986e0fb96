//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flow_core::{ProtocolConfig, SessionConfig};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default device address
    #[serde(default)]
    pub device: Option<String>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Keep-alive interval in seconds
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,

    /// Protocol overrides
    #[serde(default)]
    pub protocol: ProtocolOverrides,
}

/// Overrides for the protocol constants.
///
/// Byte sequences are hex strings (`"a5971469"`), characteristics are UUID
/// strings. Unset fields keep the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_history_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_characteristic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_characteristic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_characteristic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_characteristic: Option<String>,
}

impl ProtocolOverrides {
    /// Apply the overrides on top of the default protocol description.
    pub fn apply(&self, mut protocol: ProtocolConfig) -> Result<ProtocolConfig> {
        if let Some(key) = &self.auth_key {
            protocol.auth_key = parse_hex("auth_key", key)?;
        }
        if let Some(cmd) = &self.activate_command {
            protocol.activate_command = parse_hex("activate_command", cmd)?;
        }
        if let Some(cmd) = &self.fetch_history_command {
            protocol.fetch_history_command = parse_hex("fetch_history_command", cmd)?;
        }
        if let Some(uuid) = &self.auth_characteristic {
            protocol.auth_characteristic = parse_uuid("auth_characteristic", uuid)?;
        }
        if let Some(uuid) = &self.command_characteristic {
            protocol.command_characteristic = parse_uuid("command_characteristic", uuid)?;
        }
        if let Some(uuid) = &self.data_characteristic {
            protocol.data_characteristic = parse_uuid("data_characteristic", uuid)?;
        }
        if let Some(uuid) = &self.battery_characteristic {
            protocol.battery_characteristic = parse_uuid("battery_characteristic", uuid)?;
        }
        Ok(protocol)
    }
}

fn parse_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let cleaned: String = digits
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(&cleaned)
        .with_context(|| format!("protocol.{field}: '{value}' is not valid hex"))?;
    if bytes.is_empty() {
        bail!("protocol.{field} must not be empty");
    }
    Ok(bytes)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .with_context(|| format!("protocol.{field}: '{value}' is not a valid UUID"))
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flow")
            .join("config.toml")
    }

    /// Load config from `path`, or return defaults if it is missing or broken
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
            }
        }
        Self::default()
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Build the session configuration, with `timeout` (seconds) taking
    /// precedence over the file.
    pub fn session_config(&self, timeout: Option<u64>) -> Result<SessionConfig> {
        let mut config = SessionConfig::default();
        if let Some(secs) = timeout.or(self.timeout) {
            config = config.connection_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.keep_alive_secs {
            config = config.keep_alive_interval(Duration::from_secs(secs));
        }
        let protocol = self.protocol.apply(ProtocolConfig::default())?;
        let config = config.protocol(protocol);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Resolve device from arg (or env var) first, then config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_broken_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "device = [not toml").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            device: Some("E4:3D:7F:05:7C:FA".to_string()),
            timeout: Some(30),
            keep_alive_secs: Some(4),
            protocol: ProtocolOverrides {
                auth_key: Some("deadbeef".to_string()),
                ..Default::default()
            },
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            device = "FLOW-00:43:A6"
            keep_alive_secs = 3

            [protocol]
            activate_command = "0x0100"
            data_characteristic = "30390501-4e55-4c10-9dce-b654f35fdf99"
            "#,
        )
        .unwrap();
        assert_eq!(config.device.as_deref(), Some("FLOW-00:43:A6"));
        assert_eq!(config.protocol.activate_command.as_deref(), Some("0x0100"));
    }

    #[test]
    fn test_session_config_applies_overrides() {
        let config = Config {
            timeout: Some(45),
            keep_alive_secs: Some(2),
            protocol: ProtocolOverrides {
                auth_key: Some("a5:97:14:6a".to_string()),
                fetch_history_command: Some("0300".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let session = config.session_config(None).unwrap();
        assert_eq!(session.connection_timeout, Duration::from_secs(45));
        assert_eq!(session.keep_alive_interval, Duration::from_secs(2));
        assert_eq!(session.protocol.auth_key, vec![0xa5, 0x97, 0x14, 0x6a]);
        assert_eq!(session.protocol.fetch_history_command, vec![0x03, 0x00]);

        let session = config.session_config(Some(5)).unwrap();
        assert_eq!(session.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_overrides_are_rejected() {
        let mut config = Config::default();
        config.protocol.auth_key = Some("zz".to_string());
        assert!(config.session_config(None).is_err());

        let mut config = Config::default();
        config.protocol.activate_command = Some(String::new());
        assert!(config.session_config(None).is_err());

        let mut config = Config::default();
        config.protocol.data_characteristic = Some("not-a-uuid".to_string());
        assert!(config.session_config(None).is_err());

        let config = Config {
            keep_alive_secs: Some(0),
            ..Default::default()
        };
        assert!(config.session_config(None).is_err());
    }

    #[test]
    fn test_parse_hex_prefixes() {
        assert_eq!(parse_hex("f", "0x0100").unwrap(), vec![0x01, 0x00]);
        assert_eq!(parse_hex("f", "0XA5").unwrap(), vec![0xa5]);
        assert_eq!(parse_hex("f", " a5:97 ").unwrap(), vec![0xa5, 0x97]);
        assert!(parse_hex("f", "0x0x01").is_err());
        assert!(parse_hex("f", "0x").is_err());
    }

    #[test]
    fn test_resolve_device() {
        let config = Config {
            device: Some("default".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_device(Some("explicit".to_string()), &config).as_deref(),
            Some("explicit")
        );
        assert_eq!(resolve_device(None, &config).as_deref(), Some("default"));
        assert_eq!(resolve_device(None, &Config::default()), None);
    }
}
