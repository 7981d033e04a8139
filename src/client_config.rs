use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aprs_client::{AprsClientConfig, DEFAULT_PASSCODE, DEFAULT_SERVER};

/// Client configuration file structure (TOML)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfigFile {
    #[serde(default = "default_server")]
    pub server: String,
    /// Derived from `filter` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub callsign: String,
    #[serde(default = "default_passcode")]
    pub passcode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// `[reconnect]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_seconds: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_seconds: 0,
            max_retry_delay_seconds: default_max_retry_delay(),
        }
    }
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_passcode() -> String {
    DEFAULT_PASSCODE.to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_retry_delay() -> u64 {
    60
}

impl ClientConfigFile {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: ClientConfigFile =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise `None`
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Save config to a TOML file (atomic: write to .tmp then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", tmp_path, path))?;
        Ok(())
    }
}

impl From<ClientConfigFile> for AprsClientConfig {
    fn from(file: ClientConfigFile) -> Self {
        Self {
            server: file.server,
            port: file.port,
            callsign: file.callsign,
            passcode: file.passcode,
            filter: file.filter,
            max_retries: file.reconnect.max_retries,
            retry_delay_seconds: file.reconnect.retry_delay_seconds,
            max_retry_delay_seconds: file.reconnect.max_retry_delay_seconds,
        }
    }
}

impl From<AprsClientConfig> for ClientConfigFile {
    fn from(config: AprsClientConfig) -> Self {
        Self {
            server: config.server,
            port: config.port,
            callsign: config.callsign,
            passcode: config.passcode,
            filter: config.filter,
            reconnect: ReconnectSection {
                max_retries: config.max_retries,
                retry_delay_seconds: config.retry_delay_seconds,
                max_retry_delay_seconds: config.max_retry_delay_seconds,
            },
        }
    }
}

/// Resolve the client config file path.
///
/// Priority:
/// 1. `OGN_CLIENT_CONFIG` env var
/// 2. `./ogn-client.toml`
pub fn client_config_path() -> PathBuf {
    std::env::var("OGN_CLIENT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./ogn-client.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let parsed: ClientConfigFile = toml::from_str(r#"callsign = "N0CALL""#).unwrap();

        assert_eq!(parsed.server, "aprs.glidernet.org");
        assert_eq!(parsed.passcode, "-1");
        assert_eq!(parsed.port, None);
        assert_eq!(parsed.reconnect, ReconnectSection::default());

        let config = AprsClientConfig::from(parsed);
        assert_eq!(config.effective_port(), 10152);
    }

    #[test]
    fn test_config_sections() {
        let parsed: ClientConfigFile = toml::from_str(
            r#"
            callsign = "OK1ABC"
            passcode = "12345"
            filter = "r/49.0/14.5/200"

            [reconnect]
            max_retries = 2
            retry_delay_seconds = 3
            "#,
        )
        .unwrap();

        let config = AprsClientConfig::from(parsed);
        assert_eq!(config.callsign, "OK1ABC");
        assert_eq!(config.effective_port(), 14580);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_seconds, 3);
        assert_eq!(config.max_retry_delay_seconds, 60);
    }

    #[test]
    fn test_config_load_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ogn-client.toml");

        let config = ClientConfigFile::from(AprsClientConfig {
            port: Some(14581),
            filter: Some("r/47.0/-122.0/100".to_string()),
            ..Default::default()
        });

        config.save(&path).unwrap();
        let loaded = ClientConfigFile::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(ClientConfigFile::load_optional(&path).unwrap().is_none());
        assert!(ClientConfigFile::load(&path).is_err());
    }

    #[test]
    fn test_missing_callsign_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "server = \"localhost\"\n").unwrap();

        let err = ClientConfigFile::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }
}
