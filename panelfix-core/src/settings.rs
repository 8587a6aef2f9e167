use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Installer shipped by the CyberPanel bootstrap script
pub const DEFAULT_INSTALLER_PATH: &str = "/root/cyberpanel/install/installCyberPanel.py";
/// Operator-controlled list of rDNS relay servers
pub const DEFAULT_RELAY_LIST_URL: &str = "https://cyberpanel.net/dnsServers.txt";
pub const DEFAULT_LOG_FILE: &str = "/home/cyberpanel/error-logs.txt";
/// Debug-level logging is enabled while this file exists
pub const DEFAULT_DEBUG_MARKER: &str = "/usr/local/CyberCP/debug";
pub const DEFAULT_STATUS_FILE: &str = "/home/cyberpanel/onboarding-status";

/// Settings shared by every panelfix operation
///
/// Every field has a default, so a settings file only needs to name the
/// values it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PanelSettings {
    /// Installer script rewritten by the patcher
    pub installer_path: PathBuf,
    /// URL returning `{"urls": [...]}`
    pub relay_list_url: String,
    /// Timeout for the relay list fetch, in seconds
    pub relay_list_timeout_secs: u64,
    /// Timeout for each relay query, in seconds
    pub relay_query_timeout_secs: u64,
    /// Append-only panel log
    pub log_file: PathBuf,
    pub debug_marker: PathBuf,
    /// Receives the latest onboarding status message
    pub status_file: PathBuf,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            installer_path: PathBuf::from(DEFAULT_INSTALLER_PATH),
            relay_list_url: DEFAULT_RELAY_LIST_URL.to_string(),
            relay_list_timeout_secs: 10,
            relay_query_timeout_secs: 5,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            debug_marker: PathBuf::from(DEFAULT_DEBUG_MARKER),
            status_file: PathBuf::from(DEFAULT_STATUS_FILE),
        }
    }
}

impl PanelSettings {
    /// Load settings from a JSON file, or defaults if no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: PanelSettings = serde_json::from_str(&data)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn relay_list_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_list_timeout_secs)
    }

    pub fn relay_query_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_query_timeout_secs)
    }
}
