use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Timing and presence settings shared by the server and every client.
///
/// Loaded from TOML; any key left out takes its default:
///
/// ```toml
/// poll_interval_ms = 3000
/// heartbeat_interval_ms = 15000
/// debounce_ms = 1500
/// safety_flush_ms = 30000
/// presence_expiry_ms = 30000
/// live_tab = "advance"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync Poller period while the live tab is open.
    pub poll_interval_ms: u64,
    /// Heartbeat period on every other tab.
    pub heartbeat_interval_ms: u64,
    /// Quiet period after the last edit before autosave fires.
    pub debounce_ms: u64,
    /// Forced flush period while the dirty flag stays set.
    pub safety_flush_ms: u64,
    /// Presence entries older than this are left out of listings.
    pub presence_expiry_ms: u64,
    /// How long a merged field keeps its "updated" marker.
    pub flash_ms: u64,
    /// How long the "N fields updated" notice stays up.
    pub notice_ms: u64,
    /// How long the "saved" confirmation stays up.
    pub saved_clear_ms: u64,
    /// The tab whose fields are live-synced.
    pub live_tab: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            heartbeat_interval_ms: 15_000,
            debounce_ms: 1_500,
            safety_flush_ms: 30_000,
            presence_expiry_ms: 30_000,
            flash_ms: 1_500,
            notice_ms: 3_000,
            saved_clear_ms: 3_000,
            live_tab: "advance".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(s).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let intervals = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("debounce_ms", self.debounce_ms),
            ("safety_flush_ms", self.safety_flush_ms),
            ("presence_expiry_ms", self.presence_expiry_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(CoreError::Config(format!("{name} must be positive")));
            }
        }
        if self.debounce_ms >= self.safety_flush_ms {
            return Err(CoreError::Config(
                "debounce_ms must be shorter than safety_flush_ms".into(),
            ));
        }
        if self.live_tab.is_empty() {
            return Err(CoreError::Config("live_tab must not be empty".into()));
        }
        Ok(())
    }
}
