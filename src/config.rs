//! Service configuration.
//!
//! Layered sources, later wins: built-in defaults, then an optional TOML
//! file, then `RELAYDESK_*` environment variables. The admin API key is
//! never logged.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory the document store keeps its collection files in.
    pub data_dir: PathBuf,
    /// Collection the session record lives in.
    pub collection: String,
    /// Fixed name the session record is persisted under.
    pub session_name: String,
    /// Bearer token required by the mutating admin endpoints. `None`
    /// disables them.
    pub admin_api_key: Option<String>,
    /// Address the admin HTTP surface binds to.
    pub bind_addr: String,
    pub health_interval_minutes: u64,
    pub shutdown_flush_wait_secs: u64,
    pub qr_expiry_minutes: i64,
    /// Base URL of the ticketing backend, probed by `/status`.
    pub ticketing_url: Option<String>,
    /// Command spawned as the automation driver process.
    pub transport_command: String,
    pub transport_args: Vec<String>,
    /// Minutes between the driver's own background session syncs, passed
    /// through to the driver. Longer than the health interval on purpose;
    /// the monitor's forced flush covers the gap.
    pub transport_sync_interval_minutes: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            collection: "platform-sessions".to_string(),
            session_name: "support-bridge".to_string(),
            admin_api_key: None,
            bind_addr: "0.0.0.0:3000".to_string(),
            health_interval_minutes: 10,
            shutdown_flush_wait_secs: 2,
            qr_expiry_minutes: 2,
            ticketing_url: None,
            transport_command: "relaydesk-driver".to_string(),
            transport_args: Vec::new(),
            transport_sync_interval_minutes: 5,
        }
    }
}

impl BridgeConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the full layered configuration: defaults, then the optional
    /// file, then environment variables.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `RELAYDESK_*` overrides from the given lookup. Taking the
    /// lookup as a closure keeps this testable without mutating the process
    /// environment.
    pub fn apply_env_from<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = get("RELAYDESK_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = get("RELAYDESK_COLLECTION") {
            self.collection = value;
        }
        if let Some(value) = get("RELAYDESK_SESSION_NAME") {
            self.session_name = value;
        }
        if let Some(value) = get("RELAYDESK_ADMIN_API_KEY") {
            self.admin_api_key = Some(value);
        }
        if let Some(value) = get("RELAYDESK_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some(value) = get("RELAYDESK_TICKETING_URL") {
            self.ticketing_url = Some(value);
        }
        if let Some(value) = get("RELAYDESK_TRANSPORT_COMMAND") {
            self.transport_command = value;
        }
        if let Some(value) = get("RELAYDESK_TRANSPORT_ARGS") {
            self.transport_args = value.split_whitespace().map(str::to_string).collect();
        }

        Self::apply_number(&mut self.health_interval_minutes, &get, "RELAYDESK_HEALTH_INTERVAL_MINUTES");
        Self::apply_number(&mut self.shutdown_flush_wait_secs, &get, "RELAYDESK_FLUSH_WAIT_SECS");
        Self::apply_number(&mut self.qr_expiry_minutes, &get, "RELAYDESK_QR_EXPIRY_MINUTES");
        Self::apply_number(
            &mut self.transport_sync_interval_minutes,
            &get,
            "RELAYDESK_TRANSPORT_SYNC_INTERVAL_MINUTES",
        );
    }

    fn apply_number<T, F>(slot: &mut T, get: &F, key: &str)
    where
        T: std::str::FromStr,
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = get(key) {
            match value.parse() {
                Ok(parsed) => *slot = parsed,
                Err(_) => warn!(key, value, "ignoring unparsable numeric override"),
            }
        }
    }
}
