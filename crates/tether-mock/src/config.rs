use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_model::{
    Attribute, Capabilities, ConfigSchema, Device, DeviceFingerprint, DeviceGroup, FieldKind,
    Fingerprint, FsIsolation, MountConfigSupport, NetIsolationMode, SchemaField,
};

/// Driver config blob understood by [`MockDriver`](crate::MockDriver).
///
/// Durations are milliseconds; `0` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockTaskConfig {
    /// Exit on its own after this long. `0` runs until stopped.
    pub run_for_ms: u64,
    pub exit_code: i32,
    pub exit_signal: i32,
    pub exit_err_msg: Option<String>,

    pub start_error: Option<String>,
    pub start_error_recoverable: bool,
    pub start_block_for_ms: u64,

    /// How long the task ignores a stop request before it is killed.
    pub kill_after_ms: u64,
    /// Terminate the whole plugin process this long after start.
    pub plugin_exit_after_ms: u64,
    pub signal_error: Option<String>,

    pub driver_ip: Option<String>,
    pub driver_advertise: bool,
    pub driver_port_map: BTreeMap<String, u16>,
}

impl MockTaskConfig {
    pub fn run_for(&self) -> Option<Duration> {
        millis(self.run_for_ms)
    }

    pub fn kill_after(&self) -> Duration {
        Duration::from_millis(self.kill_after_ms)
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new(vec![
            SchemaField::optional("run_for_ms", FieldKind::Number)
                .describe("exit on its own after this many milliseconds"),
            SchemaField::optional("exit_code", FieldKind::Number),
            SchemaField::optional("exit_signal", FieldKind::Number),
            SchemaField::optional("exit_err_msg", FieldKind::String),
            SchemaField::optional("start_error", FieldKind::String)
                .describe("fail StartTask with this message"),
            SchemaField::optional("start_error_recoverable", FieldKind::Bool),
            SchemaField::optional("start_block_for_ms", FieldKind::Number),
            SchemaField::optional("kill_after_ms", FieldKind::Number),
            SchemaField::optional("plugin_exit_after_ms", FieldKind::Number),
            SchemaField::optional("signal_error", FieldKind::String),
            SchemaField::optional("driver_ip", FieldKind::String),
            SchemaField::optional("driver_advertise", FieldKind::Bool),
            SchemaField::optional("driver_port_map", FieldKind::Map),
        ])
    }
}

/// What the mock persists in `TaskHandle::driver_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockTaskState {
    pub started_at_ms: u64,
    pub command: MockTaskConfig,
}

#[derive(Debug, Clone)]
pub struct MockDriverConfig {
    pub name: String,
    pub version: String,
    pub capabilities: Capabilities,
    /// When set, the fingerprint stream sends exactly these and then ends.
    pub fingerprints: Option<Vec<Fingerprint>>,
    pub fingerprint_interval: Duration,
    /// Used when a stats request asks for a zero interval.
    pub stats_interval: Duration,
    /// Honour `plugin_exit_after_ms` by exiting the process.
    pub allow_plugin_exit: bool,
}

impl Default for MockDriverConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Capabilities {
                send_signals: true,
                exec: true,
                fs_isolation: FsIsolation::None,
                net_isolation_modes: vec![NetIsolationMode::Host, NetIsolationMode::Group],
                must_initiate_network: false,
                mount_configs: MountConfigSupport::All,
                disable_log_collection: false,
            },
            fingerprints: None,
            fingerprint_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(1),
            allow_plugin_exit: false,
        }
    }
}

impl MockDriverConfig {
    pub(crate) fn default_fingerprint(&self) -> Fingerprint {
        Fingerprint::healthy("healthy")
            .with_attribute("driver.mock", Attribute::bool(true))
            .with_attribute("driver.mock.version", Attribute::string(&self.version))
    }
}

#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    pub name: String,
    pub version: String,
    pub groups: Vec<DeviceGroup>,
    /// When set, the fingerprint stream sends exactly these and then ends.
    pub fingerprints: Option<Vec<DeviceFingerprint>>,
    pub fingerprint_interval: Duration,
    pub stats_interval: Duration,
    /// Refuse to reserve a device twice until it is released.
    pub exclusive: bool,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        let devices = (0..2)
            .map(|i| Device {
                id: format!("mock-{i}"),
                healthy: true,
                health_description: None,
                hw_locality: None,
            })
            .collect();
        let mut attributes = BTreeMap::new();
        attributes.insert("memory".to_string(), Attribute::int(8192).with_unit("MiB"));

        Self {
            name: "mock-device".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            groups: vec![DeviceGroup {
                vendor: "tether".to_string(),
                device_type: "gpu".to_string(),
                name: "mock".to_string(),
                devices,
                attributes,
            }],
            fingerprints: None,
            fingerprint_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(1),
            exclusive: false,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_is_a_valid_config() {
        let cfg: MockTaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, MockTaskConfig::default());
        assert_eq!(cfg.run_for(), None);
        MockTaskConfig::schema()
            .validate(&serde_json::json!({}))
            .unwrap();
    }

    #[test]
    fn schema_covers_every_field() {
        let full = serde_json::to_value(MockTaskConfig {
            run_for_ms: 10,
            exit_err_msg: Some("x".into()),
            start_error: Some("x".into()),
            signal_error: Some("x".into()),
            driver_ip: Some("10.0.0.1".into()),
            ..Default::default()
        })
        .unwrap();
        MockTaskConfig::schema().validate(&full).unwrap();
    }

    #[test]
    fn schema_rejects_wrong_kinds() {
        let bad = serde_json::json!({ "run_for_ms": "soon" });
        assert!(MockTaskConfig::schema().validate(&bad).is_err());
    }
}
