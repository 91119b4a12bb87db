use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{Attribute, DeviceConfig, MountConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLocality {
    pub pci_bus_id: String,
}

/// A single device instance inside a [`DeviceGroup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub healthy: bool,
    pub health_description: Option<String>,
    pub hw_locality: Option<DeviceLocality>,
}

/// Devices sharing vendor, type and model name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGroup {
    pub vendor: String,
    pub device_type: String,
    pub name: String,
    pub devices: Vec<Device>,
    pub attributes: BTreeMap<String, Attribute>,
}

impl DeviceGroup {
    /// `vendor/type/name`.
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.vendor, self.device_type, self.name)
    }

    pub fn healthy_count(&self) -> usize {
        self.devices.iter().filter(|d| d.healthy).count()
    }
}

/// One sample of the device fingerprint stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFingerprint {
    pub groups: Vec<DeviceGroup>,
}

/// Instructions for mounting reserved devices into a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerReservation {
    pub envs: BTreeMap<String, String>,
    pub mounts: Vec<MountConfig>,
    pub devices: Vec<DeviceConfig>,
}

/// Single numeric, string or boolean reading. Unset parts are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatValue {
    pub float_numerator: Option<f64>,
    pub float_denominator: Option<f64>,
    pub int_numerator: Option<i64>,
    pub int_denominator: Option<i64>,
    pub string_val: Option<String>,
    pub bool_val: Option<bool>,
    pub unit: String,
    pub desc: String,
}

impl StatValue {
    pub fn int_ratio(numerator: i64, denominator: i64, unit: impl Into<String>) -> Self {
        Self {
            int_numerator: Some(numerator),
            int_denominator: Some(denominator),
            unit: unit.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStats {
    pub summary: Option<StatValue>,
    pub timestamp: Option<SystemTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGroupStats {
    pub vendor: String,
    pub device_type: String,
    pub name: String,
    /// Keyed by device id.
    pub instance_stats: BTreeMap<String, DeviceStats>,
}

/// One sample of the device stats stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatsReport {
    pub groups: Vec<DeviceGroupStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_and_health() {
        let group = DeviceGroup {
            vendor: "nvidia".into(),
            device_type: "gpu".into(),
            name: "t4".into(),
            devices: vec![
                Device {
                    id: "gpu-0".into(),
                    healthy: true,
                    ..Default::default()
                },
                Device {
                    id: "gpu-1".into(),
                    healthy: false,
                    health_description: Some("xid 79".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(group.id(), "nvidia/gpu/t4");
        assert_eq!(group.healthy_count(), 1);
    }
}
