use tether_model::{
    ContainerReservation, Device, DeviceFingerprint, DeviceGroup, DeviceGroupStats,
    DeviceLocality, DeviceStats, DeviceStatsReport, StatValue,
};

use super::{attributes_from_proto, attributes_to_proto, non_empty, timestamp_from_proto, timestamp_to_proto};
use crate::proto;

impl From<Device> for proto::DetectedDevice {
    fn from(d: Device) -> Self {
        proto::DetectedDevice {
            id: d.id,
            healthy: d.healthy,
            health_description: d.health_description.unwrap_or_default(),
            hw_locality: d.hw_locality.map(|l| proto::DeviceLocality {
                pci_bus_id: l.pci_bus_id,
            }),
        }
    }
}

impl From<proto::DetectedDevice> for Device {
    fn from(d: proto::DetectedDevice) -> Self {
        Device {
            id: d.id,
            healthy: d.healthy,
            health_description: non_empty(d.health_description),
            hw_locality: d.hw_locality.map(|l| DeviceLocality {
                pci_bus_id: l.pci_bus_id,
            }),
        }
    }
}

impl From<DeviceGroup> for proto::DeviceGroup {
    fn from(g: DeviceGroup) -> Self {
        proto::DeviceGroup {
            vendor: g.vendor,
            device_type: g.device_type,
            device_name: g.name,
            devices: g.devices.into_iter().map(Into::into).collect(),
            attributes: attributes_to_proto(g.attributes),
        }
    }
}

impl From<proto::DeviceGroup> for DeviceGroup {
    fn from(g: proto::DeviceGroup) -> Self {
        DeviceGroup {
            vendor: g.vendor,
            device_type: g.device_type,
            name: g.device_name,
            devices: g.devices.into_iter().map(Into::into).collect(),
            attributes: attributes_from_proto(g.attributes),
        }
    }
}

impl From<DeviceFingerprint> for proto::DeviceFingerprintResponse {
    fn from(fp: DeviceFingerprint) -> Self {
        proto::DeviceFingerprintResponse {
            device_group: fp.groups.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<proto::DeviceFingerprintResponse> for DeviceFingerprint {
    fn from(fp: proto::DeviceFingerprintResponse) -> Self {
        DeviceFingerprint {
            groups: fp.device_group.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ContainerReservation> for proto::ReserveResponse {
    fn from(res: ContainerReservation) -> Self {
        proto::ReserveResponse {
            container_res: Some(proto::ContainerReservation {
                envs: res.envs.into_iter().collect(),
                mounts: res.mounts.into_iter().map(Into::into).collect(),
                devices: res.devices.into_iter().map(Into::into).collect(),
            }),
        }
    }
}

impl From<proto::ReserveResponse> for ContainerReservation {
    fn from(resp: proto::ReserveResponse) -> Self {
        let res = resp.container_res.unwrap_or_default();
        ContainerReservation {
            envs: res.envs.into_iter().collect(),
            mounts: res.mounts.into_iter().map(Into::into).collect(),
            devices: res.devices.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<StatValue> for proto::StatValue {
    fn from(v: StatValue) -> Self {
        proto::StatValue {
            float_numerator_val: v.float_numerator,
            float_denominator_val: v.float_denominator,
            int_numerator_val: v.int_numerator,
            int_denominator_val: v.int_denominator,
            string_val: v.string_val,
            bool_val: v.bool_val,
            unit: v.unit,
            desc: v.desc,
        }
    }
}

impl From<proto::StatValue> for StatValue {
    fn from(v: proto::StatValue) -> Self {
        StatValue {
            float_numerator: v.float_numerator_val,
            float_denominator: v.float_denominator_val,
            int_numerator: v.int_numerator_val,
            int_denominator: v.int_denominator_val,
            string_val: v.string_val,
            bool_val: v.bool_val,
            unit: v.unit,
            desc: v.desc,
        }
    }
}

impl From<DeviceStats> for proto::DeviceStats {
    fn from(s: DeviceStats) -> Self {
        proto::DeviceStats {
            summary: s.summary.map(Into::into),
            timestamp: timestamp_to_proto(s.timestamp),
        }
    }
}

impl From<proto::DeviceStats> for DeviceStats {
    fn from(s: proto::DeviceStats) -> Self {
        DeviceStats {
            summary: s.summary.map(Into::into),
            timestamp: timestamp_from_proto(s.timestamp),
        }
    }
}

impl From<DeviceStatsReport> for proto::DeviceStatsResponse {
    fn from(report: DeviceStatsReport) -> Self {
        let groups = report
            .groups
            .into_iter()
            .map(|g| proto::DeviceGroupStats {
                vendor: g.vendor,
                r#type: g.device_type,
                name: g.name,
                instance_stats: g
                    .instance_stats
                    .into_iter()
                    .map(|(id, s)| (id, s.into()))
                    .collect(),
            })
            .collect();
        proto::DeviceStatsResponse { groups }
    }
}

impl From<proto::DeviceStatsResponse> for DeviceStatsReport {
    fn from(resp: proto::DeviceStatsResponse) -> Self {
        let groups = resp
            .groups
            .into_iter()
            .map(|g| DeviceGroupStats {
                vendor: g.vendor,
                device_type: g.r#type,
                name: g.name,
                instance_stats: g
                    .instance_stats
                    .into_iter()
                    .map(|(id, s)| (id, s.into()))
                    .collect(),
            })
            .collect();
        DeviceStatsReport { groups }
    }
}
