//! Conversions between host domain types and generated wire messages.
//!
//! Absent input maps to absent output, collections keep order and length, and
//! unknown enum values decode to the domain default. Nothing here panics on
//! malformed input.

mod device;
mod network;
mod stats;
mod task;

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use tracing::warn;

use tether_core::PluginError;
use tether_model::{
    Attribute, AttributeValue, DeviceConfig, ExitResult, MountConfig, PluginInfo, PluginType,
};

use crate::proto;

pub(crate) fn timestamp_to_proto(t: Option<SystemTime>) -> Option<prost_types::Timestamp> {
    t.map(prost_types::Timestamp::from)
}

pub(crate) fn timestamp_from_proto(t: Option<prost_types::Timestamp>) -> Option<SystemTime> {
    let ts = t?;
    match SystemTime::try_from(ts) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!(target: "tether.convert", error = %e, "timestamp out of range, dropping");
            None
        }
    }
}

pub(crate) fn duration_to_proto(d: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        nanos: d.subsec_nanos() as i32,
    }
}

/// Negative, malformed or absent durations decode as zero.
pub(crate) fn duration_from_proto(d: Option<prost_types::Duration>) -> Duration {
    match d {
        Some(d) if d.seconds >= 0 && d.nanos >= 0 => Duration::new(d.seconds as u64, d.nanos as u32),
        Some(d) => {
            warn!(target: "tether.convert", seconds = d.seconds, nanos = d.nanos, "negative duration, using zero");
            Duration::ZERO
        }
        None => Duration::ZERO,
    }
}

/// Empty wire strings stand for "not set".
pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

impl From<Attribute> for proto::Attribute {
    fn from(attr: Attribute) -> Self {
        use proto::attribute::Value;

        let value = match attr.value {
            AttributeValue::String(v) => Value::StringVal(v),
            AttributeValue::Int(v) => Value::IntVal(v),
            AttributeValue::Float(v) => Value::FloatVal(v),
            AttributeValue::Bool(v) => Value::BoolVal(v),
        };
        proto::Attribute {
            value: Some(value),
            unit: attr.unit.unwrap_or_default(),
        }
    }
}

impl From<proto::Attribute> for Attribute {
    fn from(attr: proto::Attribute) -> Self {
        use proto::attribute::Value;

        let value = match attr.value {
            Some(Value::StringVal(v)) => AttributeValue::String(v),
            Some(Value::IntVal(v)) => AttributeValue::Int(v),
            Some(Value::FloatVal(v)) => AttributeValue::Float(v),
            Some(Value::BoolVal(v)) => AttributeValue::Bool(v),
            None => AttributeValue::String(String::new()),
        };
        Attribute {
            value,
            unit: non_empty(attr.unit),
        }
    }
}

pub(crate) fn attributes_to_proto<M>(attrs: BTreeMap<String, Attribute>) -> M
where
    M: FromIterator<(String, proto::Attribute)>,
{
    attrs.into_iter().map(|(k, v)| (k, v.into())).collect()
}

pub(crate) fn attributes_from_proto<I>(attrs: I) -> BTreeMap<String, Attribute>
where
    I: IntoIterator<Item = (String, proto::Attribute)>,
{
    attrs.into_iter().map(|(k, v)| (k, v.into())).collect()
}

impl From<MountConfig> for proto::Mount {
    fn from(m: MountConfig) -> Self {
        proto::Mount {
            task_path: m.task_path,
            host_path: m.host_path,
            read_only: m.read_only,
            propagation_mode: m.propagation_mode,
            selinux_label: m.selinux_label,
        }
    }
}

impl From<proto::Mount> for MountConfig {
    fn from(m: proto::Mount) -> Self {
        MountConfig {
            task_path: m.task_path,
            host_path: m.host_path,
            read_only: m.read_only,
            propagation_mode: m.propagation_mode,
            selinux_label: m.selinux_label,
        }
    }
}

impl From<DeviceConfig> for proto::DeviceSpec {
    fn from(d: DeviceConfig) -> Self {
        proto::DeviceSpec {
            task_path: d.task_path,
            host_path: d.host_path,
            permissions: d.permissions,
        }
    }
}

impl From<proto::DeviceSpec> for DeviceConfig {
    fn from(d: proto::DeviceSpec) -> Self {
        DeviceConfig {
            task_path: d.task_path,
            host_path: d.host_path,
            permissions: d.permissions,
        }
    }
}

impl From<ExitResult> for proto::ExitResult {
    fn from(r: ExitResult) -> Self {
        proto::ExitResult {
            exit_code: r.exit_code,
            signal: r.signal,
            oom_killed: r.oom_killed,
            err: r.err,
        }
    }
}

impl From<proto::ExitResult> for ExitResult {
    fn from(r: proto::ExitResult) -> Self {
        ExitResult {
            exit_code: r.exit_code,
            signal: r.signal,
            oom_killed: r.oom_killed,
            err: r.err,
        }
    }
}

impl From<PluginType> for proto::PluginType {
    fn from(t: PluginType) -> Self {
        match t {
            PluginType::Driver => proto::PluginType::Driver,
            PluginType::Device => proto::PluginType::Device,
        }
    }
}

impl From<PluginInfo> for proto::PluginInfoResponse {
    fn from(info: PluginInfo) -> Self {
        proto::PluginInfoResponse {
            name: info.name,
            r#type: proto::PluginType::from(info.plugin_type) as i32,
            plugin_version: info.plugin_version,
            api_version: info.api_version,
        }
    }
}

impl TryFrom<proto::PluginInfoResponse> for PluginInfo {
    type Error = PluginError;

    fn try_from(info: proto::PluginInfoResponse) -> Result<Self, Self::Error> {
        let plugin_type = match proto::PluginType::try_from(info.r#type) {
            Ok(proto::PluginType::Driver) => PluginType::Driver,
            Ok(proto::PluginType::Device) => PluginType::Device,
            _ => {
                return Err(PluginError::InvalidMessage(format!(
                    "plugin {:?} reported unknown type {}",
                    info.name, info.r#type
                )));
            }
        };
        Ok(PluginInfo {
            name: info.name,
            plugin_type,
            plugin_version: info.plugin_version,
            api_version: info.api_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_clamp_negative_to_zero() {
        let d = Duration::from_millis(1500);
        assert_eq!(duration_from_proto(Some(duration_to_proto(d))), d);
        assert_eq!(duration_from_proto(None), Duration::ZERO);
        assert_eq!(
            duration_from_proto(Some(prost_types::Duration {
                seconds: -5,
                nanos: 0
            })),
            Duration::ZERO
        );
    }

    #[test]
    fn timestamps_keep_second_precision() {
        let t = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let back = timestamp_from_proto(timestamp_to_proto(Some(t)));
        assert_eq!(back, Some(t));
        assert_eq!(timestamp_from_proto(None), None);
        assert_eq!(timestamp_to_proto(None), None);
    }

    #[test]
    fn attribute_unit_presence() {
        let attr = Attribute::int(4).with_unit("cores");
        let back = Attribute::from(proto::Attribute::from(attr.clone()));
        assert_eq!(back, attr);

        let bare = Attribute::bool(false);
        assert_eq!(Attribute::from(proto::Attribute::from(bare.clone())), bare);
    }

    #[test]
    fn plugin_info_rejects_unknown_type() {
        let wire = proto::PluginInfoResponse {
            name: "mock".into(),
            r#type: 42,
            plugin_version: "0.1.0".into(),
            api_version: 1,
        };
        assert!(matches!(
            PluginInfo::try_from(wire),
            Err(PluginError::InvalidMessage(_))
        ));
    }
}
