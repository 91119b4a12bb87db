use tracing::warn;

use tether_model::{
    Capabilities, ConfigSchema, DriverNetwork, ExecTaskResult, FieldKind, Fingerprint,
    FsIsolation, HealthState, MountConfigSupport, Resources, SchemaField, TaskConfig, TaskEnv,
    TaskEvent, TaskHandle, TaskState, TaskStatus,
};

use super::network::{net_mode_from_proto, net_mode_to_proto};
use super::{attributes_from_proto, attributes_to_proto, non_empty, timestamp_from_proto, timestamp_to_proto};
use crate::proto;

impl From<TaskState> for proto::TaskState {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Pending => proto::TaskState::Pending,
            TaskState::Running => proto::TaskState::Running,
            TaskState::Exited => proto::TaskState::Exited,
        }
    }
}

pub(crate) fn task_state_from_proto(raw: i32) -> TaskState {
    match proto::TaskState::try_from(raw) {
        Ok(proto::TaskState::Pending) => TaskState::Pending,
        Ok(proto::TaskState::Running) => TaskState::Running,
        Ok(proto::TaskState::Exited) => TaskState::Exited,
        Err(_) => {
            warn!(target: "tether.convert", raw, "unknown task state, using default");
            TaskState::default()
        }
    }
}

fn env_to_proto(env: TaskEnv) -> Vec<proto::KeyValue> {
    env.iter()
        .map(|kv| proto::KeyValue {
            key: kv.key().to_string(),
            value: kv.value().to_string(),
        })
        .collect()
}

fn env_from_proto(kvs: Vec<proto::KeyValue>) -> TaskEnv {
    kvs.into_iter().map(|kv| (kv.key, kv.value)).collect()
}

impl From<Resources> for proto::Resources {
    fn from(r: Resources) -> Self {
        proto::Resources {
            cpu_period: r.cpu_period,
            cpu_quota: r.cpu_quota,
            cpu_shares: r.cpu_shares,
            memory_limit_bytes: r.memory_limit_bytes,
            oom_score_adj: r.oom_score_adj,
            cpuset_cpus: r.cpuset_cpus,
            percent_ticks: r.percent_ticks,
        }
    }
}

impl From<proto::Resources> for Resources {
    fn from(r: proto::Resources) -> Self {
        Resources {
            cpu_period: r.cpu_period,
            cpu_quota: r.cpu_quota,
            cpu_shares: r.cpu_shares,
            memory_limit_bytes: r.memory_limit_bytes,
            oom_score_adj: r.oom_score_adj,
            cpuset_cpus: r.cpuset_cpus,
            percent_ticks: r.percent_ticks,
        }
    }
}

impl From<TaskConfig> for proto::TaskConfig {
    fn from(cfg: TaskConfig) -> Self {
        proto::TaskConfig {
            id: cfg.id,
            name: cfg.name,
            job_name: cfg.job_name,
            alloc_id: cfg.alloc_id,
            user: cfg.user,
            env: env_to_proto(cfg.env),
            device_env: env_to_proto(cfg.device_env),
            resources: cfg.resources.map(Into::into),
            mounts: cfg.mounts.into_iter().map(Into::into).collect(),
            devices: cfg.devices.into_iter().map(Into::into).collect(),
            alloc_dir: cfg.alloc_dir,
            stdout_path: cfg.stdout_path,
            stderr_path: cfg.stderr_path,
            driver_config: cfg.driver_config,
            network_isolation: cfg.network_isolation.map(Into::into),
        }
    }
}

impl From<proto::TaskConfig> for TaskConfig {
    fn from(cfg: proto::TaskConfig) -> Self {
        TaskConfig {
            id: cfg.id,
            name: cfg.name,
            job_name: cfg.job_name,
            alloc_id: cfg.alloc_id,
            user: cfg.user,
            env: env_from_proto(cfg.env),
            device_env: env_from_proto(cfg.device_env),
            resources: cfg.resources.map(Into::into),
            mounts: cfg.mounts.into_iter().map(Into::into).collect(),
            devices: cfg.devices.into_iter().map(Into::into).collect(),
            alloc_dir: cfg.alloc_dir,
            stdout_path: cfg.stdout_path,
            stderr_path: cfg.stderr_path,
            network_isolation: cfg.network_isolation.map(Into::into),
            driver_config: cfg.driver_config,
        }
    }
}

impl From<TaskHandle> for proto::TaskHandle {
    fn from(h: TaskHandle) -> Self {
        proto::TaskHandle {
            version: h.version,
            driver: h.driver,
            config: Some(h.config.into()),
            state: proto::TaskState::from(h.state) as i32,
            driver_state: h.driver_state,
        }
    }
}

impl From<proto::TaskHandle> for TaskHandle {
    fn from(h: proto::TaskHandle) -> Self {
        TaskHandle {
            version: h.version,
            driver: h.driver,
            config: h.config.map(Into::into).unwrap_or_default(),
            state: task_state_from_proto(h.state),
            driver_state: h.driver_state,
        }
    }
}

impl From<FieldKind> for proto::FieldKind {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => proto::FieldKind::String,
            FieldKind::Number => proto::FieldKind::Number,
            FieldKind::Bool => proto::FieldKind::Bool,
            FieldKind::List => proto::FieldKind::List,
            FieldKind::Map => proto::FieldKind::Map,
        }
    }
}

fn field_kind_from_proto(raw: i32) -> FieldKind {
    match proto::FieldKind::try_from(raw) {
        Ok(proto::FieldKind::Number) => FieldKind::Number,
        Ok(proto::FieldKind::Bool) => FieldKind::Bool,
        Ok(proto::FieldKind::List) => FieldKind::List,
        Ok(proto::FieldKind::Map) => FieldKind::Map,
        Ok(proto::FieldKind::String) | Ok(proto::FieldKind::Unspecified) | Err(_) => {
            FieldKind::String
        }
    }
}

impl From<ConfigSchema> for proto::TaskConfigSchemaResponse {
    fn from(schema: ConfigSchema) -> Self {
        let fields = schema
            .fields
            .into_iter()
            .map(|f| proto::SchemaField {
                name: f.name,
                kind: proto::FieldKind::from(f.kind) as i32,
                required: f.required,
                description: f.description,
            })
            .collect();
        proto::TaskConfigSchemaResponse { fields }
    }
}

impl From<proto::TaskConfigSchemaResponse> for ConfigSchema {
    fn from(resp: proto::TaskConfigSchemaResponse) -> Self {
        let fields = resp
            .fields
            .into_iter()
            .map(|f| SchemaField {
                name: f.name,
                kind: field_kind_from_proto(f.kind),
                required: f.required,
                description: f.description,
            })
            .collect();
        ConfigSchema { fields }
    }
}

impl From<Capabilities> for proto::DriverCapabilities {
    fn from(caps: Capabilities) -> Self {
        let fs_isolation = match caps.fs_isolation {
            FsIsolation::None => proto::FsIsolation::None,
            FsIsolation::Chroot => proto::FsIsolation::Chroot,
            FsIsolation::Image => proto::FsIsolation::Image,
        };
        let mount_configs = match caps.mount_configs {
            MountConfigSupport::All => proto::MountConfigSupport::All,
            MountConfigSupport::None => proto::MountConfigSupport::None,
        };
        let network_isolation_modes = caps
            .net_isolation_modes
            .into_iter()
            .map(|m| net_mode_to_proto(m) as i32)
            .collect();

        proto::DriverCapabilities {
            send_signals: caps.send_signals,
            exec: caps.exec,
            fs_isolation: fs_isolation as i32,
            network_isolation_modes,
            must_create_network: caps.must_initiate_network,
            mount_configs: mount_configs as i32,
            disable_log_collection: caps.disable_log_collection,
        }
    }
}

impl From<proto::DriverCapabilities> for Capabilities {
    fn from(caps: proto::DriverCapabilities) -> Self {
        let fs_isolation = match proto::FsIsolation::try_from(caps.fs_isolation) {
            Ok(proto::FsIsolation::Chroot) => FsIsolation::Chroot,
            Ok(proto::FsIsolation::Image) => FsIsolation::Image,
            Ok(proto::FsIsolation::None) | Err(_) => FsIsolation::None,
        };
        let mount_configs = match proto::MountConfigSupport::try_from(caps.mount_configs) {
            Ok(proto::MountConfigSupport::None) => MountConfigSupport::None,
            Ok(proto::MountConfigSupport::All) | Err(_) => MountConfigSupport::All,
        };
        // Unknown modes are skipped rather than guessed.
        let net_isolation_modes = caps
            .network_isolation_modes
            .into_iter()
            .filter_map(net_mode_from_proto)
            .collect();

        Capabilities {
            send_signals: caps.send_signals,
            exec: caps.exec,
            fs_isolation,
            net_isolation_modes,
            must_initiate_network: caps.must_create_network,
            mount_configs,
            disable_log_collection: caps.disable_log_collection,
        }
    }
}

impl From<Fingerprint> for proto::FingerprintResponse {
    fn from(fp: Fingerprint) -> Self {
        let health = match fp.health {
            HealthState::Undetected => proto::HealthState::Undetected,
            HealthState::Unhealthy => proto::HealthState::Unhealthy,
            HealthState::Healthy => proto::HealthState::Healthy,
        };
        proto::FingerprintResponse {
            attributes: attributes_to_proto(fp.attributes),
            health: health as i32,
            health_description: fp.health_description.unwrap_or_default(),
        }
    }
}

impl From<proto::FingerprintResponse> for Fingerprint {
    fn from(fp: proto::FingerprintResponse) -> Self {
        let health = match proto::HealthState::try_from(fp.health) {
            Ok(proto::HealthState::Healthy) => HealthState::Healthy,
            Ok(proto::HealthState::Unhealthy) => HealthState::Unhealthy,
            Ok(proto::HealthState::Undetected) | Err(_) => HealthState::Undetected,
        };
        Fingerprint {
            attributes: attributes_from_proto(fp.attributes),
            health,
            health_description: non_empty(fp.health_description),
        }
    }
}

impl From<DriverNetwork> for proto::NetworkOverride {
    fn from(net: DriverNetwork) -> Self {
        proto::NetworkOverride {
            port_map: net
                .port_map
                .into_iter()
                .map(|(label, port)| (label, i32::from(port)))
                .collect(),
            addr: net.ip,
            auto_advertise: net.auto_advertise,
        }
    }
}

impl From<proto::NetworkOverride> for DriverNetwork {
    fn from(net: proto::NetworkOverride) -> Self {
        let port_map = net
            .port_map
            .into_iter()
            .filter_map(|(label, port)| match u16::try_from(port) {
                Ok(port) => Some((label, port)),
                Err(_) => {
                    warn!(target: "tether.convert", %label, port, "port out of range, dropping");
                    None
                }
            })
            .collect();
        DriverNetwork {
            port_map,
            ip: net.addr,
            auto_advertise: net.auto_advertise,
        }
    }
}

impl From<TaskStatus> for proto::InspectTaskResponse {
    fn from(status: TaskStatus) -> Self {
        let task = proto::TaskStatus {
            id: status.id,
            name: status.name,
            state: proto::TaskState::from(status.state) as i32,
            size_on_disk: status.size_on_disk,
            started_at: timestamp_to_proto(status.started_at),
            completed_at: timestamp_to_proto(status.completed_at),
            result: status.exit_result.map(Into::into),
        };
        proto::InspectTaskResponse {
            task: Some(task),
            driver: Some(proto::TaskDriverStatus {
                attributes: status.driver_attributes.into_iter().collect(),
            }),
            network_override: status.network_override.map(Into::into),
        }
    }
}

impl From<proto::InspectTaskResponse> for TaskStatus {
    fn from(resp: proto::InspectTaskResponse) -> Self {
        let task = resp.task.unwrap_or_default();
        TaskStatus {
            id: task.id,
            name: task.name,
            state: task_state_from_proto(task.state),
            size_on_disk: task.size_on_disk,
            started_at: timestamp_from_proto(task.started_at),
            completed_at: timestamp_from_proto(task.completed_at),
            exit_result: task.result.map(Into::into),
            driver_attributes: resp
                .driver
                .map(|d| d.attributes.into_iter().collect())
                .unwrap_or_default(),
            network_override: resp.network_override.map(Into::into),
        }
    }
}

impl From<TaskEvent> for proto::TaskEvent {
    fn from(ev: TaskEvent) -> Self {
        proto::TaskEvent {
            task_id: ev.task_id,
            alloc_id: ev.alloc_id,
            task_name: ev.task_name,
            timestamp: timestamp_to_proto(ev.timestamp),
            message: ev.message,
            annotations: ev.annotations.into_iter().collect(),
        }
    }
}

impl From<proto::TaskEvent> for TaskEvent {
    fn from(ev: proto::TaskEvent) -> Self {
        TaskEvent {
            task_id: ev.task_id,
            alloc_id: ev.alloc_id,
            task_name: ev.task_name,
            timestamp: timestamp_from_proto(ev.timestamp),
            message: ev.message,
            annotations: ev.annotations.into_iter().collect(),
        }
    }
}

impl From<ExecTaskResult> for proto::ExecTaskResponse {
    fn from(res: ExecTaskResult) -> Self {
        proto::ExecTaskResponse {
            stdout: res.stdout,
            stderr: res.stderr,
            result: Some(res.exit_result.into()),
        }
    }
}

impl From<proto::ExecTaskResponse> for ExecTaskResult {
    fn from(res: proto::ExecTaskResponse) -> Self {
        ExecTaskResult {
            stdout: res.stdout,
            stderr: res.stderr,
            exit_result: res.result.map(Into::into).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use tether_model::{
        Attribute, DeviceConfig, ExitResult, MountConfig, NetIsolationMode, NetworkIsolationSpec,
    };

    use super::*;

    fn sample_config() -> TaskConfig {
        let mut cfg = TaskConfig::new("alloc-1/web", "web");
        cfg.job_name = "shop".into();
        cfg.alloc_id = "alloc-1".into();
        cfg.user = "nobody".into();
        cfg.env.push("PORT", "8080");
        cfg.env.push("PORT", "9090");
        cfg.device_env.push("VISIBLE_DEVICES", "0");
        cfg.resources = Some(Resources {
            cpu_shares: 512,
            memory_limit_bytes: 256 << 20,
            oom_score_adj: -500,
            cpuset_cpus: "0-1".into(),
            percent_ticks: 0.25,
            ..Default::default()
        });
        cfg.mounts = vec![
            MountConfig {
                task_path: "/data".into(),
                host_path: "/srv/data".into(),
                read_only: true,
                propagation_mode: Some("private".into()),
                selinux_label: None,
            },
            MountConfig {
                task_path: "/cache".into(),
                host_path: "/srv/cache".into(),
                ..Default::default()
            },
        ];
        cfg.devices = vec![DeviceConfig {
            task_path: "/dev/nvidia0".into(),
            host_path: "/dev/nvidia0".into(),
            permissions: "rw".into(),
        }];
        cfg.driver_config = Some(br#"{"command":"/bin/server"}"#.to_vec());
        cfg
    }

    #[test]
    fn task_handle_roundtrip_with_nil_state() {
        let mut handle = TaskHandle::new("mock", sample_config());
        handle.state = TaskState::Running;
        assert!(handle.driver_state.is_none());

        let back = TaskHandle::from(proto::TaskHandle::from(handle.clone()));
        assert_eq!(back, handle);
        assert!(back.driver_state.is_none());
    }

    #[test]
    fn task_handle_roundtrip_with_state_blob() {
        let mut handle = TaskHandle::new("mock", sample_config());
        handle.driver_state = Some(vec![0, 159, 146, 150, 255]);
        let back = TaskHandle::from(proto::TaskHandle::from(handle.clone()));
        assert_eq!(back.driver_state, handle.driver_state);
        assert_eq!(back, handle);

        handle.driver_state = Some(Vec::new());
        let back = TaskHandle::from(proto::TaskHandle::from(handle.clone()));
        assert_eq!(back.driver_state, Some(Vec::new()));
    }

    #[test]
    fn task_config_carries_network_isolation() {
        let mut cfg = sample_config();
        cfg.network_isolation = Some(NetworkIsolationSpec::group("/var/run/netns/alloc-1"));
        let back = TaskConfig::from(proto::TaskConfig::from(cfg.clone()));
        assert_eq!(back, cfg);
        assert_eq!(
            back.network_isolation.map(|n| n.mode),
            Some(NetIsolationMode::Group)
        );
    }

    #[test]
    fn env_order_and_duplicates_survive() {
        let wire = proto::TaskConfig::from(sample_config());
        assert_eq!(wire.env.len(), 2);
        let back = TaskConfig::from(wire);
        let values: Vec<_> = back.env.iter().map(|kv| kv.value()).collect();
        assert_eq!(values, vec!["8080", "9090"]);
        assert_eq!(back.mounts.len(), 2);
        assert_eq!(back.mounts[0].task_path, "/data");
    }

    #[test]
    fn absent_submessages_decode_as_absent() {
        let cfg = TaskConfig::from(proto::TaskConfig::default());
        assert!(cfg.resources.is_none());
        assert!(cfg.driver_config.is_none());
        assert!(cfg.network_isolation.is_none());

        let status = TaskStatus::from(proto::InspectTaskResponse::default());
        assert!(status.exit_result.is_none());
        assert!(status.started_at.is_none());
        assert!(status.network_override.is_none());
    }

    #[test]
    fn unknown_enum_values_fall_back_to_default() {
        let handle = TaskHandle::from(proto::TaskHandle {
            state: 99,
            ..Default::default()
        });
        assert_eq!(handle.state, TaskState::Pending);

        let caps = Capabilities::from(proto::DriverCapabilities {
            fs_isolation: 17,
            network_isolation_modes: vec![0, 42, 2],
            ..Default::default()
        });
        assert_eq!(caps.fs_isolation, FsIsolation::None);
        assert_eq!(
            caps.net_isolation_modes,
            vec![NetIsolationMode::Host, NetIsolationMode::Task]
        );
    }

    #[test]
    fn capabilities_roundtrip() {
        let caps = Capabilities {
            send_signals: true,
            exec: false,
            fs_isolation: FsIsolation::Image,
            net_isolation_modes: vec![NetIsolationMode::Group, NetIsolationMode::Host],
            must_initiate_network: true,
            mount_configs: MountConfigSupport::None,
            disable_log_collection: true,
        };
        assert_eq!(Capabilities::from(proto::DriverCapabilities::from(caps.clone())), caps);
    }

    #[test]
    fn inspect_roundtrip() {
        let started = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let status = TaskStatus {
            id: "t1".into(),
            name: "web".into(),
            state: TaskState::Exited,
            size_on_disk: 4096,
            started_at: Some(started),
            completed_at: Some(started + Duration::from_secs(30)),
            exit_result: Some(ExitResult::code(3)),
            driver_attributes: [("pid".to_string(), "42".to_string())].into_iter().collect(),
            network_override: Some(DriverNetwork {
                port_map: [("http".to_string(), 8080)].into_iter().collect(),
                ip: "10.0.0.2".into(),
                auto_advertise: true,
            }),
        };
        assert_eq!(TaskStatus::from(proto::InspectTaskResponse::from(status.clone())), status);
    }

    #[test]
    fn out_of_range_ports_are_dropped() {
        let net = DriverNetwork::from(proto::NetworkOverride {
            port_map: [("ok".to_string(), 443), ("bad".to_string(), 70_000)]
                .into_iter()
                .collect(),
            ..Default::default()
        });
        assert_eq!(net.port_map.len(), 1);
        assert_eq!(net.port_map.get("ok"), Some(&443));
    }

    #[test]
    fn fingerprint_roundtrip() {
        let fp = Fingerprint::healthy("ok")
            .with_attribute("driver.mock.version", Attribute::string("0.1.0"))
            .with_attribute("driver.mock.slots", Attribute::int(8));
        assert_eq!(Fingerprint::from(proto::FingerprintResponse::from(fp.clone())), fp);

        let empty = Fingerprint::from(proto::FingerprintResponse::default());
        assert_eq!(empty.health, HealthState::Undetected);
        assert!(empty.health_description.is_none());
    }

    #[test]
    fn schema_roundtrip() {
        let schema = ConfigSchema::new(vec![
            SchemaField::required("command", FieldKind::String).describe("binary to run"),
            SchemaField::optional("args", FieldKind::List),
        ]);
        assert_eq!(
            ConfigSchema::from(proto::TaskConfigSchemaResponse::from(schema.clone())),
            schema
        );
    }
}
