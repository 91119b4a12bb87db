//! Host-side domain types shared by the plugin contracts, the wire adapter and
//! the orchestrator.

mod error;
pub use error::ModelError;

mod kv;
pub use kv::KeyValue;

mod task_env;
pub use task_env::TaskEnv;

mod task;
pub use task::{DeviceConfig, MountConfig, Resources, TaskConfig, TaskHandle, TaskState};

mod capabilities;
pub use capabilities::{Capabilities, Capability, FsIsolation, MountConfigSupport, NetIsolationMode};

mod fingerprint;
pub use fingerprint::{Attribute, AttributeValue, Fingerprint, HealthState};

mod network;
pub use network::{CreatedNetwork, HostsConfig, NetworkCreateRequest, NetworkIsolationSpec};

mod schema;
pub use schema::{ConfigSchema, FieldKind, SchemaError, SchemaField};

mod status;
pub use status::{DriverNetwork, ExecTaskResult, ExitResult, StartedTask, TaskEvent, TaskStatus};

mod stats;
pub use stats::{CpuStats, MemoryStats, ResourceUsage, TaskResourceUsage};

mod device;
pub use device::{
    ContainerReservation, Device, DeviceFingerprint, DeviceGroup, DeviceGroupStats,
    DeviceLocality, DeviceStats, DeviceStatsReport, StatValue,
};

mod plugin;
pub use plugin::{PluginInfo, PluginType};
