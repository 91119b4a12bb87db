use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{ModelError, NetworkIsolationSpec, TaskEnv};

/// Lifecycle state of a driver task.
///
/// `Pending -> Running -> Exited`; `Exited` is terminal. Recovery re-enters
/// `Running` from a persisted handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Exited,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Exited)
    }
}

/// Linux resource limits requested for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub cpu_shares: i64,
    pub memory_limit_bytes: i64,
    pub oom_score_adj: i64,
    pub cpuset_cpus: String,
    pub percent_ticks: f64,
}

/// Host path bind-mounted into the task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    pub task_path: String,
    pub host_path: String,
    pub read_only: bool,
    pub propagation_mode: Option<String>,
    pub selinux_label: Option<String>,
}

/// Host device node exposed to the task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub task_path: String,
    pub host_path: String,
    /// cgroup permissions, e.g. `rwm`.
    pub permissions: String,
}

/// Everything a driver needs to start one task.
///
/// `driver_config` is an opaque blob owned by the driver. The core only moves it
/// around; [`TaskConfig::decode_driver_config`] is a convenience for drivers that
/// accept JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    pub id: String,
    pub name: String,
    pub job_name: String,
    pub alloc_id: String,
    pub user: String,
    pub env: TaskEnv,
    pub device_env: TaskEnv,
    pub resources: Option<Resources>,
    pub mounts: Vec<MountConfig>,
    pub devices: Vec<DeviceConfig>,
    pub alloc_dir: String,
    pub stdout_path: String,
    pub stderr_path: String,
    /// Network created by `create_network` for the task's allocation.
    pub network_isolation: Option<NetworkIsolationSpec>,
    pub driver_config: Option<Vec<u8>>,
}

impl TaskConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_driver_config<T: Serialize>(mut self, cfg: &T) -> Result<Self, ModelError> {
        self.encode_driver_config(cfg)?;
        Ok(self)
    }

    pub fn encode_driver_config<T: Serialize>(&mut self, cfg: &T) -> Result<(), ModelError> {
        let raw = serde_json::to_vec(cfg).map_err(|e| ModelError::Encode(e.to_string()))?;
        self.driver_config = Some(raw);
        Ok(())
    }

    /// Decode the driver config; an absent blob decodes from `{}`.
    pub fn decode_driver_config<T: DeserializeOwned>(&self) -> Result<T, ModelError> {
        let raw = self.driver_config.as_deref().unwrap_or(b"{}");
        serde_json::from_slice(raw).map_err(|e| ModelError::Decode(e.to_string()))
    }

    /// Task environment with device-provided variables applied last.
    pub fn effective_env(&self) -> TaskEnv {
        self.env.merged(&self.device_env)
    }
}

/// Durable token returned by `StartTask` and persisted by the orchestrator.
///
/// `driver_state` is never inspected outside the driver that produced it. An
/// absent blob and an empty blob are different values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub version: i32,
    pub driver: String,
    pub config: TaskConfig,
    pub state: TaskState,
    pub driver_state: Option<Vec<u8>>,
}

impl TaskHandle {
    pub const VERSION: i32 = 1;

    pub fn new(driver: impl Into<String>, config: TaskConfig) -> Self {
        Self {
            version: Self::VERSION,
            driver: driver.into(),
            config,
            state: TaskState::Pending,
            driver_state: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.config.id
    }

    pub fn set_driver_state<T: Serialize>(&mut self, state: &T) -> Result<(), ModelError> {
        let raw = serde_json::to_vec(state).map_err(|e| ModelError::Encode(e.to_string()))?;
        self.driver_state = Some(raw);
        Ok(())
    }

    /// `Ok(None)` when no state was stored.
    pub fn driver_state<T: DeserializeOwned>(&self) -> Result<Option<T>, ModelError> {
        match self.driver_state.as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_slice(raw)
                .map(Some)
                .map_err(|e| ModelError::Decode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cfg {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    }

    #[test]
    fn only_exited_is_terminal() {
        assert!(TaskState::Exited.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert_eq!(TaskState::default(), TaskState::Pending);
    }

    #[test]
    fn driver_config_roundtrip() {
        let cfg = Cfg {
            command: "/bin/true".into(),
            args: vec!["-v".into()],
        };
        let task = TaskConfig::new("t1", "web").with_driver_config(&cfg).unwrap();
        let back: Cfg = task.decode_driver_config().unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn absent_driver_config_decodes_as_empty_object() {
        #[derive(Deserialize, Default)]
        struct Empty {
            #[serde(default)]
            verbose: bool,
        }
        let task = TaskConfig::new("t1", "web");
        let cfg: Empty = task.decode_driver_config().unwrap();
        assert!(!cfg.verbose);
    }

    #[test]
    fn driver_state_absent_vs_empty() {
        let mut handle = TaskHandle::new("mock", TaskConfig::new("t1", "web"));
        assert_eq!(handle.version, TaskHandle::VERSION);
        assert!(handle.driver_state::<serde_json::Value>().unwrap().is_none());

        handle.driver_state = Some(Vec::new());
        assert!(handle.driver_state::<serde_json::Value>().is_err());

        handle.set_driver_state(&serde_json::json!({"pid": 42})).unwrap();
        let state: serde_json::Value = handle.driver_state().unwrap().unwrap();
        assert_eq!(state["pid"], 42);
    }

    #[test]
    fn device_env_overrides_task_env() {
        let mut task = TaskConfig::new("t1", "web");
        task.env.push("VISIBLE_DEVICES", "none");
        task.device_env.push("VISIBLE_DEVICES", "0,1");
        assert_eq!(task.effective_env().get("VISIBLE_DEVICES"), Some("0,1"));
    }
}
