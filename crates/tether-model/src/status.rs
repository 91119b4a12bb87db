use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{TaskHandle, TaskState};

/// Terminal outcome of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitResult {
    pub exit_code: i32,
    pub signal: i32,
    pub oom_killed: bool,
    /// Driver-side failure while waiting, not a task failure.
    pub err: Option<String>,
}

impl ExitResult {
    pub fn code(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            signal,
            ..Default::default()
        }
    }

    pub fn successful(&self) -> bool {
        self.exit_code == 0 && self.signal == 0 && !self.oom_killed && self.err.is_none()
    }
}

/// Network settings chosen by the driver for a started task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverNetwork {
    pub port_map: BTreeMap<String, u16>,
    pub ip: String,
    pub auto_advertise: bool,
}

/// Result of a successful `StartTask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedTask {
    pub handle: TaskHandle,
    pub network: Option<DriverNetwork>,
}

/// Point-in-time view returned by `InspectTask`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    pub size_on_disk: u64,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub exit_result: Option<ExitResult>,
    pub driver_attributes: BTreeMap<String, String>,
    pub network_override: Option<DriverNetwork>,
}

/// Notable occurrence reported by a driver for one of its tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: String,
    pub alloc_id: String,
    pub task_name: String,
    pub timestamp: Option<SystemTime>,
    pub message: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecTaskResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_result: ExitResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_result_success() {
        assert!(ExitResult::code(0).successful());
        assert!(!ExitResult::code(2).successful());
        assert!(!ExitResult::signaled(9).successful());

        let oom = ExitResult {
            oom_killed: true,
            ..Default::default()
        };
        assert!(!oom.successful());
    }
}
