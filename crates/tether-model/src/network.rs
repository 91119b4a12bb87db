use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::NetIsolationMode;

/// `/etc/hosts` entry the driver writes for a group network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostsConfig {
    pub hostname: String,
    pub address: String,
}

/// Network namespace created for an allocation and shared by its tasks.
///
/// Passed back to the driver on `start_task` (through
/// [`TaskConfig::network_isolation`](crate::TaskConfig)) and on
/// `destroy_network`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIsolationSpec {
    pub mode: NetIsolationMode,
    /// Namespace path, e.g. `/var/run/netns/<alloc>`.
    pub path: String,
    pub labels: BTreeMap<String, String>,
    pub hosts: Option<HostsConfig>,
}

impl NetworkIsolationSpec {
    pub fn group(path: impl Into<String>) -> Self {
        Self {
            mode: NetIsolationMode::Group,
            path: path.into(),
            labels: BTreeMap::new(),
            hosts: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCreateRequest {
    /// Hostname the job asked the network to carry; empty for the default.
    pub hostname: String,
}

/// Result of `create_network`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedNetwork {
    pub spec: Option<NetworkIsolationSpec>,
    /// `false` when the network already existed (e.g. after a host restart).
    pub created: bool,
}
