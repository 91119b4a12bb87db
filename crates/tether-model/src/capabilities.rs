use std::fmt;

use serde::{Deserialize, Serialize};

/// Filesystem isolation a driver provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsIsolation {
    #[default]
    None,
    Chroot,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetIsolationMode {
    Host,
    Group,
    Task,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MountConfigSupport {
    #[default]
    All,
    None,
}

/// Optional operations that are gated on advertised capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Signal,
    Exec,
    /// `create_network` / `destroy_network`, advertised as `must_initiate_network`.
    Network,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Signal => f.write_str("SignalTask"),
            Capability::Exec => f.write_str("ExecTask"),
            Capability::Network => f.write_str("CreateNetwork"),
        }
    }
}

/// Feature set a driver advertises. Queried once per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub send_signals: bool,
    pub exec: bool,
    pub fs_isolation: FsIsolation,
    pub net_isolation_modes: Vec<NetIsolationMode>,
    pub must_initiate_network: bool,
    pub mount_configs: MountConfigSupport,
    pub disable_log_collection: bool,
}

impl Capabilities {
    pub fn supports(&self, cap: Capability) -> bool {
        match cap {
            Capability::Signal => self.send_signals,
            Capability::Exec => self.exec,
            Capability::Network => self.must_initiate_network,
        }
    }

    pub fn supports_net_mode(&self, mode: NetIsolationMode) -> bool {
        self.net_isolation_modes.contains(&mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_supports_nothing_optional() {
        let caps = Capabilities::default();
        assert!(!caps.supports(Capability::Signal));
        assert!(!caps.supports(Capability::Exec));
        assert!(!caps.supports(Capability::Network));
        assert_eq!(caps.fs_isolation, FsIsolation::None);
        assert_eq!(caps.mount_configs, MountConfigSupport::All);
    }

    #[test]
    fn capability_names_match_operations() {
        assert_eq!(Capability::Signal.to_string(), "SignalTask");
        assert_eq!(Capability::Exec.to_string(), "ExecTask");
        assert_eq!(Capability::Network.to_string(), "CreateNetwork");
    }

    #[test]
    fn network_capability_follows_must_initiate() {
        let caps = Capabilities {
            must_initiate_network: true,
            ..Default::default()
        };
        assert!(caps.supports(Capability::Network));
        assert!(!caps.supports(Capability::Signal));
    }

    #[test]
    fn net_modes_lookup() {
        let caps = Capabilities {
            net_isolation_modes: vec![NetIsolationMode::Host, NetIsolationMode::Group],
            ..Default::default()
        };
        assert!(caps.supports_net_mode(NetIsolationMode::Group));
        assert!(!caps.supports_net_mode(NetIsolationMode::Task));
    }
}
