use tracing::warn;

use tether_model::{CreatedNetwork, HostsConfig, NetIsolationMode, NetworkIsolationSpec};

use crate::proto;

pub(crate) fn net_mode_to_proto(mode: NetIsolationMode) -> proto::NetIsolationMode {
    match mode {
        NetIsolationMode::Host => proto::NetIsolationMode::Host,
        NetIsolationMode::Group => proto::NetIsolationMode::Group,
        NetIsolationMode::Task => proto::NetIsolationMode::Task,
        NetIsolationMode::None => proto::NetIsolationMode::None,
    }
}

pub(crate) fn net_mode_from_proto(raw: i32) -> Option<NetIsolationMode> {
    match proto::NetIsolationMode::try_from(raw) {
        Ok(proto::NetIsolationMode::Host) => Some(NetIsolationMode::Host),
        Ok(proto::NetIsolationMode::Group) => Some(NetIsolationMode::Group),
        Ok(proto::NetIsolationMode::Task) => Some(NetIsolationMode::Task),
        Ok(proto::NetIsolationMode::None) => Some(NetIsolationMode::None),
        Err(_) => None,
    }
}

impl From<NetworkIsolationSpec> for proto::NetworkIsolationSpec {
    fn from(spec: NetworkIsolationSpec) -> Self {
        proto::NetworkIsolationSpec {
            mode: net_mode_to_proto(spec.mode) as i32,
            path: spec.path,
            labels: spec.labels.into_iter().collect(),
            hosts_config: spec.hosts.map(|h| proto::HostsConfig {
                hostname: h.hostname,
                address: h.address,
            }),
        }
    }
}

impl From<proto::NetworkIsolationSpec> for NetworkIsolationSpec {
    fn from(spec: proto::NetworkIsolationSpec) -> Self {
        let mode = net_mode_from_proto(spec.mode).unwrap_or_else(|| {
            warn!(target: "tether.convert", raw = spec.mode, "unknown network mode, using host");
            NetIsolationMode::Host
        });
        NetworkIsolationSpec {
            mode,
            path: spec.path,
            labels: spec.labels.into_iter().collect(),
            hosts: spec.hosts_config.map(|h| HostsConfig {
                hostname: h.hostname,
                address: h.address,
            }),
        }
    }
}

impl From<CreatedNetwork> for proto::CreateNetworkResponse {
    fn from(net: CreatedNetwork) -> Self {
        proto::CreateNetworkResponse {
            isolation_spec: net.spec.map(Into::into),
            created: net.created,
        }
    }
}

impl From<proto::CreateNetworkResponse> for CreatedNetwork {
    fn from(resp: proto::CreateNetworkResponse) -> Self {
        CreatedNetwork {
            spec: resp.isolation_spec.map(Into::into),
            created: resp.created,
        }
    }
}
