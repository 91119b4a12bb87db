//! Host-side proxies implementing the plugin traits over gRPC.

mod device;
mod driver;

pub use device::DevicePluginClient;
pub use driver::DriverPluginClient;

use std::future::Future;
use std::net::SocketAddr;

use tonic::transport::{Channel, Endpoint};
use tonic::{Response, Status};
use tracing::debug;

use tether_core::{CancellationToken, Joined, Liveness, PluginError};
use tether_model::{PluginInfo, PluginType};

use crate::proto::{self, base_plugin_client::BasePluginClient};
use crate::status::{self, ErrorScope};
use crate::ClientConfig;

/// Open a channel to a plugin listening on `addr`.
pub async fn connect(addr: SocketAddr, cfg: &ClientConfig) -> Result<Channel, PluginError> {
    let endpoint = Endpoint::from_shared(format!("http://{addr}"))
        .map_err(|e| PluginError::Transport(e.to_string()))?
        .connect_timeout(cfg.connect_timeout);

    debug!(target: "tether.client", %addr, "connecting to plugin");
    endpoint
        .connect()
        .await
        .map_err(|e| PluginError::Transport(format!("connect {addr}: {e}")))
}

/// State shared by every proxy: the liveness signal and error scope.
#[derive(Debug, Clone)]
pub(crate) struct Conn {
    base: BasePluginClient<Channel>,
    liveness: Liveness,
    cfg: ClientConfig,
    plugin_type: PluginType,
}

impl Conn {
    pub(crate) fn new(
        channel: Channel,
        liveness: Liveness,
        cfg: ClientConfig,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            base: BasePluginClient::new(channel),
            liveness,
            cfg,
            plugin_type,
        }
    }

    pub(crate) fn joined(&self, ctx: &CancellationToken) -> Joined {
        Joined::new(ctx, &self.liveness)
    }

    pub(crate) fn scope(&self) -> ErrorScope {
        ErrorScope {
            plugin_type: self.plugin_type,
            grace: self.cfg.unavailable_grace,
        }
    }

    /// Run a unary call under joined cancellation and translate its failure.
    pub(crate) async fn call<R, Fut>(
        &self,
        ctx: &CancellationToken,
        fut: Fut,
    ) -> Result<R, PluginError>
    where
        Fut: Future<Output = Result<Response<R>, Status>>,
    {
        let joined = self.joined(ctx);
        if let Some(reason) = joined.reason() {
            return Err(reason);
        }

        tokio::select! {
            biased;
            _ = joined.cancelled() => Err(joined.reason().unwrap_or(PluginError::Cancelled)),
            res = fut => match res {
                Ok(resp) => Ok(resp.into_inner()),
                Err(st) => Err(status::translate(st, &joined, self.scope()).await),
            },
        }
    }

    pub(crate) async fn plugin_info(
        &self,
        ctx: &CancellationToken,
    ) -> Result<PluginInfo, PluginError> {
        let mut base = self.base.clone();
        let resp = self
            .call(ctx, async move { base.plugin_info(proto::PluginInfoRequest {}).await })
            .await?;
        PluginInfo::try_from(resp)
    }
}
