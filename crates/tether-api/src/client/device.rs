use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;

use tether_core::{CancellationToken, DevicePlugin, Liveness, PluginError, Subscription};
use tether_model::{
    ContainerReservation, DeviceFingerprint, DeviceStatsReport, PluginInfo, PluginType,
};

use super::Conn;
use crate::convert::duration_to_proto;
use crate::proto::{self, device_client::DeviceClient};
use crate::{ClientConfig, stream};

/// [`DevicePlugin`] backed by a plugin process on the other end of a channel.
#[derive(Debug, Clone)]
pub struct DevicePluginClient {
    conn: Conn,
    client: DeviceClient<Channel>,
}

impl DevicePluginClient {
    pub fn new(channel: Channel, liveness: Liveness, cfg: ClientConfig) -> Self {
        Self {
            conn: Conn::new(channel.clone(), liveness, cfg, PluginType::Device),
            client: DeviceClient::new(channel),
        }
    }
}

#[async_trait]
impl DevicePlugin for DevicePluginClient {
    async fn plugin_info(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError> {
        self.conn.plugin_info(ctx).await
    }

    async fn fingerprint(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<DeviceFingerprint>, PluginError> {
        let mut c = self.client.clone();
        let wire = self
            .conn
            .call(ctx, async move {
                c.fingerprint(proto::DeviceFingerprintRequest {}).await
            })
            .await?;
        Ok(stream::forward(
            "device_fingerprint",
            wire,
            self.conn.joined(ctx),
            self.conn.scope(),
            |fp| Ok(DeviceFingerprint::from(fp)),
        ))
    }

    async fn reserve(
        &self,
        ctx: &CancellationToken,
        device_ids: &[String],
    ) -> Result<ContainerReservation, PluginError> {
        let mut c = self.client.clone();
        let req = proto::ReserveRequest {
            device_ids: device_ids.to_vec(),
        };
        let resp = self
            .conn
            .call(ctx, async move { c.reserve(req).await })
            .await?;
        Ok(resp.into())
    }

    async fn stats(
        &self,
        ctx: &CancellationToken,
        interval: Duration,
    ) -> Result<Subscription<DeviceStatsReport>, PluginError> {
        let mut c = self.client.clone();
        let req = proto::DeviceStatsRequest {
            collection_interval: Some(duration_to_proto(interval)),
        };
        let wire = self
            .conn
            .call(ctx, async move { c.stats(req).await })
            .await?;
        Ok(stream::forward(
            "device_stats",
            wire,
            self.conn.joined(ctx),
            self.conn.scope(),
            |r| Ok(DeviceStatsReport::from(r)),
        ))
    }
}
