use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tether_model::{ContainerReservation, DeviceFingerprint, DeviceStatsReport, PluginInfo};

use crate::{PluginError, Subscription};

/// Hardware device plugin.
#[async_trait]
pub trait DevicePlugin: Send + Sync + 'static {
    async fn plugin_info(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError>;

    async fn fingerprint(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<DeviceFingerprint>, PluginError>;

    /// Reserve devices by id for a single task.
    async fn reserve(
        &self,
        ctx: &CancellationToken,
        device_ids: &[String],
    ) -> Result<ContainerReservation, PluginError>;

    /// A zero interval is replaced by the plugin's default.
    async fn stats(
        &self,
        ctx: &CancellationToken,
        interval: Duration,
    ) -> Result<Subscription<DeviceStatsReport>, PluginError>;
}
