use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Request, Response, Status};
use tracing::debug;

use tether_core::{CancellationToken, DevicePlugin, DriverPlugin, PluginError};
use tether_model::PluginInfo;

use super::request_ctx;
use crate::proto::{self, base_plugin_server::BasePlugin};
use crate::status::to_status;

#[async_trait]
trait Describe: Send + Sync + 'static {
    async fn describe(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError>;
}

struct DriverInfo<D>(Arc<D>);

#[async_trait]
impl<D: DriverPlugin> Describe for DriverInfo<D> {
    async fn describe(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError> {
        self.0.plugin_info(ctx).await
    }
}

struct DeviceInfo<D>(Arc<D>);

#[async_trait]
impl<D: DevicePlugin> Describe for DeviceInfo<D> {
    async fn describe(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError> {
        self.0.plugin_info(ctx).await
    }
}

/// Identity service served next to the typed plugin service.
pub struct BaseService {
    source: Arc<dyn Describe>,
}

impl BaseService {
    pub fn for_driver<D: DriverPlugin>(driver: Arc<D>) -> Self {
        Self {
            source: Arc::new(DriverInfo(driver)),
        }
    }

    pub fn for_device<D: DevicePlugin>(device: Arc<D>) -> Self {
        Self {
            source: Arc::new(DeviceInfo(device)),
        }
    }
}

#[tonic::async_trait]
impl BasePlugin for BaseService {
    async fn plugin_info(
        &self,
        _request: Request<proto::PluginInfoRequest>,
    ) -> Result<Response<proto::PluginInfoResponse>, Status> {
        let (ctx, _guard) = request_ctx();
        let info = self.source.describe(&ctx).await.map_err(to_status)?;
        debug!(target: "tether.server", name = %info.name, "grpc: plugin info");
        Ok(Response::new(info.into()))
    }
}
