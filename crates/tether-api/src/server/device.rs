use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use tether_core::{DevicePlugin, PluginError};

use super::{ResponseStream, request_ctx, respond};
use crate::convert::duration_from_proto;
use crate::proto::{self, device_server::Device};
use crate::status::to_status;

/// Wraps a [`DevicePlugin`] and implements the generated `Device` trait.
pub struct DeviceService<D> {
    device: Arc<D>,
}

impl<D> DeviceService<D>
where
    D: DevicePlugin,
{
    pub fn new(device: Arc<D>) -> Self {
        Self { device }
    }
}

#[tonic::async_trait]
impl<D> Device for DeviceService<D>
where
    D: DevicePlugin,
{
    type FingerprintStream = ResponseStream<proto::DeviceFingerprintResponse>;
    type StatsStream = ResponseStream<proto::DeviceStatsResponse>;

    async fn fingerprint(
        &self,
        _request: Request<proto::DeviceFingerprintRequest>,
    ) -> Result<Response<Self::FingerprintStream>, Status> {
        let (ctx, guard) = request_ctx();
        let sub = self.device.fingerprint(&ctx).await.map_err(to_status)?;
        Ok(Response::new(respond(sub, guard)))
    }

    async fn reserve(
        &self,
        request: Request<proto::ReserveRequest>,
    ) -> Result<Response<proto::ReserveResponse>, Status> {
        let req = request.into_inner();
        if req.device_ids.is_empty() {
            return Err(to_status(PluginError::InvalidMessage(
                "device_ids cannot be empty".into(),
            )));
        }

        debug!(target: "tether.server", ids = ?req.device_ids, "grpc: reserving devices");
        let (ctx, _guard) = request_ctx();
        let res = self
            .device
            .reserve(&ctx, &req.device_ids)
            .await
            .map_err(to_status)?;
        Ok(Response::new(res.into()))
    }

    async fn stats(
        &self,
        request: Request<proto::DeviceStatsRequest>,
    ) -> Result<Response<Self::StatsStream>, Status> {
        let interval = duration_from_proto(request.into_inner().collection_interval);
        let (ctx, guard) = request_ctx();
        let sub = self
            .device
            .stats(&ctx, interval)
            .await
            .map_err(to_status)?;
        Ok(Response::new(respond(sub, guard)))
    }
}
