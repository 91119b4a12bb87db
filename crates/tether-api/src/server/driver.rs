use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use tether_core::{DriverPlugin, PluginError};
use tether_model::{NetworkCreateRequest, NetworkIsolationSpec};

use super::{ResponseStream, request_ctx, require_id, respond};
use crate::convert::duration_from_proto;
use crate::proto::{self, driver_server::Driver};
use crate::status::to_status;

/// gRPC service implementation.
///
/// Wraps a [`DriverPlugin`] and implements the generated `Driver` trait.
pub struct DriverService<D> {
    driver: Arc<D>,
}

impl<D> DriverService<D>
where
    D: DriverPlugin,
{
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }
}

#[tonic::async_trait]
impl<D> Driver for DriverService<D>
where
    D: DriverPlugin,
{
    type FingerprintStream = ResponseStream<proto::FingerprintResponse>;
    type TaskStatsStream = ResponseStream<proto::TaskStatsResponse>;
    type TaskEventsStream = ResponseStream<proto::TaskEvent>;

    async fn task_config_schema(
        &self,
        _request: Request<proto::TaskConfigSchemaRequest>,
    ) -> Result<Response<proto::TaskConfigSchemaResponse>, Status> {
        let (ctx, _guard) = request_ctx();
        let schema = self
            .driver
            .task_config_schema(&ctx)
            .await
            .map_err(to_status)?;
        Ok(Response::new(schema.into()))
    }

    async fn capabilities(
        &self,
        _request: Request<proto::CapabilitiesRequest>,
    ) -> Result<Response<proto::CapabilitiesResponse>, Status> {
        let (ctx, _guard) = request_ctx();
        let caps = self.driver.capabilities(&ctx).await.map_err(to_status)?;
        Ok(Response::new(proto::CapabilitiesResponse {
            capabilities: Some(caps.into()),
        }))
    }

    async fn fingerprint(
        &self,
        _request: Request<proto::FingerprintRequest>,
    ) -> Result<Response<Self::FingerprintStream>, Status> {
        let (ctx, guard) = request_ctx();
        let sub = self.driver.fingerprint(&ctx).await.map_err(to_status)?;
        debug!(target: "tether.server", "grpc: fingerprint stream opened");
        Ok(Response::new(respond(sub, guard)))
    }

    async fn recover_task(
        &self,
        request: Request<proto::RecoverTaskRequest>,
    ) -> Result<Response<proto::RecoverTaskResponse>, Status> {
        let req = request.into_inner();
        let handle = req
            .handle
            .ok_or_else(|| to_status(PluginError::InvalidMessage("missing handle".into())))?;
        let handle = tether_model::TaskHandle::from(handle);
        require_id(handle.task_id(), "task id")?;

        debug!(target: "tether.server", task_id = %handle.task_id(), "grpc: recovering task");
        let (ctx, _guard) = request_ctx();
        self.driver
            .recover_task(&ctx, &handle)
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::RecoverTaskResponse {}))
    }

    async fn start_task(
        &self,
        request: Request<proto::StartTaskRequest>,
    ) -> Result<Response<proto::StartTaskResponse>, Status> {
        let req = request.into_inner();
        let config = req
            .task
            .ok_or_else(|| to_status(PluginError::InvalidMessage("missing task config".into())))?;
        let config = tether_model::TaskConfig::from(config);
        require_id(&config.id, "task id")?;

        debug!(target: "tether.server", task_id = %config.id, name = %config.name, "grpc: starting task");
        let (ctx, _guard) = request_ctx();
        let started = self
            .driver
            .start_task(&ctx, &config)
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::StartTaskResponse {
            handle: Some(started.handle.into()),
            network_override: started.network.map(Into::into),
        }))
    }

    async fn wait_task(
        &self,
        request: Request<proto::WaitTaskRequest>,
    ) -> Result<Response<proto::WaitTaskResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;

        let (ctx, _guard) = request_ctx();
        let mut sub = self
            .driver
            .wait_task(&ctx, &req.task_id)
            .await
            .map_err(to_status)?;

        match sub.recv().await {
            Some(Ok(result)) => Ok(Response::new(proto::WaitTaskResponse {
                result: Some(result.into()),
            })),
            Some(Err(e)) => Err(to_status(e)),
            None => Err(to_status(PluginError::plugin(format!(
                "wait on task {} ended without a result",
                req.task_id
            )))),
        }
    }

    async fn stop_task(
        &self,
        request: Request<proto::StopTaskRequest>,
    ) -> Result<Response<proto::StopTaskResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;

        let timeout = duration_from_proto(req.timeout);
        debug!(target: "tether.server", task_id = %req.task_id, signal = %req.signal, ?timeout, "grpc: stopping task");
        let (ctx, _guard) = request_ctx();
        self.driver
            .stop_task(&ctx, &req.task_id, timeout, &req.signal)
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::StopTaskResponse {}))
    }

    async fn destroy_task(
        &self,
        request: Request<proto::DestroyTaskRequest>,
    ) -> Result<Response<proto::DestroyTaskResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;

        debug!(target: "tether.server", task_id = %req.task_id, force = req.force, "grpc: destroying task");
        let (ctx, _guard) = request_ctx();
        self.driver
            .destroy_task(&ctx, &req.task_id, req.force)
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::DestroyTaskResponse {}))
    }

    async fn inspect_task(
        &self,
        request: Request<proto::InspectTaskRequest>,
    ) -> Result<Response<proto::InspectTaskResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;

        let (ctx, _guard) = request_ctx();
        let status = self
            .driver
            .inspect_task(&ctx, &req.task_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(status.into()))
    }

    async fn task_stats(
        &self,
        request: Request<proto::TaskStatsRequest>,
    ) -> Result<Response<Self::TaskStatsStream>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;

        let interval = duration_from_proto(req.collection_interval);
        let (ctx, guard) = request_ctx();
        let sub = self
            .driver
            .task_stats(&ctx, &req.task_id, interval)
            .await
            .map_err(to_status)?;
        Ok(Response::new(respond(sub, guard)))
    }

    async fn task_events(
        &self,
        _request: Request<proto::TaskEventsRequest>,
    ) -> Result<Response<Self::TaskEventsStream>, Status> {
        let (ctx, guard) = request_ctx();
        let sub = self.driver.task_events(&ctx).await.map_err(to_status)?;
        Ok(Response::new(respond(sub, guard)))
    }

    async fn signal_task(
        &self,
        request: Request<proto::SignalTaskRequest>,
    ) -> Result<Response<proto::SignalTaskResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;

        debug!(target: "tether.server", task_id = %req.task_id, signal = %req.signal, "grpc: signalling task");
        let (ctx, _guard) = request_ctx();
        self.driver
            .signal_task(&ctx, &req.task_id, &req.signal)
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::SignalTaskResponse {}))
    }

    async fn exec_task(
        &self,
        request: Request<proto::ExecTaskRequest>,
    ) -> Result<Response<proto::ExecTaskResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.task_id, "task_id")?;
        if req.command.is_empty() {
            return Err(to_status(PluginError::InvalidMessage(
                "command cannot be empty".into(),
            )));
        }

        let timeout = duration_from_proto(req.timeout);
        let (ctx, _guard) = request_ctx();
        let result = self
            .driver
            .exec_task(&ctx, &req.task_id, &req.command, timeout)
            .await
            .map_err(to_status)?;
        Ok(Response::new(result.into()))
    }

    async fn create_network(
        &self,
        request: Request<proto::CreateNetworkRequest>,
    ) -> Result<Response<proto::CreateNetworkResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.alloc_id, "alloc_id")?;

        debug!(target: "tether.server", alloc_id = %req.alloc_id, "grpc: creating network");
        let (ctx, _guard) = request_ctx();
        let created = self
            .driver
            .create_network(
                &ctx,
                &req.alloc_id,
                &NetworkCreateRequest {
                    hostname: req.hostname,
                },
            )
            .await
            .map_err(to_status)?;
        Ok(Response::new(created.into()))
    }

    async fn destroy_network(
        &self,
        request: Request<proto::DestroyNetworkRequest>,
    ) -> Result<Response<proto::DestroyNetworkResponse>, Status> {
        let req = request.into_inner();
        require_id(&req.alloc_id, "alloc_id")?;
        let spec = req.isolation_spec.map(NetworkIsolationSpec::from);

        debug!(target: "tether.server", alloc_id = %req.alloc_id, "grpc: destroying network");
        let (ctx, _guard) = request_ctx();
        self.driver
            .destroy_network(&ctx, &req.alloc_id, spec.as_ref())
            .await
            .map_err(to_status)?;
        Ok(Response::new(proto::DestroyNetworkResponse {}))
    }
}
