use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tonic::transport::Channel;
use tracing::debug;

use tether_core::{CancellationToken, DriverPlugin, Liveness, PluginError, Subscription};
use tether_model::{
    Capabilities, Capability, ConfigSchema, CreatedNetwork, ExecTaskResult, ExitResult,
    Fingerprint, NetworkCreateRequest, NetworkIsolationSpec, PluginInfo, PluginType, StartedTask,
    TaskConfig, TaskEvent, TaskHandle, TaskResourceUsage, TaskStatus,
};

use super::Conn;
use crate::convert::duration_to_proto;
use crate::proto::{self, driver_client::DriverClient};
use crate::{ClientConfig, stream};

/// [`DriverPlugin`] backed by a plugin process on the other end of a channel.
///
/// Clones share the connection, the liveness signal and the capability cache.
#[derive(Debug, Clone)]
pub struct DriverPluginClient {
    conn: Conn,
    client: DriverClient<Channel>,
    caps: Arc<OnceCell<Capabilities>>,
}

impl DriverPluginClient {
    pub fn new(channel: Channel, liveness: Liveness, cfg: ClientConfig) -> Self {
        Self {
            conn: Conn::new(channel.clone(), liveness, cfg, PluginType::Driver),
            client: DriverClient::new(channel),
            caps: Arc::new(OnceCell::new()),
        }
    }

    async fn fetch_capabilities(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Capabilities, PluginError> {
        let mut c = self.client.clone();
        let resp = self
            .conn
            .call(ctx, async move { c.capabilities(proto::CapabilitiesRequest {}).await })
            .await?;
        Ok(resp.capabilities.map(Into::into).unwrap_or_default())
    }

    async fn require(&self, ctx: &CancellationToken, cap: Capability) -> Result<(), PluginError> {
        let caps = self.capabilities(ctx).await?;
        if caps.supports(cap) {
            Ok(())
        } else {
            debug!(target: "tether.client", %cap, "capability not advertised, skipping rpc");
            Err(PluginError::Unsupported(cap))
        }
    }
}

#[async_trait]
impl DriverPlugin for DriverPluginClient {
    async fn plugin_info(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError> {
        self.conn.plugin_info(ctx).await
    }

    async fn task_config_schema(
        &self,
        ctx: &CancellationToken,
    ) -> Result<ConfigSchema, PluginError> {
        let mut c = self.client.clone();
        let resp = self
            .conn
            .call(ctx, async move {
                c.task_config_schema(proto::TaskConfigSchemaRequest {}).await
            })
            .await?;
        Ok(resp.into())
    }

    /// Fetched once per connection, then served from the cache.
    async fn capabilities(&self, ctx: &CancellationToken) -> Result<Capabilities, PluginError> {
        self.caps
            .get_or_try_init(|| self.fetch_capabilities(ctx))
            .await
            .cloned()
    }

    async fn fingerprint(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<Fingerprint>, PluginError> {
        let mut c = self.client.clone();
        let wire = self
            .conn
            .call(ctx, async move { c.fingerprint(proto::FingerprintRequest {}).await })
            .await?;
        Ok(stream::forward(
            "fingerprint",
            wire,
            self.conn.joined(ctx),
            self.conn.scope(),
            |fp| Ok(Fingerprint::from(fp)),
        ))
    }

    async fn recover_task(
        &self,
        ctx: &CancellationToken,
        handle: &TaskHandle,
    ) -> Result<(), PluginError> {
        let mut c = self.client.clone();
        let req = proto::RecoverTaskRequest {
            task_id: handle.task_id().to_string(),
            handle: Some(handle.clone().into()),
        };
        self.conn
            .call(ctx, async move { c.recover_task(req).await })
            .await?;
        Ok(())
    }

    async fn start_task(
        &self,
        ctx: &CancellationToken,
        config: &TaskConfig,
    ) -> Result<StartedTask, PluginError> {
        let mut c = self.client.clone();
        let req = proto::StartTaskRequest {
            task: Some(config.clone().into()),
        };
        let resp = self
            .conn
            .call(ctx, async move { c.start_task(req).await })
            .await?;

        let handle = resp.handle.ok_or_else(|| {
            PluginError::InvalidMessage(format!("start of task {} returned no handle", config.id))
        })?;
        Ok(StartedTask {
            handle: handle.into(),
            network: resp.network_override.map(Into::into),
        })
    }

    async fn wait_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
    ) -> Result<Subscription<ExitResult>, PluginError> {
        let mut c = self.client.clone();
        let req = proto::WaitTaskRequest {
            task_id: task_id.to_string(),
        };
        let call = async move { c.wait_task(req).await.map(|r| r.into_inner()) };
        Ok(stream::forward_once(
            "wait_task",
            call,
            self.conn.joined(ctx),
            self.conn.scope(),
            |resp| {
                resp.result
                    .map(ExitResult::from)
                    .ok_or_else(|| PluginError::InvalidMessage("wait returned no result".into()))
            },
        ))
    }

    async fn stop_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        timeout: Duration,
        signal: &str,
    ) -> Result<(), PluginError> {
        let mut c = self.client.clone();
        let req = proto::StopTaskRequest {
            task_id: task_id.to_string(),
            timeout: Some(duration_to_proto(timeout)),
            signal: signal.to_string(),
        };
        self.conn
            .call(ctx, async move { c.stop_task(req).await })
            .await?;
        Ok(())
    }

    async fn destroy_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        force: bool,
    ) -> Result<(), PluginError> {
        let mut c = self.client.clone();
        let req = proto::DestroyTaskRequest {
            task_id: task_id.to_string(),
            force,
        };
        self.conn
            .call(ctx, async move { c.destroy_task(req).await })
            .await?;
        Ok(())
    }

    async fn inspect_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
    ) -> Result<TaskStatus, PluginError> {
        let mut c = self.client.clone();
        let req = proto::InspectTaskRequest {
            task_id: task_id.to_string(),
        };
        let resp = self
            .conn
            .call(ctx, async move { c.inspect_task(req).await })
            .await?;
        Ok(resp.into())
    }

    async fn task_stats(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        interval: Duration,
    ) -> Result<Subscription<TaskResourceUsage>, PluginError> {
        let mut c = self.client.clone();
        let req = proto::TaskStatsRequest {
            task_id: task_id.to_string(),
            collection_interval: Some(duration_to_proto(interval)),
        };
        let wire = self
            .conn
            .call(ctx, async move { c.task_stats(req).await })
            .await?;
        Ok(stream::forward(
            "task_stats",
            wire,
            self.conn.joined(ctx),
            self.conn.scope(),
            |u| Ok(TaskResourceUsage::from(u)),
        ))
    }

    async fn task_events(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<TaskEvent>, PluginError> {
        let mut c = self.client.clone();
        let wire = self
            .conn
            .call(ctx, async move { c.task_events(proto::TaskEventsRequest {}).await })
            .await?;
        Ok(stream::forward(
            "task_events",
            wire,
            self.conn.joined(ctx),
            self.conn.scope(),
            |ev| Ok(TaskEvent::from(ev)),
        ))
    }

    async fn signal_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        signal: &str,
    ) -> Result<(), PluginError> {
        self.require(ctx, Capability::Signal).await?;

        let mut c = self.client.clone();
        let req = proto::SignalTaskRequest {
            task_id: task_id.to_string(),
            signal: signal.to_string(),
        };
        self.conn
            .call(ctx, async move { c.signal_task(req).await })
            .await?;
        Ok(())
    }

    async fn exec_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        cmd: &[String],
        timeout: Duration,
    ) -> Result<ExecTaskResult, PluginError> {
        self.require(ctx, Capability::Exec).await?;

        let mut c = self.client.clone();
        let req = proto::ExecTaskRequest {
            task_id: task_id.to_string(),
            command: cmd.to_vec(),
            timeout: Some(duration_to_proto(timeout)),
        };
        let resp = self
            .conn
            .call(ctx, async move { c.exec_task(req).await })
            .await?;
        Ok(resp.into())
    }

    async fn create_network(
        &self,
        ctx: &CancellationToken,
        alloc_id: &str,
        request: &NetworkCreateRequest,
    ) -> Result<CreatedNetwork, PluginError> {
        self.require(ctx, Capability::Network).await?;

        let mut c = self.client.clone();
        let req = proto::CreateNetworkRequest {
            alloc_id: alloc_id.to_string(),
            hostname: request.hostname.clone(),
        };
        let resp = self
            .conn
            .call(ctx, async move { c.create_network(req).await })
            .await?;
        Ok(resp.into())
    }

    async fn destroy_network(
        &self,
        ctx: &CancellationToken,
        alloc_id: &str,
        spec: Option<&NetworkIsolationSpec>,
    ) -> Result<(), PluginError> {
        let Some(spec) = spec else {
            return Ok(());
        };
        self.require(ctx, Capability::Network).await?;

        let mut c = self.client.clone();
        let req = proto::DestroyNetworkRequest {
            alloc_id: alloc_id.to_string(),
            isolation_spec: Some(spec.clone().into()),
        };
        self.conn
            .call(ctx, async move { c.destroy_network(req).await })
            .await?;
        Ok(())
    }
}
