use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tether_model::{
    Capabilities, Capability, ConfigSchema, CreatedNetwork, ExecTaskResult, ExitResult,
    Fingerprint, NetworkCreateRequest, NetworkIsolationSpec, PluginInfo, StartedTask, TaskConfig,
    TaskEvent, TaskHandle, TaskResourceUsage, TaskStatus,
};

use crate::{PluginError, Subscription};

/// Task-execution plugin.
///
/// Every call receives the caller's cancellation token. Implementations must
/// keep `wait_task`, `stop_task` and `destroy_task` idempotent once a task has
/// exited.
#[async_trait]
pub trait DriverPlugin: Send + Sync + 'static {
    async fn plugin_info(&self, ctx: &CancellationToken) -> Result<PluginInfo, PluginError>;

    /// Shape of the opaque driver config accepted by `start_task`.
    async fn task_config_schema(
        &self,
        ctx: &CancellationToken,
    ) -> Result<ConfigSchema, PluginError>;

    async fn capabilities(&self, ctx: &CancellationToken) -> Result<Capabilities, PluginError>;

    /// Infinite health/attribute stream. Ends only on cancellation or failure.
    async fn fingerprint(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<Fingerprint>, PluginError>;

    /// Re-attach to a task started before an orchestrator restart.
    ///
    /// Succeeds when the task is already known. Fails with
    /// [`PluginError::TaskNotFound`] when it can no longer be located.
    async fn recover_task(
        &self,
        ctx: &CancellationToken,
        handle: &TaskHandle,
    ) -> Result<(), PluginError>;

    async fn start_task(
        &self,
        ctx: &CancellationToken,
        config: &TaskConfig,
    ) -> Result<StartedTask, PluginError>;

    /// Single-item stream carrying the task's exit result.
    async fn wait_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
    ) -> Result<Subscription<ExitResult>, PluginError>;

    /// Deliver `signal`, then force-kill after `timeout`.
    async fn stop_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        timeout: Duration,
        signal: &str,
    ) -> Result<(), PluginError>;

    async fn destroy_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        force: bool,
    ) -> Result<(), PluginError>;

    async fn inspect_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
    ) -> Result<TaskStatus, PluginError>;

    async fn task_stats(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        interval: Duration,
    ) -> Result<Subscription<TaskResourceUsage>, PluginError>;

    /// Events for all tasks owned by this driver.
    async fn task_events(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<TaskEvent>, PluginError>;

    async fn signal_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        signal: &str,
    ) -> Result<(), PluginError>;

    async fn exec_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        cmd: &[String],
        timeout: Duration,
    ) -> Result<ExecTaskResult, PluginError>;

    /// Create the network namespace shared by an allocation's tasks.
    ///
    /// Only drivers advertising `must_initiate_network` are asked. Calling it
    /// again for the same allocation returns the existing network with
    /// `created == false`.
    async fn create_network(
        &self,
        _ctx: &CancellationToken,
        _alloc_id: &str,
        _request: &NetworkCreateRequest,
    ) -> Result<CreatedNetwork, PluginError> {
        Err(PluginError::Unsupported(Capability::Network))
    }

    /// Tear down a network returned by `create_network`.
    ///
    /// `None` means no network was created and is a no-op.
    async fn destroy_network(
        &self,
        _ctx: &CancellationToken,
        _alloc_id: &str,
        _spec: Option<&NetworkIsolationSpec>,
    ) -> Result<(), PluginError> {
        Err(PluginError::Unsupported(Capability::Network))
    }
}
