use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use tether_core::{
    CancellationToken, DriverPlugin, PluginError, Subscription, SubscriptionSender, subscription,
};
use tether_model::{
    Capabilities, ConfigSchema, CpuStats, CreatedNetwork, DriverNetwork, ExecTaskResult,
    ExitResult, Fingerprint, HostsConfig, MemoryStats, NetworkCreateRequest, NetworkIsolationSpec,
    PluginInfo, PluginType, ResourceUsage, StartedTask, TaskConfig, TaskEvent, TaskHandle,
    TaskResourceUsage, TaskState, TaskStatus,
};

use crate::calls::Calls;
use crate::config::{MockDriverConfig, MockTaskConfig, MockTaskState};

/// Name the mock puts into task handles.
pub const DRIVER_NAME: &str = "mock";

struct MockTask {
    config: TaskConfig,
    command: MockTaskConfig,
    state: TaskState,
    started_at: SystemTime,
    completed_at: Option<SystemTime>,
    exit: watch::Sender<Option<ExitResult>>,
    kill: CancellationToken,
    network: Option<DriverNetwork>,
    recovered: bool,
}

impl MockTask {
    fn new(config: TaskConfig, command: MockTaskConfig, started_at: SystemTime) -> Self {
        let network = network_for(&command);
        Self {
            config,
            command,
            state: TaskState::Running,
            started_at,
            completed_at: None,
            exit: watch::Sender::new(None),
            kill: CancellationToken::new(),
            network,
            recovered: false,
        }
    }

    fn status(&self) -> TaskStatus {
        let mut driver_attributes = BTreeMap::new();
        driver_attributes.insert("recovered".to_string(), self.recovered.to_string());
        if let Some(net) = &self.config.network_isolation {
            driver_attributes.insert("netns".to_string(), net.path.clone());
        }

        TaskStatus {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            state: self.state,
            size_on_disk: 0,
            started_at: Some(self.started_at),
            completed_at: self.completed_at,
            exit_result: self.exit.borrow().clone(),
            driver_attributes,
            network_override: self.network.clone(),
        }
    }
}

struct Inner {
    cfg: MockDriverConfig,
    tasks: RwLock<HashMap<String, MockTask>>,
    /// Allocation id to the network created for it.
    networks: RwLock<HashMap<String, NetworkIsolationSpec>>,
    events: broadcast::Sender<TaskEvent>,
    calls: Calls,
}

impl Inner {
    /// Move a task to `Exited` and publish its result. First caller wins.
    async fn finish(&self, task_id: &str, result: ExitResult) {
        let event = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(task_id) else {
                return;
            };
            if task.state.is_terminal() {
                return;
            }

            task.state = TaskState::Exited;
            task.completed_at = Some(SystemTime::now());
            task.kill.cancel();
            task.exit.send_replace(Some(result.clone()));
            event_for(&task.config, format!("task exited with code {}", result.exit_code))
        };

        debug!(target: "tether.mock", %task_id, exit_code = result.exit_code, signal = result.signal, "task exited");
        self.emit(event);
    }

    fn emit(&self, event: TaskEvent) {
        // No receivers is fine: nobody is watching events.
        let _ = self.events.send(event);
    }

    async fn exit_watch(
        &self,
        task_id: &str,
    ) -> Result<watch::Receiver<Option<ExitResult>>, PluginError> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .map(|t| t.exit.subscribe())
            .ok_or_else(|| PluginError::TaskNotFound(task_id.to_string()))
    }
}

/// In-memory [`DriverPlugin`] whose tasks are timers driven by
/// [`MockTaskConfig`].
#[derive(Clone)]
pub struct MockDriver {
    inner: Arc<Inner>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new(MockDriverConfig::default())
    }
}

impl MockDriver {
    pub fn new(cfg: MockDriverConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                cfg,
                tasks: RwLock::new(HashMap::new()),
                networks: RwLock::new(HashMap::new()),
                events,
                calls: Calls::default(),
            }),
        }
    }

    pub fn calls(&self) -> &Calls {
        &self.inner.calls
    }

    pub async fn task_count(&self) -> usize {
        self.inner.tasks.read().await.len()
    }

    pub async fn network(&self, alloc_id: &str) -> Option<NetworkIsolationSpec> {
        self.inner.networks.read().await.get(alloc_id).cloned()
    }

    fn spawn_runner(
        &self,
        task_id: String,
        run_for: Option<Duration>,
        kill: CancellationToken,
        exit: ExitResult,
    ) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let ran_out = tokio::select! {
                _ = kill.cancelled() => false,
                _ = sleep_or_forever(run_for) => true,
            };
            if ran_out {
                inner.finish(&task_id, exit).await;
            }
        });
    }

    fn schedule_plugin_exit(&self, after: Duration) {
        if !self.inner.cfg.allow_plugin_exit {
            warn!(target: "tether.mock", ?after, "plugin_exit_after_ms ignored for in-process driver");
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            warn!(target: "tether.mock", "plugin_exit_after_ms elapsed; exiting");
            std::process::exit(1);
        });
    }
}

#[async_trait]
impl DriverPlugin for MockDriver {
    async fn plugin_info(&self, _ctx: &CancellationToken) -> Result<PluginInfo, PluginError> {
        self.inner.calls.record("plugin_info");
        Ok(PluginInfo {
            name: self.inner.cfg.name.clone(),
            plugin_type: PluginType::Driver,
            plugin_version: self.inner.cfg.version.clone(),
            api_version: tether_api::PROTOCOL_VERSION,
        })
    }

    async fn task_config_schema(
        &self,
        _ctx: &CancellationToken,
    ) -> Result<ConfigSchema, PluginError> {
        self.inner.calls.record("task_config_schema");
        Ok(MockTaskConfig::schema())
    }

    async fn capabilities(&self, _ctx: &CancellationToken) -> Result<Capabilities, PluginError> {
        self.inner.calls.record("capabilities");
        Ok(self.inner.cfg.capabilities.clone())
    }

    async fn fingerprint(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<Fingerprint>, PluginError> {
        self.inner.calls.record("fingerprint");
        let (tx, sub) = subscription();
        let ctx = ctx.clone();
        let cfg = self.inner.cfg.clone();

        tokio::spawn(async move {
            if let Some(script) = cfg.fingerprints.clone() {
                for fp in script {
                    if !deliver(&tx, &ctx, Ok(fp)).await {
                        return;
                    }
                }
                return;
            }

            let mut ticker = tokio::time::interval(cfg.fingerprint_interval);
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if !deliver(&tx, &ctx, Ok(cfg.default_fingerprint())).await {
                    return;
                }
            }
        });
        Ok(sub)
    }

    async fn recover_task(
        &self,
        _ctx: &CancellationToken,
        handle: &TaskHandle,
    ) -> Result<(), PluginError> {
        self.inner.calls.record("recover_task");
        let task_id = handle.task_id().to_string();
        if self.inner.tasks.read().await.contains_key(&task_id) {
            return Ok(());
        }

        let state: MockTaskState = handle
            .driver_state()?
            .ok_or_else(|| PluginError::TaskNotFound(task_id.clone()))?;

        let started_at = UNIX_EPOCH + Duration::from_millis(state.started_at_ms);
        let elapsed = SystemTime::now()
            .duration_since(started_at)
            .unwrap_or_default();
        let remaining = state
            .command
            .run_for()
            .map(|run_for| run_for.saturating_sub(elapsed));

        let mut task = MockTask::new(handle.config.clone(), state.command.clone(), started_at);
        task.recovered = true;
        let kill = task.kill.clone();
        let exit = natural_exit(&state.command);
        self.inner.tasks.write().await.insert(task_id.clone(), task);

        info!(target: "tether.mock", %task_id, ?remaining, "task recovered");
        self.spawn_runner(task_id, remaining, kill, exit);
        Ok(())
    }

    async fn start_task(
        &self,
        ctx: &CancellationToken,
        config: &TaskConfig,
    ) -> Result<StartedTask, PluginError> {
        self.inner.calls.record("start_task");
        MockTaskConfig::schema().validate_bytes(config.driver_config.as_deref())?;
        let command: MockTaskConfig = config.decode_driver_config()?;

        if let Some(message) = &command.start_error {
            return Err(PluginError::Plugin {
                message: message.clone(),
                recoverable: command.start_error_recoverable,
            });
        }
        if command.start_block_for_ms > 0 {
            tokio::select! {
                _ = ctx.cancelled() => return Err(PluginError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(command.start_block_for_ms)) => {}
            }
        }

        let started_at = SystemTime::now();
        let mut handle = TaskHandle::new(DRIVER_NAME, config.clone());
        handle.state = TaskState::Running;
        handle.set_driver_state(&MockTaskState {
            started_at_ms: unix_millis(started_at),
            command: command.clone(),
        })?;

        let task = MockTask::new(config.clone(), command.clone(), started_at);
        let network = task.network.clone();
        let kill = task.kill.clone();
        {
            let mut tasks = self.inner.tasks.write().await;
            if tasks.contains_key(&config.id) {
                return Err(PluginError::plugin(format!(
                    "task {} already started",
                    config.id
                )));
            }
            tasks.insert(config.id.clone(), task);
        }

        info!(target: "tether.mock", task_id = %config.id, name = %config.name, run_for = ?command.run_for(), "task started");
        self.inner
            .emit(event_for(config, "task started".to_string()));
        self.spawn_runner(config.id.clone(), command.run_for(), kill, natural_exit(&command));
        if command.plugin_exit_after_ms > 0 {
            self.schedule_plugin_exit(Duration::from_millis(command.plugin_exit_after_ms));
        }

        Ok(StartedTask { handle, network })
    }

    async fn wait_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
    ) -> Result<Subscription<ExitResult>, PluginError> {
        self.inner.calls.record("wait_task");
        let mut exit = self.inner.exit_watch(task_id).await?;
        let (tx, sub) = subscription();
        let ctx = ctx.clone();
        let task_id = task_id.to_string();

        tokio::spawn(async move {
            loop {
                let current = exit.borrow_and_update().clone();
                if let Some(result) = current {
                    deliver(&tx, &ctx, Ok(result)).await;
                    return;
                }
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    changed = exit.changed() => {
                        if changed.is_err() {
                            let last = exit.borrow().clone();
                            let item = last.ok_or(PluginError::TaskNotFound(task_id));
                            deliver(&tx, &ctx, item).await;
                            return;
                        }
                    }
                }
            }
        });
        Ok(sub)
    }

    async fn stop_task(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        timeout: Duration,
        signal: &str,
    ) -> Result<(), PluginError> {
        self.inner.calls.record("stop_task");
        let mut exit = self.inner.exit_watch(task_id).await?;
        if exit.borrow().is_some() {
            debug!(target: "tether.mock", %task_id, "not stopping task: already exited");
            return Ok(());
        }

        let kill_after = {
            let tasks = self.inner.tasks.read().await;
            tasks
                .get(task_id)
                .map(|t| t.command.kill_after())
                .unwrap_or_default()
        };
        debug!(target: "tether.mock", %task_id, %signal, ?timeout, ?kill_after, "stopping task");

        let exited = tokio::select! {
            _ = ctx.cancelled() => return Err(PluginError::Cancelled),
            _ = exited(&mut exit) => true,
            _ = tokio::time::sleep(kill_after) => false,
        };
        if !exited {
            self.inner
                .finish(task_id, ExitResult::signaled(signal_number(signal)))
                .await;
        }
        Ok(())
    }

    async fn destroy_task(
        &self,
        _ctx: &CancellationToken,
        task_id: &str,
        force: bool,
    ) -> Result<(), PluginError> {
        self.inner.calls.record("destroy_task");
        let running = {
            let tasks = self.inner.tasks.read().await;
            let task = tasks
                .get(task_id)
                .ok_or_else(|| PluginError::TaskNotFound(task_id.to_string()))?;
            !task.state.is_terminal()
        };

        if running {
            if !force {
                return Err(PluginError::TaskRunning(task_id.to_string()));
            }
            self.inner
                .finish(task_id, ExitResult::signaled(signal_number("SIGKILL")))
                .await;
        }

        self.inner.tasks.write().await.remove(task_id);
        debug!(target: "tether.mock", %task_id, force, "task destroyed");
        Ok(())
    }

    async fn inspect_task(
        &self,
        _ctx: &CancellationToken,
        task_id: &str,
    ) -> Result<TaskStatus, PluginError> {
        self.inner.calls.record("inspect_task");
        let tasks = self.inner.tasks.read().await;
        tasks
            .get(task_id)
            .map(MockTask::status)
            .ok_or_else(|| PluginError::TaskNotFound(task_id.to_string()))
    }

    async fn task_stats(
        &self,
        ctx: &CancellationToken,
        task_id: &str,
        interval: Duration,
    ) -> Result<Subscription<TaskResourceUsage>, PluginError> {
        self.inner.calls.record("task_stats");
        let mut exit = self.inner.exit_watch(task_id).await?;
        let interval = if interval.is_zero() {
            self.inner.cfg.stats_interval
        } else {
            interval
        };

        let (tx, sub) = subscription();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sample = 0u64;
            loop {
                if exit.borrow().is_some() {
                    return;
                }
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    changed = exit.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }
                sample += 1;
                if !deliver(&tx, &ctx, Ok(usage_sample(sample))).await {
                    return;
                }
            }
        });
        Ok(sub)
    }

    async fn task_events(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<TaskEvent>, PluginError> {
        self.inner.calls.record("task_events");
        let mut events = self.inner.events.subscribe();
        let (tx, sub) = subscription();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = ctx.cancelled() => return,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if !deliver(&tx, &ctx, Ok(event)).await {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: "tether.mock", skipped = n, "task event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(sub)
    }

    async fn signal_task(
        &self,
        _ctx: &CancellationToken,
        task_id: &str,
        signal: &str,
    ) -> Result<(), PluginError> {
        self.inner.calls.record("signal_task");
        let event = {
            let tasks = self.inner.tasks.read().await;
            let task = tasks
                .get(task_id)
                .ok_or_else(|| PluginError::TaskNotFound(task_id.to_string()))?;
            if let Some(message) = &task.command.signal_error {
                return Err(PluginError::plugin(message.clone()));
            }
            event_for(&task.config, format!("received signal {signal}"))
        };
        self.inner.emit(event);
        Ok(())
    }

    async fn exec_task(
        &self,
        _ctx: &CancellationToken,
        task_id: &str,
        cmd: &[String],
        _timeout: Duration,
    ) -> Result<ExecTaskResult, PluginError> {
        self.inner.calls.record("exec_task");
        let tasks = self.inner.tasks.read().await;
        let task = tasks
            .get(task_id)
            .ok_or_else(|| PluginError::TaskNotFound(task_id.to_string()))?;

        Ok(ExecTaskResult {
            stdout: format!("Exec({:?}, {:?})", task.config.name, cmd).into_bytes(),
            stderr: Vec::new(),
            exit_result: ExitResult::default(),
        })
    }

    async fn create_network(
        &self,
        _ctx: &CancellationToken,
        alloc_id: &str,
        request: &NetworkCreateRequest,
    ) -> Result<CreatedNetwork, PluginError> {
        self.inner.calls.record("create_network");
        let mut networks = self.inner.networks.write().await;
        if let Some(spec) = networks.get(alloc_id) {
            debug!(target: "tether.mock", %alloc_id, "network already exists");
            return Ok(CreatedNetwork {
                spec: Some(spec.clone()),
                created: false,
            });
        }

        let mut spec = NetworkIsolationSpec::group(format!("/var/run/netns/{alloc_id}"));
        if !request.hostname.is_empty() {
            spec.hosts = Some(HostsConfig {
                hostname: request.hostname.clone(),
                address: "127.0.0.1".to_string(),
            });
        }
        networks.insert(alloc_id.to_string(), spec.clone());
        info!(target: "tether.mock", %alloc_id, path = %spec.path, "network created");
        Ok(CreatedNetwork {
            spec: Some(spec),
            created: true,
        })
    }

    async fn destroy_network(
        &self,
        _ctx: &CancellationToken,
        alloc_id: &str,
        _spec: Option<&NetworkIsolationSpec>,
    ) -> Result<(), PluginError> {
        self.inner.calls.record("destroy_network");
        if self.inner.networks.write().await.remove(alloc_id).is_some() {
            info!(target: "tether.mock", %alloc_id, "network destroyed");
        }
        Ok(())
    }
}

/// Send one item unless the consumer or the request went away.
async fn deliver<T>(
    tx: &SubscriptionSender<T>,
    ctx: &CancellationToken,
    item: Result<T, PluginError>,
) -> bool {
    tokio::select! {
        _ = ctx.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Resolves once an exit result is published or the task is removed.
async fn exited(exit: &mut watch::Receiver<Option<ExitResult>>) {
    loop {
        let done = exit.borrow_and_update().is_some();
        if done || exit.changed().await.is_err() {
            return;
        }
    }
}

async fn sleep_or_forever(d: Option<Duration>) {
    match d {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

fn natural_exit(cmd: &MockTaskConfig) -> ExitResult {
    ExitResult {
        exit_code: cmd.exit_code,
        signal: cmd.exit_signal,
        oom_killed: false,
        err: cmd.exit_err_msg.clone(),
    }
}

fn network_for(cmd: &MockTaskConfig) -> Option<DriverNetwork> {
    let ip = cmd.driver_ip.clone()?;
    Some(DriverNetwork {
        port_map: cmd.driver_port_map.clone(),
        ip,
        auto_advertise: cmd.driver_advertise,
    })
}

fn event_for(config: &TaskConfig, message: String) -> TaskEvent {
    TaskEvent {
        task_id: config.id.clone(),
        alloc_id: config.alloc_id.clone(),
        task_name: config.name.clone(),
        timestamp: Some(SystemTime::now()),
        message,
        annotations: BTreeMap::new(),
    }
}

fn signal_number(signal: &str) -> i32 {
    match signal.trim().trim_start_matches("SIG") {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "KILL" => 9,
        "USR1" => 10,
        "USR2" => 12,
        _ => 15,
    }
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn usage_sample(n: u64) -> TaskResourceUsage {
    let usage = ResourceUsage {
        cpu: Some(CpuStats {
            system_mode: Some(0.0),
            user_mode: Some(n as f64),
            percent: Some(1.5),
            ..Default::default()
        }),
        memory: Some(MemoryStats {
            rss: Some(n * 1024 * 1024),
            usage: Some(n * 2 * 1024 * 1024),
            ..Default::default()
        }),
    };

    let mut pids = BTreeMap::new();
    pids.insert("1".to_string(), usage.clone());
    TaskResourceUsage {
        timestamp: Some(SystemTime::now()),
        usage,
        pids,
    }
}
