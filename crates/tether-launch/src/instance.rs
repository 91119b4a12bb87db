use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tether_api::tonic::transport::Channel;
use tether_api::{
    ClientConfig, DevicePluginClient, DriverPluginClient, Handshake, HandshakeError, connect,
};
use tether_core::{CancellationToken, DevicePlugin, DriverPlugin, Liveness, PluginError};
use tether_model::{PluginInfo, PluginType};

use crate::process;
use crate::{LaunchConfig, LaunchError, ReattachConfig};

/// A connected plugin, either spawned by us or attached to.
///
/// Dropping the instance stops the plugin process it owns. Proxies handed out
/// by [`driver`](Self::driver) / [`device`](Self::device) share its liveness
/// signal and report [`PluginError::Shutdown`] once the plugin is gone.
pub struct PluginInstance {
    name: String,
    handshake: Handshake,
    channel: Channel,
    liveness: Liveness,
    client: ClientConfig,
    pid: Option<u32>,
    stop: CancellationToken,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl PluginInstance {
    /// Spawn the plugin, complete the handshake and connect to it.
    pub async fn launch(cfg: LaunchConfig) -> Result<Self, LaunchError> {
        let name = cfg.display_name();
        let mut child = process::spawn(&cfg)?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("plugin stdout is not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("plugin stderr is not captured"))?;
        process::forward_output(name.clone(), "stderr", BufReader::new(stderr).lines());

        let mut lines = BufReader::new(stdout).lines();
        let connected = async {
            let handshake =
                process::read_handshake(&mut child, &mut lines, cfg.handshake_timeout).await?;
            let addr = handshake.validate(cfg.protocol_version, cfg.plugin_type)?;
            let channel = connect(addr, &cfg.client)
                .await
                .map_err(LaunchError::Connect)?;
            Ok::<_, LaunchError>((handshake, channel))
        }
        .await;

        let (handshake, channel) = match connected {
            Ok(ok) => ok,
            Err(e) => {
                warn!(target: "tether.launch", plugin = %name, error = %e, "plugin launch failed");
                if let Err(kill) = child.kill().await {
                    debug!(target: "tether.launch", plugin = %name, error = %kill, "kill after failed launch");
                }
                return Err(e);
            }
        };
        process::forward_output(name.clone(), "stdout", lines);

        let liveness = Liveness::new();
        let stop = CancellationToken::new();
        let watcher = tokio::spawn(process::monitor(
            child,
            name.clone(),
            stop.clone(),
            cfg.kill_grace,
            liveness.clone(),
        ));

        info!(target: "tether.launch", plugin = %name, ?pid, addr = %handshake.address, "plugin launched");
        Ok(Self {
            name,
            handshake,
            channel,
            liveness,
            client: cfg.client,
            pid,
            stop,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Connect to a plugin that is already running, e.g. after a host restart.
    ///
    /// The process is not owned: liveness fires when a periodic probe finds the
    /// plugin unreachable, and [`shutdown`](Self::shutdown) only disconnects.
    pub async fn attach(cfg: ReattachConfig) -> Result<Self, LaunchError> {
        let channel = connect(cfg.addr, &cfg.client)
            .await
            .map_err(LaunchError::Connect)?;
        let liveness = Liveness::new();
        let stop = CancellationToken::new();

        let info = probe(&channel, cfg.plugin_type, &liveness, &cfg.client, &stop)
            .await
            .map_err(LaunchError::Connect)?;
        if info.plugin_type != cfg.plugin_type {
            return Err(HandshakeError::PluginType {
                expected: cfg.plugin_type,
                got: info.plugin_type,
            }
            .into());
        }
        let handshake = Handshake::tcp(info.plugin_type, cfg.addr);
        if info.api_version != handshake.protocol_version {
            return Err(HandshakeError::Version {
                expected: handshake.protocol_version,
                got: info.api_version,
            }
            .into());
        }

        let watcher = tokio::spawn(probe_loop(
            channel.clone(),
            cfg.clone(),
            liveness.clone(),
            stop.clone(),
        ));

        info!(target: "tether.launch", plugin = %info.name, addr = %cfg.addr, "attached to running plugin");
        Ok(Self {
            name: info.name,
            handshake,
            channel,
            liveness,
            client: cfg.client,
            pid: cfg.pid,
            stop,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn addr(&self) -> Result<SocketAddr, LaunchError> {
        Ok(self
            .handshake
            .validate(self.handshake.protocol_version, self.handshake.plugin_type)?)
    }

    pub fn plugin_type(&self) -> PluginType {
        self.handshake.plugin_type
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Reattach parameters for this instance, to persist across host restarts.
    pub fn reattach_config(&self) -> Result<ReattachConfig, LaunchError> {
        let mut cfg = ReattachConfig::new(self.addr()?, self.plugin_type());
        cfg.pid = self.pid;
        cfg.client = self.client.clone();
        Ok(cfg)
    }

    pub fn driver(&self) -> Result<DriverPluginClient, LaunchError> {
        self.ensure_type(PluginType::Driver)?;
        Ok(DriverPluginClient::new(
            self.channel.clone(),
            self.liveness.clone(),
            self.client.clone(),
        ))
    }

    pub fn device(&self) -> Result<DevicePluginClient, LaunchError> {
        self.ensure_type(PluginType::Device)?;
        Ok(DevicePluginClient::new(
            self.channel.clone(),
            self.liveness.clone(),
            self.client.clone(),
        ))
    }

    fn ensure_type(&self, requested: PluginType) -> Result<(), LaunchError> {
        if self.plugin_type() != requested {
            return Err(LaunchError::WrongType {
                requested,
                actual: self.plugin_type(),
            });
        }
        Ok(())
    }

    /// Stop the plugin (or detach from it) and fire liveness. Idempotent.
    pub async fn shutdown(&self) {
        self.stop.cancel();
        let watcher = self.watcher.lock().await.take();
        if let Some(watcher) = watcher {
            debug!(target: "tether.launch", plugin = %self.name, "shutting down plugin");
            if let Err(e) = watcher.await {
                warn!(target: "tether.launch", plugin = %self.name, error = %e, "plugin watcher failed");
            }
        }
        self.liveness.fire();
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn probe(
    channel: &Channel,
    plugin_type: PluginType,
    liveness: &Liveness,
    client: &ClientConfig,
    ctx: &CancellationToken,
) -> Result<PluginInfo, PluginError> {
    let (channel, liveness, client) = (channel.clone(), liveness.clone(), client.clone());
    match plugin_type {
        PluginType::Driver => {
            DriverPluginClient::new(channel, liveness, client)
                .plugin_info(ctx)
                .await
        }
        PluginType::Device => {
            DevicePluginClient::new(channel, liveness, client)
                .plugin_info(ctx)
                .await
        }
    }
}

async fn probe_loop(channel: Channel, cfg: ReattachConfig, liveness: Liveness, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(cfg.probe_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match probe(&channel, cfg.plugin_type, &liveness, &cfg.client, &stop).await {
            Ok(_) => {}
            Err(PluginError::Cancelled) => break,
            Err(e) if e.is_connection() => {
                warn!(target: "tether.launch", addr = %cfg.addr, error = %e, "attached plugin is unreachable");
                break;
            }
            Err(e) => {
                debug!(target: "tether.launch", addr = %cfg.addr, error = %e, "probe failed");
            }
        }
    }
    liveness.fire();
}
