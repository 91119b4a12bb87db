use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tether_api::{COOKIE_VALUE, ClientConfig, PROTOCOL_VERSION};
use tether_model::PluginType;

/// How to start a plugin process.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub plugin_type: PluginType,
    pub protocol_version: u32,
    /// Time the plugin has to print its handshake line.
    pub handshake_timeout: Duration,
    /// Time between SIGTERM and SIGKILL on shutdown.
    pub kill_grace: Duration,
    pub client: ClientConfig,
    pub cookie: String,
}

impl LaunchConfig {
    pub fn new(command: impl Into<PathBuf>, plugin_type: PluginType) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            plugin_type,
            protocol_version: PROTOCOL_VERSION,
            handshake_timeout: Duration::from_secs(10),
            kill_grace: Duration::from_secs(5),
            client: ClientConfig::default(),
            cookie: COOKIE_VALUE.to_string(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Short name used in log lines.
    pub(crate) fn display_name(&self) -> String {
        self.command
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.display().to_string())
    }
}

/// How to reach a plugin that is already running.
#[derive(Debug, Clone)]
pub struct ReattachConfig {
    pub addr: SocketAddr,
    pub plugin_type: PluginType,
    /// Pid of the plugin process, if known. Informational only.
    pub pid: Option<u32>,
    pub probe_interval: Duration,
    pub client: ClientConfig,
}

impl ReattachConfig {
    pub fn new(addr: SocketAddr, plugin_type: PluginType) -> Self {
        Self {
            addr,
            plugin_type,
            pid: None,
            probe_interval: Duration::from_secs(5),
            client: ClientConfig::default(),
        }
    }
}
