use std::time::Duration;

use thiserror::Error;

use tether_api::HandshakeError;
use tether_core::PluginError;
use tether_model::PluginType;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("plugin exited before completing the handshake ({status})")]
    ExitedEarly { status: String },

    #[error("handshake rejected: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("connect to plugin: {0}")]
    Connect(PluginError),

    #[error("requested a {requested} proxy but the plugin is a {actual} plugin")]
    WrongType {
        requested: PluginType,
        actual: PluginType,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LaunchError> for PluginError {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Connect(inner) => inner,
            LaunchError::Io(e) => PluginError::Transport(e.to_string()),
            other => PluginError::Handshake(other.to_string()),
        }
    }
}
