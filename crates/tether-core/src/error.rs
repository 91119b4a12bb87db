use thiserror::Error;

use tether_model::{Capability, ModelError, SchemaError};

/// Every failure a plugin call can surface to the orchestrator.
///
/// `Shutdown` means the plugin process is gone. `Cancelled` means the caller
/// gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin is shut down")]
    Shutdown,

    #[error("request cancelled")]
    Cancelled,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device already reserved: {0}")]
    DeviceReserved(String),

    #[error("invalid task config: {0}")]
    InvalidConfig(String),

    #[error("insufficient resources: {0}")]
    Resources(String),

    #[error("task is still running: {0}")]
    TaskRunning(String),

    #[error("{0} is not supported by this plugin")]
    Unsupported(Capability),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("plugin error: {message}")]
    Plugin { message: String, recoverable: bool },
}

impl PluginError {
    pub fn plugin(message: impl Into<String>) -> Self {
        PluginError::Plugin {
            message: message.into(),
            recoverable: false,
        }
    }

    /// Error the orchestrator may retry, e.g. a start that failed on a transient
    /// host condition.
    pub fn recoverable(message: impl Into<String>) -> Self {
        PluginError::Plugin {
            message: message.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PluginError::Plugin {
                recoverable: true,
                ..
            }
        )
    }

    /// Errors that come from the connection rather than from the plugin.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            PluginError::Shutdown | PluginError::Handshake(_) | PluginError::Transport(_)
        )
    }
}

impl From<SchemaError> for PluginError {
    fn from(e: SchemaError) -> Self {
        PluginError::InvalidConfig(e.to_string())
    }
}

impl From<ModelError> for PluginError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Decode(msg) => PluginError::InvalidConfig(msg),
            other => PluginError::plugin(other.to_string()),
        }
    }
}
