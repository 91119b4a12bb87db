//! Mapping between [`PluginError`] and gRPC status codes.
//!
//! Domain errors carry their kind in the `x-tether-error` metadata entry so the
//! host can rebuild the exact variant; plain status codes from foreign plugins
//! fall back to a code-based guess.

use std::time::Duration;

use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Code, Status};
use tracing::debug;

use tether_core::{Joined, PluginError};
use tether_model::{Capability, PluginType};

pub const ERROR_KIND_KEY: &str = "x-tether-error";
pub const RECOVERABLE_KEY: &str = "x-tether-recoverable";

/// How a host-side proxy reads failures from one plugin connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorScope {
    /// Surface being called; decides what an untagged `NotFound` refers to.
    pub plugin_type: PluginType,
    /// How long an `Unavailable` status waits for liveness.
    pub grace: Duration,
}

/// Encode a plugin-side error for the wire.
pub fn to_status(err: PluginError) -> Status {
    let (code, kind, message) = match err {
        PluginError::Shutdown => (Code::Unavailable, "shutdown", "plugin is shut down".to_string()),
        PluginError::Cancelled => (Code::Cancelled, "cancelled", "request cancelled".to_string()),
        PluginError::Handshake(m) => (Code::Internal, "handshake", m),
        PluginError::Transport(m) => (Code::Unavailable, "transport", m),
        PluginError::TaskNotFound(m) => (Code::NotFound, "task-not-found", m),
        PluginError::DeviceNotFound(m) => (Code::NotFound, "device-not-found", m),
        PluginError::DeviceReserved(m) => (Code::AlreadyExists, "device-reserved", m),
        PluginError::InvalidConfig(m) => (Code::InvalidArgument, "invalid-config", m),
        PluginError::Resources(m) => (Code::ResourceExhausted, "resources", m),
        PluginError::TaskRunning(m) => (Code::FailedPrecondition, "task-running", m),
        PluginError::Unsupported(Capability::Signal) => {
            (Code::Unimplemented, "unsupported-signal", "SignalTask".to_string())
        }
        PluginError::Unsupported(Capability::Exec) => {
            (Code::Unimplemented, "unsupported-exec", "ExecTask".to_string())
        }
        PluginError::Unsupported(Capability::Network) => {
            (Code::Unimplemented, "unsupported-network", "CreateNetwork".to_string())
        }
        PluginError::InvalidMessage(m) => (Code::InvalidArgument, "invalid-message", m),
        PluginError::Plugin {
            message,
            recoverable,
        } => {
            let mut status = Status::new(Code::Unknown, message);
            insert(status.metadata_mut(), ERROR_KIND_KEY, "plugin");
            if recoverable {
                insert(status.metadata_mut(), RECOVERABLE_KEY, "true");
            }
            return status;
        }
    };

    let mut status = Status::new(code, message);
    insert(status.metadata_mut(), ERROR_KIND_KEY, kind);
    status
}

fn insert(md: &mut MetadataMap, key: &'static str, value: &'static str) {
    md.insert(key, MetadataValue::from_static(value));
}

/// Decode a status into a domain error without looking at connection state.
///
/// Tagged statuses decode exactly. Untagged ones are guessed from the code,
/// with `NotFound` naming a task on drivers and a device on device plugins.
pub fn from_status(status: &Status, plugin_type: PluginType) -> PluginError {
    let message = status.message().to_string();
    let kind = status
        .metadata()
        .get(ERROR_KIND_KEY)
        .and_then(|v| v.to_str().ok());

    match kind {
        Some("shutdown") => PluginError::Shutdown,
        Some("cancelled") => PluginError::Cancelled,
        Some("handshake") => PluginError::Handshake(message),
        Some("transport") => PluginError::Transport(message),
        Some("task-not-found") => PluginError::TaskNotFound(message),
        Some("device-not-found") => PluginError::DeviceNotFound(message),
        Some("device-reserved") => PluginError::DeviceReserved(message),
        Some("invalid-config") => PluginError::InvalidConfig(message),
        Some("resources") => PluginError::Resources(message),
        Some("task-running") => PluginError::TaskRunning(message),
        Some("unsupported-signal") => PluginError::Unsupported(Capability::Signal),
        Some("unsupported-exec") => PluginError::Unsupported(Capability::Exec),
        Some("unsupported-network") => PluginError::Unsupported(Capability::Network),
        Some("invalid-message") => PluginError::InvalidMessage(message),
        Some("plugin") => {
            let recoverable = status
                .metadata()
                .get(RECOVERABLE_KEY)
                .and_then(|v| v.to_str().ok())
                == Some("true");
            PluginError::Plugin {
                message,
                recoverable,
            }
        }
        _ => match status.code() {
            Code::NotFound => match plugin_type {
                PluginType::Driver => PluginError::TaskNotFound(message),
                PluginType::Device => PluginError::DeviceNotFound(message),
            },
            Code::InvalidArgument => PluginError::InvalidConfig(message),
            Code::ResourceExhausted => PluginError::Resources(message),
            Code::Cancelled => PluginError::Cancelled,
            Code::Unimplemented if message.contains("Exec") => {
                PluginError::Unsupported(Capability::Exec)
            }
            Code::Unimplemented if message.contains("Signal") => {
                PluginError::Unsupported(Capability::Signal)
            }
            Code::Unimplemented if message.contains("Network") => {
                PluginError::Unsupported(Capability::Network)
            }
            Code::Unavailable | Code::DeadlineExceeded => PluginError::Transport(message),
            _ => PluginError::plugin(message),
        },
    }
}

/// Translate an RPC failure observed by a host-side proxy.
///
/// Liveness takes precedence over caller cancellation. An `Unavailable` status
/// with neither signal fired waits up to `scope.grace` for liveness before it
/// is reported as a transport error.
pub async fn translate(status: Status, joined: &Joined, scope: ErrorScope) -> PluginError {
    let grace = scope.grace;
    if let Some(reason) = joined.reason() {
        return reason;
    }

    let tagged = status.metadata().get(ERROR_KIND_KEY).is_some();
    if status.code() != Code::Unavailable || tagged {
        return from_status(&status, scope.plugin_type);
    }

    debug!(target: "tether.client", grace_ms = grace.as_millis() as u64, "plugin unavailable, waiting for liveness");
    tokio::select! {
        _ = joined.liveness().fired() => PluginError::Shutdown,
        _ = joined.caller().cancelled() => joined.reason().unwrap_or(PluginError::Cancelled),
        _ = tokio::time::sleep(grace) => {
            joined.reason().unwrap_or_else(|| PluginError::Transport(status.message().to_string()))
        }
    }
}
