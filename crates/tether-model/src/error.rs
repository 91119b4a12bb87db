use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown plugin type: {0} (expected: driver|device)")]
    UnknownPluginType(String),

    #[error("failed to encode opaque blob: {0}")]
    Encode(String),

    #[error("failed to decode opaque blob: {0}")]
    Decode(String),
}
