//! Logging setup shared by hosts and plugin binaries.
//!
//! Plugins must keep stdout free for the handshake line, so their logs go to
//! stderr ([`LoggerConfig::plugin`]); the host forwards those lines into its
//! own log.

mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::{LoggerFormat, LoggerOutput};

/// Install the global subscriber. Fails with [`LoggerError::AlreadyInitialized`]
/// on a second call.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::install(cfg)
}
