//! Starting, attaching to and stopping plugin processes.
//!
//! ```text
//! host                                   plugin
//!  spawn (cookie in env)  ─────────────▶  bind 127.0.0.1:0
//!  read first stdout line ◀─────────────  1|driver|tcp|127.0.0.1:40123
//!  validate, dial gRPC    ─────────────▶  serve
//!  child exits            ──▶ liveness fires, proxies report Shutdown
//! ```

mod config;
pub use config::{LaunchConfig, ReattachConfig};

mod error;
pub use error::LaunchError;

mod instance;
pub use instance::PluginInstance;

mod process;
