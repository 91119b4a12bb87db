//! Mock driver and device plugins.
//!
//! Used in-process behind the gRPC services in tests, and as the
//! `tether-mock-plugin` binary for end-to-end runs through a real launch.

mod calls;
pub use calls::Calls;

mod config;
pub use config::{MockDeviceConfig, MockDriverConfig, MockTaskConfig, MockTaskState};

mod driver;
pub use driver::{DRIVER_NAME, MockDriver};

mod device;
pub use device::{MockDevice, VISIBLE_DEVICES_ENV};

/// Environment variables understood by the plugin binary.
pub mod env {
    /// `driver` (default) or `device`.
    pub const PLUGIN_TYPE: &str = "TETHER_MOCK_PLUGIN_TYPE";
    /// Serve this many driver fingerprints, then end the stream.
    pub const FINGERPRINT_COUNT: &str = "TETHER_MOCK_FINGERPRINT_COUNT";
    /// Exit the process after this many milliseconds.
    pub const EXIT_AFTER_MS: &str = "TETHER_MOCK_EXIT_AFTER_MS";
}
