use std::time::Duration;

/// Host-side proxy settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long an `Unavailable` failure waits for the liveness signal before it
    /// is reported as a transport error.
    pub unavailable_grace: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            unavailable_grace: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
