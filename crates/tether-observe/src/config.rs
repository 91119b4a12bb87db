use std::io::IsTerminal;

use crate::error::LoggerError;
use crate::format::{LoggerFormat, LoggerOutput};

/// Environment variables read by [`LoggerConfig::from_env`].
pub const ENV_LEVEL: &str = "TETHER_LOG";
pub const ENV_FORMAT: &str = "TETHER_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub output: LoggerOutput,
    /// `EnvFilter` directive, e.g. `info` or `info,tether.stream=debug`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            output: LoggerOutput::Stdout,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Preset for plugin binaries: json on stderr, no color.
    pub fn plugin() -> Self {
        Self {
            format: LoggerFormat::Json,
            output: LoggerOutput::Stderr,
            use_color: false,
            ..Self::default()
        }
    }

    /// Apply `TETHER_LOG` / `TETHER_LOG_FORMAT` on top of `self`.
    pub fn from_env(self) -> Result<Self, LoggerError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, LoggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.level = level;
        }
        if let Some(format) = lookup(ENV_FORMAT).filter(|v| !v.trim().is_empty()) {
            self.format = format.parse()?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_preset_keeps_stdout_free() {
        let cfg = LoggerConfig::plugin();
        assert_eq!(cfg.output, LoggerOutput::Stderr);
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert!(!cfg.use_color);
    }

    #[test]
    fn overrides() {
        let cfg = LoggerConfig::plugin()
            .with_overrides(|key| match key {
                ENV_LEVEL => Some("debug,tonic=warn".into()),
                ENV_FORMAT => Some("text".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(cfg.level, "debug,tonic=warn");
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.output, LoggerOutput::Stderr);

        let untouched = LoggerConfig::default().with_overrides(|_| None).unwrap();
        assert_eq!(untouched.level, "info");
    }

    #[test]
    fn bad_format_override() {
        let res = LoggerConfig::default().with_overrides(|key| {
            (key == ENV_FORMAT).then(|| "yaml".to_string())
        });
        assert!(matches!(res, Err(LoggerError::InvalidFormat(_))));
    }
}
