use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, fmt::writer::BoxMakeWriter,
    layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{LoggerConfig, LoggerError, LoggerFormat, LoggerOutput};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the process-wide subscriber described by `cfg`.
///
/// Everything that can be rejected up front (level directive, format) is
/// checked before the global dispatcher is touched.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = level_filter(&cfg.level)?;
    let sink = match cfg.format {
        LoggerFormat::Text => fmt_sink(cfg, false),
        LoggerFormat::Json => fmt_sink(cfg, true),
        LoggerFormat::Journald => journald_sink()?,
    };

    tracing_subscriber::registry()
        .with(sink)
        .with(filter)
        .try_init()
        .map_err(|e| {
            if tracing::dispatcher::has_been_set() {
                LoggerError::AlreadyInitialized
            } else {
                LoggerError::InitializationFailed(e.to_string())
            }
        })
}

fn level_filter(directive: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directive).map_err(|_| LoggerError::InvalidLogLevel(directive.to_string()))
}

fn fmt_sink(cfg: &LoggerConfig, json: bool) -> BoxedLayer {
    let writer = match cfg.output {
        LoggerOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LoggerOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(cfg.with_targets)
        .with_timer(local_rfc3339());

    if json {
        layer.json().with_ansi(false).boxed()
    } else {
        layer.with_ansi(cfg.use_color).boxed()
    }
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    // Unknown offsets (multi-threaded start on some platforms) fall back to UTC.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_sink() -> Result<BoxedLayer, LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("tether".to_string());
    Ok(layer.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_sink() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> LoggerConfig {
        LoggerConfig {
            output: LoggerOutput::Stderr,
            level: "warn".into(),
            ..LoggerConfig::default()
        }
    }

    #[test]
    fn bad_directive_is_rejected_before_install() {
        let cfg = LoggerConfig {
            level: "info,tether=loud".into(),
            ..quiet()
        };
        assert!(matches!(install(&cfg), Err(LoggerError::InvalidLogLevel(_))));
        assert!(level_filter("info,tether.stream=trace").is_ok());
    }

    #[cfg(not(all(target_os = "linux", feature = "journald")))]
    #[test]
    fn journald_without_feature() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Journald,
            ..quiet()
        };
        assert!(matches!(install(&cfg), Err(LoggerError::JournaldNotSupported)));
    }

    #[test]
    fn second_install_reports_already_initialized() {
        // Another test in this binary may have installed first.
        let _ = install(&quiet());
        let json = LoggerConfig {
            format: LoggerFormat::Json,
            ..quiet()
        };
        assert!(matches!(install(&json), Err(LoggerError::AlreadyInitialized)));
    }
}
