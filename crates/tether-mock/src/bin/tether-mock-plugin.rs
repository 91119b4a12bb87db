use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tether_api::{ServeConfig, serve_device, serve_driver};
use tether_mock::{MockDevice, MockDriver, MockDriverConfig, env};
use tether_model::{Fingerprint, PluginType};
use tether_observe::{LoggerConfig, logger_init};

fn env_u64(key: &str) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(Some(v.trim().parse()?)),
        _ => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) Logger (stdout belongs to the handshake)
    logger_init(&LoggerConfig::plugin().from_env()?)?;

    // 2) Plugin settings
    let plugin_type: PluginType = std::env::var(env::PLUGIN_TYPE)
        .unwrap_or_else(|_| "driver".to_string())
        .parse()?;
    let fingerprint_count = env_u64(env::FINGERPRINT_COUNT)?;
    let exit_after = env_u64(env::EXIT_AFTER_MS)?.map(Duration::from_millis);

    // 3) Shutdown on SIGTERM / Ctrl+C
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("signal received, shutting down");
            shutdown.cancel();
        });
    }
    if let Some(after) = exit_after {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            warn!(?after, "exiting on request");
            std::process::exit(2);
        });
    }

    // 4) Serve
    match plugin_type {
        PluginType::Driver => {
            let cfg = MockDriverConfig {
                fingerprints: fingerprint_count.map(|n| {
                    (0..n)
                        .map(|i| Fingerprint::healthy(format!("sample {i}")))
                        .collect()
                }),
                allow_plugin_exit: true,
                ..Default::default()
            };
            serve_driver(Arc::new(MockDriver::new(cfg)), ServeConfig::default(), shutdown).await?
        }
        PluginType::Device => {
            serve_device(Arc::new(MockDevice::default()), ServeConfig::default(), shutdown).await?
        }
    }

    info!("plugin stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
