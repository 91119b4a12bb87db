use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};

use tether_core::{CancellationToken, DriverPlugin};
use tether_launch::{LaunchConfig, PluginInstance};
use tether_mock::MockTaskConfig;
use tether_model::{PluginType, TaskConfig};
use tether_observe::{LoggerConfig, logger_init};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    logger_init(&LoggerConfig::default().from_env()?)?;
    info!("logger initialized");

    // 2) Launch the plugin (path from argv, mock plugin from PATH otherwise)
    let command = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tether-mock-plugin".to_string());
    let cfg = LaunchConfig::new(&command, PluginType::Driver)
        .with_handshake_timeout(Duration::from_secs(5));
    let plugin = PluginInstance::launch(cfg)
        .await
        .with_context(|| format!("launching {command}"))?;
    info!(addr = %plugin.handshake().address, pid = ?plugin.pid(), "plugin launched");

    let driver = plugin.driver()?;
    let ctx = CancellationToken::new();

    // 3) Fingerprint
    let info = driver.plugin_info(&ctx).await?;
    info!(name = %info.name, version = %info.plugin_version, "plugin info");
    let mut fingerprints = driver.fingerprint(&ctx).await?;
    match fingerprints.recv().await {
        Some(Ok(fp)) => info!(health = ?fp.health, attributes = fp.attributes.len(), "fingerprint"),
        Some(Err(e)) => bail!("fingerprint failed: {e}"),
        None => warn!("fingerprint stream closed without a sample"),
    }
    drop(fingerprints);

    // 4) Run one task to completion
    let cmd = MockTaskConfig {
        run_for_ms: 500,
        exit_code: 0,
        ..Default::default()
    };
    let task = TaskConfig::new("demo-1", "demo").with_driver_config(&cmd)?;
    let started = driver.start_task(&ctx, &task).await?;
    info!(task = %started.handle.task_id(), "task started");

    let mut wait = driver.wait_task(&ctx, "demo-1").await?;
    tokio::select! {
        res = wait.recv() => match res {
            Some(Ok(exit)) => info!(code = exit.exit_code, signal = exit.signal, "task exited"),
            Some(Err(e)) => warn!(error = %e, "wait failed"),
            None => warn!("wait stream closed"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            ctx.cancel();
        }
    }
    if let Err(e) = driver
        .destroy_task(&CancellationToken::new(), "demo-1", true)
        .await
    {
        warn!(error = %e, "destroy failed");
    }

    // 5) Stop the plugin
    plugin.shutdown().await;
    info!("shutting down...");
    Ok(())
}
