use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use tether_core::{CancellationToken, DevicePlugin, PluginError, Subscription, subscription};
use tether_model::{
    ContainerReservation, DeviceConfig, DeviceFingerprint, DeviceGroupStats, DeviceStats,
    DeviceStatsReport, PluginInfo, PluginType, StatValue,
};

use crate::calls::Calls;
use crate::config::MockDeviceConfig;

/// Env var listing reserved device ids inside the task.
pub const VISIBLE_DEVICES_ENV: &str = "MOCK_VISIBLE_DEVICES";

/// In-memory [`DevicePlugin`] exposing the groups from its config.
#[derive(Clone)]
pub struct MockDevice {
    cfg: Arc<MockDeviceConfig>,
    reserved: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Calls>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(MockDeviceConfig::default())
    }
}

impl MockDevice {
    pub fn new(cfg: MockDeviceConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            reserved: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> &Calls {
        &self.calls
    }

    /// Give devices back after an exclusive reservation.
    pub async fn release(&self, device_ids: &[String]) {
        let mut reserved = self.reserved.lock().await;
        for id in device_ids {
            reserved.remove(id);
        }
    }

    fn knows(&self, id: &str) -> bool {
        self.cfg
            .groups
            .iter()
            .any(|g| g.devices.iter().any(|d| d.id == id))
    }

    fn fingerprint_now(&self) -> DeviceFingerprint {
        DeviceFingerprint {
            groups: self.cfg.groups.clone(),
        }
    }

    fn stats_now(&self, sample: i64) -> DeviceStatsReport {
        let now = SystemTime::now();
        let groups = self
            .cfg
            .groups
            .iter()
            .map(|g| DeviceGroupStats {
                vendor: g.vendor.clone(),
                device_type: g.device_type.clone(),
                name: g.name.clone(),
                instance_stats: g
                    .devices
                    .iter()
                    .map(|d| {
                        let mut summary = StatValue::int_ratio(sample % 8192, 8192, "MiB");
                        summary.desc = "memory used".to_string();
                        let stats = DeviceStats {
                            summary: Some(summary),
                            timestamp: Some(now),
                        };
                        (d.id.clone(), stats)
                    })
                    .collect(),
            })
            .collect();
        DeviceStatsReport { groups }
    }
}

#[async_trait]
impl DevicePlugin for MockDevice {
    async fn plugin_info(&self, _ctx: &CancellationToken) -> Result<PluginInfo, PluginError> {
        self.calls.record("plugin_info");
        Ok(PluginInfo {
            name: self.cfg.name.clone(),
            plugin_type: PluginType::Device,
            plugin_version: self.cfg.version.clone(),
            api_version: tether_api::PROTOCOL_VERSION,
        })
    }

    async fn fingerprint(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Subscription<DeviceFingerprint>, PluginError> {
        self.calls.record("fingerprint");
        let (tx, sub) = subscription();
        let ctx = ctx.clone();
        let device = self.clone();

        tokio::spawn(async move {
            if let Some(script) = device.cfg.fingerprints.clone() {
                for fp in script {
                    tokio::select! {
                        _ = ctx.cancelled() => return,
                        sent = tx.send(Ok(fp)) => if sent.is_err() { return },
                    }
                }
                return;
            }

            let mut ticker = tokio::time::interval(device.cfg.fingerprint_interval);
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    sent = tx.send(Ok(device.fingerprint_now())) => if sent.is_err() { return },
                }
            }
        });
        Ok(sub)
    }

    async fn reserve(
        &self,
        _ctx: &CancellationToken,
        device_ids: &[String],
    ) -> Result<ContainerReservation, PluginError> {
        self.calls.record("reserve");
        if device_ids.is_empty() {
            return Err(PluginError::InvalidMessage(
                "no device ids to reserve".into(),
            ));
        }
        if let Some(unknown) = device_ids.iter().find(|id| !self.knows(id)) {
            return Err(PluginError::DeviceNotFound(unknown.clone()));
        }

        if self.cfg.exclusive {
            let mut reserved = self.reserved.lock().await;
            if let Some(taken) = device_ids.iter().find(|id| reserved.contains(*id)) {
                return Err(PluginError::DeviceReserved(taken.clone()));
            }
            reserved.extend(device_ids.iter().cloned());
        }

        debug!(target: "tether.mock", ids = ?device_ids, "devices reserved");
        let mut envs = BTreeMap::new();
        envs.insert(VISIBLE_DEVICES_ENV.to_string(), device_ids.join(","));
        Ok(ContainerReservation {
            envs,
            mounts: Vec::new(),
            devices: device_ids
                .iter()
                .map(|id| DeviceConfig {
                    task_path: format!("/dev/mock/{id}"),
                    host_path: format!("/dev/mock/{id}"),
                    permissions: "rw".to_string(),
                })
                .collect(),
        })
    }

    async fn stats(
        &self,
        ctx: &CancellationToken,
        interval: Duration,
    ) -> Result<Subscription<DeviceStatsReport>, PluginError> {
        self.calls.record("stats");
        let interval = if interval.is_zero() {
            self.cfg.stats_interval
        } else {
            interval
        };
        let (tx, sub) = subscription();
        let ctx = ctx.clone();
        let device = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sample = 0i64;
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                sample += 512;
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    sent = tx.send(Ok(device.stats_now(sample))) => if sent.is_err() { return },
                }
            }
        });
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn reserve_known_devices() {
        let device = MockDevice::default();
        let ctx = CancellationToken::new();
        let res = device.reserve(&ctx, &ids(&["mock-0", "mock-1"])).await.unwrap();
        assert_eq!(res.envs[VISIBLE_DEVICES_ENV], "mock-0,mock-1");
        assert_eq!(res.devices.len(), 2);
        assert_eq!(res.devices[0].host_path, "/dev/mock/mock-0");
    }

    #[tokio::test]
    async fn reserve_unknown_device() {
        let device = MockDevice::default();
        let ctx = CancellationToken::new();
        let err = device
            .reserve(&ctx, &ids(&["mock-0", "mock-9"]))
            .await
            .unwrap_err();
        assert_eq!(err, PluginError::DeviceNotFound("mock-9".into()));
    }

    #[tokio::test]
    async fn exclusive_reservation() {
        let device = MockDevice::new(MockDeviceConfig {
            exclusive: true,
            ..Default::default()
        });
        let ctx = CancellationToken::new();
        device.reserve(&ctx, &ids(&["mock-0"])).await.unwrap();
        assert_eq!(
            device.reserve(&ctx, &ids(&["mock-0"])).await.unwrap_err(),
            PluginError::DeviceReserved("mock-0".into())
        );

        device.release(&ids(&["mock-0"])).await;
        device.reserve(&ctx, &ids(&["mock-0"])).await.unwrap();
        assert_eq!(device.calls().get("reserve"), 3);
    }

    #[tokio::test]
    async fn stats_cover_every_device() {
        let device = MockDevice::default();
        let ctx = CancellationToken::new();
        let mut stats = device
            .stats(&ctx, Duration::from_millis(5))
            .await
            .unwrap();
        let report = stats.recv().await.unwrap().unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].instance_stats.len(), 2);

        ctx.cancel();
        while stats.recv().await.is_some() {}
    }
}
