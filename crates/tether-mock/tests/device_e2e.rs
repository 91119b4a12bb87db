use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::DropGuard;

use tether_api::{ClientConfig, DevicePluginClient, connect, spawn_device};
use tether_core::{CancellationToken, DevicePlugin, Liveness, PluginError};
use tether_mock::{MockDevice, MockDeviceConfig, VISIBLE_DEVICES_ENV};
use tether_model::{DeviceFingerprint, PluginType};

struct Harness {
    device: MockDevice,
    client: DevicePluginClient,
    liveness: Liveness,
    _server: DropGuard,
}

async fn harness(cfg: MockDeviceConfig) -> Harness {
    let device = MockDevice::new(cfg);
    let server = CancellationToken::new();
    let served = spawn_device(
        Arc::new(device.clone()),
        "127.0.0.1:0".parse().unwrap(),
        server.clone(),
    )
    .await
    .unwrap();
    assert_eq!(served.plugin_type, PluginType::Device);

    let cfg = ClientConfig {
        unavailable_grace: Duration::from_millis(200),
        ..Default::default()
    };
    let channel = connect(served.addr, &cfg).await.unwrap();
    let liveness = Liveness::new();
    Harness {
        device,
        client: DevicePluginClient::new(channel, liveness.clone(), cfg),
        liveness,
        _server: server.drop_guard(),
    }
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn plugin_info_reports_device() {
    let h = harness(MockDeviceConfig::default()).await;
    let info = h.client.plugin_info(&CancellationToken::new()).await.unwrap();
    assert_eq!(info.plugin_type, PluginType::Device);
    assert_eq!(info.name, "mock-device");
}

#[tokio::test]
async fn reserve_over_the_wire() {
    let h = harness(MockDeviceConfig::default()).await;
    let ctx = CancellationToken::new();

    let res = h.client.reserve(&ctx, &ids(&["mock-1"])).await.unwrap();
    assert_eq!(res.envs[VISIBLE_DEVICES_ENV], "mock-1");
    assert_eq!(res.devices.len(), 1);
    assert_eq!(res.devices[0].task_path, "/dev/mock/mock-1");
    assert_eq!(res.devices[0].permissions, "rw");

    assert_eq!(
        h.client.reserve(&ctx, &ids(&["gpu-7"])).await.unwrap_err(),
        PluginError::DeviceNotFound("gpu-7".into())
    );
    assert!(matches!(
        h.client.reserve(&ctx, &[]).await.unwrap_err(),
        PluginError::InvalidMessage(_)
    ));
    assert_eq!(h.device.calls().get("reserve"), 3);
}

#[tokio::test]
async fn exclusive_reservation_conflict() {
    let h = harness(MockDeviceConfig {
        exclusive: true,
        ..Default::default()
    })
    .await;
    let ctx = CancellationToken::new();

    h.client.reserve(&ctx, &ids(&["mock-0"])).await.unwrap();
    assert_eq!(
        h.client.reserve(&ctx, &ids(&["mock-0"])).await.unwrap_err(),
        PluginError::DeviceReserved("mock-0".into())
    );
}

#[tokio::test]
async fn fingerprint_carries_groups() {
    let groups = MockDeviceConfig::default().groups;
    let script = vec![
        DeviceFingerprint {
            groups: groups.clone(),
        },
        DeviceFingerprint { groups: Vec::new() },
    ];
    let h = harness(MockDeviceConfig {
        fingerprints: Some(script),
        ..Default::default()
    })
    .await;

    let mut sub = h.client.fingerprint(&CancellationToken::new()).await.unwrap();
    let first = sub.recv().await.unwrap().unwrap();
    assert_eq!(first.groups.len(), 1);
    assert_eq!(first.groups[0].id(), "tether/gpu/mock");
    let devices: Vec<_> = first.groups[0].devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(devices, ["mock-0", "mock-1"]);
    assert!(first.groups[0].attributes.contains_key("memory"));

    let second = sub.recv().await.unwrap().unwrap();
    assert!(second.groups.is_empty());
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn stats_stream_until_cancelled() {
    let h = harness(MockDeviceConfig::default()).await;
    let ctx = CancellationToken::new();

    let mut stats = h
        .client
        .stats(&ctx, Duration::from_millis(20))
        .await
        .unwrap();
    let report = stats.recv().await.unwrap().unwrap();
    let group = &report.groups[0];
    assert_eq!(group.instance_stats.len(), 2);
    let summary = group.instance_stats["mock-0"].summary.as_ref().unwrap();
    assert_eq!(summary.unit, "MiB");

    ctx.cancel();
    let mut last = None;
    while let Some(item) = stats.recv().await {
        last = Some(item);
    }
    if let Some(Err(err)) = last {
        assert_eq!(err, PluginError::Cancelled);
    }
}

#[tokio::test]
async fn shutdown_after_liveness() {
    let h = harness(MockDeviceConfig::default()).await;
    h.liveness.fire();
    assert_eq!(
        h.client
            .reserve(&CancellationToken::new(), &ids(&["mock-0"]))
            .await
            .unwrap_err(),
        PluginError::Shutdown
    );
}
