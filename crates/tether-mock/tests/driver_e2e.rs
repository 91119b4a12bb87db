use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::DropGuard;

use tether_api::{ClientConfig, DriverPluginClient, connect, spawn_driver};
use tether_core::{CancellationToken, DriverPlugin, Liveness, PluginError};
use tether_mock::{MockDriver, MockDriverConfig, MockTaskConfig};
use tether_model::{
    Capabilities, Capability, Fingerprint, NetworkCreateRequest, TaskConfig, TaskHandle, TaskState,
};

struct Harness {
    driver: MockDriver,
    client: DriverPluginClient,
    liveness: Liveness,
    _server: DropGuard,
}

fn client_config() -> ClientConfig {
    ClientConfig {
        unavailable_grace: Duration::from_millis(200),
        ..Default::default()
    }
}

async fn harness(cfg: MockDriverConfig) -> Harness {
    let driver = MockDriver::new(cfg);
    let server = CancellationToken::new();
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let served = spawn_driver(Arc::new(driver.clone()), bind, server.clone())
        .await
        .unwrap();

    let channel = connect(served.addr, &client_config()).await.unwrap();
    let liveness = Liveness::new();
    let client = DriverPluginClient::new(channel, liveness.clone(), client_config());
    Harness {
        driver,
        client,
        liveness,
        _server: server.drop_guard(),
    }
}

fn task(id: &str, cmd: MockTaskConfig) -> TaskConfig {
    TaskConfig::new(id, "web").with_driver_config(&cmd).unwrap()
}

#[tokio::test]
async fn plugin_info_and_schema() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();

    let info = h.client.plugin_info(&ctx).await.unwrap();
    assert_eq!(info.name, "mock");
    assert_eq!(info.api_version, tether_api::PROTOCOL_VERSION);

    let schema = h.client.task_config_schema(&ctx).await.unwrap();
    assert!(schema.field("run_for_ms").is_some());
    assert_eq!(schema, MockTaskConfig::schema());
}

#[tokio::test]
async fn wait_is_idempotent_after_exit() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();
    let cmd = MockTaskConfig {
        run_for_ms: 50,
        exit_code: 7,
        ..Default::default()
    };
    let started = h.client.start_task(&ctx, &task("t1", cmd)).await.unwrap();
    assert_eq!(started.handle.task_id(), "t1");
    assert_eq!(started.handle.state, TaskState::Running);

    for _ in 0..3 {
        let mut wait = h.client.wait_task(&ctx, "t1").await.unwrap();
        let res = wait.recv().await.unwrap().unwrap();
        assert_eq!(res.exit_code, 7);
        assert!(wait.recv().await.is_none());
    }

    // Stopping and destroying an exited task both succeed.
    h.client
        .stop_task(&ctx, "t1", Duration::from_secs(1), "SIGTERM")
        .await
        .unwrap();
    h.client.destroy_task(&ctx, "t1", false).await.unwrap();
    assert_eq!(h.driver.task_count().await, 0);
}

#[tokio::test]
async fn recover_after_plugin_restart() {
    let ctx = CancellationToken::new();
    let persisted = {
        let first = harness(MockDriverConfig::default()).await;
        let started = first
            .client
            .start_task(&ctx, &task("t1", MockTaskConfig::default()))
            .await
            .unwrap();
        serde_json::to_vec(&started.handle).unwrap()
    };

    let handle: TaskHandle = serde_json::from_slice(&persisted).unwrap();
    assert!(handle.driver_state.is_some());

    let second = harness(MockDriverConfig::default()).await;
    second.client.recover_task(&ctx, &handle).await.unwrap();

    let status = second.client.inspect_task(&ctx, "t1").await.unwrap();
    assert_eq!(status.state, TaskState::Running);
    assert_eq!(status.driver_attributes["recovered"], "true");

    let mut lost = handle.clone();
    lost.config.id = "t2".into();
    lost.driver_state = None;
    assert_eq!(
        second.client.recover_task(&ctx, &lost).await.unwrap_err(),
        PluginError::TaskNotFound("t2".into())
    );
}

#[tokio::test]
async fn unadvertised_capabilities_never_reach_the_plugin() {
    let h = harness(MockDriverConfig {
        capabilities: Capabilities::default(),
        ..Default::default()
    })
    .await;
    let ctx = CancellationToken::new();
    h.client
        .start_task(&ctx, &task("t1", MockTaskConfig::default()))
        .await
        .unwrap();

    let err = h.client.signal_task(&ctx, "t1", "SIGHUP").await.unwrap_err();
    assert_eq!(err, PluginError::Unsupported(Capability::Signal));
    let err = h
        .client
        .exec_task(&ctx, "t1", &["ls".to_string()], Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, PluginError::Unsupported(Capability::Exec));

    assert_eq!(h.driver.calls().get("signal_task"), 0);
    assert_eq!(h.driver.calls().get("exec_task"), 0);
    assert_eq!(h.driver.calls().get("capabilities"), 1);
}

#[tokio::test]
async fn advertised_capabilities_are_forwarded() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();
    h.client
        .start_task(&ctx, &task("t1", MockTaskConfig::default()))
        .await
        .unwrap();

    h.client.signal_task(&ctx, "t1", "SIGHUP").await.unwrap();
    let out = h
        .client
        .exec_task(&ctx, "t1", &["ls".to_string()], Duration::from_secs(1))
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("Exec("));
    assert!(out.exit_result.successful());
    assert_eq!(h.driver.calls().get("signal_task"), 1);
}

#[tokio::test]
async fn fingerprint_stream_ends_after_script() {
    let script: Vec<Fingerprint> = (0..3)
        .map(|i| Fingerprint::healthy(format!("sample {i}")))
        .collect();
    let h = harness(MockDriverConfig {
        fingerprints: Some(script.clone()),
        ..Default::default()
    })
    .await;
    let ctx = CancellationToken::new();

    let mut sub = h.client.fingerprint(&ctx).await.unwrap();
    let mut got = Vec::new();
    while let Some(item) = sub.recv().await {
        got.push(item.unwrap());
    }
    assert_eq!(got, script);
}

#[tokio::test]
async fn domain_errors_survive_the_wire() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();

    assert_eq!(
        h.client.inspect_task(&ctx, "nope").await.unwrap_err(),
        PluginError::TaskNotFound("nope".into())
    );

    let cmd = MockTaskConfig {
        start_error: Some("disk full".into()),
        start_error_recoverable: true,
        ..Default::default()
    };
    let err = h.client.start_task(&ctx, &task("t1", cmd)).await.unwrap_err();
    assert!(err.is_recoverable(), "{err}");

    let mut bad = TaskConfig::new("t2", "web");
    bad.driver_config = Some(br#"{"unknown_knob":1}"#.to_vec());
    let err = h.client.start_task(&ctx, &bad).await.unwrap_err();
    assert!(matches!(err, PluginError::InvalidConfig(_)), "{err}");

    h.client
        .start_task(&ctx, &task("t3", MockTaskConfig::default()))
        .await
        .unwrap();
    assert_eq!(
        h.client.destroy_task(&ctx, "t3", false).await.unwrap_err(),
        PluginError::TaskRunning("t3".into())
    );
    h.client.destroy_task(&ctx, "t3", true).await.unwrap();

    let mut wait = h.client.wait_task(&ctx, "t3").await.unwrap();
    assert_eq!(
        wait.recv().await.unwrap().unwrap_err(),
        PluginError::TaskNotFound("t3".into())
    );
}

#[tokio::test]
async fn caller_cancel_ends_wait_with_cancelled() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();
    h.client
        .start_task(&ctx, &task("t1", MockTaskConfig::default()))
        .await
        .unwrap();

    let wait_ctx = CancellationToken::new();
    let mut wait = h.client.wait_task(&wait_ctx, "t1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_ctx.cancel();

    assert_eq!(wait.recv().await.unwrap().unwrap_err(), PluginError::Cancelled);
    assert!(wait.recv().await.is_none());

    // The task itself is untouched.
    let status = h.client.inspect_task(&ctx, "t1").await.unwrap();
    assert_eq!(status.state, TaskState::Running);
}

#[tokio::test]
async fn liveness_wins_over_caller_cancel() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();
    h.client
        .start_task(&ctx, &task("t1", MockTaskConfig::default()))
        .await
        .unwrap();

    let mut wait = h.client.wait_task(&ctx, "t1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.liveness.fire();
    ctx.cancel();

    assert_eq!(wait.recv().await.unwrap().unwrap_err(), PluginError::Shutdown);
    assert_eq!(
        h.client
            .inspect_task(&CancellationToken::new(), "t1")
            .await
            .unwrap_err(),
        PluginError::Shutdown
    );
}

#[tokio::test]
async fn stats_keep_zero_valued_measurements() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();
    h.client
        .start_task(&ctx, &task("t1", MockTaskConfig::default()))
        .await
        .unwrap();

    let mut stats = h
        .client
        .task_stats(&ctx, "t1", Duration::from_millis(20))
        .await
        .unwrap();
    let sample = stats.recv().await.unwrap().unwrap();
    let cpu = sample.usage.cpu.unwrap();
    assert_eq!(cpu.system_mode, Some(0.0));
    assert_eq!(cpu.throttled_periods, None);
    assert!(sample.pids.contains_key("1"));
    assert!(sample.timestamp.is_some());
}

#[tokio::test]
async fn task_events_follow_lifecycle() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();

    let mut events = h.client.task_events(&ctx).await.unwrap();
    // Give the server a moment to subscribe before the task starts.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cmd = MockTaskConfig {
        run_for_ms: 20,
        ..Default::default()
    };
    h.client.start_task(&ctx, &task("t1", cmd)).await.unwrap();

    let started = events.recv().await.unwrap().unwrap();
    assert_eq!(started.task_id, "t1");
    assert_eq!(started.message, "task started");
    let exited = events.recv().await.unwrap().unwrap();
    assert!(exited.message.starts_with("task exited"), "{}", exited.message);
}

#[tokio::test]
async fn start_reports_driver_network() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();
    let mut ports = std::collections::BTreeMap::new();
    ports.insert("http".to_string(), 8080u16);
    let cmd = MockTaskConfig {
        driver_ip: Some("10.0.0.7".into()),
        driver_advertise: true,
        driver_port_map: ports.clone(),
        ..Default::default()
    };

    let started = h.client.start_task(&ctx, &task("t1", cmd)).await.unwrap();
    let net = started.network.unwrap();
    assert_eq!(net.ip, "10.0.0.7");
    assert!(net.auto_advertise);
    assert_eq!(net.port_map, ports);

    let status = h.client.inspect_task(&ctx, "t1").await.unwrap();
    assert_eq!(status.network_override.unwrap().port_map, ports);
}

#[tokio::test]
async fn network_lifecycle_over_the_wire() {
    let mut cfg = MockDriverConfig::default();
    cfg.capabilities.must_initiate_network = true;
    let h = harness(cfg).await;
    let ctx = CancellationToken::new();
    let req = NetworkCreateRequest {
        hostname: "web".into(),
    };

    let created = h.client.create_network(&ctx, "a1", &req).await.unwrap();
    assert!(created.created);
    let spec = created.spec.unwrap();
    assert_eq!(spec.path, "/var/run/netns/a1");
    assert_eq!(spec.hosts.as_ref().unwrap().hostname, "web");

    // A restarted host asks again and gets the same network back.
    let again = h.client.create_network(&ctx, "a1", &req).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.spec.as_ref(), Some(&spec));

    // Tasks of the allocation join the network.
    let mut config = task("t1", MockTaskConfig::default());
    config.network_isolation = Some(spec.clone());
    h.client.start_task(&ctx, &config).await.unwrap();
    let status = h.client.inspect_task(&ctx, "t1").await.unwrap();
    assert_eq!(status.driver_attributes["netns"], spec.path);

    h.client
        .destroy_network(&ctx, "a1", Some(&spec))
        .await
        .unwrap();
    assert!(h.driver.network("a1").await.is_none());

    // Nothing was created, nothing to tear down.
    h.client.destroy_network(&ctx, "a2", None).await.unwrap();
    assert_eq!(h.driver.calls().get("create_network"), 2);
    assert_eq!(h.driver.calls().get("destroy_network"), 1);
}

#[tokio::test]
async fn network_calls_need_must_initiate_network() {
    let h = harness(MockDriverConfig::default()).await;
    let ctx = CancellationToken::new();

    let err = h
        .client
        .create_network(&ctx, "a1", &NetworkCreateRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err, PluginError::Unsupported(Capability::Network));
    let spec = tether_model::NetworkIsolationSpec::group("/var/run/netns/a1");
    let err = h
        .client
        .destroy_network(&ctx, "a1", Some(&spec))
        .await
        .unwrap_err();
    assert_eq!(err, PluginError::Unsupported(Capability::Network));

    assert_eq!(h.driver.calls().get("create_network"), 0);
    assert_eq!(h.driver.calls().get("destroy_network"), 0);
}
