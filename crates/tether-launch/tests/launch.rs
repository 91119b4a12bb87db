#![cfg(unix)]

use std::time::{Duration, Instant};

use tether_api::{COOKIE_VALUE, HandshakeError};
use tether_launch::{LaunchConfig, LaunchError, PluginInstance};
use tether_model::PluginType;

fn script(body: &str) -> LaunchConfig {
    LaunchConfig::new("/bin/sh", PluginType::Driver)
        .with_args(["-c", body])
        .with_handshake_timeout(Duration::from_secs(5))
}

async fn launch_err(cfg: LaunchConfig) -> LaunchError {
    match PluginInstance::launch(cfg).await {
        Ok(_) => panic!("launch should fail"),
        Err(e) => e,
    }
}

#[tokio::test]
async fn malformed_handshake_is_fatal() {
    let err = launch_err(script("echo 'listening on 8080'; sleep 30")).await;
    assert!(
        matches!(err, LaunchError::Handshake(HandshakeError::Malformed { .. })),
        "{err}"
    );
}

#[tokio::test]
async fn cookie_reaches_the_plugin() {
    // Echo the cookie as the handshake line so it shows up in the error.
    let err = launch_err(script("echo \"$TETHER_PLUGIN_COOKIE\"; sleep 30")).await;
    match err {
        LaunchError::Handshake(HandshakeError::Malformed { line, .. }) => {
            assert_eq!(line, COOKIE_VALUE)
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn version_mismatch_is_fatal() {
    let err = launch_err(script("echo '9|driver|tcp|127.0.0.1:1'; sleep 30")).await;
    assert!(
        matches!(
            err,
            LaunchError::Handshake(HandshakeError::Version {
                expected: 1,
                got: 9
            })
        ),
        "{err}"
    );
}

#[tokio::test]
async fn plugin_type_mismatch_is_fatal() {
    let err = launch_err(script("echo '1|device|tcp|127.0.0.1:1'; sleep 30")).await;
    assert!(
        matches!(
            err,
            LaunchError::Handshake(HandshakeError::PluginType {
                expected: PluginType::Driver,
                got: PluginType::Device
            })
        ),
        "{err}"
    );
}

#[tokio::test]
async fn unix_socket_network_is_rejected() {
    let err = launch_err(script("echo '1|driver|unix|/tmp/tether.sock'; sleep 30")).await;
    assert!(
        matches!(err, LaunchError::Handshake(HandshakeError::Network(_))),
        "{err}"
    );
}

#[tokio::test]
async fn handshake_timeout() {
    let cfg = script("sleep 30").with_handshake_timeout(Duration::from_millis(200));
    let started = Instant::now();
    let err = launch_err(cfg).await;
    assert!(matches!(err, LaunchError::HandshakeTimeout(_)), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn exit_before_handshake() {
    let err = launch_err(script("echo 'boom' >&2; exit 3")).await;
    match err {
        LaunchError::ExitedEarly { status } => assert!(status.contains('3'), "{status}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_binary() {
    let cfg = LaunchConfig::new("/nonexistent/tether-plugin", PluginType::Driver);
    let err = launch_err(cfg).await;
    assert!(matches!(err, LaunchError::Spawn { .. }), "{err}");
}

#[tokio::test]
async fn connect_failure_is_reported() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = launch_err(script(&format!(
        "echo '1|driver|tcp|127.0.0.1:{port}'; sleep 30"
    )))
    .await;
    assert!(matches!(err, LaunchError::Connect(_)), "{err}");
}
