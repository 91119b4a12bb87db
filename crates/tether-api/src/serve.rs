//! Entry points for plugin binaries.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info};

use tether_core::{DevicePlugin, DriverPlugin};
use tether_model::PluginType;

use crate::handshake::{COOKIE_KEY, COOKIE_VALUE, Handshake};
use crate::proto::{
    base_plugin_server::BasePluginServer, device_server::DeviceServer,
    driver_server::DriverServer,
};
use crate::server::{BaseService, DeviceService, DriverService};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(
        "this binary is a tether plugin; it is not meant to be run directly, launch it from a host instead"
    )]
    Cookie,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("grpc server failed: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("server task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    /// Refuse to start unless the host set the plugin cookie.
    pub check_cookie: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            check_cookie: true,
        }
    }
}

/// Running gRPC server for a single plugin.
pub struct Served {
    pub addr: SocketAddr,
    pub plugin_type: PluginType,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl Served {
    pub fn handshake(&self) -> Handshake {
        Handshake::tcp(self.plugin_type, self.addr)
    }

    /// Wait until the server stops.
    pub async fn wait(self) -> Result<(), ServeError> {
        self.handle
            .await
            .map_err(|e| ServeError::Join(e.to_string()))??;
        Ok(())
    }
}

fn incoming(
    listener: TcpListener,
) -> impl futures::Stream<Item = Result<tokio::net::TcpStream, std::io::Error>> {
    futures::stream::unfold(listener, |listener| async move {
        let conn = listener.accept().await.map(|(stream, peer)| {
            debug!(target: "tether.serve", %peer, "host connected");
            stream
        });
        Some((conn, listener))
    })
}

/// Bind and serve a driver until `shutdown` fires. No handshake is printed.
pub async fn spawn_driver<D: DriverPlugin>(
    driver: Arc<D>,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> Result<Served, ServeError> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;

    let router = Server::builder()
        .add_service(BasePluginServer::new(BaseService::for_driver(driver.clone())))
        .add_service(DriverServer::new(DriverService::new(driver)));
    let handle = tokio::spawn(async move {
        router
            .serve_with_incoming_shutdown(incoming(listener), shutdown.cancelled_owned())
            .await
    });

    debug!(target: "tether.serve", %addr, "driver plugin listening");
    Ok(Served {
        addr,
        plugin_type: PluginType::Driver,
        handle,
    })
}

/// Bind and serve a device plugin until `shutdown` fires.
pub async fn spawn_device<D: DevicePlugin>(
    device: Arc<D>,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> Result<Served, ServeError> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;

    let router = Server::builder()
        .add_service(BasePluginServer::new(BaseService::for_device(device.clone())))
        .add_service(DeviceServer::new(DeviceService::new(device)));
    let handle = tokio::spawn(async move {
        router
            .serve_with_incoming_shutdown(incoming(listener), shutdown.cancelled_owned())
            .await
    });

    debug!(target: "tether.serve", %addr, "device plugin listening");
    Ok(Served {
        addr,
        plugin_type: PluginType::Device,
        handle,
    })
}

/// Serve a driver plugin the way a host expects: check the cookie, print the
/// handshake line on stdout, then block until `shutdown` fires.
pub async fn serve_driver<D: DriverPlugin>(
    driver: Arc<D>,
    cfg: ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    check_cookie(&cfg)?;
    let served = spawn_driver(driver, cfg.bind, shutdown).await?;
    announce(&served).await?;
    served.wait().await
}

pub async fn serve_device<D: DevicePlugin>(
    device: Arc<D>,
    cfg: ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    check_cookie(&cfg)?;
    let served = spawn_device(device, cfg.bind, shutdown).await?;
    announce(&served).await?;
    served.wait().await
}

fn check_cookie(cfg: &ServeConfig) -> Result<(), ServeError> {
    if cfg.check_cookie && std::env::var(COOKIE_KEY).as_deref() != Ok(COOKIE_VALUE) {
        return Err(ServeError::Cookie);
    }
    Ok(())
}

async fn announce(served: &Served) -> Result<(), ServeError> {
    let line = served.handshake().to_string();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    info!(target: "tether.serve", handshake = %line, "plugin ready");
    Ok(())
}
