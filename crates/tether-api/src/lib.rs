//! gRPC transport for tether plugins.
//!
//! The host side gets [`DriverPluginClient`] and [`DevicePluginClient`], proxies
//! that implement the `tether-core` traits. The plugin side gets
//! [`DriverService`] / [`DeviceService`] and the [`serve_driver`] /
//! [`serve_device`] entry points.

pub mod proto {
    tonic::include_proto!("tether.v1");
}

mod convert;

mod config;
pub use config::ClientConfig;

pub mod status;
pub mod stream;

mod client;
pub use client::{DevicePluginClient, DriverPluginClient, connect};

mod server;
pub use server::{BaseService, DeviceService, DriverService};

mod handshake;
pub use handshake::{COOKIE_KEY, COOKIE_VALUE, Handshake, HandshakeError, PROTOCOL_VERSION};

mod serve;
pub use serve::{
    ServeConfig, ServeError, Served, serve_device, serve_driver, spawn_device, spawn_driver,
};

pub use proto::base_plugin_server::BasePluginServer;
pub use proto::device_server::DeviceServer;
pub use proto::driver_server::DriverServer;

pub use tonic;
