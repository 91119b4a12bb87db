//! Plugin-side gRPC services delegating to a [`DriverPlugin`] or
//! [`DevicePlugin`] implementation.
//!
//! [`DriverPlugin`]: tether_core::DriverPlugin
//! [`DevicePlugin`]: tether_core::DevicePlugin

mod base;
mod device;
mod driver;

pub use base::BaseService;
pub use device::DeviceService;
pub use driver::DriverService;

use std::pin::Pin;

use futures::Stream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::Status;

use tether_core::{PluginError, Subscription};

use crate::status::to_status;

pub type ResponseStream<W> = Pin<Box<dyn Stream<Item = Result<W, Status>> + Send + 'static>>;

/// Token handed to the implementation for one RPC.
///
/// It fires when the guard is dropped, i.e. when tonic drops the handler future
/// or the response stream because the client went away.
pub(crate) fn request_ctx() -> (CancellationToken, DropGuard) {
    let ctx = CancellationToken::new();
    let guard = ctx.clone().drop_guard();
    (ctx, guard)
}

/// Serve a subscription as a response stream, keeping the request context alive
/// for as long as the client keeps reading.
pub(crate) fn respond<T, W>(sub: Subscription<T>, guard: DropGuard) -> ResponseStream<W>
where
    T: Send + 'static,
    W: From<T> + Send + 'static,
{
    Box::pin(futures::stream::unfold(
        (sub, guard),
        |(mut sub, guard)| async move {
            let item = sub.recv().await?;
            Some((item.map(W::from).map_err(to_status), (sub, guard)))
        },
    ))
}

pub(crate) fn require_id(task_id: &str, what: &str) -> Result<(), Status> {
    if task_id.trim().is_empty() {
        return Err(to_status(PluginError::InvalidMessage(format!(
            "{what} cannot be empty"
        ))));
    }
    Ok(())
}
