//! Turns server-streaming RPCs into [`Subscription`]s.
//!
//! One worker task per subscription pulls wire items, converts them and hands
//! them over a channel of capacity one. The worker always drops its sender on
//! exit, so the consumer sees `None` after the last item or the terminal error.
//! Plugin death is always reported; caller cancellation is best effort.

use std::future::Future;

use futures::{Stream, StreamExt};
use tonic::Status;
use tracing::{debug, trace};

use tether_core::{Joined, PluginError, Subscription, SubscriptionSender, subscription};

use crate::status::{self, ErrorScope};

/// Spawn a worker forwarding `stream` into a new subscription.
///
/// `op` names the operation in logs.
pub fn forward<S, W, T, F>(
    op: &'static str,
    stream: S,
    joined: Joined,
    scope: ErrorScope,
    map: F,
) -> Subscription<T>
where
    S: Stream<Item = Result<W, Status>> + Send + 'static,
    W: Send + 'static,
    T: Send + 'static,
    F: Fn(W) -> Result<T, PluginError> + Send + 'static,
{
    let (tx, rx) = subscription();
    tokio::spawn(run(op, Box::pin(stream), joined, scope, map, tx));
    rx
}

/// Wrap a unary call as a single-item subscription.
pub fn forward_once<Fut, W, T, F>(
    op: &'static str,
    call: Fut,
    joined: Joined,
    scope: ErrorScope,
    map: F,
) -> Subscription<T>
where
    Fut: Future<Output = Result<W, Status>> + Send + 'static,
    W: Send + 'static,
    T: Send + 'static,
    F: Fn(W) -> Result<T, PluginError> + Send + 'static,
{
    forward(op, futures::stream::once(call), joined, scope, map)
}

async fn run<S, W, T, F>(
    op: &'static str,
    mut stream: std::pin::Pin<Box<S>>,
    joined: Joined,
    scope: ErrorScope,
    map: F,
    tx: SubscriptionSender<T>,
) where
    S: Stream<Item = Result<W, Status>> + Send,
    F: Fn(W) -> Result<T, PluginError>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = joined.cancelled() => {
                let reason = joined.reason().unwrap_or(PluginError::Cancelled);
                debug!(target: "tether.stream", op, %reason, "stream cancelled");
                deliver_reason(&tx, reason).await;
                return;
            }
            _ = tx.closed() => {
                trace!(target: "tether.stream", op, "consumer went away");
                return;
            }
            next = stream.next() => next,
        };

        let item = match next {
            None => {
                trace!(target: "tether.stream", op, "end of stream");
                return;
            }
            Some(Err(st)) => Err(status::translate(st, &joined, scope).await),
            Some(Ok(wire)) => map(wire),
        };

        if let Err(err) = item {
            debug!(target: "tether.stream", op, error = %err, "stream failed");
            deliver_terminal(&tx, &joined, err).await;
            return;
        }

        tokio::select! {
            biased;
            _ = joined.cancelled() => {
                let reason = joined.reason().unwrap_or(PluginError::Cancelled);
                trace!(target: "tether.stream", op, %reason, "cancelled during handoff, dropping item");
                deliver_reason(&tx, reason).await;
                return;
            }
            sent = tx.send(item) => {
                if sent.is_err() {
                    trace!(target: "tether.stream", op, "consumer went away");
                    return;
                }
            }
        }
    }
}

async fn deliver_terminal<T>(tx: &SubscriptionSender<T>, joined: &Joined, err: PluginError) {
    tokio::select! {
        biased;
        _ = joined.cancelled() => {
            deliver_reason(tx, joined.reason().unwrap_or(err)).await;
        }
        _ = tx.send(Err(err.clone())) => {}
    }
}

/// Hand over the reason a joined token fired.
///
/// A caller that cancelled may never read again, so `Cancelled` is only
/// offered. `Shutdown` waits for the slot to free up and is abandoned only
/// when the consumer drops the subscription.
async fn deliver_reason<T>(tx: &SubscriptionSender<T>, reason: PluginError) {
    if reason != PluginError::Shutdown {
        let _ = tx.try_send(Err(reason));
        return;
    }
    tokio::select! {
        _ = tx.closed() => {}
        _ = tx.send(Err(reason)) => {}
    }
}
