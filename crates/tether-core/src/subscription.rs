use tokio::sync::mpsc;

use crate::PluginError;

/// At most one item is in flight between a producer and its consumer.
pub const SUBSCRIPTION_CAPACITY: usize = 1;

/// Consumer end of a streaming operation.
///
/// A terminal failure arrives as one final `Err` item; `recv() == None` means the
/// producer is done.
pub type Subscription<T> = mpsc::Receiver<Result<T, PluginError>>;

pub type SubscriptionSender<T> = mpsc::Sender<Result<T, PluginError>>;

pub fn subscription<T>() -> (SubscriptionSender<T>, Subscription<T>) {
    mpsc::channel(SUBSCRIPTION_CAPACITY)
}
