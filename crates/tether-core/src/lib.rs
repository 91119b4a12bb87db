//! Plugin contracts shared by both sides of the transport.
//!
//! The orchestrator talks to [`DriverPlugin`] and [`DevicePlugin`] trait
//! objects without knowing whether they are in-process implementations or
//! transport-backed proxies.

mod error;
pub use error::PluginError;

mod liveness;
pub use liveness::{Joined, Liveness};

mod subscription;
pub use subscription::{SUBSCRIPTION_CAPACITY, Subscription, SubscriptionSender, subscription};

mod driver;
pub use driver::DriverPlugin;

mod device;
pub use device::DevicePlugin;

pub use tokio_util::sync::CancellationToken;

pub mod prelude {
    pub use crate::{
        CancellationToken, DevicePlugin, DriverPlugin, Joined, Liveness, PluginError,
        Subscription, subscription,
    };
}
