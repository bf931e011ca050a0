//! Notification sync client library.
//!
//! Keeps a reconciled local mirror of a user's notifications, fed by the REST
//! notification store and the websocket live channel.

pub mod api;
pub mod config;
pub mod errors;
pub mod live;
pub mod models;
pub mod session;
pub mod sync;

pub use api::{HttpNotificationApi, NotificationApi};
pub use config::Config;
pub use errors::{ClientError, Result};
pub use session::Session;
pub use sync::{MirrorView, NotificationCenter};
