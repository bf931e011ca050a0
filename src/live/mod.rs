pub mod channel;
pub mod types;

pub use channel::{LiveConnection, LiveSubscription};
pub use types::LiveEvent;
