pub mod center;
pub mod mirror;

pub use center::{MirrorView, NotificationCenter};
pub use mirror::{NotificationMirror, PushOutcome, ReadSnapshot};
