pub mod link;
pub mod protocol;
pub mod transport;

pub use link::{DeviceLink, LinkError, LoopbackLink, Subscription};
pub use protocol::{Command, DecodeError, Notification};
pub use transport::Base64Link;
