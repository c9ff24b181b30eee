//! Process lifecycle: shutdown signals and single-instance detection

mod instance;
mod shutdown;

pub use instance::{probe, InstanceStatus};
pub use shutdown::ShutdownSignal;
