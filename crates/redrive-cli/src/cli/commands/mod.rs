//! CLI command handlers, one file per command.

mod clear;
mod daemon;
mod message;
mod process;
mod queue;
mod send;
mod stats;

pub use clear::run_clear;
pub use daemon::run_daemon;
pub use message::run_message;
pub use process::run_process;
pub use queue::run_queue;
pub use send::{run_send, SendArgs};
pub use stats::run_stats;

pub(crate) use send::print_delivery;
