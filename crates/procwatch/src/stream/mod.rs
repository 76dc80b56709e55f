mod listener;
mod log;

pub use listener::{EventStreamListener, ProgressFeed, StreamState};
pub use log::BoundedLog;
