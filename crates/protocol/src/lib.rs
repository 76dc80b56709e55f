//! Wire contracts between procwatch and the process it supervises.
//!
//! Everything here is a boundary type: the health document served on
//! `GET <base>/health`, the lifecycle endpoints, the push-channel frames and
//! the operator-tunable timeouts on `<base>/config`. Parsing is strict so a
//! malformed body is a precise condition instead of a missing field at use.

pub mod config;
pub mod control;
pub mod frame;
pub mod health;

pub use config::ServiceTimeouts;
pub use control::{LifecycleAck, LifecycleCommand};
pub use frame::{parse_push_frame, FrameError, ProgressEvent, PushFrame, DEFAULT_PROGRESS_TYPE};
pub use health::{HealthError, HealthReport};
