//! # Messaging Module
//!
//! Wire-level pieces shared by producers, workers and subworkers: the call
//! envelope codec, subworker status reports and the ZeroMQ bus wrappers.

pub mod bus;
pub mod envelope;
pub mod status;

pub use bus::{poll_readable, Bus, PullSocket, PushSocket};
pub use envelope::{Args, CallEnvelope, Kwargs};
pub use status::{ParsedStatus, StatusReport};
