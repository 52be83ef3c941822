//! The poller: watches a repository's update-time snapshot and reports
//! what changed since the last tick.

#![forbid(unsafe_code)]

pub mod consumer;
pub mod delta;
pub mod error;
pub mod poller;
pub mod registration;

pub use consumer::PollConsumer;
pub use delta::{compute_delta, PollDelta};
pub use error::PollError;
pub use poller::{tick, Poller};
pub use registration::Registration;
