//! Configuration models for the dispatcher, its buckets and its transport.

pub mod dispatcher;

pub use dispatcher::{DispatcherConfig, ENV_PREFIX};
