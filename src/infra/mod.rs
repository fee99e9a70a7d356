//! Infrastructure adapters: outbound transports and per-client bucket storage.

pub mod registry;
pub mod transport;

pub use registry::BucketRegistry;
pub use transport::HttpTransport;
