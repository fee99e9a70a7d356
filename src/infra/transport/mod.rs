//! Transport backends.

pub mod http;

pub use http::HttpTransport;
