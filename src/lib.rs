//! # Prometheus Dispatcher
//!
//! A rate-limited priority dispatcher for outbound AI workloads.
//!
//! Pending HTTP tasks carry a priority and a token cost. They wait in a
//! binary max-heap and are released to their downstream target no faster
//! than two independent quota pools allow: a number of dispatches per cycle
//! (request rate) and a cumulative token cost per cycle (token rate). Both
//! pools refill on fixed, drift-free boundaries, typically every 60 seconds.
//!
//! ## Dispatch cycle
//!
//! 1. Peek the highest-priority task; return idle if the queue is empty.
//! 2. Start the bucket clocks on first use and apply any due refills.
//! 3. If a pool is short, suspend until it refills plus a clock-skew margin.
//!    When both are short, wait for the later of the two refills.
//! 4. Send the task through the [`core::TaskTransport`].
//! 5. On success charge one request and the task's tokens, then remove it.
//!    On failure leave queue and buckets untouched and report the error.
//!
//! Only one send is ever in flight per dispatcher. Waits and sends race a
//! shutdown token, so cancellation never leaves a partial charge behind.
//!
//! ```rust,ignore
//! use prometheus_dispatcher::builders::DispatcherBuilder;
//! use prometheus_dispatcher::config::DispatcherConfig;
//! use prometheus_dispatcher::core::PendingTask;
//!
//! let dispatcher = DispatcherBuilder::new("openai", DispatcherConfig::new(60, 90_000))
//!     .build_http()?;
//! dispatcher.submit(PendingTask::new(3, "http://localhost:8000/post", 4, 4)?)?;
//! let stats = dispatcher.drain().await?;
//! ```
//!
//! For complete scenarios, see `tests/dispatcher_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core dispatch abstractions and quota accounting.
pub mod core;
/// Configuration models for quotas, cycles, and timeouts.
pub mod config;
/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Infrastructure adapters for transports and per-client buckets.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
