//! Dispatcher configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

const fn default_cycle_secs() -> u64 {
    60
}

const fn default_safety_margin_ms() -> u64 {
    10_000
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_read_timeout_ms() -> u64 {
    60_000
}

const fn default_idle_poll_ms() -> u64 {
    1_000
}

/// Prefix of the environment variables read by [`DispatcherConfig::from_env`].
pub const ENV_PREFIX: &str = "DISPATCH_";

/// Quota, timing and transport settings for one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Dispatches allowed per request cycle.
    pub request_capacity: u32,
    /// Token cost allowed per token cycle.
    pub token_capacity: u32,
    /// Cycle length shared by both pools, in seconds.
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,
    /// Request-pool cycle override, in seconds.
    #[serde(default)]
    pub request_cycle_secs: Option<u64>,
    /// Token-pool cycle override, in seconds.
    #[serde(default)]
    pub token_cycle_secs: Option<u64>,
    /// Extra delay added to every quota wait to absorb clock skew.
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
    /// Transport connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Transport timeout for the whole request, including the body.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Sleep between idle polls when no submission wakes the loop.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Lower a task's priority by one after this many consecutive failures.
    #[serde(default)]
    pub demote_after_failures: Option<u32>,
}

impl DispatcherConfig {
    /// Config with the given capacities and defaults everywhere else.
    #[must_use]
    pub const fn new(request_capacity: u32, token_capacity: u32) -> Self {
        Self {
            request_capacity,
            token_capacity,
            cycle_secs: default_cycle_secs(),
            request_cycle_secs: None,
            token_cycle_secs: None,
            safety_margin_ms: default_safety_margin_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            demote_after_failures: None,
        }
    }

    /// Set the shared cycle length.
    #[must_use]
    pub const fn with_cycle_secs(mut self, secs: u64) -> Self {
        self.cycle_secs = secs;
        self
    }

    /// Give each pool its own cycle length.
    #[must_use]
    pub const fn with_pool_cycles(mut self, request_secs: u64, token_secs: u64) -> Self {
        self.request_cycle_secs = Some(request_secs);
        self.token_cycle_secs = Some(token_secs);
        self
    }

    /// Set the clock-skew safety margin.
    #[must_use]
    pub const fn with_safety_margin_ms(mut self, ms: u64) -> Self {
        self.safety_margin_ms = ms;
        self
    }

    /// Set transport connect and read timeouts.
    #[must_use]
    pub const fn with_timeouts_ms(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }

    /// Enable priority demotion after `failures` consecutive failures.
    #[must_use]
    pub const fn with_demote_after_failures(mut self, failures: u32) -> Self {
        self.demote_after_failures = Some(failures);
        self
    }

    /// Effective request-pool cycle.
    #[must_use]
    pub fn request_cycle(&self) -> Duration {
        Duration::from_secs(self.request_cycle_secs.unwrap_or(self.cycle_secs))
    }

    /// Effective token-pool cycle.
    #[must_use]
    pub fn token_cycle(&self) -> Duration {
        Duration::from_secs(self.token_cycle_secs.unwrap_or(self.cycle_secs))
    }

    /// Clock-skew margin as a duration.
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    /// Connect timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a duration.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Idle poll interval as a duration.
    #[must_use]
    pub const fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_capacity == 0 {
            return Err("request_capacity must be greater than 0".into());
        }
        if self.token_capacity == 0 {
            return Err("token_capacity must be greater than 0".into());
        }
        if self.cycle_secs == 0 {
            return Err("cycle_secs must be greater than 0".into());
        }
        if self.request_cycle_secs == Some(0) {
            return Err("request_cycle_secs must be greater than 0".into());
        }
        if self.token_cycle_secs == Some(0) {
            return Err("token_cycle_secs must be greater than 0".into());
        }
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be greater than 0".into());
        }
        if self.read_timeout_ms < self.connect_timeout_ms {
            return Err("read_timeout_ms must not be shorter than connect_timeout_ms".into());
        }
        if self.idle_poll_ms == 0 {
            return Err("idle_poll_ms must be greater than 0".into());
        }
        if self.demote_after_failures == Some(0) {
            return Err("demote_after_failures must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a message on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `DISPATCH_*` environment variables, reading a
    /// `.env` file first when one exists.
    ///
    /// `DISPATCH_REQUEST_CAPACITY` and `DISPATCH_TOKEN_CAPACITY` are required;
    /// every other field falls back to its default.
    ///
    /// # Errors
    ///
    /// Fails when a `.env` file exists but cannot be read or parsed, a
    /// required variable is missing, a value does not parse, or validation
    /// rejects the result.
    pub fn from_env() -> AppResult<Self> {
        accept_missing_dotenv(dotenvy::dotenv().map(drop))?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup using the
    /// `DISPATCH_*` names.
    ///
    /// # Errors
    ///
    /// Same as [`DispatcherConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let parse_u64 = |name: &str| -> AppResult<Option<u64>> {
            read(name)
                .map(|raw| {
                    raw.trim().parse::<u64>().with_context(|| {
                        format!("{ENV_PREFIX}{name} must be an integer, got `{raw}`")
                    })
                })
                .transpose()
        };
        let parse_u32 = |name: &str| -> AppResult<Option<u32>> {
            parse_u64(name)?
                .map(|v| {
                    u32::try_from(v).with_context(|| format!("{ENV_PREFIX}{name} out of range"))
                })
                .transpose()
        };

        let request_capacity = parse_u32("REQUEST_CAPACITY")?
            .with_context(|| format!("{ENV_PREFIX}REQUEST_CAPACITY is required"))?;
        let token_capacity = parse_u32("TOKEN_CAPACITY")?
            .with_context(|| format!("{ENV_PREFIX}TOKEN_CAPACITY is required"))?;

        let mut cfg = Self::new(request_capacity, token_capacity);
        if let Some(v) = parse_u64("CYCLE_SECS")? {
            cfg.cycle_secs = v;
        }
        cfg.request_cycle_secs = parse_u64("REQUEST_CYCLE_SECS")?;
        cfg.token_cycle_secs = parse_u64("TOKEN_CYCLE_SECS")?;
        if let Some(v) = parse_u64("SAFETY_MARGIN_MS")? {
            cfg.safety_margin_ms = v;
        }
        if let Some(v) = parse_u64("CONNECT_TIMEOUT_MS")? {
            cfg.connect_timeout_ms = v;
        }
        if let Some(v) = parse_u64("READ_TIMEOUT_MS")? {
            cfg.read_timeout_ms = v;
        }
        if let Some(v) = parse_u64("IDLE_POLL_MS")? {
            cfg.idle_poll_ms = v;
        }
        cfg.demote_after_failures = parse_u32("DEMOTE_AFTER_FAILURES")?;

        cfg.validate()
            .map_err(|e| anyhow::anyhow!("dispatcher config invalid: {e}"))?;
        Ok(cfg)
    }
}

/// A missing `.env` file is fine; a broken one is not.
fn accept_missing_dotenv(loaded: Result<(), dotenvy::Error>) -> AppResult<()> {
    match loaded {
        Err(err) if !err.not_found() => {
            Err(anyhow::Error::new(err).context("failed to load .env file"))
        }
        _ => Ok(()),
    }
}
