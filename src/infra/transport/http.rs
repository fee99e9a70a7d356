//! reqwest-backed transport posting JSON task payloads.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::DispatcherConfig;
use crate::core::{TaskPayload, TaskTransport, TransportError, TransportResponse};

/// Longest error body kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// HTTP transport with separate connect and whole-request timeouts.
///
/// Sentinel tasks (empty target) are acknowledged locally with status 200 and
/// an empty JSON object.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport with the given timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            connect_timeout,
            read_timeout,
        })
    }

    /// Build a transport from the dispatcher's timeout settings.
    ///
    /// # Errors
    ///
    /// See [`HttpTransport::new`].
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, TransportError> {
        Self::new(config.connect_timeout(), config.read_timeout())
    }

    /// Configured connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Configured whole-request timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[async_trait]
impl TaskTransport for HttpTransport {
    async fn send(
        &self,
        target: &str,
        payload: TaskPayload,
    ) -> Result<TransportResponse, TransportError> {
        if target.is_empty() {
            return Ok(TransportResponse {
                status: 200,
                body: serde_json::json!({}),
            });
        }

        let response = self
            .client
            .post(target)
            .json(&payload)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?
        };
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sentinel_target_skips_network() {
        let transport =
            HttpTransport::new(Duration::from_millis(100), Duration::from_millis(200)).unwrap();
        let response = transport.send("", TaskPayload { tokens: 3 }).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, serde_json::json!({}));
    }

    #[test]
    fn test_from_config_uses_timeouts() {
        let cfg = DispatcherConfig::new(1, 1).with_timeouts_ms(250, 4_000);
        let transport = HttpTransport::from_config(&cfg).unwrap();
        assert_eq!(transport.connect_timeout(), Duration::from_millis(250));
        assert_eq!(transport.read_timeout(), Duration::from_secs(4));
    }
}
