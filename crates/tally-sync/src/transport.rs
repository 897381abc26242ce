//! # Sync Transport
//!
//! HTTP client for the three sync endpoints.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HttpTransport                                    │
//! │                                                                         │
//! │   health()      GET  /health       (health timeout, 5s default)        │
//! │   push_batch()  POST /sync/batch   (request timeout, 30s default)      │
//! │   pull()        GET  /sync/pull    (request timeout, 30s default)      │
//! │                                                                         │
//! │   Response handling:                                                   │
//! │   ──────────────────                                                   │
//! │   401                 ──► SyncError::Unauthorized                      │
//! │   other non-2xx       ──► SyncError::ServerRejected { status, body }   │
//! │   2xx, success=false  ──► SyncError::ServerRejected { 200, message }   │
//! │   2xx, success=true   ──► envelope.data                                │
//! │   elapsed             ──► SyncError::Timeout(secs)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ServerSettings, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{ApiEnvelope, BatchAck, BatchRequest, PullData, PullQuery};

// =============================================================================
// Transport Trait
// =============================================================================

/// The server side of a sync cycle.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Liveness probe. `Ok(())` on any 2xx.
    async fn health(&self) -> SyncResult<()>;

    /// Uploads a batch of dirty records.
    async fn push_batch(&self, request: &BatchRequest) -> SyncResult<BatchAck>;

    /// Fetches records changed since `query.last_sync`.
    async fn pull(&self, query: &PullQuery) -> SyncResult<PullData>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// [`SyncTransport`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    server: ServerSettings,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Builds a transport from the loaded configuration.
    ///
    /// ## Returns
    /// * `Err(SyncError::InvalidUrl)` - `server.base_url` does not parse
    /// * `Err(SyncError::Network)` - The HTTP client could not be built
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        // Fail at construction rather than on the first tick.
        config.server.endpoint(&config.server.health_path)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpTransport {
            client,
            server: config.server.clone(),
            health_timeout: config.sync.health_timeout(),
            request_timeout: config.sync.request_timeout(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.server.api_token {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    async fn send(&self, request: RequestBuilder, timeout: Duration) -> SyncResult<Response> {
        self.authorize(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn health(&self) -> SyncResult<()> {
        let url = self.server.endpoint(&self.server.health_path)?;
        let response = self
            .send(self.client.get(url), self.health_timeout)
            .await?;

        check_status(response).await.map(|_| ())
    }

    async fn push_batch(&self, request: &BatchRequest) -> SyncResult<BatchAck> {
        let url = self.server.endpoint(&self.server.batch_path)?;
        debug!(
            %url,
            records = request.record_count(),
            device_id = %request.device_id,
            "Pushing batch"
        );

        let response = self
            .send(self.client.post(url).json(request), self.request_timeout)
            .await?;

        let envelope: ApiEnvelope<BatchAck> = read_envelope(response, self.request_timeout).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn pull(&self, query: &PullQuery) -> SyncResult<PullData> {
        let url = self.server.endpoint(&self.server.pull_path)?;
        debug!(%url, last_sync = query.last_sync, tables = %query.tables_param(), "Pulling updates");

        let response = self
            .send(self.client.get(url).query(&query.to_pairs()), self.request_timeout)
            .await?;

        let envelope: ApiEnvelope<PullData> = read_envelope(response, self.request_timeout).await?;
        envelope
            .data
            .ok_or_else(|| SyncError::InvalidResponse("pull response has no data".into()))
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

fn map_send_error(err: reqwest::Error, timeout: Duration) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout(timeout.as_secs())
    } else {
        SyncError::from(err)
    }
}

/// Turns 401 and other non-2xx statuses into errors.
async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        warn!("Sync server rejected credentials");
        return Err(SyncError::Unauthorized);
    }

    let message = response.text().await.unwrap_or_default();
    Err(SyncError::ServerRejected {
        status: status.as_u16(),
        message,
    })
}

async fn read_envelope<T: DeserializeOwned>(
    response: Response,
    timeout: Duration,
) -> SyncResult<ApiEnvelope<T>> {
    let response = check_status(response).await?;
    let status = response.status().as_u16();

    let body = response
        .text()
        .await
        .map_err(|e| map_send_error(e, timeout))?;
    let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;

    if !envelope.success {
        return Err(SyncError::ServerRejected {
            status,
            message: envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
        });
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_rejects_bad_url() {
        let mut config = SyncConfig::default();
        config.server.base_url = "not a url".into();
        let err = HttpTransport::from_config(&config).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_from_config_copies_timeouts() {
        let mut config = SyncConfig::default();
        config.sync.health_timeout_secs = 2;
        config.sync.request_timeout_secs = 9;

        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.health_timeout, Duration::from_secs(2));
        assert_eq!(transport.request_timeout, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let mut config = SyncConfig::default();
        // Port 9 (discard) on loopback is closed in test sandboxes.
        config.server.base_url = "http://127.0.0.1:9/api".into();
        config.sync.health_timeout_secs = 1;

        let transport = HttpTransport::from_config(&config).unwrap();
        let err = transport.health().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
