use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use moka::future::Cache;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::devops::DevOpsError;
use crate::observability::api_metrics;

/// Rate-limited HTTP transport for the platform REST API.
///
/// Every request waits on a direct governor quota. Idempotent metadata
/// lookups may opt into a short-lived response cache keyed by URL.
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    client: Client,
    credential: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    cache: Cache<String, Value>,
}

impl RateLimitedHttpClient {
    pub fn new(
        credential: &str,
        rate_limit: &RateLimitConfig,
        timeout: Duration,
    ) -> Result<Self, DevOpsError> {
        let per_second = NonZeroU32::new(rate_limit.requests_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(rate_limit.burst_capacity.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| DevOpsError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        // Process templates and work item type metadata only; 5 minute TTL
        let cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(Duration::from_secs(300))
            .build();

        Ok(Self {
            client,
            credential: credential.to_string(),
            rate_limiter,
            cache,
        })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.authorized(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.authorized(self.client.post(url))
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.authorized(self.client.put(url))
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.authorized(self.client.patch(url))
    }

    /// PATs authenticate as basic auth with an empty user name
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth("", Some(&self.credential))
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, DevOpsError> {
        let body = self.send_raw(request, resource).await?;
        serde_json::from_slice(&body).map_err(|e| DevOpsError::InvalidResponse {
            message: format!("{resource}: {e}"),
        })
    }

    /// Send and discard the response body.
    pub async fn send_unit(&self, request: RequestBuilder, resource: &str) -> Result<(), DevOpsError> {
        self.send_raw(request, resource).await.map(|_| ())
    }

    /// Send and return the raw response bytes.
    pub async fn send_bytes(&self, request: RequestBuilder, resource: &str) -> Result<Vec<u8>, DevOpsError> {
        self.send_raw(request, resource).await
    }

    /// GET with the response cache in front.
    pub async fn get_cached<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T, DevOpsError> {
        if let Some(cached) = self.cache.get(url).await {
            api_metrics().record_cache_hit();
            debug!(url, "Cache hit");
            if let Ok(value) = serde_json::from_value(cached) {
                return Ok(value);
            }
        }
        api_metrics().record_cache_miss();

        let value: Value = self.send_json(self.get(url), resource).await?;
        self.cache.insert(url.to_string(), value.clone()).await;
        serde_json::from_value(value).map_err(|e| DevOpsError::InvalidResponse {
            message: format!("{resource}: {e}"),
        })
    }

    async fn send_raw(&self, request: RequestBuilder, resource: &str) -> Result<Vec<u8>, DevOpsError> {
        // Wait for rate limit permission
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;
        api_metrics().record_request();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                api_metrics().record_error();
                return Err(DevOpsError::from(e));
            }
        };

        let status = response.status();
        let body = response.bytes().await.map_err(DevOpsError::from)?;
        if status.is_success() {
            return Ok(body.to_vec());
        }

        api_metrics().record_error();
        if status.as_u16() == 429 {
            api_metrics().record_throttled();
        }
        let text = String::from_utf8_lossy(&body);
        debug!(status = status.as_u16(), resource, "Platform request failed");
        Err(DevOpsError::from_status(status.as_u16(), resource, &text))
    }
}
