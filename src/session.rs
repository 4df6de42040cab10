// src/session.rs
use crate::sources::SourceId;
use crate::types::{Config, ScoutError};
use governor::{Jitter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP client plus per-source rate limiters.
#[derive(Clone)]
pub struct Session {
    pub client: Client,
    rate_limiters: Arc<HashMap<String, Arc<governor::DefaultDirectRateLimiter>>>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self, ScoutError> {
        let mut client_builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ScoutError::ConfigError(format!("Invalid proxy URL: {}", e)))?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder
            .build()
            .map_err(|e| ScoutError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let mut rate_limiters = HashMap::new();
        for (source, rate_limit) in &config.rate_limits {
            if let Some(limit) = rate_limit.and_then(NonZeroU32::new) {
                let quota = Quota::per_second(limit).allow_burst(NonZeroU32::MIN);
                rate_limiters.insert(source.clone(), Arc::new(RateLimiter::direct(quota)));
            }
        }

        Ok(Session {
            client,
            rate_limiters: Arc::new(rate_limiters),
        })
    }

    pub async fn wait_for_rate_limit(&self, source: SourceId) {
        if let Some(limiter) = self.rate_limiters.get(source.as_str()) {
            limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }
    }

    /// Sends `request` on behalf of `source` and returns the body of a successful response.
    pub async fn fetch_text(&self, source: SourceId, request: RequestBuilder) -> Result<String, ScoutError> {
        self.wait_for_rate_limit(source).await;

        let response = request
            .send()
            .await
            .map_err(|e| ScoutError::source_failed(source, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ScoutError::source_failed(
                source,
                format!("API returned status: {}", response.status()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| ScoutError::NetworkError(e.to_string()))
    }

    pub async fn get_text(&self, source: SourceId, url: &str) -> Result<String, ScoutError> {
        self.fetch_text(source, self.client.get(url)).await
    }

    pub async fn get_json<T>(&self, source: SourceId, url: &str) -> Result<T, ScoutError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.get_text(source, url).await?;
        parse_json(source, &body)
    }
}

pub(crate) fn parse_json<T>(source: SourceId, body: &str) -> Result<T, ScoutError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(body)
        .map_err(|e| ScoutError::source_failed(source, format!("Failed to parse JSON: {}", e)))
}
