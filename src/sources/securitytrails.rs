// src/sources/securitytrails.rs
use crate::session::{parse_json, Session};
use crate::sources::{pick_api_key, Source, SourceId};
use crate::types::ScoutError;
use async_trait::async_trait;
use log::warn;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SecurityTrailsResponse {
    meta: Option<SecurityTrailsMeta>,
    #[serde(default)]
    subdomains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SecurityTrailsMeta {
    limit_reached: Option<bool>,
}

/// SecurityTrails subdomain listing
#[derive(Debug, Clone)]
pub struct SecurityTrailsSource {
    base_url: String,
    api_keys: Vec<String>,
}

impl Default for SecurityTrailsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityTrailsSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.securitytrails.com".to_string(),
            api_keys: Vec::new(),
        }
    }

    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.api_keys = keys;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Source for SecurityTrailsSource {
    fn id(&self) -> SourceId {
        SourceId::Securitytrails
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let api_key = pick_api_key(&self.api_keys)
            .ok_or_else(|| ScoutError::source_failed(self.id(), "No API key configured"))?;

        let url = format!("{}/v1/domain/{}/subdomains", self.base_url, domain);
        let request = session
            .client
            .get(&url)
            .header("APIKEY", api_key)
            .header("Accept", "application/json");
        let body = session.fetch_text(self.id(), request).await?;

        let response: SecurityTrailsResponse = parse_json(self.id(), &body)?;
        if response.meta.and_then(|m| m.limit_reached).unwrap_or(false) {
            warn!("[{}] result limit reached for {}, listing is truncated", self.id(), domain);
        }

        // The API answers with labels relative to the queried domain.
        Ok(response
            .subdomains
            .into_iter()
            .filter(|label| !label.is_empty())
            .map(|label| format!("{}.{}", label, domain))
            .collect())
    }
}
