// src/sources/virustotal.rs
use crate::session::{parse_json, Session};
use crate::sources::{pick_api_key, Source, SourceId};
use crate::types::ScoutError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VirusTotalResponse {
    #[serde(default)]
    data: Vec<VirusTotalData>,
}

#[derive(Debug, Deserialize)]
struct VirusTotalData {
    id: String,
}

/// VirusTotal v3 subdomain relationship
#[derive(Debug, Clone)]
pub struct VirusTotalSource {
    base_url: String,
    api_keys: Vec<String>,
}

impl Default for VirusTotalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VirusTotalSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.virustotal.com".to_string(),
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
impl Source for VirusTotalSource {
    fn id(&self) -> SourceId {
        SourceId::Virustotal
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let api_key = pick_api_key(&self.api_keys)
            .ok_or_else(|| ScoutError::source_failed(self.id(), "No API key configured"))?;

        let url = format!("{}/api/v3/domains/{}/subdomains?limit=40", self.base_url, domain);
        let request = session.client.get(&url).header("x-apikey", api_key);
        let body = session.fetch_text(self.id(), request).await?;

        let data: VirusTotalResponse = parse_json(self.id(), &body)?;
        Ok(data.data.into_iter().map(|item| item.id).collect())
    }
}
