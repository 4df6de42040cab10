// src/sources/threatminer.rs
use crate::session::Session;
use crate::sources::{Source, SourceId};
use crate::types::ScoutError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ThreatMinerResponse {
    status_code: String,
    #[serde(default)]
    results: Vec<String>,
}

/// ThreatMiner passive DNS subdomain report
#[derive(Debug, Clone)]
pub struct ThreatMinerSource {
    base_url: String,
}

impl Default for ThreatMinerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreatMinerSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.threatminer.org".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Source for ThreatMinerSource {
    fn id(&self) -> SourceId {
        SourceId::Threatminer
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let url = format!("{}/v2/domain.php?q={}&rt=5", self.base_url, domain);
        let response: ThreatMinerResponse = session.get_json(self.id(), &url).await?;

        // 404 in the body means "nothing known", not a failure
        match response.status_code.as_str() {
            "200" => Ok(response.results),
            "404" => Ok(Vec::new()),
            other => Err(ScoutError::source_failed(
                self.id(),
                format!("API returned status_code {}", other),
            )),
        }
    }
}
