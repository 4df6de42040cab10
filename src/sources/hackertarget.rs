// src/sources/hackertarget.rs
use crate::session::Session;
use crate::sources::{Source, SourceId};
use crate::types::ScoutError;
use async_trait::async_trait;

/// HackerTarget host search
#[derive(Debug, Clone)]
pub struct HackerTargetSource {
    base_url: String,
}

impl Default for HackerTargetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HackerTargetSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.hackertarget.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Source for HackerTargetSource {
    fn id(&self) -> SourceId {
        SourceId::Hackertarget
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let url = format!("{}/hostsearch/?q={}", self.base_url, domain);
        let text = session.get_text(self.id(), &url).await?;

        let trimmed = text.trim();
        if trimmed.starts_with("API count exceeded") {
            return Err(ScoutError::source_failed(self.id(), trimmed));
        }

        let mut results = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("error") {
                continue;
            }

            // host,ip
            if let Some(host) = line.split(',').next() {
                let host = host.trim();
                if !host.is_empty() {
                    results.push(host.to_string());
                }
            }
        }
        Ok(results)
    }
}
