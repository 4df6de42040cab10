// src/sources/crtsh.rs
use crate::session::{parse_json, Session};
use crate::sources::{Source, SourceId};
use crate::types::ScoutError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    name_value: String,
}

/// crt.sh certificate transparency search
#[derive(Debug, Clone)]
pub struct CrtShSource {
    base_url: String,
}

impl Default for CrtShSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CrtShSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://crt.sh".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Source for CrtShSource {
    fn id(&self) -> SourceId {
        SourceId::Crtsh
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let query = urlencoding::encode(&format!("%.{}", domain)).into_owned();
        let url = format!("{}/?q={}&output=json", self.base_url, query);

        let body = session.get_text(self.id(), &url).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<CrtShEntry> = parse_json(self.id(), &body)?;

        // name_value holds every SAN of the certificate, newline separated
        Ok(entries
            .iter()
            .flat_map(|entry| entry.name_value.lines())
            .map(|line| line.trim().trim_start_matches("*.").to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}
