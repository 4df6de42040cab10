// src/sources/waybackarchive.rs
use crate::session::Session;
use crate::sources::{Source, SourceId};
use crate::types::ScoutError;
use crate::utils::extract_domain_from_url;
use async_trait::async_trait;
use std::collections::HashSet;

/// Wayback Machine CDX index of archived URLs
#[derive(Debug, Clone)]
pub struct WaybackArchiveSource {
    base_url: String,
}

impl Default for WaybackArchiveSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WaybackArchiveSource {
    pub fn new() -> Self {
        Self {
            base_url: "http://web.archive.org".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Source for WaybackArchiveSource {
    fn id(&self) -> SourceId {
        SourceId::Waybackarchive
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let url = format!(
            "{}/cdx/search/cdx?url=*.{}/*&output=txt&fl=original&collapse=urlkey",
            self.base_url, domain
        );
        let text = session.get_text(self.id(), &url).await?;

        let suffix = format!(".{}", domain);
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let archived = if line.contains("://") {
                line.to_string()
            } else {
                format!("http://{}", line)
            };

            // Archived URLs are often mangled; skip what does not parse.
            let Ok(host) = extract_domain_from_url(&archived) else {
                continue;
            };
            let host = host.to_lowercase();
            if host.ends_with(&suffix) && seen.insert(host.clone()) {
                results.push(host);
            }
        }

        Ok(results)
    }
}
