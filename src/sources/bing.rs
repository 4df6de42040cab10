// src/sources/bing.rs
use crate::session::Session;
use crate::sources::{Source, SourceId};
use crate::types::ScoutError;
use crate::utils::extract_subdomains_from_text;
use async_trait::async_trait;
use log::debug;
use std::collections::HashSet;

const RESULTS_PER_PAGE: usize = 10;

/// Bing web search scraping with a `domain:` operator
#[derive(Debug, Clone)]
pub struct BingSource {
    base_url: String,
    max_pages: usize,
}

impl Default for BingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BingSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.bing.com".to_string(),
            max_pages: 5,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

#[async_trait]
impl Source for BingSource {
    fn id(&self) -> SourceId {
        SourceId::Bing
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut query = format!("domain:{}", domain);

        for page in 0..self.max_pages {
            let url = format!(
                "{}/search?q={}&first={}",
                self.base_url,
                urlencoding::encode(&query),
                page * RESULTS_PER_PAGE + 1
            );
            let html = session.get_text(self.id(), &url).await?;

            let found = extract_subdomains_from_text(&html, domain)?;
            let new: Vec<String> = found.into_iter().filter(|s| seen.insert(s.clone())).collect();
            if new.is_empty() {
                debug!("[{}] page {} added nothing, stopping", self.id(), page);
                break;
            }

            // Exclude what is already known so later pages surface new hosts.
            for name in &new {
                if let Some(label) = name.strip_suffix(&format!(".{}", domain)) {
                    query.push_str(&format!(" -domain:{}.{}", label, domain));
                }
            }
            results.extend(new);
        }

        results.sort();
        Ok(results)
    }
}
