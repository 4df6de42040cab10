// src/sources/certspotter.rs
use crate::session::Session;
use crate::sources::{Source, SourceId};
use crate::types::ScoutError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Issuance {
    #[serde(default)]
    dns_names: Vec<String>,
}

/// Cert Spotter issuance API
#[derive(Debug, Clone)]
pub struct CertSpotterSource {
    base_url: String,
}

impl Default for CertSpotterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CertSpotterSource {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.certspotter.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Source for CertSpotterSource {
    fn id(&self) -> SourceId {
        SourceId::Certspotter
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError> {
        let url = format!(
            "{}/v1/issuances?domain={}&include_subdomains=true&expand=dns_names",
            self.base_url, domain
        );

        let issuances: Vec<Issuance> = session.get_json(self.id(), &url).await?;

        let suffix = format!(".{}", domain);
        Ok(issuances
            .into_iter()
            .flat_map(|issuance| issuance.dns_names)
            .map(|name| name.trim_start_matches("*.").to_string())
            .filter(|name| name.ends_with(&suffix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_collects_dns_names() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/issuances")
            .match_query(Matcher::UrlEncoded("domain".into(), "example.com".into()))
            .with_status(200)
            .with_body(r#"[{"dns_names":["*.example.com","api.example.com","example.org"]},{"id":"2"}]"#)
            .create_async()
            .await;

        let session = Session::new(&Config::default()).unwrap();
        let source = CertSpotterSource::new().with_base_url(server.url());
        let names = source.enumerate("example.com", &session).await.unwrap();

        assert_eq!(names, vec!["api.example.com"]);
    }
}
