// src/types.rs
use crate::sources::{SourceId, SourceSelection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound for a single source query.
    pub timeout: Duration,
    /// Upper bound for a whole run; partial results are kept when it expires.
    pub max_time: Option<Duration>,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub rate_limits: HashMap<String, Option<u32>>,
    pub api_keys: HashMap<String, Vec<String>>,
    pub output: OutputConfig,
    pub resolver: ResolverConfig,
    pub sources: SourceSelection,
    pub excluded_sources: BTreeSet<SourceId>,
    pub recursion_concurrency: usize,
    /// Keep names that are not subdomains of the enumerated root.
    pub keep_out_of_scope: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        rate_limits.insert("virustotal".to_string(), Some(4));
        rate_limits.insert("securitytrails".to_string(), Some(1));
        rate_limits.insert("threatminer".to_string(), Some(1));
        rate_limits.insert("bing".to_string(), Some(2));

        Self {
            timeout: Duration::from_secs(30),
            max_time: None,
            user_agent: format!("subscout/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
            rate_limits,
            api_keys: HashMap::new(),
            output: OutputConfig::default(),
            resolver: ResolverConfig::default(),
            sources: SourceSelection::All,
            excluded_sources: BTreeSet::new(),
            recursion_concurrency: 4,
            keep_out_of_scope: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Aggregate file covering every root domain of the run.
    pub file: Option<PathBuf>,
    /// Directory receiving one file per root domain.
    pub directory: Option<PathBuf>,
    pub verbose: bool,
    pub silent: bool,
    pub include_ips: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            directory: None,
            verbose: false,
            silent: false,
            include_ips: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    /// `{"host": "ip"}` map consumed by aquatone-style tooling.
    Aquatone,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json | OutputFormat::Aquatone => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub threads: usize,
    pub timeout: Duration,
    pub nameservers: Vec<String>,
    pub use_system_resolver: bool,
    /// Let names that do not resolve through validation.
    pub keep_unresolved: bool,
    pub wildcard_probes: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threads: 50,
            timeout: Duration::from_secs(5),
            nameservers: vec![
                "8.8.8.8:53".to_string(),
                "8.8.4.4:53".to_string(),
                "1.1.1.1:53".to_string(),
                "1.0.0.1:53".to_string(),
            ],
            use_system_resolver: false,
            keep_unresolved: false,
            wildcard_probes: 3,
        }
    }
}

/// One orchestration call against one root domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationRequest {
    pub root_domain: String,
    pub enabled_sources: SourceSelection,
    pub recursive: bool,
    pub confirm_live: bool,
}

impl EnumerationRequest {
    pub fn new(root_domain: impl Into<String>, enabled_sources: SourceSelection) -> Self {
        Self {
            root_domain: root_domain.into(),
            enabled_sources,
            recursive: false,
            confirm_live: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn confirm_live(mut self, confirm_live: bool) -> Self {
        self.confirm_live = confirm_live;
        self
    }
}

/// What a single source produced for a single request.
#[derive(Debug)]
pub struct SourceResult {
    pub source: SourceId,
    pub names: Vec<String>,
    pub error: Option<ScoutError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardProfile {
    pub is_wildcard: bool,
    pub wildcard_addresses: BTreeSet<IpAddr>,
}

impl WildcardProfile {
    pub fn none() -> Self {
        Self::default()
    }

    /// A non-empty address set entirely covered by the wildcard answers.
    pub fn is_wildcard_answer(&self, addresses: &BTreeSet<IpAddr>) -> bool {
        self.is_wildcard && !addresses.is_empty() && addresses.is_subset(&self.wildcard_addresses)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedResult {
    pub hostname: String,
    pub source: Option<SourceId>,
    pub addresses: BTreeSet<IpAddr>,
}

impl ValidatedResult {
    pub fn resolved(&self) -> bool {
        !self.addresses.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationStats {
    pub total_found: usize,
    pub unique_subdomains: usize,
    pub resolved_count: usize,
    pub sources_used: Vec<String>,
    pub source_errors: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: String,
    pub results: Vec<ValidatedResult>,
    pub stats: EnumerationStats,
    pub timestamp: String,
}

impl DomainReport {
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.hostname.as_str())
    }
}

pub struct SourceInfo {
    pub id: SourceId,
    pub needs_key: bool,
}

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source error in {source_name}: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Resolution error: {0}")]
    ResolutionError(String),

    #[error("Input error: {0}")]
    InputError(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),
}

impl ScoutError {
    pub fn source_failed(source: SourceId, message: impl Into<String>) -> Self {
        ScoutError::SourceError {
            source_name: source.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(addrs: &[&str]) -> BTreeSet<IpAddr> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_wildcard_subset_policy() {
        let profile = WildcardProfile {
            is_wildcard: true,
            wildcard_addresses: set(&["1.2.3.4"]),
        };

        assert!(profile.is_wildcard_answer(&set(&["1.2.3.4"])));
        assert!(!profile.is_wildcard_answer(&set(&["1.2.3.4", "5.6.7.8"])));
        assert!(!profile.is_wildcard_answer(&set(&[])));
    }

    #[test]
    fn test_non_wildcard_profile_never_matches() {
        let profile = WildcardProfile {
            is_wildcard: false,
            wildcard_addresses: set(&["1.2.3.4"]),
        };
        assert!(!profile.is_wildcard_answer(&set(&["1.2.3.4"])));
    }
}
