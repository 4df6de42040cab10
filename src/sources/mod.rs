// src/sources/mod.rs
use crate::session::Session;
use crate::types::{Config, ScoutError, SourceInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod bing;
mod certspotter;
mod crtsh;
mod hackertarget;
mod securitytrails;
mod threatminer;
mod virustotal;
mod waybackarchive;

pub use bing::BingSource;
pub use certspotter::CertSpotterSource;
pub use crtsh::CrtShSource;
pub use hackertarget::HackerTargetSource;
pub use securitytrails::SecurityTrailsSource;
pub use threatminer::ThreatMinerSource;
pub use virustotal::VirusTotalSource;
pub use waybackarchive::WaybackArchiveSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Bing,
    Certspotter,
    Crtsh,
    Hackertarget,
    Securitytrails,
    Threatminer,
    Virustotal,
    Waybackarchive,
}

impl SourceId {
    pub const ALL: [SourceId; 8] = [
        SourceId::Bing,
        SourceId::Certspotter,
        SourceId::Crtsh,
        SourceId::Hackertarget,
        SourceId::Securitytrails,
        SourceId::Threatminer,
        SourceId::Virustotal,
        SourceId::Waybackarchive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Bing => "bing",
            SourceId::Certspotter => "certspotter",
            SourceId::Crtsh => "crtsh",
            SourceId::Hackertarget => "hackertarget",
            SourceId::Securitytrails => "securitytrails",
            SourceId::Threatminer => "threatminer",
            SourceId::Virustotal => "virustotal",
            SourceId::Waybackarchive => "waybackarchive",
        }
    }

    pub fn needs_key(&self) -> bool {
        matches!(self, SourceId::Securitytrails | SourceId::Virustotal)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| ScoutError::ConfigError(format!("Unknown source: {}", s.trim())))
    }
}

/// Which sources an enumeration should query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceSelection {
    #[default]
    All,
    Only(BTreeSet<SourceId>),
}

impl SourceSelection {
    /// Parses `all` or a comma separated list of source names.
    pub fn parse(spec: &str) -> Result<Self, ScoutError> {
        if spec.trim().eq_ignore_ascii_case("all") {
            return Ok(SourceSelection::All);
        }
        let ids = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SourceId::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(SourceSelection::Only(ids))
    }

    pub fn contains(&self, id: SourceId) -> bool {
        match self {
            SourceSelection::All => true,
            SourceSelection::Only(ids) => ids.contains(&id),
        }
    }

    pub fn without(self, excluded: &BTreeSet<SourceId>) -> Self {
        if excluded.is_empty() {
            return self;
        }
        let remaining = match self {
            SourceSelection::All => SourceId::ALL.into_iter().collect::<BTreeSet<_>>(),
            SourceSelection::Only(ids) => ids,
        };
        SourceSelection::Only(remaining.difference(excluded).copied().collect())
    }
}

/// A passive data provider.
///
/// Implementations return `Ok` with an empty list when the provider simply knows
/// nothing about the domain, and `Err` only for hard failures.
#[async_trait]
pub trait Source: Send + Sync {
    fn id(&self) -> SourceId;

    fn name(&self) -> &str {
        self.id().as_str()
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            id: self.id(),
            needs_key: self.id().needs_key(),
        }
    }

    async fn enumerate(&self, domain: &str, session: &Session) -> Result<Vec<String>, ScoutError>;
}

/// Maps source identifiers to their implementations.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in source, configured with the API keys in `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for id in SourceId::ALL {
            registry.register(create_source(id, config));
        }
        registry
    }

    pub fn register(&mut self, source: Arc<dyn Source>) -> &mut Self {
        self.sources.insert(source.id(), source);
        self
    }

    pub fn select(&self, selection: &SourceSelection) -> Vec<Arc<dyn Source>> {
        self.sources
            .iter()
            .filter(|(id, _)| selection.contains(**id))
            .map(|(_, source)| Arc::clone(source))
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    pub fn infos(&self) -> Vec<SourceInfo> {
        self.sources.values().map(|s| s.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub fn create_source(id: SourceId, config: &Config) -> Arc<dyn Source> {
    let api_keys = config.api_keys.get(id.as_str()).cloned().unwrap_or_default();

    match id {
        SourceId::Bing => Arc::new(BingSource::new()),
        SourceId::Certspotter => Arc::new(CertSpotterSource::new()),
        SourceId::Crtsh => Arc::new(CrtShSource::new()),
        SourceId::Hackertarget => Arc::new(HackerTargetSource::new()),
        SourceId::Securitytrails => Arc::new(SecurityTrailsSource::new().with_api_keys(api_keys)),
        SourceId::Threatminer => Arc::new(ThreatMinerSource::new()),
        SourceId::Virustotal => Arc::new(VirusTotalSource::new().with_api_keys(api_keys)),
        SourceId::Waybackarchive => Arc::new(WaybackArchiveSource::new()),
    }
}

pub(crate) fn pick_api_key(keys: &[String]) -> Option<&String> {
    use rand::seq::SliceRandom;
    keys.choose(&mut rand::thread_rng())
}
