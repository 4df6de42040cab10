// src/resolver.rs
use crate::dedupe::CandidateSet;
use crate::types::{ResolverConfig, ScoutError, ValidatedResult, WildcardProfile};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig as DnsResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Resolve a name to its addresses.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ScoutError>;
}

pub struct Resolver {
    resolver: TokioAsyncResolver,
}

impl Resolver {
    pub fn new(config: &ResolverConfig) -> Result<Self, ScoutError> {
        let resolver = if config.use_system_resolver {
            TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| ScoutError::ResolutionError(format!("Failed to create system resolver: {}", e)))?
        } else {
            let mut resolver_config = DnsResolverConfig::new();

            for ns in &config.nameservers {
                resolver_config.add_name_server(NameServerConfig {
                    socket_addr: parse_nameserver(ns)?,
                    protocol: Protocol::Udp,
                    tls_dns_name: None,
                    trust_negative_responses: false,
                    bind_addr: None,
                });
            }

            let mut opts = ResolverOpts::default();
            opts.timeout = config.timeout;
            opts.attempts = 2;

            TokioAsyncResolver::tokio(resolver_config, opts)
        };

        Ok(Self { resolver })
    }
}

#[async_trait]
impl Lookup for Resolver {
    async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ScoutError> {
        self.resolver
            .lookup_ip(hostname)
            .await
            .map(|lookup| lookup.iter().collect())
            .map_err(|e| ScoutError::ResolutionError(format!("Failed to resolve {}: {}", hostname, e)))
    }
}

/// Accepts `ip` or `ip:port`; the port defaults to 53.
pub fn parse_nameserver(ns: &str) -> Result<SocketAddr, ScoutError> {
    let ns = ns.trim();
    if let Ok(addr) = SocketAddr::from_str(ns) {
        return Ok(addr);
    }
    IpAddr::from_str(ns)
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|e| ScoutError::ConfigError(format!("Invalid nameserver address {}: {}", ns, e)))
}

/// Resolve a name, folding every failure into "no addresses".
pub async fn resolve_addresses(lookup: &dyn Lookup, hostname: &str) -> BTreeSet<IpAddr> {
    match lookup.lookup(hostname).await {
        Ok(addresses) => addresses.into_iter().collect(),
        Err(e) => {
            debug!("{}", e);
            BTreeSet::new()
        }
    }
}

/// Confirms candidates resolve and are not wildcard noise.
#[derive(Clone)]
pub struct Validator {
    lookup: Arc<dyn Lookup>,
    semaphore: Arc<Semaphore>,
    keep_unresolved: bool,
}

impl Validator {
    pub fn new(lookup: Arc<dyn Lookup>, config: &ResolverConfig) -> Self {
        Self {
            lookup,
            semaphore: Arc::new(Semaphore::new(config.threads.max(1))),
            keep_unresolved: config.keep_unresolved,
        }
    }

    /// Resolves every candidate with bounded concurrency and keeps live, non-wildcard names.
    ///
    /// Lookups still pending at `deadline` are dropped; what finished is returned.
    pub async fn validate(
        &self,
        candidates: &CandidateSet,
        profile: &WildcardProfile,
        deadline: Option<Instant>,
    ) -> Vec<ValidatedResult> {
        let mut lookups = FuturesUnordered::new();

        for (hostname, candidate) in candidates.iter() {
            let lookup = Arc::clone(&self.lookup);
            let semaphore = Arc::clone(&self.semaphore);
            let hostname = hostname.to_string();
            let source = candidate.first_seen;

            lookups.push(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let addresses = resolve_addresses(lookup.as_ref(), &hostname).await;
                ValidatedResult {
                    hostname,
                    source,
                    addresses,
                }
            });
        }

        let mut accepted = Vec::new();
        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, lookups.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Deadline reached with {} lookups pending, keeping partial results", lookups.len());
                        break;
                    }
                },
                None => lookups.next().await,
            };
            let Some(result) = next else {
                break;
            };

            if self.accepts(&result, profile) {
                accepted.push(result);
            }
        }

        accepted.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        accepted
    }

    fn accepts(&self, result: &ValidatedResult, profile: &WildcardProfile) -> bool {
        if result.addresses.is_empty() {
            return self.keep_unresolved;
        }
        if profile.is_wildcard_answer(&result.addresses) {
            debug!("Dropping wildcard answer for {}", result.hostname);
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dedupe::dedupe;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory resolver; names under `wildcard_zone` fall back to `wildcard` answers.
    #[derive(Default)]
    pub(crate) struct StaticLookup {
        pub records: HashMap<String, Vec<IpAddr>>,
        pub wildcard_zone: Option<(String, Vec<IpAddr>)>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl StaticLookup {
        pub fn with(records: &[(&str, &[&str])]) -> Self {
            Self {
                records: records
                    .iter()
                    .map(|(name, ips)| (name.to_string(), ips.iter().map(|ip| ip.parse().unwrap()).collect()))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn wildcard(mut self, zone: &str, ips: &[&str]) -> Self {
            self.wildcard_zone = Some((zone.to_string(), ips.iter().map(|ip| ip.parse().unwrap()).collect()));
            self
        }
    }

    #[async_trait]
    impl Lookup for StaticLookup {
        async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ScoutError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(ips) = self.records.get(hostname) {
                return Ok(ips.clone());
            }
            match &self.wildcard_zone {
                Some((zone, ips)) if hostname.ends_with(&format!(".{}", zone)) => Ok(ips.clone()),
                _ => Err(ScoutError::ResolutionError(format!("NXDOMAIN {}", hostname))),
            }
        }
    }

    fn ips(list: &[&str]) -> BTreeSet<IpAddr> {
        list.iter().map(|ip| ip.parse().unwrap()).collect()
    }

    fn validator(lookup: StaticLookup, keep_unresolved: bool) -> Validator {
        let config = ResolverConfig {
            threads: 4,
            keep_unresolved,
            ..ResolverConfig::default()
        };
        Validator::new(Arc::new(lookup), &config)
    }

    #[test]
    fn test_parse_nameserver() {
        assert_eq!(parse_nameserver("1.1.1.1").unwrap(), "1.1.1.1:53".parse().unwrap());
        assert_eq!(parse_nameserver(" 9.9.9.9:5353 ").unwrap(), "9.9.9.9:5353".parse().unwrap());
        assert!(parse_nameserver("resolver.local").is_err());
    }

    #[tokio::test]
    async fn test_drops_unresolved_by_default() {
        let lookup = StaticLookup::with(&[("www.example.com", &["10.0.0.1"])]);
        let candidates = dedupe(["www.example.com", "gone.example.com"]);

        let results = validator(lookup, false)
            .validate(&candidates, &WildcardProfile::none(), None)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hostname, "www.example.com");
        assert_eq!(results[0].addresses, ips(&["10.0.0.1"]));
    }

    #[tokio::test]
    async fn test_keep_unresolved_passes_through() {
        let lookup = StaticLookup::with(&[("www.example.com", &["10.0.0.1"])]);
        let candidates = dedupe(["www.example.com", "gone.example.com"]);

        let results = validator(lookup, true)
            .validate(&candidates, &WildcardProfile::none(), None)
            .await;
        let names: Vec<&str> = results.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(names, vec!["gone.example.com", "www.example.com"]);
        assert!(!results[0].resolved());
    }

    #[tokio::test]
    async fn test_wildcard_subset_dropped_superset_kept() {
        let lookup = StaticLookup::with(&[
            ("noise.example.com", &["1.2.3.4"]),
            ("real.example.com", &["1.2.3.4", "5.6.7.8"]),
        ]);
        let profile = WildcardProfile {
            is_wildcard: true,
            wildcard_addresses: ips(&["1.2.3.4"]),
        };
        let candidates = dedupe(["noise.example.com", "real.example.com"]);

        let results = validator(lookup, false).validate(&candidates, &profile, None).await;
        let names: Vec<&str> = results.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(names, vec!["real.example.com"]);
    }

    #[tokio::test]
    async fn test_no_filtering_without_wildcard() {
        let lookup = StaticLookup::with(&[("noise.example.com", &["1.2.3.4"])]);
        let profile = WildcardProfile {
            is_wildcard: false,
            wildcard_addresses: ips(&["1.2.3.4"]),
        };
        let candidates = dedupe(["noise.example.com"]);

        let results = validator(lookup, false).validate(&candidates, &profile, None).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_keeps_partial_results() {
        let mut lookup = StaticLookup::with(&[("slow.example.com", &["10.0.0.2"])]);
        lookup.delay = Some(Duration::from_secs(30));
        let candidates = dedupe(["slow.example.com"]);

        let deadline = Instant::now() + Duration::from_millis(50);
        let results = validator(lookup, false)
            .validate(&candidates, &WildcardProfile::none(), Some(deadline))
            .await;
        assert!(results.is_empty());
    }
}
