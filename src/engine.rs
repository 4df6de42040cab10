use crate::dedupe::{normalize, CandidateSet};
use crate::resolver::{Lookup, Resolver, Validator};
use crate::session::Session;
use crate::sources::{Source, SourceId, SourceRegistry};
use crate::types::{
    Config, EnumerationRequest, ScoutError, SourceFailure, SourceResult, ValidatedResult, WildcardProfile,
};
use crate::utils::{is_subdomain_of, is_valid_domain, strip_wildcard_prefix};
use crate::wildcard::WildcardDetector;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Everything one orchestration call learned about one root domain.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub domain: String,
    /// Sorted by hostname, no duplicates.
    pub results: Vec<ValidatedResult>,
    pub wildcard: WildcardProfile,
    pub failures: Vec<SourceFailure>,
    pub sources_used: Vec<SourceId>,
    /// Raw names reported by sources before deduplication.
    pub total_found: usize,
    pub duration: Duration,
}

impl Discovery {
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.hostname.as_str())
    }
}

/// Fans a domain out to the selected sources and turns their answers into a validated list.
pub struct DiscoveryEngine {
    session: Session,
    registry: Arc<SourceRegistry>,
    detector: WildcardDetector,
    validator: Validator,
    source_timeout: Duration,
    keep_out_of_scope: bool,
}

impl DiscoveryEngine {
    pub fn new(config: &Config) -> Result<Self, ScoutError> {
        let session = Session::new(config)?;
        let registry = SourceRegistry::from_config(config);
        let lookup: Arc<dyn Lookup> = Arc::new(Resolver::new(&config.resolver)?);
        Ok(Self::with_parts(config, session, registry, lookup))
    }

    pub fn with_parts(
        config: &Config,
        session: Session,
        registry: SourceRegistry,
        lookup: Arc<dyn Lookup>,
    ) -> Self {
        Self {
            session,
            registry: Arc::new(registry),
            detector: WildcardDetector::new(Arc::clone(&lookup), config.resolver.wildcard_probes),
            validator: Validator::new(lookup, &config.resolver),
            source_timeout: config.timeout,
            keep_out_of_scope: config.keep_out_of_scope,
        }
    }

    /// Runs one enumeration of `request.root_domain`.
    ///
    /// Source failures never fail the call; only an unusable root domain does.
    /// When `deadline` passes, in-flight work is cancelled and what was collected is returned.
    pub async fn discover(
        &self,
        request: &EnumerationRequest,
        deadline: Option<Instant>,
    ) -> Result<Discovery, ScoutError> {
        let domain = normalize(strip_wildcard_prefix(&request.root_domain))
            .filter(|d| is_valid_domain(d))
            .ok_or_else(|| ScoutError::InvalidDomain(request.root_domain.clone()))?;

        info!("Enumerating subdomains for: {}", domain);
        let start_time = Instant::now();

        let wildcard = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.detector.detect(&domain))
                .await
                .unwrap_or_default(),
            None => self.detector.detect(&domain).await,
        };

        let sources = self.registry.select(&request.enabled_sources);
        let sources_used: Vec<SourceId> = sources.iter().map(|s| s.id()).collect();
        if sources.is_empty() {
            warn!("No registered source matches the selection for {}", domain);
        }

        let (candidates, failures, total_found) = self.fan_out(&domain, sources, deadline).await;

        let results = if request.confirm_live {
            info!("Resolving {} candidates for {}...", candidates.len(), domain);
            self.validator.validate(&candidates, &wildcard, deadline).await
        } else {
            candidates
                .iter()
                .map(|(hostname, candidate)| ValidatedResult {
                    hostname: hostname.to_string(),
                    source: candidate.first_seen,
                    addresses: Default::default(),
                })
                .collect()
        };

        Ok(Discovery {
            domain,
            results,
            wildcard,
            failures,
            sources_used,
            total_found,
            duration: start_time.elapsed(),
        })
    }

    /// Queries every source concurrently and merges exactly one answer per source.
    async fn fan_out(
        &self,
        domain: &str,
        sources: Vec<Arc<dyn Source>>,
        deadline: Option<Instant>,
    ) -> (CandidateSet, Vec<SourceFailure>, usize) {
        let expected = sources.len();
        let (tx, mut rx) = mpsc::channel::<SourceResult>(expected.max(1));
        let mut tasks = JoinSet::new();

        for source in sources {
            let tx = tx.clone();
            let session = self.session.clone();
            let domain = domain.to_string();
            let timeout = self.source_timeout;

            tasks.spawn(async move {
                let result = query_source(source.as_ref(), &domain, &session, timeout).await;
                // The receiver only goes away once the run deadline has passed.
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut candidates = CandidateSet::new();
        let mut failures = Vec::new();
        let mut total_found = 0;
        let mut completed = 0;

        while completed < expected {
            let received = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        warn!(
                            "{}: deadline reached with {} source(s) outstanding, keeping partial results",
                            domain,
                            expected - completed
                        );
                        break;
                    }
                },
                None => rx.recv().await,
            };

            // Every sender dropped: a source task died without reporting.
            let Some(result) = received else {
                error!("{}: a source task ended without reporting", domain);
                break;
            };
            completed += 1;

            match result.error {
                Some(e) => failures.push(SourceFailure {
                    source: result.source,
                    message: e.to_string(),
                }),
                None => {
                    total_found += result.names.len();
                    candidates.extend_from_source(result.source, &result.names);
                }
            }
        }

        // Only sources still running past the deadline are left here.
        tasks.abort_all();

        if !self.keep_out_of_scope {
            let before = candidates.len();
            candidates.retain(|name| is_valid_domain(name) && is_subdomain_of(name, domain));
            debug!("{}: {} out-of-scope names dropped", domain, before - candidates.len());
        }

        (candidates, failures, total_found)
    }
}

async fn query_source(source: &dyn Source, domain: &str, session: &Session, timeout: Duration) -> SourceResult {
    let start = Instant::now();
    let outcome = match tokio::time::timeout(timeout, source.enumerate(domain, session)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ScoutError::TimeoutError(format!(
            "{} did not answer within {:?}",
            source.name(),
            timeout
        ))),
    };

    match outcome {
        Ok(names) => {
            info!(
                "{}: Found {} subdomains for {} in {:?}",
                source.name(),
                names.len(),
                domain,
                start.elapsed()
            );
            SourceResult {
                source: source.id(),
                names,
                error: None,
            }
        }
        Err(e) => {
            error!("{}: Failed to enumerate {}: {}", source.name(), domain, e);
            SourceResult {
                source: source.id(),
                names: Vec::new(),
                error: Some(e),
            }
        }
    }
}
