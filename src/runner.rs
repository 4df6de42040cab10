// src/runner.rs
use crate::dedupe::normalize;
use crate::engine::{Discovery, DiscoveryEngine};
use crate::output::OutputSink;
use crate::sources::SourceSelection;
use crate::types::{Config, DomainReport, EnumerationRequest, EnumerationStats, ScoutError, ValidatedResult};
use crate::utils::strip_wildcard_prefix;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Names already enumerated during one run.
///
/// Shared by every enumeration of the run so no name is queried twice; separate
/// runs use separate sets.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    names: DashSet<String>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a (normalized) name is seen.
    pub fn mark(&self, name: &str) -> bool {
        match normalize(name) {
            Some(name) => self.names.insert(name),
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        normalize(name).is_some_and(|name| self.names.contains(&name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub sources: SourceSelection,
    pub recursive: bool,
    pub confirm_live: bool,
    pub max_time: Option<Duration>,
}

impl RunOptions {
    pub fn from_config(config: &Config, recursive: bool, confirm_live: bool) -> Self {
        Self {
            sources: config.sources.clone().without(&config.excluded_sources),
            recursive,
            confirm_live,
            max_time: config.max_time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootFailure {
    pub domain: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub reports: Vec<DomainReport>,
    pub failed_roots: Vec<RootFailure>,
    pub duration: Duration,
}

impl RunReport {
    /// Every hostname found across all root domains, sorted and unique.
    pub fn all_hostnames(&self) -> BTreeSet<String> {
        self.reports
            .iter()
            .flat_map(|r| r.hostnames().map(str::to_string))
            .collect()
    }

    pub fn source_errors(&self) -> usize {
        self.reports.iter().map(|r| r.stats.source_errors).sum()
    }
}

type CachedDiscovery = Result<Arc<Discovery>, Arc<ScoutError>>;

/// Base discoveries of one run, keyed by the enumerated name.
///
/// A name reached both as a listed root and as a recursion target is queried
/// once and its results are shared by every report that needs them.
#[derive(Default)]
struct DiscoveryCache {
    entries: DashMap<String, Arc<OnceCell<CachedDiscovery>>>,
}

impl DiscoveryCache {
    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn slot(&self, name: &str) -> Arc<OnceCell<CachedDiscovery>> {
        Arc::clone(self.entries.entry(name.to_string()).or_default().value())
    }
}

/// Drives the engine over a list of root domains, optionally one level deeper.
pub struct RecursionController {
    engine: DiscoveryEngine,
    recursion_concurrency: usize,
    progress: Option<ProgressBar>,
}

impl RecursionController {
    pub fn new(engine: DiscoveryEngine, config: &Config) -> Self {
        Self {
            engine,
            recursion_concurrency: config.recursion_concurrency.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Enumerates every root and hands each finished report to `sink`, then the aggregate.
    ///
    /// Failures of a single root or of the sink are logged and never abort the run.
    pub async fn run(
        &self,
        roots: &[String],
        options: &RunOptions,
        processed: &ProcessedSet,
        sink: &dyn OutputSink,
    ) -> RunReport {
        let start = Instant::now();
        let deadline = options.max_time.map(|max_time| start + max_time);

        // Roots are claimed up front so duplicates in the list run once.
        let mut queue = Vec::new();
        for root in roots {
            let Some(root) = normalize(strip_wildcard_prefix(root)) else {
                continue;
            };
            if processed.mark(&root) {
                queue.push(root);
            } else {
                info!("{} already enumerated in this run, skipping", root);
            }
        }

        let listed: BTreeSet<String> = queue.iter().cloned().collect();
        let cache = DiscoveryCache::default();

        if let Some(progress) = &self.progress {
            progress.set_length(queue.len() as u64);
        }

        let mut run = RunReport::default();
        for root in queue {
            if let Some(progress) = &self.progress {
                progress.set_message(root.clone());
            }

            let pass = RootPass {
                options,
                processed,
                listed: &listed,
                cache: &cache,
                deadline,
            };
            match self.enumerate_root(&root, &pass).await {
                Ok(report) => {
                    info!(
                        "Completed enumeration for {}: found {} unique subdomains",
                        root, report.stats.unique_subdomains
                    );
                    if let Err(e) = sink.write_domain(&report).await {
                        error!("Failed to write results for {}: {}", root, e);
                    }
                    run.reports.push(report);
                }
                Err(e) => {
                    error!("Failed to enumerate {}: {}", root, e);
                    run.failed_roots.push(RootFailure {
                        domain: root.clone(),
                        message: e.to_string(),
                    });
                }
            }

            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        if let Err(e) = sink.write_aggregate(&run.reports).await {
            error!("Failed to write aggregate results: {}", e);
        }

        run.duration = start.elapsed();
        run
    }

    /// Runs `request` at most once per run; later callers get the stored outcome.
    async fn discover_once(
        &self,
        request: &EnumerationRequest,
        cache: &DiscoveryCache,
        deadline: Option<Instant>,
    ) -> CachedDiscovery {
        let slot = cache.slot(&request.root_domain);
        let outcome = slot
            .get_or_init(|| async {
                self.engine
                    .discover(request, deadline)
                    .await
                    .map(Arc::new)
                    .map_err(Arc::new)
            })
            .await
            .clone();
        outcome
    }

    async fn enumerate_root(&self, root: &str, pass: &RootPass<'_>) -> Result<DomainReport, Arc<ScoutError>> {
        let start = Instant::now();
        let options = pass.options;
        let request = EnumerationRequest::new(root, options.sources.clone())
            .recursive(options.recursive)
            .confirm_live(options.confirm_live);

        let base = self.discover_once(&request, pass.cache, pass.deadline).await?;
        let mut merged = Merged::new(&base);

        if request.recursive {
            // A name claimed elsewhere in this run is still merged, from the cache.
            let targets: Vec<String> = base
                .hostnames()
                .filter(|name| processed_or_shared(name, pass))
                .map(str::to_string)
                .collect();
            info!("Recursing into {} names found under {}", targets.len(), root);

            // One level only: these requests are not recursive themselves.
            let cache = pass.cache;
            let deadline = pass.deadline;
            let mut passes = stream::iter(targets)
                .map(move |target| async move {
                    let request = EnumerationRequest::new(target, options.sources.clone())
                        .confirm_live(options.confirm_live);
                    let outcome = self.discover_once(&request, cache, deadline).await;
                    (request.root_domain, outcome)
                })
                .buffer_unordered(self.recursion_concurrency);

            while let Some((target, outcome)) = passes.next().await {
                match outcome {
                    Ok(discovery) => merged.absorb(&discovery),
                    Err(e) => warn!("Recursive enumeration of {} failed: {}", target, e),
                }
            }
        }

        let results: Vec<ValidatedResult> = merged.results.into_values().collect();
        let stats = EnumerationStats {
            total_found: merged.total_found,
            unique_subdomains: results.len(),
            resolved_count: results.iter().filter(|r| r.resolved()).count(),
            sources_used: base.sources_used.iter().map(|s| s.to_string()).collect(),
            source_errors: merged.source_errors,
            duration: start.elapsed(),
        };

        Ok(DomainReport {
            domain: root.to_string(),
            results,
            stats,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Run-wide state one root enumeration reads.
struct RootPass<'a> {
    options: &'a RunOptions,
    processed: &'a ProcessedSet,
    listed: &'a BTreeSet<String>,
    cache: &'a DiscoveryCache,
    deadline: Option<Instant>,
}

/// New names are claimed here; names claimed by a listed root or an earlier
/// pass of this run are served from the cache. Anything else was enumerated by
/// a previous run sharing `processed` and is skipped.
fn processed_or_shared(name: &str, pass: &RootPass<'_>) -> bool {
    if pass.processed.mark(name) || pass.listed.contains(name) || pass.cache.contains(name) {
        return true;
    }
    debug!("{} already enumerated, skipping", name);
    false
}

/// Union of a base pass and its recursive passes.
struct Merged {
    results: BTreeMap<String, ValidatedResult>,
    total_found: usize,
    source_errors: usize,
}

impl Merged {
    fn new(base: &Discovery) -> Self {
        let mut merged = Self {
            results: BTreeMap::new(),
            total_found: 0,
            source_errors: 0,
        };
        merged.absorb(base);
        merged
    }

    fn absorb(&mut self, discovery: &Discovery) {
        self.total_found += discovery.total_found;
        self.source_errors += discovery.failures.len();
        for result in &discovery.results {
            self.results
                .entry(result.hostname.clone())
                .and_modify(|existing| existing.addresses.extend(result.addresses.iter().copied()))
                .or_insert_with(|| result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine_with, test_config, FixedSource};
    use crate::resolver::tests::StaticLookup;
    use crate::sources::SourceId;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        domains: Mutex<Vec<(String, Vec<String>)>>,
        aggregates: Mutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait]
    impl OutputSink for RecordingSink {
        async fn write_domain(&self, report: &DomainReport) -> Result<(), ScoutError> {
            self.domains.lock().unwrap().push((
                report.domain.clone(),
                report.hostnames().map(str::to_string).collect(),
            ));
            if self.fail {
                return Err(ScoutError::OutputError("disk full".to_string()));
            }
            Ok(())
        }

        async fn write_aggregate(&self, reports: &[DomainReport]) -> Result<(), ScoutError> {
            self.aggregates.lock().unwrap().push(reports.len());
            Ok(())
        }
    }

    fn options(recursive: bool) -> RunOptions {
        RunOptions {
            sources: SourceSelection::All,
            recursive,
            confirm_live: false,
            max_time: None,
        }
    }

    fn chain_source() -> FixedSource {
        FixedSource::new(SourceId::Crtsh)
            .answer("example.com", &["a.example.com"])
            .answer("a.example.com", &["deep.a.example.com"])
            .answer("deep.a.example.com", &["deeper.deep.a.example.com"])
    }

    fn roots(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_recursion_is_exactly_one_level_deep() {
        let source = chain_source();
        let queries = Arc::clone(&source.queries);
        let controller = RecursionController::new(
            engine_with(&test_config(), vec![source], StaticLookup::default()),
            &test_config(),
        );

        let sink = RecordingSink::default();
        let run = controller
            .run(&roots(&["example.com"]), &options(true), &ProcessedSet::new(), &sink)
            .await;

        assert_eq!(*queries.lock().unwrap(), vec!["example.com", "a.example.com"]);
        assert_eq!(
            run.reports[0].hostnames().collect::<Vec<_>>(),
            vec!["a.example.com", "deep.a.example.com"]
        );
    }

    #[tokio::test]
    async fn test_no_recursion_by_default() {
        let source = chain_source();
        let queries = Arc::clone(&source.queries);
        let controller = RecursionController::new(
            engine_with(&test_config(), vec![source], StaticLookup::default()),
            &test_config(),
        );

        let run = controller
            .run(&roots(&["example.com"]), &options(false), &ProcessedSet::new(), &RecordingSink::default())
            .await;
        assert_eq!(*queries.lock().unwrap(), vec!["example.com"]);
        assert_eq!(run.all_hostnames().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_roots_and_listed_roots_enumerated_once() {
        let source = FixedSource::new(SourceId::Crtsh)
            .answer("example.com", &["a.example.com", "b.example.com"])
            .answer("a.example.com", &["x.a.example.com"])
            .answer("b.example.com", &["y.b.example.com"]);
        let queries = Arc::clone(&source.queries);
        let controller = RecursionController::new(
            engine_with(&test_config(), vec![source], StaticLookup::default()),
            &test_config(),
        );

        let sink = RecordingSink::default();
        let run = controller
            .run(
                &roots(&["example.com", "EXAMPLE.com.", "a.example.com"]),
                &options(true),
                &ProcessedSet::new(),
                &sink,
            )
            .await;

        let mut seen = queries.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec!["a.example.com", "b.example.com", "example.com", "x.a.example.com"]
        );

        let domains = sink.domains.lock().unwrap().clone();
        assert_eq!(
            domains,
            vec![
                (
                    "example.com".to_string(),
                    roots(&["a.example.com", "b.example.com", "x.a.example.com", "y.b.example.com"])
                ),
                ("a.example.com".to_string(), roots(&["x.a.example.com"])),
            ]
        );
        assert_eq!(*sink.aggregates.lock().unwrap(), vec![2]);
        assert_eq!(run.reports.len(), 2);
    }

    #[tokio::test]
    async fn test_listed_child_root_does_not_shrink_parent_report() {
        let source = || {
            FixedSource::new(SourceId::Crtsh)
                .answer("example.com", &["a.example.com"])
                .answer("a.example.com", &["x.a.example.com"])
        };
        let parent_report = |run: &RunReport| {
            run.reports
                .iter()
                .find(|r| r.domain == "example.com")
                .map(|r| r.hostnames().map(str::to_string).collect::<Vec<_>>())
                .unwrap()
        };

        let alone = RecursionController::new(
            engine_with(&test_config(), vec![source()], StaticLookup::default()),
            &test_config(),
        )
        .run(&roots(&["example.com"]), &options(true), &ProcessedSet::new(), &RecordingSink::default())
        .await;

        let shared = source();
        let queries = Arc::clone(&shared.queries);
        let together = RecursionController::new(
            engine_with(&test_config(), vec![shared], StaticLookup::default()),
            &test_config(),
        )
        .run(
            &roots(&["example.com", "a.example.com"]),
            &options(true),
            &ProcessedSet::new(),
            &RecordingSink::default(),
        )
        .await;

        assert_eq!(parent_report(&alone), vec!["a.example.com", "x.a.example.com"]);
        assert_eq!(parent_report(&together), parent_report(&alone));
        // a.example.com served both as a recursion target and as a root from one query.
        let mut seen = queries.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a.example.com", "example.com", "x.a.example.com"]);
    }

    #[tokio::test]
    async fn test_names_from_an_earlier_run_are_not_requeried() {
        let source = chain_source();
        let queries = Arc::clone(&source.queries);
        let controller = RecursionController::new(
            engine_with(&test_config(), vec![source], StaticLookup::default()),
            &test_config(),
        );
        let processed = ProcessedSet::new();
        processed.mark("a.example.com");

        let run = controller
            .run(&roots(&["example.com"]), &options(true), &processed, &RecordingSink::default())
            .await;

        assert_eq!(*queries.lock().unwrap(), vec!["example.com"]);
        assert_eq!(run.reports[0].hostnames().collect::<Vec<_>>(), vec!["a.example.com"]);
    }

    #[tokio::test]
    async fn test_bad_root_and_sink_errors_do_not_abort() {
        let controller = RecursionController::new(
            engine_with(&test_config(), vec![chain_source()], StaticLookup::default()),
            &test_config(),
        );
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        let run = controller
            .run(&roots(&["bad domain", "example.com"]), &options(false), &ProcessedSet::new(), &sink)
            .await;

        assert_eq!(run.failed_roots.len(), 1);
        assert_eq!(run.failed_roots[0].domain, "bad domain");
        assert_eq!(run.reports.len(), 1);
        assert_eq!(run.reports[0].domain, "example.com");
    }

    #[tokio::test]
    async fn test_live_results_merge_addresses_across_passes() {
        let lookup = StaticLookup::with(&[
            ("a.example.com", &["10.0.0.1"]),
            ("deep.a.example.com", &["10.0.0.2"]),
        ]);
        let controller = RecursionController::new(
            engine_with(&test_config(), vec![chain_source()], lookup),
            &test_config(),
        );
        let mut opts = options(true);
        opts.confirm_live = true;

        let run = controller
            .run(&roots(&["example.com"]), &opts, &ProcessedSet::new(), &RecordingSink::default())
            .await;

        let report = &run.reports[0];
        assert_eq!(report.stats.resolved_count, 2);
        assert_eq!(report.stats.unique_subdomains, 2);
        assert!(report.results.iter().all(|r| r.resolved()));
    }

    #[test]
    fn test_processed_set_normalizes() {
        let processed = ProcessedSet::new();
        assert!(processed.mark("Example.COM."));
        assert!(!processed.mark("example.com"));
        assert!(processed.contains(" EXAMPLE.com "));
        assert!(!processed.mark("   "));
        assert_eq!(processed.len(), 1);
    }

    #[test]
    fn test_run_options_apply_exclusions() {
        let mut config = Config::default();
        config.excluded_sources.insert(SourceId::Bing);
        let opts = RunOptions::from_config(&config, true, false);
        assert!(!opts.sources.contains(SourceId::Bing));
        assert!(opts.sources.contains(SourceId::Crtsh));
    }
}
