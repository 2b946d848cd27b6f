// src/core/pipeline/mod.rs

//! The scan pipeline.
//!
//! The orchestrator sequences the stages
//! `INIT → PREFLIGHT → (SHORT_CIRCUIT) → EVALUATE → BASE_SCORE → CONSENSUS →
//! LEGITIMACY_ADJUST → CLASSIFY → DONE` under a hard overall deadline. Each
//! stage gets the smaller of its configured budget and whatever remains of
//! the overall budget; a stage that runs out proceeds with the partial
//! results that arrived. No stage below the orchestrator can fail the scan.

pub mod checks;
pub mod consensus;
pub mod fetch;
pub mod fingerprint;
pub mod legitimacy;
pub mod probe;
pub mod reputation;
pub mod rules;
pub mod score;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::cache::ScanCache;
use crate::core::config::ScanConfig;
use crate::core::error::ScanError;
use crate::core::models::{
    CacheInfo, PipelineMode, ProbeReport, ReputationSourceResult, ReputationSummary,
    ReputationVerdict, ScanReport, StageTimings, UrlFingerprint,
};
use consensus::AdvisoryModel;
use fetch::{ContentFetcher, HttpFetcher};
use probe::{DnsProber, ReachabilityProber};
use reputation::{ReputationQuery, ReputationSource, TombstoneList};

/// Orchestrator state machine, used for stage-transition logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ScanStage {
    Init,
    Preflight,
    ShortCircuit,
    Evaluate,
    BaseScore,
    Consensus,
    LegitimacyAdjust,
    Classify,
    Done,
}

/// Joins whatever a task set finishes before `deadline` and abandons the
/// rest: gather with partial failure, never all-or-nothing.
pub(crate) async fn gather_within<T: Send + 'static>(
    set: &mut JoinSet<T>,
    deadline: tokio::time::Instant,
) -> Vec<T> {
    let mut gathered = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(value))) => gathered.push(value),
            Ok(Some(Err(e))) => warn!(error = %e, "Fan-out task panicked, dropping its result."),
            Ok(None) => break,
            Err(_) => {
                warn!(outstanding = set.len(), "Stage deadline elapsed, abandoning late tasks.");
                set.abort_all();
                break;
            }
        }
    }
    gathered
}

/// The collaborators a scan consumes. All of them are contracts; swap in
/// test doubles or real integrations as needed.
pub struct Collaborators {
    pub prober: Arc<dyn ReachabilityProber>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub sources: Vec<Arc<dyn ReputationSource>>,
    pub models: Vec<Arc<dyn AdvisoryModel>>,
}

impl Collaborators {
    /// Live network prober and fetcher, with empty reputation and advisory
    /// rosters (those integrations belong to the deployment).
    pub fn live() -> Self {
        Self {
            prober: Arc::new(DnsProber::default()),
            fetcher: Arc::new(HttpFetcher::default()),
            sources: Vec::new(),
            models: Vec::new(),
        }
    }
}

/// A finished scan plus whether it was served from the cache.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub report: Arc<ScanReport>,
    pub from_cache: bool,
}

/// The scan engine: immutable configuration, collaborators, and the shared
/// result cache.
pub struct Scanner {
    config: ScanConfig,
    collaborators: Collaborators,
    tombstones: TombstoneList,
    cache: ScanCache,
}

impl Scanner {
    pub fn new(config: ScanConfig, collaborators: Collaborators) -> Result<Self, ScanError> {
        let config = config.validated().map_err(ScanError::Fatal)?;
        let tombstones = TombstoneList::new(config.tombstones.iter().cloned());
        let cache = ScanCache::new(config.cache_ttl);
        Ok(Self { config, collaborators, tombstones, cache })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans a URL, serving identical requests within the TTL from the cache
    /// and coalescing concurrent first-time scans of one fingerprint into a
    /// single underlying computation.
    pub async fn scan(&self, raw_url: &str) -> Result<ScanOutcome, ScanError> {
        let fingerprint = fingerprint::fingerprint(raw_url)?;
        let key = fingerprint.content_hash.clone();

        let built = AtomicBool::new(false);
        let report = self
            .cache
            .get_or_build(&key, || {
                built.store(true, Ordering::SeqCst);
                self.run_pipeline(fingerprint)
            })
            .await?;

        Ok(ScanOutcome { report, from_cache: !built.load(Ordering::SeqCst) })
    }

    async fn run_pipeline(&self, fingerprint: UrlFingerprint) -> Result<ScanReport, ScanError> {
        let started_at = Utc::now();
        let scan_start = tokio::time::Instant::now();
        let overall_deadline = scan_start + self.config.deadline.overall;
        let mut timings = StageTimings::default();

        info!(stage = %ScanStage::Init, url = %fingerprint.canonical_url, preset = %self.config.preset, "Scan starting.");

        // PREFLIGHT: a tombstoned domain terminates immediately; no probe,
        // no rules, no collaborator calls.
        info!(stage = %ScanStage::Preflight, host = %fingerprint.host, "Checking tombstone list.");
        if self.tombstones.hit(&fingerprint.host) {
            info!(stage = %ScanStage::ShortCircuit, host = %fingerprint.host, "Tombstone hit, emitting terminal verdict.");
            return self.tombstone_report(fingerprint, started_at);
        }

        // Reachability governs the pipeline mode; its failure never aborts.
        let probe_deadline = stage_deadline(overall_deadline, self.config.deadline.probe);
        let (probe_report, probe_ms) = timed(async {
            match tokio::time::timeout_at(
                probe_deadline,
                self.collaborators.prober.probe(&fingerprint.host, fingerprint.port),
            )
            .await
            {
                Ok(report) => report,
                Err(_) => {
                    warn!("Probe exceeded its stage budget.");
                    ProbeReport { timed_out: true, ..ProbeReport::default() }
                }
            }
        })
        .await;
        timings.probe_ms = probe_ms;
        let reachability = probe::classify(&probe_report, probe_ms);
        info!(outcome = %reachability.outcome, mode = %reachability.mode, "Reachability classified.");

        let domain = tokio::time::timeout(
            Duration::from_secs(1),
            self.collaborators.prober.domain_metadata(&fingerprint.host),
        )
        .await
        .ok()
        .flatten();

        let fetch_budget = remaining(overall_deadline).min(self.config.deadline.fetch);
        let (snapshot, fetch_ms) = fetch::assemble(
            &fingerprint,
            &reachability,
            domain,
            &self.collaborators.fetcher,
            fetch_budget,
        )
        .await;
        timings.fetch_ms = fetch_ms;
        let snapshot = Arc::new(snapshot);
        let mode = snapshot.mode;

        // EVALUATE: rules and reputation fan out concurrently and join on
        // the same stage deadline.
        info!(stage = %ScanStage::Evaluate, %mode, "Evaluating categories and reputation sources.");
        let evaluate_deadline = stage_deadline(overall_deadline, self.config.deadline.evaluate);
        let query = ReputationQuery::for_fingerprint(&fingerprint, reachability.ip.clone());
        let ((categories, rules_ms), (reputation, reputation_ms)) = tokio::join!(
            timed(rules::run_categories(snapshot.clone(), &self.config, evaluate_deadline)),
            timed(reputation::aggregate(
                &self.collaborators.sources,
                query,
                &self.config,
                evaluate_deadline
            )),
        );
        timings.rules_ms = rules_ms;
        timings.reputation_ms = reputation_ms;

        info!(stage = %ScanStage::BaseScore, "Combining base score.");
        let base_score = score::combine_base(&categories, &reputation);

        info!(stage = %ScanStage::Consensus, models = self.collaborators.models.len(), "Running advisory consensus.");
        let digest = Arc::new(consensus::build_digest(
            &fingerprint,
            mode,
            &categories,
            &reputation,
            &base_score,
            &self.config,
        ));
        let consensus_deadline = stage_deadline(overall_deadline, self.config.deadline.consensus);
        let (consensus_result, consensus_ms) = timed(consensus::run_consensus(
            &self.collaborators.models,
            digest,
            &self.config,
            consensus_deadline,
        ))
        .await;
        timings.consensus_ms = consensus_ms;

        info!(stage = %ScanStage::LegitimacyAdjust, "Assessing legitimacy signals.");
        let (legitimacy, legitimacy_ms) =
            timed(async { legitimacy::assess(&snapshot, &reputation, &self.config) }).await;
        timings.legitimacy_ms = legitimacy_ms;

        let final_score = score::apply_adjustments(
            &base_score,
            consensus_result.final_multiplier,
            legitimacy.adjustment_multiplier,
        );

        info!(stage = %ScanStage::Classify, final_score, "Classifying risk.");
        let (risk_percentage, risk_level) =
            score::classify(final_score, base_score.active_max_score, &self.config.risk_thresholds);

        timings.total_ms = scan_start.elapsed().as_millis() as u64;
        let scan_id = Uuid::new_v4().to_string();
        info!(
            stage = %ScanStage::Done,
            scan_id = %scan_id,
            %risk_level,
            risk_percentage,
            total_ms = timings.total_ms,
            "Scan complete."
        );

        Ok(ScanReport {
            scan_id,
            fingerprint,
            mode,
            reachability: Some(reachability),
            categories,
            reputation,
            base_score,
            consensus: Some(consensus_result),
            legitimacy: Some(legitimacy),
            final_score,
            risk_percentage,
            risk_level,
            started_at,
            completed_at: Utc::now(),
            timings,
            cache: CacheInfo { short_circuited: false, ttl_secs: self.cache.ttl().as_secs() },
        })
    }

    /// Terminal verdict for an already-confirmed domain: the tombstone list
    /// acts as one authoritative reputation source at full points.
    fn tombstone_report(
        &self,
        fingerprint: UrlFingerprint,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<ScanReport, ScanError> {
        let points = self.config.points_per_source;
        let reputation = ReputationSummary {
            sources: vec![ReputationSourceResult {
                source_id: "tombstone".to_string(),
                verdict: ReputationVerdict::Malicious,
                score: points,
                confidence: 100.0,
                duration_ms: 0,
            }],
            score: points,
            max_score: points,
            malicious_count: 1,
            suspicious_count: 0,
            safe_count: 0,
            error_count: 0,
        };
        let base_score = score::combine_base(&[], &reputation);
        let (risk_percentage, risk_level) =
            score::classify(points, base_score.active_max_score, &self.config.risk_thresholds);

        Ok(ScanReport {
            scan_id: Uuid::new_v4().to_string(),
            fingerprint,
            mode: PipelineMode::Minimal,
            reachability: None,
            categories: Vec::new(),
            reputation,
            base_score,
            consensus: None,
            legitimacy: None,
            final_score: points,
            risk_percentage,
            risk_level,
            started_at,
            completed_at: Utc::now(),
            timings: StageTimings::default(),
            cache: CacheInfo { short_circuited: true, ttl_secs: self.cache.ttl().as_secs() },
        })
    }
}

/// The smaller of "now + stage budget" and the overall deadline.
fn stage_deadline(overall: tokio::time::Instant, budget: Duration) -> tokio::time::Instant {
    (tokio::time::Instant::now() + budget).min(overall)
}

fn remaining(overall: tokio::time::Instant) -> Duration {
    overall.saturating_duration_since(tokio::time::Instant::now())
}

async fn timed<T>(future: impl Future<Output = T>) -> (T, u64) {
    let started = tokio::time::Instant::now();
    let value = future.await;
    (value, started.elapsed().as_millis() as u64)
}
