// src/core/pipeline/reputation.rs

//! Reputation aggregation.
//!
//! Every configured source is queried concurrently, each isolated behind its
//! own timeout with zero retries. A timeout or transport error becomes an
//! `error` verdict worth 0 points, excluded from the verdict tallies and
//! from the reputation maximum, so the active maximum only reflects sources
//! that actually answered.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::config::ScanConfig;
use crate::core::error::SourceError;
use crate::core::models::{
    ReputationSourceResult, ReputationSummary, ReputationVerdict, SourceVerdict, UrlFingerprint,
};
use crate::core::pipeline::gather_within;

/// What a source gets asked about. Sources are free to key on the URL, the
/// host, or the resolved IP.
#[derive(Debug, Clone)]
pub struct ReputationQuery {
    pub canonical_url: String,
    pub host: String,
    pub ip: Option<String>,
}

impl ReputationQuery {
    pub fn for_fingerprint(fingerprint: &UrlFingerprint, ip: Option<String>) -> Self {
        Self { canonical_url: fingerprint.canonical_url.clone(), host: fingerprint.host.clone(), ip }
    }
}

/// Uniform contract every reputation source implements.
///
/// Concrete vendor integrations live with the integrator; this core only
/// depends on the contract and each source's declared SLA.
#[async_trait]
pub trait ReputationSource: Send + Sync {
    fn id(&self) -> &str;
    /// The source-specific SLA. Exceeding it fails the call; there is no retry.
    fn timeout(&self) -> Duration;
    async fn check(&self, query: &ReputationQuery) -> Result<SourceVerdict, SourceError>;
}

/// Fixed verdict → points mapping.
pub fn verdict_points(verdict: ReputationVerdict, config: &ScanConfig) -> u32 {
    match verdict {
        ReputationVerdict::Malicious => config.points_per_source,
        ReputationVerdict::Suspicious => config.suspicious_points,
        ReputationVerdict::Safe | ReputationVerdict::Error => 0,
    }
}

/// Queries all sources concurrently and folds their verdicts into a summary.
pub async fn aggregate(
    sources: &[Arc<dyn ReputationSource>],
    query: ReputationQuery,
    config: &ScanConfig,
    deadline: tokio::time::Instant,
) -> ReputationSummary {
    let mut set: JoinSet<ReputationSourceResult> = JoinSet::new();
    let roster: Vec<String> = sources.iter().map(|s| s.id().to_string()).collect();

    for source in sources {
        let source = source.clone();
        let query = query.clone();
        let points_per_source = config.points_per_source;
        let suspicious_points = config.suspicious_points;
        set.spawn(async move {
            let started = Instant::now();
            let budget = source.timeout();
            let outcome = tokio::time::timeout(budget, source.check(&query)).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(Ok(answer)) => {
                    let score = match answer.verdict {
                        ReputationVerdict::Malicious => points_per_source,
                        ReputationVerdict::Suspicious => suspicious_points,
                        _ => 0,
                    };
                    debug!(source = source.id(), verdict = %answer.verdict, score, "Source answered.");
                    ReputationSourceResult {
                        source_id: source.id().to_string(),
                        verdict: answer.verdict,
                        score,
                        confidence: answer.confidence.clamp(0.0, 100.0),
                        duration_ms,
                    }
                }
                Ok(Err(e)) => {
                    warn!(source = source.id(), error = %e, "Source call failed.");
                    errored(source.id(), duration_ms)
                }
                Err(_) => {
                    warn!(source = source.id(), timeout = ?budget, "Source timed out.");
                    errored(source.id(), duration_ms)
                }
            }
        });
    }

    let mut results = gather_within(&mut set, deadline).await;
    // Sources cut off by the stage deadline count as errored, not absent.
    for id in roster {
        if !results.iter().any(|r| r.source_id == id) {
            warn!(source = %id, "Source cut off by stage deadline.");
            results.push(errored(&id, 0));
        }
    }
    results.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let mut summary = ReputationSummary::default();
    for result in &results {
        match result.verdict {
            ReputationVerdict::Malicious => summary.malicious_count += 1,
            ReputationVerdict::Suspicious => summary.suspicious_count += 1,
            ReputationVerdict::Safe => summary.safe_count += 1,
            ReputationVerdict::Error => summary.error_count += 1,
        }
        summary.score += result.score;
    }
    let responders =
        summary.malicious_count + summary.suspicious_count + summary.safe_count;
    summary.max_score = config.points_per_source * responders;
    summary.sources = results;

    info!(
        score = summary.score,
        max = summary.max_score,
        errors = summary.error_count,
        "Reputation aggregation finished."
    );
    summary
}

fn errored(source_id: &str, duration_ms: u64) -> ReputationSourceResult {
    ReputationSourceResult {
        source_id: source_id.to_string(),
        verdict: ReputationVerdict::Error,
        score: 0,
        confidence: 0.0,
        duration_ms,
    }
}

// --- Tombstones ---

/// Small authoritative list of already-confirmed domains.
///
/// Checked before any network work; a hit short-circuits the entire pipeline
/// with an immediate terminal verdict.
#[derive(Debug, Clone, Default)]
pub struct TombstoneList {
    domains: HashSet<String>,
}

impl TombstoneList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { domains: domains.into_iter().map(|d| d.into().to_ascii_lowercase()).collect() }
    }

    /// Exact or parent-domain match.
    pub fn hit(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.domains.contains(&host) {
            return true;
        }
        self.domains.iter().any(|d| host.ends_with(&format!(".{d}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::fingerprint::fingerprint;

    struct StaticSource {
        id: &'static str,
        verdict: ReputationVerdict,
        delay: Duration,
        budget: Duration,
    }

    #[async_trait]
    impl ReputationSource for StaticSource {
        fn id(&self) -> &str {
            self.id
        }

        fn timeout(&self) -> Duration {
            self.budget
        }

        async fn check(&self, _query: &ReputationQuery) -> Result<SourceVerdict, SourceError> {
            tokio::time::sleep(self.delay).await;
            Ok(SourceVerdict { verdict: self.verdict, confidence: 90.0, details: None })
        }
    }

    fn source(id: &'static str, verdict: ReputationVerdict, delay_ms: u64) -> Arc<dyn ReputationSource> {
        Arc::new(StaticSource {
            id,
            verdict,
            delay: Duration::from_millis(delay_ms),
            budget: Duration::from_millis(100),
        })
    }

    fn query() -> ReputationQuery {
        let fp = fingerprint("https://example.com").expect("valid url");
        ReputationQuery::for_fingerprint(&fp, None)
    }

    #[tokio::test]
    async fn responders_are_tallied_and_mapped_to_points() {
        let config = crate::core::config::ScanConfig::balanced();
        let sources = vec![
            source("alpha", ReputationVerdict::Malicious, 0),
            source("beta", ReputationVerdict::Suspicious, 0),
            source("gamma", ReputationVerdict::Safe, 0),
        ];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let summary = aggregate(&sources, query(), &config, deadline).await;

        assert_eq!(summary.malicious_count, 1);
        assert_eq!(summary.suspicious_count, 1);
        assert_eq!(summary.safe_count, 1);
        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.score, config.points_per_source + config.suspicious_points);
        assert_eq!(summary.max_score, config.points_per_source * 3);
    }

    #[tokio::test]
    async fn timed_out_source_is_excluded_from_max_and_tallies() {
        let config = crate::core::config::ScanConfig::balanced();
        let sources = vec![
            source("slow", ReputationVerdict::Malicious, 5_000),
            source("quick-a", ReputationVerdict::Safe, 0),
            source("quick-b", ReputationVerdict::Safe, 0),
        ];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let summary = aggregate(&sources, query(), &config, deadline).await;

        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.safe_count, 2);
        assert_eq!(summary.score, 0);
        // Only the two responders back the maximum.
        assert_eq!(summary.max_score, config.points_per_source * 2);
    }

    #[tokio::test]
    async fn failing_source_contributes_zero() {
        struct FailingSource;

        #[async_trait]
        impl ReputationSource for FailingSource {
            fn id(&self) -> &str {
                "failing"
            }

            fn timeout(&self) -> Duration {
                Duration::from_millis(100)
            }

            async fn check(&self, _query: &ReputationQuery) -> Result<SourceVerdict, SourceError> {
                Err(SourceError::Transport("connection refused".to_string()))
            }
        }

        let config = crate::core::config::ScanConfig::balanced();
        let sources: Vec<Arc<dyn ReputationSource>> = vec![Arc::new(FailingSource)];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let summary = aggregate(&sources, query(), &config, deadline).await;

        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.score, 0);
        assert_eq!(summary.max_score, 0);
    }

    #[test]
    fn tombstone_matches_exact_and_subdomains() {
        let list = TombstoneList::new(["sinkholed.example"]);
        assert!(list.hit("sinkholed.example"));
        assert!(list.hit("login.sinkholed.example"));
        assert!(list.hit("SINKHOLED.example"));
        assert!(!list.hit("notsinkholed.example"));
        assert!(!list.hit("example.com"));
    }
}
