// src/core/pipeline/consensus.rs

//! Advisory consensus.
//!
//! A compact digest of the scan so far goes out to every configured advisory
//! model concurrently, each behind its own timeout with zero retries.
//! Non-responding models are omitted and the remaining weights renormalized,
//! so a slow model dilutes nothing silently. With zero responders the stage
//! is an exact no-op: multiplier 1.0, agreement 0, neutral lean.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::config::ScanConfig;
use crate::core::error::ModelError;
use crate::core::models::{
    AdvisoryLean, AdvisoryResponse, AdvisoryVerdict, BaseScore, CategoryResult, ConsensusResult,
    DigestFinding, FindingsDigest, PipelineMode, ReputationSummary, UrlFingerprint,
};
use crate::core::pipeline::gather_within;

/// Uniform contract every advisory model implements.
#[async_trait]
pub trait AdvisoryModel: Send + Sync {
    fn id(&self) -> &str;
    /// Relative weight of this model's vote in the consensus.
    fn weight(&self) -> f64;
    fn timeout(&self) -> Duration;
    async fn analyze(&self, digest: &FindingsDigest) -> Result<AdvisoryResponse, ModelError>;
}

/// Builds the digest dispatched to advisory models: top findings ranked by
/// severity then points, reputation tallies, and the base score. Pure.
pub fn build_digest(
    fingerprint: &UrlFingerprint,
    mode: PipelineMode,
    categories: &[CategoryResult],
    reputation: &ReputationSummary,
    base: &BaseScore,
    config: &ScanConfig,
) -> FindingsDigest {
    let mut findings: Vec<DigestFinding> = categories
        .iter()
        .flat_map(|c| c.findings.iter())
        .map(|f| DigestFinding {
            check_id: f.check_id.clone(),
            severity: f.severity,
            points: f.points,
            message: f.message.clone(),
        })
        .collect();
    findings.sort_by_key(|f| (Reverse(f.severity), Reverse(f.points)));
    findings.truncate(config.digest_top_findings);

    FindingsDigest {
        canonical_url: fingerprint.canonical_url.clone(),
        mode,
        top_findings: findings,
        malicious_count: reputation.malicious_count,
        suspicious_count: reputation.suspicious_count,
        safe_count: reputation.safe_count,
        error_count: reputation.error_count,
        base_score: base.category_score + base.reputation_score,
        active_max_score: base.active_max_score,
        base_percentage: base.base_percentage,
    }
}

/// Dispatches the digest to every model and folds the responses.
pub async fn run_consensus(
    models: &[Arc<dyn AdvisoryModel>],
    digest: Arc<FindingsDigest>,
    config: &ScanConfig,
    deadline: tokio::time::Instant,
) -> ConsensusResult {
    if models.is_empty() {
        debug!("No advisory models configured, consensus is a no-op.");
        return ConsensusResult::no_op();
    }

    let mut set: JoinSet<Option<(f64, AdvisoryVerdict)>> = JoinSet::new();
    for model in models {
        let model = model.clone();
        let digest = digest.clone();
        let multiplier_min = config.multiplier_min;
        let multiplier_max = config.multiplier_max;
        set.spawn(async move {
            let started = Instant::now();
            let budget = model.timeout();
            let outcome = tokio::time::timeout(budget, model.analyze(&digest)).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(Ok(response)) => {
                    // Sanitize before weighting: adversarial out-of-range
                    // values must not leak past the global bounds.
                    let verdict = AdvisoryVerdict {
                        model_id: model.id().to_string(),
                        lean: response.lean,
                        confidence: response.confidence.clamp(0.0, 100.0),
                        multiplier: response.multiplier.clamp(multiplier_min, multiplier_max),
                        reasoning: response.reasoning,
                        duration_ms,
                    };
                    debug!(model = model.id(), lean = %verdict.lean, multiplier = verdict.multiplier, "Model answered.");
                    Some((model.weight(), verdict))
                }
                Ok(Err(e)) => {
                    warn!(model = model.id(), error = %e, "Model call failed, omitting from consensus.");
                    None
                }
                Err(_) => {
                    warn!(model = model.id(), timeout = ?budget, "Model timed out, omitting from consensus.");
                    None
                }
            }
        });
    }

    let responses: Vec<(f64, AdvisoryVerdict)> =
        gather_within(&mut set, deadline).await.into_iter().flatten().collect();

    let result = fold(responses, config);
    info!(
        responders = result.verdicts.len(),
        final_multiplier = result.final_multiplier,
        agreement = result.agreement_rate,
        "Consensus finished."
    );
    result
}

/// Folds weighted verdicts into the consensus. Pure.
///
/// Weights are renormalized over the responders (divide by their weight sum,
/// not the configured total) and the result clamped into the global bounds.
pub fn fold(responses: Vec<(f64, AdvisoryVerdict)>, config: &ScanConfig) -> ConsensusResult {
    if responses.is_empty() {
        return ConsensusResult::no_op();
    }

    let weight_sum: f64 = responses.iter().map(|(w, _)| w.max(0.0)).sum();
    let final_multiplier = if weight_sum > 0.0 {
        responses.iter().map(|(w, v)| w.max(0.0) * v.multiplier).sum::<f64>() / weight_sum
    } else {
        // Degenerate all-zero weights: fall back to a plain mean.
        responses.iter().map(|(_, v)| v.multiplier).sum::<f64>() / responses.len() as f64
    }
    .clamp(config.multiplier_min, config.multiplier_max);

    let count = responses.len() as f64;
    let average_confidence = responses.iter().map(|(_, v)| v.confidence).sum::<f64>() / count;

    let tally = |lean: AdvisoryLean| responses.iter().filter(|(_, v)| v.lean == lean).count();
    let votes = [
        (AdvisoryLean::Increase, tally(AdvisoryLean::Increase)),
        (AdvisoryLean::Neutral, tally(AdvisoryLean::Neutral)),
        (AdvisoryLean::Decrease, tally(AdvisoryLean::Decrease)),
    ];
    let majority = votes.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let mut leaders = votes.iter().filter(|(_, n)| *n == majority).map(|(l, _)| *l);
    let lean = match (leaders.next(), leaders.next()) {
        (Some(single), None) => single,
        // A tied vote carries no direction.
        _ => AdvisoryLean::Neutral,
    };
    let agreement_rate = majority as f64 / count * 100.0;

    ConsensusResult {
        verdicts: responses.into_iter().map(|(_, v)| v).collect(),
        final_multiplier,
        agreement_rate,
        average_confidence,
        lean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ScanConfig;
    use crate::core::models::Severity;

    fn verdict(lean: AdvisoryLean, multiplier: f64, confidence: f64) -> AdvisoryVerdict {
        AdvisoryVerdict {
            model_id: "m".to_string(),
            lean,
            confidence,
            multiplier,
            reasoning: String::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn zero_responders_is_an_exact_no_op() {
        let config = ScanConfig::balanced();
        let result = fold(Vec::new(), &config);
        assert_eq!(result.final_multiplier, 1.0);
        assert_eq!(result.agreement_rate, 0.0);
        assert_eq!(result.lean, AdvisoryLean::Neutral);
        assert!(result.verdicts.is_empty());
    }

    #[test]
    fn weights_renormalize_over_responders() {
        let config = ScanConfig::balanced();
        let result = fold(
            vec![
                (1.0, verdict(AdvisoryLean::Neutral, 1.0, 80.0)),
                (3.0, verdict(AdvisoryLean::Increase, 2.0, 60.0)),
            ],
            &config,
        );
        // (1·1.0 + 3·2.0) / 4 = 1.75, not diluted by any absent model.
        assert!((result.final_multiplier - 1.75).abs() < 1e-9);
        assert!((result.average_confidence - 70.0).abs() < 1e-9);
    }

    #[test]
    fn final_multiplier_stays_within_global_bounds() {
        let config = ScanConfig::balanced();
        let result = fold(
            vec![
                (1.0, verdict(AdvisoryLean::Increase, 50.0, 99.0)),
                (1.0, verdict(AdvisoryLean::Increase, 3.5, 99.0)),
            ],
            &config,
        );
        assert!(result.final_multiplier <= config.multiplier_max);
        assert!(result.final_multiplier >= config.multiplier_min);
    }

    #[test]
    fn agreement_rate_reflects_majority_share() {
        let config = ScanConfig::balanced();
        let result = fold(
            vec![
                (1.0, verdict(AdvisoryLean::Increase, 1.5, 80.0)),
                (1.0, verdict(AdvisoryLean::Increase, 1.4, 70.0)),
                (1.0, verdict(AdvisoryLean::Decrease, 0.8, 60.0)),
            ],
            &config,
        );
        assert!((result.agreement_rate - (2.0 / 3.0 * 100.0)).abs() < 1e-9);
        assert_eq!(result.lean, AdvisoryLean::Increase);
    }

    #[test]
    fn tied_vote_has_no_direction() {
        let config = ScanConfig::balanced();
        let result = fold(
            vec![
                (1.0, verdict(AdvisoryLean::Increase, 1.5, 80.0)),
                (1.0, verdict(AdvisoryLean::Decrease, 0.8, 80.0)),
            ],
            &config,
        );
        assert_eq!(result.lean, AdvisoryLean::Neutral);
    }

    #[test]
    fn digest_ranks_findings_by_severity_then_points() {
        let config = ScanConfig::balanced();
        let fingerprint =
            crate::core::pipeline::fingerprint::fingerprint("https://example.com").expect("valid");
        let mut category = crate::core::models::CategoryResult::skipped(
            crate::core::models::CategoryId::UrlLexical,
            20,
        );
        category.findings = vec![
            crate::core::models::Finding::new("A", Severity::Info, 2, "info"),
            crate::core::models::Finding::new("B", Severity::Critical, 5, "critical small"),
            crate::core::models::Finding::new("C", Severity::Critical, 9, "critical big"),
            crate::core::models::Finding::new("D", Severity::Warning, 4, "warning"),
        ];
        let digest = build_digest(
            &fingerprint,
            PipelineMode::Full,
            &[category],
            &ReputationSummary::default(),
            &BaseScore::default(),
            &config,
        );
        let ids: Vec<_> = digest.top_findings.iter().map(|f| f.check_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B", "D", "A"]);
    }
}
