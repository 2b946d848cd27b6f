// src/core/pipeline/score.rs

//! Base scoring and risk classification. Everything here is a pure function;
//! the orchestrator threads the values through the stage sequence.

use tracing::debug;

use crate::core::config::RiskThreshold;
use crate::core::models::{
    BaseScore, CategoryResult, CategoryStatus, ReputationSummary, RiskLevel,
};

/// Combines category and reputation scores against the maxima of what was
/// actually evaluated. Skipped categories count on neither side.
pub fn combine_base(categories: &[CategoryResult], reputation: &ReputationSummary) -> BaseScore {
    let evaluated = categories.iter().filter(|c| c.status != CategoryStatus::Skipped);
    let (category_score, category_max) =
        evaluated.fold((0u32, 0u32), |(score, max), c| (score + c.score, max + c.max_weight));

    let active_max_score = category_max + reputation.max_score;
    let base = category_score + reputation.score;
    let base_percentage = if active_max_score == 0 {
        0.0
    } else {
        base as f64 / active_max_score as f64 * 100.0
    };

    debug!(base, active_max_score, base_percentage, "Base score combined.");
    BaseScore {
        category_score,
        category_max,
        reputation_score: reputation.score,
        reputation_max: reputation.max_score,
        active_max_score,
        base_percentage,
    }
}

/// Applies the consensus and legitimacy multipliers to the base score.
/// Rounds exactly once and clamps into `[0, active_max_score]`.
pub fn apply_adjustments(
    base: &BaseScore,
    consensus_multiplier: f64,
    adjustment_multiplier: f64,
) -> u32 {
    let raw = (base.category_score + base.reputation_score) as f64;
    let adjusted = (raw * consensus_multiplier * adjustment_multiplier).round();
    (adjusted.max(0.0) as u32).min(base.active_max_score)
}

/// Maps the final score to a percentage and a discrete tier.
///
/// Thresholds are tested from the most severe tier downward and a value
/// exactly at a threshold enters the higher-severity tier.
pub fn classify(
    final_score: u32,
    active_max_score: u32,
    thresholds: &[RiskThreshold],
) -> (f64, RiskLevel) {
    let percentage = if active_max_score == 0 {
        0.0
    } else {
        final_score as f64 / active_max_score as f64 * 100.0
    };
    let level = thresholds
        .iter()
        .find(|row| percentage >= row.min_percentage)
        .map(|row| row.level)
        .unwrap_or(RiskLevel::Safe);
    (percentage, level)
}
