// src/core/pipeline/rules.rs

//! The category rule engine.
//!
//! Eligible categories evaluate concurrently over one shared immutable
//! artifact snapshot; within a category, checks run in catalogue order. A
//! failing check contributes 0 points and marks its category `partial`; it
//! never aborts the category or its siblings. Skipped categories (artifacts
//! unavailable for the pipeline mode) are excluded from both sides of the
//! score, shrinking the active maximum.

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::config::{ArtifactRequirement, ScanConfig};
use crate::core::models::{ArtifactSnapshot, CategoryResult, CategoryStatus, PipelineMode};
use crate::core::pipeline::checks::{self, CategoryDef};
use crate::core::pipeline::gather_within;

/// Whether a category's artifact requirement is satisfiable in `mode`.
pub fn eligible(requires: ArtifactRequirement, mode: PipelineMode) -> bool {
    match requires {
        ArtifactRequirement::UrlOnly => true,
        ArtifactRequirement::Dns => mode != PipelineMode::Minimal,
        ArtifactRequirement::Content => mode == PipelineMode::Full,
    }
}

/// Evaluates every check of one category against the snapshot.
///
/// Pure over (definition, weight, snapshot); the invariant
/// `score == min(max_weight, Σ finding points)` holds by construction.
pub fn evaluate_category(
    def: &CategoryDef,
    max_weight: u32,
    snapshot: &ArtifactSnapshot,
) -> CategoryResult {
    let started = Instant::now();
    let mut findings = Vec::new();
    let mut failed_checks = 0u32;

    for check in def.checks {
        match (check.run)(snapshot) {
            Ok(Some(mut finding)) => {
                if finding.points > check.max_points {
                    finding.points = check.max_points;
                }
                debug!(check = check.id, points = finding.points, "Check matched.");
                findings.push(finding);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(check = check.id, error = %e, "Check failed, contributing 0 points.");
                failed_checks += 1;
            }
        }
    }

    let raw: u32 = findings.iter().map(|f| f.points).sum();
    let score = raw.min(max_weight);
    let status = if failed_checks > 0 { CategoryStatus::Partial } else { CategoryStatus::Ok };

    CategoryResult {
        id: def.id,
        name: def.id.to_string(),
        score,
        max_weight,
        findings,
        status,
        failed_checks,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Fans the configured categories out over the snapshot and joins them.
///
/// Categories still running at the stage deadline are abandoned and reported
/// as skipped, so the active maximum only counts what actually evaluated.
/// Results come back in configuration order regardless of completion order.
pub async fn run_categories(
    snapshot: Arc<ArtifactSnapshot>,
    config: &ScanConfig,
    deadline: tokio::time::Instant,
) -> Vec<CategoryResult> {
    let mut results: Vec<CategoryResult> = Vec::with_capacity(config.categories.len());
    let mut set: JoinSet<CategoryResult> = JoinSet::new();
    let mut spawned = Vec::new();

    for category in &config.categories {
        let Some(def) = checks::category_def(category.id) else {
            warn!(category = %category.id, "Configured category has no catalogue entry.");
            continue;
        };
        if !eligible(def.requires, snapshot.mode) {
            debug!(category = %category.id, mode = %snapshot.mode, "Category skipped: artifacts unavailable.");
            results.push(CategoryResult::skipped(category.id, category.max_weight));
            continue;
        }
        let snapshot = snapshot.clone();
        let max_weight = category.max_weight;
        spawned.push((category.id, max_weight));
        set.spawn(async move { evaluate_category(def, max_weight, &snapshot) });
    }

    let gathered = gather_within(&mut set, deadline).await;
    for (id, max_weight) in spawned {
        if !gathered.iter().any(|r| r.id == id) {
            warn!(category = %id, "Category cut off by stage deadline, treating as skipped.");
            results.push(CategoryResult::skipped(id, max_weight));
        }
    }
    results.extend(gathered);

    // Stable, configuration-defined ordering for the report.
    let order: Vec<_> = config.categories.iter().map(|c| c.id).collect();
    results.sort_by_key(|r| order.iter().position(|id| *id == r.id).unwrap_or(usize::MAX));

    info!(
        evaluated = results.iter().filter(|r| r.status != CategoryStatus::Skipped).count(),
        skipped = results.iter().filter(|r| r.status == CategoryStatus::Skipped).count(),
        "Rule engine finished."
    );
    results
}
