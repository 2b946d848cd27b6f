// src/core/config.rs

//! Immutable scan configuration.
//!
//! The orchestrator takes a `ScanConfig` value at scan start instead of
//! reading global state, so multiple named presets can run and be tested
//! side by side. Presets only vary budgets and thresholds; the category
//! catalogue itself (which checks exist, what artifacts they need) is static
//! data in `pipeline::checks`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::models::{CategoryId, RiskLevel};

/// Hard ceiling on the overall scan deadline. `validated()` clamps to this.
pub const DEADLINE_CAP: Duration = Duration::from_secs(60);

/// Artifact slice a category needs before it is eligible to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRequirement {
    /// Only the URL string itself; runs in every pipeline mode.
    UrlOnly,
    /// Needs resolved DNS; runs under full and partial modes.
    Dns,
    /// Needs fetched page content; runs under full mode only.
    Content,
}

/// Weight assignment for one rule category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: CategoryId,
    pub max_weight: u32,
}

/// One row of the legitimacy-score → dampening-multiplier table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegitimacyThreshold {
    pub min_score: u32,
    pub multiplier: f64,
}

/// One row of the risk-percentage → tier table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThreshold {
    pub min_percentage: f64,
    pub level: RiskLevel,
}

/// Per-stage shares of the overall deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    pub overall: Duration,
    pub probe: Duration,
    pub fetch: Duration,
    /// Shared by the rule engine and the reputation aggregator, which run
    /// concurrently.
    pub evaluate: Duration,
    pub consensus: Duration,
}

/// Complete, immutable configuration for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub preset: String,
    pub categories: Vec<CategoryConfig>,
    /// Points a source contributes on a `malicious` verdict; also the
    /// per-source share of the reputation maximum.
    pub points_per_source: u32,
    pub suspicious_points: u32,
    /// Global bounds every advisory multiplier is clamped into.
    pub multiplier_min: f64,
    pub multiplier_max: f64,
    /// How many findings the advisory digest carries at most.
    pub digest_top_findings: usize,
    pub legitimacy_thresholds: Vec<LegitimacyThreshold>,
    pub risk_thresholds: Vec<RiskThreshold>,
    pub deadline: DeadlineConfig,
    pub cache_ttl: Duration,
    /// Authoritative already-confirmed domains. A hit short-circuits the
    /// whole pipeline with a terminal critical verdict.
    pub tombstones: Vec<String>,
}

impl ScanConfig {
    /// The default preset: ~10s overall budget, standard thresholds.
    pub fn balanced() -> Self {
        Self {
            preset: "balanced".to_string(),
            categories: default_categories(),
            points_per_source: 25,
            suspicious_points: 10,
            multiplier_min: 0.5,
            multiplier_max: 2.0,
            digest_top_findings: 10,
            legitimacy_thresholds: default_legitimacy_thresholds(),
            risk_thresholds: vec![
                RiskThreshold { min_percentage: 80.0, level: RiskLevel::Critical },
                RiskThreshold { min_percentage: 60.0, level: RiskLevel::High },
                RiskThreshold { min_percentage: 30.0, level: RiskLevel::Medium },
                RiskThreshold { min_percentage: 15.0, level: RiskLevel::Low },
            ],
            deadline: DeadlineConfig {
                overall: Duration::from_secs(10),
                probe: Duration::from_secs(3),
                fetch: Duration::from_secs(4),
                evaluate: Duration::from_secs(4),
                consensus: Duration::from_secs(3),
            },
            cache_ttl: Duration::from_secs(15 * 60),
            tombstones: Vec::new(),
        }
    }

    /// Lower tier thresholds and a roomier budget: flags earlier, waits
    /// longer for slow collaborators.
    pub fn strict() -> Self {
        let mut config = Self::balanced();
        config.preset = "strict".to_string();
        config.risk_thresholds = vec![
            RiskThreshold { min_percentage: 75.0, level: RiskLevel::Critical },
            RiskThreshold { min_percentage: 50.0, level: RiskLevel::High },
            RiskThreshold { min_percentage: 25.0, level: RiskLevel::Medium },
            RiskThreshold { min_percentage: 10.0, level: RiskLevel::Low },
        ];
        config.deadline = DeadlineConfig {
            overall: Duration::from_secs(20),
            probe: Duration::from_secs(5),
            fetch: Duration::from_secs(8),
            evaluate: Duration::from_secs(8),
            consensus: Duration::from_secs(6),
        };
        config
    }

    /// Tight budgets for latency-sensitive callers; scoring thresholds stay
    /// at the balanced defaults.
    pub fn fast() -> Self {
        let mut config = Self::balanced();
        config.preset = "fast".to_string();
        config.digest_top_findings = 5;
        config.deadline = DeadlineConfig {
            overall: Duration::from_secs(5),
            probe: Duration::from_secs(1),
            fetch: Duration::from_secs(2),
            evaluate: Duration::from_secs(2),
            consensus: Duration::from_secs(1),
        };
        config
    }

    /// Checks the invariants the scoring stages rely on and clamps the
    /// overall deadline to the hard cap. Returns the normalized config.
    pub fn validated(mut self) -> Result<Self, String> {
        if self.categories.is_empty() {
            return Err("no rule categories configured".to_string());
        }
        if self.multiplier_min > self.multiplier_max {
            return Err(format!(
                "multiplier bounds inverted: {} > {}",
                self.multiplier_min, self.multiplier_max
            ));
        }
        // The legitimacy table must be ordered and monotonic non-increasing:
        // higher legitimacy may never raise the score.
        let mut previous: Option<&LegitimacyThreshold> = None;
        for row in &self.legitimacy_thresholds {
            if let Some(prev) = previous {
                if row.min_score >= prev.min_score {
                    return Err("legitimacy thresholds must descend by min_score".to_string());
                }
                if row.multiplier < prev.multiplier {
                    return Err("legitimacy multipliers must be non-increasing in score".to_string());
                }
            }
            previous = Some(row);
        }
        let mut previous: Option<&RiskThreshold> = None;
        for row in &self.risk_thresholds {
            if let Some(prev) = previous {
                if row.min_percentage >= prev.min_percentage {
                    return Err("risk thresholds must descend by min_percentage".to_string());
                }
            }
            previous = Some(row);
        }
        if self.deadline.overall > DEADLINE_CAP {
            self.deadline.overall = DEADLINE_CAP;
        }
        Ok(self)
    }
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig { id: CategoryId::UrlLexical, max_weight: 20 },
        CategoryConfig { id: CategoryId::DomainSignals, max_weight: 15 },
        CategoryConfig { id: CategoryId::TlsCertificate, max_weight: 15 },
        CategoryConfig { id: CategoryId::Content, max_weight: 20 },
        CategoryConfig { id: CategoryId::Forms, max_weight: 25 },
        CategoryConfig { id: CategoryId::Redirects, max_weight: 10 },
        CategoryConfig { id: CategoryId::Headers, max_weight: 5 },
    ]
}

fn default_legitimacy_thresholds() -> Vec<LegitimacyThreshold> {
    vec![
        LegitimacyThreshold { min_score: 80, multiplier: 0.5 },
        LegitimacyThreshold { min_score: 60, multiplier: 0.7 },
        LegitimacyThreshold { min_score: 40, multiplier: 0.85 },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_pass_validation() {
        assert!(ScanConfig::balanced().validated().is_ok());
        assert!(ScanConfig::strict().validated().is_ok());
        assert!(ScanConfig::fast().validated().is_ok());
    }

    #[test]
    fn validation_rejects_non_monotonic_legitimacy_table() {
        let mut config = ScanConfig::balanced();
        // A higher legitimacy score must never map to a larger multiplier.
        config.legitimacy_thresholds = vec![
            LegitimacyThreshold { min_score: 80, multiplier: 0.9 },
            LegitimacyThreshold { min_score: 60, multiplier: 0.5 },
        ];
        assert!(config.validated().is_err());
    }

    #[test]
    fn validation_clamps_overall_deadline_to_cap() {
        let mut config = ScanConfig::balanced();
        config.deadline.overall = Duration::from_secs(600);
        let config = config.validated().expect("valid config");
        assert_eq!(config.deadline.overall, DEADLINE_CAP);
    }

    #[test]
    fn validation_rejects_inverted_multiplier_bounds() {
        let mut config = ScanConfig::balanced();
        config.multiplier_min = 3.0;
        assert!(config.validated().is_err());
    }
}
