// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Shared enums ---

/// Severity level attached to a finding.
///
/// Declaration order is semantic: `Info < Warning < Critical`. The digest
/// builder relies on this ordering when ranking findings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Degree of fetched artifacts available for a scan.
///
/// `Full` means the page content was (or can be) fetched, `Partial` means DNS
/// resolved but the host was not reachable over HTTP, `Minimal` means even
/// DNS resolution failed and only the URL string itself can be analyzed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineMode {
    Full,
    Partial,
    Minimal,
}

/// Discrete risk tier emitted by the classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

/// Identifier for a rule category. The human-readable name lives in the
/// `Display` impl; the serialized form is the snake_case id used in reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CategoryId {
    UrlLexical,
    DomainSignals,
    TlsCertificate,
    Content,
    Forms,
    Redirects,
    Headers,
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryId::UrlLexical => write!(f, "URL Lexical Analysis"),
            CategoryId::DomainSignals => write!(f, "Domain & DNS Signals"),
            CategoryId::TlsCertificate => write!(f, "TLS Certificate"),
            CategoryId::Content => write!(f, "Page Content"),
            CategoryId::Forms => write!(f, "Credential Forms"),
            CategoryId::Redirects => write!(f, "Redirect Behaviour"),
            CategoryId::Headers => write!(f, "HTTP Security Headers"),
        }
    }
}

// --- URL fingerprint ---

/// Canonical breakdown of a submitted URL.
///
/// Immutable once computed. The `content_hash` keys the scan cache and the
/// tombstone pre-check, so two spellings of the same URL share one scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlFingerprint {
    pub canonical_url: String,
    /// Hex SHA-256 of the canonical URL string.
    pub content_hash: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
}

// --- Reachability ---

/// Terminal state of the reachability state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
    Timeout,
    DnsFailed,
}

/// Raw facts gathered by a reachability probe, before classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeReport {
    pub resolved: bool,
    pub ip: Option<String>,
    pub nameservers: Vec<String>,
    pub tcp_open: bool,
    pub http_status: Option<u16>,
    pub dns_failed: bool,
    pub timed_out: bool,
}

/// Classified reachability result. Created once per scan, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityReport {
    pub outcome: ProbeOutcome,
    pub ip: Option<String>,
    pub nameservers: Vec<String>,
    pub tcp_open: bool,
    pub http_status: Option<u16>,
    pub mode: PipelineMode,
    pub duration_ms: u64,
}

// --- Fetched artifacts ---

/// DNS facts carried into the artifact snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsInfo {
    pub ip: Option<String>,
    pub nameservers: Vec<String>,
}

/// Parsed TLS certificate facts for the target host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub is_valid: bool,
    pub self_signed: bool,
}

/// Registration facts for the target domain, when a collaborator supplies
/// them. Absent data marks the dependent checks as unavailable rather than
/// scoring them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub age_days: Option<i64>,
    pub registrar: Option<String>,
    pub abuse_contact: Option<String>,
}

/// A successfully fetched page: status, headers (lowercased names), body,
/// the redirect chain that led to it, and TLS facts observed on the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedContent {
    pub status: u16,
    pub headers: std::collections::HashMap<String, String>,
    pub body: String,
    /// URLs visited before the final one; empty when nothing redirected.
    pub redirect_chain: Vec<String>,
    /// Where the chain actually landed.
    pub final_url: String,
    pub tls: Option<TlsInfo>,
    pub fetch_ms: u64,
}

/// Immutable snapshot of everything the rule engine may look at.
///
/// Every check is a pure function over this value, so evaluation order and
/// concurrency cannot change any category result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSnapshot {
    pub fingerprint: UrlFingerprint,
    pub mode: PipelineMode,
    pub dns: Option<DnsInfo>,
    pub content: Option<FetchedContent>,
    pub domain: Option<DomainMetadata>,
}

impl ArtifactSnapshot {
    /// TLS facts travel inside the fetched content; this is the accessor the
    /// certificate checks use.
    pub fn tls(&self) -> Option<&TlsInfo> {
        self.content.as_ref().and_then(|c| c.tls.as_ref())
    }
}

// --- Findings ---

/// Structured detail attached to a finding. A closed set of shapes rather
/// than a free-form map, so consumers can match on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingDetail {
    MatchedPattern { pattern: String },
    FormTarget { action: String },
    DomainAge { days: i64 },
    CertificateWindow { not_before: DateTime<Utc>, not_after: DateTime<Utc> },
    RedirectHops { hops: u32 },
    Header { name: String },
    Count { value: u32 },
}

/// A single rule-check finding. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub check_id: String,
    pub severity: Severity,
    pub points: u32,
    pub message: String,
    pub detail: Option<FindingDetail>,
}

impl Finding {
    pub fn new(check_id: &str, severity: Severity, points: u32, message: impl Into<String>) -> Self {
        Self {
            check_id: check_id.to_string(),
            severity,
            points,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: FindingDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Execution status of one rule category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    /// All checks ran.
    Ok,
    /// At least one check failed; its points were dropped, the rest counted.
    Partial,
    /// Required artifacts were unavailable; excluded from the score entirely.
    Skipped,
}

/// Result of evaluating one rule category.
/// Invariant: `score == min(max_weight, Σ finding points)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResult {
    pub id: CategoryId,
    pub name: String,
    pub score: u32,
    pub max_weight: u32,
    pub findings: Vec<Finding>,
    pub status: CategoryStatus,
    pub failed_checks: u32,
    pub duration_ms: u64,
}

impl CategoryResult {
    /// A category whose artifacts were unavailable. Carries no score and is
    /// excluded from the active maximum.
    pub fn skipped(id: CategoryId, max_weight: u32) -> Self {
        Self {
            id,
            name: id.to_string(),
            score: 0,
            max_weight,
            findings: Vec::new(),
            status: CategoryStatus::Skipped,
            failed_checks: 0,
            duration_ms: 0,
        }
    }
}

// --- Reputation ---

/// Verdict reported by (or derived for) one reputation source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReputationVerdict {
    Safe,
    Suspicious,
    Malicious,
    /// Timeout or transport failure. Contributes 0 points and is excluded
    /// from the verdict tallies and the active maximum.
    Error,
}

/// What a reputation source actually answers with, before point mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVerdict {
    pub verdict: ReputationVerdict,
    pub confidence: f64,
    pub details: Option<String>,
}

/// Point-mapped outcome of a single source query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationSourceResult {
    pub source_id: String,
    pub verdict: ReputationVerdict,
    pub score: u32,
    pub confidence: f64,
    pub duration_ms: u64,
}

/// Fan-in of all configured reputation sources.
///
/// `max_score` counts only sources that actually responded, which keeps the
/// scan's active maximum honest about what was evaluated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub sources: Vec<ReputationSourceResult>,
    pub score: u32,
    pub max_score: u32,
    pub malicious_count: u32,
    pub suspicious_count: u32,
    pub safe_count: u32,
    pub error_count: u32,
}

// --- Scoring ---

/// Pure combination of category and reputation scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseScore {
    pub category_score: u32,
    pub category_max: u32,
    pub reputation_score: u32,
    pub reputation_max: u32,
    /// Sum of the maxima of categories and sources actually evaluated.
    pub active_max_score: u32,
    pub base_percentage: f64,
}

// --- Advisory consensus ---

/// Direction an advisory model leans for the final score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdvisoryLean {
    Increase,
    Neutral,
    Decrease,
}

/// Raw answer from an advisory model, before sanitization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub lean: AdvisoryLean,
    pub confidence: f64,
    pub multiplier: f64,
    pub reasoning: String,
}

/// Sanitized verdict of one responding advisory model. Non-responding models
/// are simply absent, never defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryVerdict {
    pub model_id: String,
    pub lean: AdvisoryLean,
    pub confidence: f64,
    pub multiplier: f64,
    pub reasoning: String,
    pub duration_ms: u64,
}

/// Weighted consensus over the responding advisory models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub verdicts: Vec<AdvisoryVerdict>,
    pub final_multiplier: f64,
    pub agreement_rate: f64,
    pub average_confidence: f64,
    pub lean: AdvisoryLean,
}

impl ConsensusResult {
    /// The exact no-op used when zero models respond: the scan must never
    /// fail purely because advisory models were unreachable.
    pub fn no_op() -> Self {
        Self {
            verdicts: Vec::new(),
            final_multiplier: 1.0,
            agreement_rate: 0.0,
            average_confidence: 0.0,
            lean: AdvisoryLean::Neutral,
        }
    }
}

// --- Legitimacy ---

/// One granted trust signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegitimacySignal {
    pub name: String,
    pub points: u32,
}

/// Additive trust assessment used to dampen likely false positives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegitimacyAssessment {
    pub signals: Vec<LegitimacySignal>,
    /// `min(100, Σ signal points)`.
    pub legitimacy_score: u32,
    /// Monotonic non-increasing in `legitimacy_score`.
    pub adjustment_multiplier: f64,
}

// --- Digest handed to advisory models ---

/// Compressed finding used inside the digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestFinding {
    pub check_id: String,
    pub severity: Severity,
    pub points: u32,
    pub message: String,
}

/// Compact summary of a scan-in-progress, dispatched to advisory models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsDigest {
    pub canonical_url: String,
    pub mode: PipelineMode,
    pub top_findings: Vec<DigestFinding>,
    pub malicious_count: u32,
    pub suspicious_count: u32,
    pub safe_count: u32,
    pub error_count: u32,
    pub base_score: u32,
    pub active_max_score: u32,
    pub base_percentage: f64,
}

// --- Final report ---

/// Wall-clock spent per pipeline stage, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub probe_ms: u64,
    pub fetch_ms: u64,
    pub rules_ms: u64,
    pub reputation_ms: u64,
    pub consensus_ms: u64,
    pub legitimacy_ms: u64,
    pub total_ms: u64,
}

/// Cache bookkeeping recorded on the report at build time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheInfo {
    /// True when the scan terminated in the tombstone pre-check.
    pub short_circuited: bool,
    pub ttl_secs: u64,
}

/// The single immutable record this core exposes to callers.
///
/// Assembled by the orchestrator, frozen at completion, and served from the
/// cache for identical requests within the TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub fingerprint: UrlFingerprint,
    pub mode: PipelineMode,
    pub reachability: Option<ReachabilityReport>,
    pub categories: Vec<CategoryResult>,
    pub reputation: ReputationSummary,
    pub base_score: BaseScore,
    pub consensus: Option<ConsensusResult>,
    pub legitimacy: Option<LegitimacyAssessment>,
    pub final_score: u32,
    pub risk_percentage: f64,
    pub risk_level: RiskLevel,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub timings: StageTimings,
    pub cache: CacheInfo,
}
