//! End-to-end pipeline tests with mock collaborators.
//!
//! These drive the whole orchestrator: probe classification, artifact
//! assembly, concurrent rule/reputation evaluation, advisory consensus,
//! legitimacy dampening, classification, and the scan cache.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use palisade_rs_scanner::core::config::ScanConfig;
use palisade_rs_scanner::core::error::{ModelError, SourceError};
use palisade_rs_scanner::core::models::{
    AdvisoryLean, AdvisoryResponse, CategoryStatus, DomainMetadata, FetchedContent, FindingsDigest,
    PipelineMode, ProbeReport, ReputationVerdict, RiskLevel, SourceVerdict, TlsInfo, UrlFingerprint,
};
use palisade_rs_scanner::core::pipeline::consensus::AdvisoryModel;
use palisade_rs_scanner::core::pipeline::fetch::{ContentFetcher, FetchOutcome};
use palisade_rs_scanner::core::pipeline::probe::ReachabilityProber;
use palisade_rs_scanner::core::pipeline::reputation::{ReputationQuery, ReputationSource};
use palisade_rs_scanner::core::{Collaborators, Scanner};

// --- Mock collaborators ---

struct StaticProber {
    report: ProbeReport,
    domain: Option<DomainMetadata>,
}

#[async_trait]
impl ReachabilityProber for StaticProber {
    async fn probe(&self, _host: &str, _port: Option<u16>) -> ProbeReport {
        self.report.clone()
    }

    async fn domain_metadata(&self, _host: &str) -> Option<DomainMetadata> {
        self.domain.clone()
    }
}

/// Prober that must never be called; proves a stage was short-circuited.
struct UnreachableProber;

#[async_trait]
impl ReachabilityProber for UnreachableProber {
    async fn probe(&self, host: &str, _port: Option<u16>) -> ProbeReport {
        panic!("prober must not be invoked for {host}");
    }
}

struct StaticFetcher {
    content: FetchedContent,
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, _fingerprint: &UrlFingerprint, _mode: PipelineMode) -> FetchOutcome {
        FetchOutcome::Fetched(self.content.clone())
    }
}

/// Fetcher that must never be called; proves content stages were skipped.
struct UnreachableFetcher;

#[async_trait]
impl ContentFetcher for UnreachableFetcher {
    async fn fetch(&self, fingerprint: &UrlFingerprint, _mode: PipelineMode) -> FetchOutcome {
        panic!("fetcher must not be invoked for {}", fingerprint.canonical_url);
    }
}

struct StaticSource {
    id: &'static str,
    verdict: ReputationVerdict,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ReputationSource for StaticSource {
    fn id(&self) -> &str {
        self.id
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(200)
    }

    async fn check(&self, _query: &ReputationQuery) -> Result<SourceVerdict, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(SourceVerdict { verdict: self.verdict, confidence: 92.0, details: None })
    }
}

struct StaticModel {
    id: &'static str,
    weight: f64,
    lean: AdvisoryLean,
    multiplier: f64,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AdvisoryModel for StaticModel {
    fn id(&self) -> &str {
        self.id
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(200)
    }

    async fn analyze(&self, _digest: &FindingsDigest) -> Result<AdvisoryResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AdvisoryResponse {
            lean: self.lean,
            confidence: 85.0,
            multiplier: self.multiplier,
            reasoning: "static test model".to_string(),
        })
    }
}

struct BrokenModel;

#[async_trait]
impl AdvisoryModel for BrokenModel {
    fn id(&self) -> &str {
        "broken"
    }

    fn weight(&self) -> f64 {
        1.0
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn analyze(&self, _digest: &FindingsDigest) -> Result<AdvisoryResponse, ModelError> {
        Err(ModelError::Transport("connection refused".to_string()))
    }
}

// --- Builders ---

fn reachable_probe(nameservers: &[&str]) -> ProbeReport {
    ProbeReport {
        resolved: true,
        ip: Some("192.0.2.10".to_string()),
        nameservers: nameservers.iter().map(|s| s.to_string()).collect(),
        tcp_open: true,
        http_status: Some(200),
        dns_failed: false,
        timed_out: false,
    }
}

fn security_headers() -> HashMap<String, String> {
    [
        ("strict-transport-security", "max-age=31536000"),
        ("content-security-policy", "default-src 'self'"),
        ("x-frame-options", "DENY"),
        ("x-content-type-options", "nosniff"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn long_lived_certificate() -> TlsInfo {
    let now = Utc::now();
    let not_before = now - ChronoDuration::days(200);
    let not_after = now + ChronoDuration::days(165);
    TlsInfo {
        subject: "CN=greenfield-books.com".to_string(),
        issuer: "CN=Example Trust CA".to_string(),
        not_before,
        not_after,
        days_until_expiry: 165,
        is_valid: true,
        self_signed: false,
    }
}

fn page(final_url: &str, body: &str, headers: HashMap<String, String>, tls: Option<TlsInfo>) -> FetchedContent {
    FetchedContent {
        status: 200,
        headers,
        body: body.to_string(),
        redirect_chain: Vec::new(),
        final_url: final_url.to_string(),
        tls,
        fetch_ms: 3,
    }
}

fn source(
    id: &'static str,
    verdict: ReputationVerdict,
    delay_ms: u64,
    calls: &Arc<AtomicUsize>,
) -> Arc<dyn ReputationSource> {
    Arc::new(StaticSource { id, verdict, delay: Duration::from_millis(delay_ms), calls: calls.clone() })
}

fn model(
    id: &'static str,
    lean: AdvisoryLean,
    multiplier: f64,
    calls: &Arc<AtomicUsize>,
) -> Arc<dyn AdvisoryModel> {
    Arc::new(StaticModel { id, weight: 1.0, lean, multiplier, calls: calls.clone() })
}

// --- Scenario A: established legitimate domain ---

#[tokio::test]
async fn established_legitimate_domain_classifies_safe() {
    let source_calls = Arc::new(AtomicUsize::new(0));
    let model_calls = Arc::new(AtomicUsize::new(0));

    let body = r#"<html><head><title>Greenfield Books</title></head>
        <body><p>Family-run bookshop. See our privacy policy or contact us.</p></body></html>"#;
    let collaborators = Collaborators {
        prober: Arc::new(StaticProber {
            report: reachable_probe(&["ava.ns.cloudflare.com.", "bob.ns.cloudflare.com."]),
            domain: Some(DomainMetadata {
                age_days: Some(1_500),
                registrar: Some("Example Registrar Inc.".to_string()),
                abuse_contact: Some("abuse@registrar.example".to_string()),
            }),
        }),
        fetcher: Arc::new(StaticFetcher {
            content: page(
                "https://greenfield-books.com/",
                body,
                security_headers(),
                Some(long_lived_certificate()),
            ),
        }),
        sources: vec![
            source("feed-a", ReputationVerdict::Safe, 0, &source_calls),
            source("feed-b", ReputationVerdict::Safe, 0, &source_calls),
        ],
        models: vec![model("advisor-1", AdvisoryLean::Neutral, 1.0, &model_calls)],
    };

    let scanner = Scanner::new(ScanConfig::balanced(), collaborators).expect("valid config");
    let outcome = scanner.scan("https://greenfield-books.com").await.expect("scan completes");
    let report = outcome.report;

    assert_eq!(report.mode, PipelineMode::Full);
    assert_eq!(report.reputation.score, 0);
    assert_eq!(report.reputation.error_count, 0);

    let consensus = report.consensus.as_ref().expect("consensus ran");
    assert!((consensus.final_multiplier - 1.0).abs() < 1e-9);

    let legitimacy = report.legitimacy.as_ref().expect("legitimacy ran");
    assert!(legitimacy.legitimacy_score >= 80, "score was {}", legitimacy.legitimacy_score);
    assert!((legitimacy.adjustment_multiplier - 0.5).abs() < 1e-9);

    assert_eq!(report.risk_level, RiskLevel::Safe);
}

// --- Scenario B: fresh credential-harvesting page ---

#[tokio::test]
async fn fresh_phishing_page_classifies_critical() {
    let source_calls = Arc::new(AtomicUsize::new(0));
    let model_calls = Arc::new(AtomicUsize::new(0));

    let body = r#"<html><head><title>PayPal Secure Login</title></head><body>
        <form action="http://198.51.100.7/collect">
          <input type="email" name="user-email">
          <input type="password" name="pass">
        </form></body></html>"#;
    let url = "http://secure-login-verify.example.top/account";
    let collaborators = Collaborators {
        prober: Arc::new(StaticProber {
            report: reachable_probe(&["ns1.freedns.example."]),
            domain: Some(DomainMetadata { age_days: Some(5), registrar: None, abuse_contact: None }),
        }),
        fetcher: Arc::new(StaticFetcher {
            content: page(url, body, HashMap::new(), None),
        }),
        sources: vec![
            source("feed-a", ReputationVerdict::Malicious, 0, &source_calls),
            source("feed-b", ReputationVerdict::Malicious, 0, &source_calls),
            source("feed-c", ReputationVerdict::Malicious, 0, &source_calls),
        ],
        models: vec![
            model("advisor-1", AdvisoryLean::Increase, 1.8, &model_calls),
            model("advisor-2", AdvisoryLean::Increase, 1.6, &model_calls),
            model("advisor-3", AdvisoryLean::Increase, 1.9, &model_calls),
        ],
    };

    let scanner = Scanner::new(ScanConfig::balanced(), collaborators).expect("valid config");
    let report = scanner.scan(url).await.expect("scan completes").report;

    assert_eq!(report.mode, PipelineMode::Full);
    assert_eq!(report.reputation.malicious_count, 3);

    let forms = report
        .categories
        .iter()
        .find(|c| c.name == "Credential Forms")
        .expect("forms category present");
    assert!(forms.findings.iter().any(|f| f.check_id == "FRM_CROSS_ORIGIN_PASSWORD"));
    assert_eq!(forms.score, forms.max_weight, "form battery should saturate");

    let consensus = report.consensus.as_ref().expect("consensus ran");
    assert_eq!(consensus.agreement_rate, 100.0);
    assert!(consensus.final_multiplier > 1.0);

    assert!(report.final_score <= report.base_score.active_max_score);
    assert_eq!(report.risk_level, RiskLevel::Critical);
}

// --- Scenario C: degraded collaborators ---

#[tokio::test]
async fn slow_source_is_flagged_and_scan_still_completes() {
    let source_calls = Arc::new(AtomicUsize::new(0));

    // Host resolves but never answers HTTP: partial mode, no fetch attempt.
    let collaborators = Collaborators {
        prober: Arc::new(StaticProber {
            report: ProbeReport {
                resolved: true,
                ip: Some("192.0.2.20".to_string()),
                nameservers: vec!["ns1.example.net.".to_string()],
                tcp_open: false,
                http_status: None,
                dns_failed: false,
                timed_out: false,
            },
            domain: None,
        }),
        fetcher: Arc::new(UnreachableFetcher),
        sources: vec![
            source("sluggish", ReputationVerdict::Malicious, 5_000, &source_calls),
            source("feed-a", ReputationVerdict::Safe, 0, &source_calls),
            source("feed-b", ReputationVerdict::Safe, 0, &source_calls),
        ],
        models: vec![Arc::new(BrokenModel)],
    };

    let started = std::time::Instant::now();
    let scanner = Scanner::new(ScanConfig::balanced(), collaborators).expect("valid config");
    let report = scanner.scan("https://quiet-host.example.net").await.expect("scan completes").report;

    assert!(started.elapsed() < Duration::from_secs(10), "must finish inside the latency budget");
    assert_eq!(report.mode, PipelineMode::Partial);

    // Only the two responders are counted on either side of the aggregate.
    assert_eq!(report.reputation.error_count, 1);
    assert_eq!(report.reputation.safe_count, 2);
    assert_eq!(report.reputation.score, 0);
    assert_eq!(report.reputation.max_score, scanner.config().points_per_source * 2);

    // Content-dependent categories were skipped, not zero-scored.
    for category in &report.categories {
        match category.name.as_str() {
            "URL Lexical Analysis" | "Domain & DNS Signals" => {
                assert_ne!(category.status, CategoryStatus::Skipped)
            }
            _ => assert_eq!(category.status, CategoryStatus::Skipped, "{}", category.name),
        }
    }

    // The lone advisory model failed: exact no-op fallback.
    let consensus = report.consensus.as_ref().expect("consensus ran");
    assert_eq!(consensus.final_multiplier, 1.0);
    assert_eq!(consensus.agreement_rate, 0.0);
    assert!(consensus.verdicts.is_empty());
}

// --- Tombstone short-circuit ---

#[tokio::test]
async fn tombstoned_domain_short_circuits_before_any_work() {
    let mut config = ScanConfig::balanced();
    config.tombstones = vec!["evil-sinkhole.example".to_string()];

    // Both network collaborators panic on use: the pre-check must fire first.
    let collaborators = Collaborators {
        prober: Arc::new(UnreachableProber),
        fetcher: Arc::new(UnreachableFetcher),
        sources: Vec::new(),
        models: Vec::new(),
    };

    let scanner = Scanner::new(config, collaborators).expect("valid config");
    let report =
        scanner.scan("https://login.evil-sinkhole.example/verify").await.expect("scan completes").report;

    assert!(report.cache.short_circuited);
    assert_eq!(report.risk_level, RiskLevel::Critical);
    assert_eq!(report.risk_percentage, 100.0);
    assert_eq!(report.reputation.sources.len(), 1);
    assert_eq!(report.reputation.sources[0].source_id, "tombstone");
    assert!(report.consensus.is_none());
    assert!(report.categories.is_empty());
}

// --- Caching ---

fn cacheable_scanner(
    source_calls: &Arc<AtomicUsize>,
    model_calls: &Arc<AtomicUsize>,
) -> Scanner {
    let collaborators = Collaborators {
        prober: Arc::new(StaticProber { report: reachable_probe(&["ns1.example.com."]), domain: None }),
        fetcher: Arc::new(StaticFetcher {
            content: page("https://example.com/", "<html></html>", security_headers(), None),
        }),
        sources: vec![source("feed-a", ReputationVerdict::Safe, 0, source_calls)],
        models: vec![model("advisor-1", AdvisoryLean::Neutral, 1.0, model_calls)],
    };
    Scanner::new(ScanConfig::balanced(), collaborators).expect("valid config")
}

#[tokio::test]
async fn repeated_scan_within_ttl_reuses_report_and_collaborators_stay_idle() {
    let source_calls = Arc::new(AtomicUsize::new(0));
    let model_calls = Arc::new(AtomicUsize::new(0));
    let scanner = cacheable_scanner(&source_calls, &model_calls);

    let first = scanner.scan("https://example.com").await.expect("first scan");
    assert!(!first.from_cache);

    // A different spelling of the same canonical URL must hit the cache too.
    let second = scanner.scan("https://EXAMPLE.com:443/").await.expect("second scan");
    assert!(second.from_cache);
    assert_eq!(first.report.scan_id, second.report.scan_id);

    assert_eq!(source_calls.load(Ordering::SeqCst), 1, "reputation queried exactly once");
    assert_eq!(model_calls.load(Ordering::SeqCst), 1, "advisory queried exactly once");
}

#[tokio::test]
async fn concurrent_first_time_scans_share_one_computation() {
    let source_calls = Arc::new(AtomicUsize::new(0));
    let model_calls = Arc::new(AtomicUsize::new(0));
    let scanner = Arc::new(cacheable_scanner(&source_calls, &model_calls));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let scanner = scanner.clone();
        handles.push(tokio::spawn(async move {
            scanner.scan("https://example.com").await.expect("scan completes")
        }));
    }

    let mut scan_ids = Vec::new();
    for handle in handles {
        scan_ids.push(handle.await.expect("task joins").report.scan_id.clone());
    }

    scan_ids.dedup();
    assert_eq!(scan_ids.len(), 1, "all callers saw the same report");
    assert_eq!(source_calls.load(Ordering::SeqCst), 1, "one underlying computation");
    assert_eq!(model_calls.load(Ordering::SeqCst), 1);
}

// --- Validation surface ---

#[tokio::test]
async fn malformed_urls_are_rejected_without_creating_a_scan() {
    let collaborators = Collaborators {
        prober: Arc::new(UnreachableProber),
        fetcher: Arc::new(UnreachableFetcher),
        sources: Vec::new(),
        models: Vec::new(),
    };
    let scanner = Scanner::new(ScanConfig::fast(), collaborators).expect("valid config");

    assert!(scanner.scan("not a url at all").await.is_err());
    assert!(scanner.scan("ftp://example.com/file").await.is_err());
    assert!(scanner.scan("").await.is_err());
}
