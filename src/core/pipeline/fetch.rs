// src/core/pipeline/fetch.rs

//! Content fetching and artifact snapshot assembly.
//!
//! The fetcher is a collaborator contract that never throws: it always
//! returns a tagged outcome. A total failure to fetch the target content
//! does not fail the scan; the orchestrator downgrades the pipeline mode to
//! partial and proceeds with a smaller active maximum.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};
use x509_parser::prelude::*;

use crate::core::error::FetchError;
use crate::core::models::{
    ArtifactSnapshot, DnsInfo, DomainMetadata, FetchedContent, PipelineMode, ReachabilityReport,
    TlsInfo, UrlFingerprint,
};

/// Tagged fetch result; the fetcher contract never errors.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedContent),
    Failed(FetchError),
}

/// Collaborator contract for fetching the target page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, fingerprint: &UrlFingerprint, mode: PipelineMode) -> FetchOutcome;
}

/// Production fetcher: follows redirects manually (the chain itself is an
/// analyzed artifact) and inspects the TLS certificate out-of-band.
pub struct HttpFetcher {
    timeout: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, max_redirects: 10, max_body_bytes: 2 * 1024 * 1024 }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, fingerprint: &UrlFingerprint, mode: PipelineMode) -> FetchOutcome {
        let started = Instant::now();
        info!(url = %fingerprint.canonical_url, %mode, "Fetching target content.");

        let client = match reqwest::Client::builder()
            .user_agent("PalisadeRS/0.1")
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()
        {
            Ok(c) => c,
            Err(e) => return FetchOutcome::Failed(FetchError::Connect(e.to_string())),
        };

        // Follow redirects by hand so the chain is observable.
        let mut chain: Vec<String> = Vec::new();
        let mut current = fingerprint.canonical_url.clone();
        let response = loop {
            let response = match client.get(&current).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return FetchOutcome::Failed(FetchError::Timeout(self.timeout));
                }
                Err(e) => return FetchOutcome::Failed(FetchError::Connect(e.to_string())),
            };

            if response.status().is_redirection() && chain.len() < self.max_redirects {
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| response.url().join(loc).ok());
                if let Some(next) = location {
                    debug!(from = %current, to = %next, "Following redirect.");
                    chain.push(current.clone());
                    current = next.to_string();
                    continue;
                }
            }
            break response;
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
            })
            .collect();

        let mut body = match response.text().await {
            Ok(text) => text,
            Err(e) => return FetchOutcome::Failed(FetchError::Body(e.to_string())),
        };
        if body.len() > self.max_body_bytes {
            body.truncate(self.max_body_bytes);
        }

        let tls = if fingerprint.scheme == "https" {
            inspect_certificate(&fingerprint.host, fingerprint.port.unwrap_or(443)).await
        } else {
            None
        };

        let fetch_ms = started.elapsed().as_millis() as u64;
        info!(status, bytes = body.len(), redirects = chain.len(), fetch_ms, "Fetch finished.");
        FetchOutcome::Fetched(FetchedContent {
            status,
            headers,
            body,
            redirect_chain: chain,
            final_url: current,
            tls,
            fetch_ms,
        })
    }
}

/// Connects and parses the peer certificate on a blocking thread.
///
/// Certificate facts are enrichment: any failure here logs and yields `None`
/// rather than degrading the fetch.
async fn inspect_certificate(host: &str, port: u16) -> Option<TlsInfo> {
    let host = host.to_string();
    let result = spawn_blocking(move || perform_tls_inspection(&host, port)).await;
    match result {
        Ok(Ok(info)) => Some(info),
        Ok(Err(e)) => {
            warn!(error = %e, "Certificate inspection failed.");
            None
        }
        Err(e) => {
            warn!(panic = %e, "Certificate inspection task panicked.");
            None
        }
    }
}

fn perform_tls_inspection(host: &str, port: u16) -> Result<TlsInfo, String> {
    debug!(host, port, "Performing TLS handshake for certificate inspection.");
    // Invalid certificates are exactly what the rule engine wants to see,
    // so verification is disabled for this inspection connection.
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| format!("TlsConnector error: {e}"))?;

    let stream = TcpStream::connect((host, port)).map_err(|e| format!("TCP error: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(4)))
        .map_err(|e| format!("socket error: {e}"))?;
    let stream = connector.connect(host, stream).map_err(|e| format!("handshake error: {e}"))?;

    let cert = stream
        .peer_certificate()
        .map_err(|e| format!("could not get peer certificate: {e}"))?
        .ok_or_else(|| "server provided no certificate".to_string())?;
    let der = cert.to_der().map_err(|e| format!("DER conversion error: {e}"))?;
    let (_, x509) = parse_x509_certificate(&der).map_err(|e| format!("X.509 parse error: {e}"))?;

    let validity = x509.validity();
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);
    let now = Utc::now();

    let subject = x509.subject().to_string();
    let issuer = x509.issuer().to_string();
    Ok(TlsInfo {
        self_signed: subject == issuer,
        subject,
        issuer,
        not_before,
        not_after,
        days_until_expiry: not_after.signed_duration_since(now).num_days(),
        is_valid: now > not_before && now < not_after,
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Builds the immutable artifact snapshot for the rule engine.
///
/// Returns the snapshot plus the fetch duration. When the mode is full but
/// the fetch fails or exceeds its budget, the snapshot comes back in partial
/// mode with no content: the scan proceeds, the content categories skip.
pub async fn assemble(
    fingerprint: &UrlFingerprint,
    reachability: &ReachabilityReport,
    domain: Option<DomainMetadata>,
    fetcher: &Arc<dyn ContentFetcher>,
    budget: Duration,
) -> (ArtifactSnapshot, u64) {
    let mut mode = reachability.mode;
    let dns = (mode != PipelineMode::Minimal).then(|| DnsInfo {
        ip: reachability.ip.clone(),
        nameservers: reachability.nameservers.clone(),
    });

    let mut content = None;
    let mut fetch_ms = 0;
    if mode == PipelineMode::Full {
        match tokio::time::timeout(budget, fetcher.fetch(fingerprint, mode)).await {
            Ok(FetchOutcome::Fetched(fetched)) => {
                fetch_ms = fetched.fetch_ms;
                content = Some(fetched);
            }
            Ok(FetchOutcome::Failed(e)) => {
                warn!(error = %e, "Content fetch failed, downgrading pipeline mode.");
                fetch_ms = budget.as_millis() as u64;
                mode = PipelineMode::Partial;
            }
            Err(_) => {
                warn!("Content fetch exceeded its stage budget, downgrading pipeline mode.");
                fetch_ms = budget.as_millis() as u64;
                mode = PipelineMode::Partial;
            }
        }
    }

    let snapshot = ArtifactSnapshot {
        fingerprint: fingerprint.clone(),
        mode,
        dns,
        content,
        domain,
    };
    (snapshot, fetch_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ProbeOutcome, ProbeReport};
    use crate::core::pipeline::probe;

    struct FixedFetcher(FetchOutcome);

    #[async_trait]
    impl ContentFetcher for FixedFetcher {
        async fn fetch(&self, _fingerprint: &UrlFingerprint, _mode: PipelineMode) -> FetchOutcome {
            self.0.clone()
        }
    }

    struct NeverFetcher;

    #[async_trait]
    impl ContentFetcher for NeverFetcher {
        async fn fetch(&self, fingerprint: &UrlFingerprint, _mode: PipelineMode) -> FetchOutcome {
            panic!("fetch must not be attempted for {}", fingerprint.canonical_url);
        }
    }

    fn reachability(mode_source: ProbeOutcome) -> ReachabilityReport {
        let report = match mode_source {
            ProbeOutcome::Reachable => ProbeReport {
                resolved: true,
                ip: Some("192.0.2.1".to_string()),
                nameservers: vec!["ns1.example.net.".to_string()],
                tcp_open: true,
                http_status: Some(200),
                ..ProbeReport::default()
            },
            ProbeOutcome::DnsFailed => ProbeReport { dns_failed: true, ..ProbeReport::default() },
            _ => ProbeReport {
                resolved: true,
                ip: Some("192.0.2.1".to_string()),
                ..ProbeReport::default()
            },
        };
        probe::classify(&report, 1)
    }

    fn fingerprint() -> UrlFingerprint {
        crate::core::pipeline::fingerprint::fingerprint("https://example.com").expect("valid url")
    }

    #[tokio::test]
    async fn successful_fetch_keeps_full_mode() {
        let fetched = FetchedContent {
            status: 200,
            headers: HashMap::new(),
            body: "<html></html>".to_string(),
            redirect_chain: Vec::new(),
            final_url: "https://example.com/".to_string(),
            tls: None,
            fetch_ms: 2,
        };
        let fetcher: Arc<dyn ContentFetcher> =
            Arc::new(FixedFetcher(FetchOutcome::Fetched(fetched)));
        let (snapshot, _) = assemble(
            &fingerprint(),
            &reachability(ProbeOutcome::Reachable),
            None,
            &fetcher,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(snapshot.mode, PipelineMode::Full);
        assert!(snapshot.content.is_some());
        assert!(snapshot.dns.is_some());
    }

    #[tokio::test]
    async fn failed_fetch_downgrades_to_partial_instead_of_failing() {
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(FixedFetcher(FetchOutcome::Failed(
            FetchError::Connect("connection reset".to_string()),
        )));
        let (snapshot, _) = assemble(
            &fingerprint(),
            &reachability(ProbeOutcome::Reachable),
            None,
            &fetcher,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(snapshot.mode, PipelineMode::Partial);
        assert!(snapshot.content.is_none());
        // DNS facts survive the downgrade.
        assert!(snapshot.dns.is_some());
    }

    #[tokio::test]
    async fn partial_mode_never_attempts_a_fetch() {
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(NeverFetcher);
        let (snapshot, fetch_ms) = assemble(
            &fingerprint(),
            &reachability(ProbeOutcome::Unreachable),
            None,
            &fetcher,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(snapshot.mode, PipelineMode::Partial);
        assert_eq!(fetch_ms, 0);
    }

    #[tokio::test]
    async fn minimal_mode_carries_no_dns_facts() {
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(NeverFetcher);
        let (snapshot, _) = assemble(
            &fingerprint(),
            &reachability(ProbeOutcome::DnsFailed),
            None,
            &fetcher,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(snapshot.mode, PipelineMode::Minimal);
        assert!(snapshot.dns.is_none());
        assert!(snapshot.content.is_none());
    }
}
