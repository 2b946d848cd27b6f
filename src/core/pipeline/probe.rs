// src/core/pipeline/probe.rs

//! Reachability probing.
//!
//! Drives the `UNVALIDATED → VALIDATING → {REACHABLE, UNREACHABLE, TIMEOUT,
//! DNS_FAILED}` state machine and derives the pipeline mode from the terminal
//! state. Nothing in here can abort a scan: every failure is folded into the
//! probe report and merely selects a degraded mode.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::models::{
    DomainMetadata, PipelineMode, ProbeOutcome, ProbeReport, ReachabilityReport,
};

/// Collaborator contract for reachability probing.
///
/// `domain_metadata` is optional enrichment (registration age, registrar);
/// probers without a registration-data backend keep the default `None`.
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    async fn probe(&self, host: &str, port: Option<u16>) -> ProbeReport;

    async fn domain_metadata(&self, _host: &str) -> Option<DomainMetadata> {
        None
    }
}

/// Maps the raw probe facts to the terminal reachability state and the
/// pipeline mode. Pure; the mode mapping is:
/// Reachable→Full, Unreachable/Timeout with valid DNS→Partial, else Minimal.
pub fn classify(report: &ProbeReport, duration_ms: u64) -> ReachabilityReport {
    let outcome = if report.dns_failed {
        ProbeOutcome::DnsFailed
    } else if report.http_status.is_some() {
        ProbeOutcome::Reachable
    } else if report.timed_out {
        ProbeOutcome::Timeout
    } else {
        ProbeOutcome::Unreachable
    };

    let mode = match outcome {
        ProbeOutcome::Reachable => PipelineMode::Full,
        ProbeOutcome::DnsFailed => PipelineMode::Minimal,
        ProbeOutcome::Unreachable | ProbeOutcome::Timeout => {
            if report.resolved {
                PipelineMode::Partial
            } else {
                PipelineMode::Minimal
            }
        }
    };

    ReachabilityReport {
        outcome,
        ip: report.ip.clone(),
        nameservers: report.nameservers.clone(),
        tcp_open: report.tcp_open,
        http_status: report.http_status,
        mode,
        duration_ms,
    }
}

/// Production prober: DNS via hickory, a bounded TCP connect, and a bounded
/// HTTP HEAD request.
pub struct DnsProber {
    step_timeout: Duration,
}

impl DnsProber {
    pub fn new(step_timeout: Duration) -> Self {
        Self { step_timeout }
    }
}

impl Default for DnsProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl ReachabilityProber for DnsProber {
    async fn probe(&self, host: &str, port: Option<u16>) -> ProbeReport {
        let mut report = ProbeReport::default();
        info!(host, state = "validating", "Starting reachability probe.");

        // IP-literal hosts skip resolution; there is nothing to look up.
        if host.parse::<IpAddr>().is_ok() {
            report.resolved = true;
            report.ip = Some(host.to_string());
        } else {
            let resolver =
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

            match tokio::time::timeout(self.step_timeout, resolver.lookup_ip(host)).await {
                Ok(Ok(lookup)) => {
                    report.ip = lookup.iter().next().map(|ip| ip.to_string());
                    report.resolved = report.ip.is_some();
                    if !report.resolved {
                        report.dns_failed = true;
                    }
                }
                Ok(Err(e)) => {
                    warn!(host, error = %e, "DNS resolution failed.");
                    report.dns_failed = true;
                }
                Err(_) => {
                    warn!(host, "DNS resolution timed out.");
                    report.dns_failed = true;
                    report.timed_out = true;
                }
            }

            if report.resolved {
                // Nameservers are informational; a failed NS lookup does not
                // change the terminal state.
                if let Ok(Ok(ns)) =
                    tokio::time::timeout(self.step_timeout, resolver.ns_lookup(host)).await
                {
                    report.nameservers = ns.iter().map(|r| r.to_string()).collect();
                }
            }
        }

        if report.dns_failed {
            info!(host, outcome = "dns_failed", "Reachability probe finished.");
            return report;
        }

        let tcp_port = port.unwrap_or(443);
        match tokio::time::timeout(
            self.step_timeout,
            tokio::net::TcpStream::connect((host, tcp_port)),
        )
        .await
        {
            Ok(Ok(_)) => report.tcp_open = true,
            Ok(Err(e)) => debug!(host, port = tcp_port, error = %e, "TCP connect failed."),
            Err(_) => {
                debug!(host, port = tcp_port, "TCP connect timed out.");
                report.timed_out = true;
            }
        }

        if report.tcp_open {
            let client = match reqwest::Client::builder()
                .user_agent("PalisadeRS/0.1")
                .timeout(self.step_timeout)
                .build()
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Failed to build HTTP client for probe.");
                    return report;
                }
            };

            let scheme = if tcp_port == 80 { "http" } else { "https" };
            let url = format!("{scheme}://{host}/");
            match client.head(&url).send().await {
                Ok(response) => report.http_status = Some(response.status().as_u16()),
                Err(e) => {
                    if e.is_timeout() {
                        report.timed_out = true;
                    }
                    debug!(url = %url, error = %e, "HTTP probe failed.");
                }
            }
        }

        info!(
            host,
            resolved = report.resolved,
            tcp_open = report.tcp_open,
            http_status = ?report.http_status,
            "Reachability probe finished."
        );
        report
    }
}
