// src/core/pipeline/legitimacy.rs

//! Legitimacy / false-positive dampening.
//!
//! A fixed additive catalogue of trust signals, each independently checkable
//! against the artifact snapshot and the reputation summary. The summed
//! score maps through an ordered, monotonic threshold table to a dampening
//! multiplier: higher legitimacy never raises the final score.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::core::config::{LegitimacyThreshold, ScanConfig};
use crate::core::models::{
    ArtifactSnapshot, LegitimacyAssessment, LegitimacySignal, ReputationSummary,
};

static RE_KNOWN_CDN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(cloudflare|akamai|fastly|cloudfront|edgekey|incapsula)").expect("static regex")
});
static RE_RECOGNIZED_HOSTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(awsdns|azure-dns|googledomains|google\.com|digitalocean|linode|ovh|hetzner)")
        .expect("static regex")
});
static RE_CONTACT_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(privacy policy|contact us|impressum|terms of service)").expect("static regex")
});

/// Evaluates the trust-signal catalogue. Pure over its inputs.
pub fn assess(
    snapshot: &ArtifactSnapshot,
    reputation: &ReputationSummary,
    config: &ScanConfig,
) -> LegitimacyAssessment {
    let mut signals = Vec::new();
    let mut grant = |name: &str, points: u32| {
        debug!(signal = name, points, "Legitimacy signal granted.");
        signals.push(LegitimacySignal { name: name.to_string(), points });
    };

    let host = &snapshot.fingerprint.host;
    if is_institutional_tld(host) {
        grant("institutional_tld", 30);
    }

    let nameservers = snapshot.dns.as_ref().map(|d| d.nameservers.join(" ")).unwrap_or_default();
    if RE_KNOWN_CDN.is_match(&nameservers) || RE_KNOWN_CDN.is_match(host) {
        grant("known_cdn_origin", 25);
    } else if RE_RECOGNIZED_HOSTING.is_match(&nameservers) {
        grant("recognized_hosting", 10);
    }

    if let Some(age) = snapshot.domain.as_ref().and_then(|d| d.age_days) {
        if age >= 730 {
            grant("domain_age_established", 20);
        } else if age >= 365 {
            grant("domain_age_over_a_year", 10);
        }
    }

    if let Some(tls) = snapshot.tls() {
        let lifetime = tls.not_after.signed_duration_since(tls.not_before).num_days();
        let age = lifetime - tls.days_until_expiry;
        if tls.is_valid && !tls.self_signed && lifetime >= 90 && age >= 30 {
            grant("long_lived_certificate", 15);
        }
    }

    let responders =
        reputation.malicious_count + reputation.suspicious_count + reputation.safe_count;
    if responders > 0 && reputation.malicious_count == 0 && reputation.suspicious_count == 0 {
        grant("zero_reputation_hits", 15);
    }

    if let Some(content) = snapshot.content.as_ref() {
        if RE_CONTACT_CONTENT.is_match(&content.body) {
            grant("privacy_contact_present", 10);
        }
    }

    if let Some(domain) = snapshot.domain.as_ref() {
        if domain.registrar.is_some() && domain.abuse_contact.is_some() {
            grant("registration_complete", 10);
        }
    }

    let legitimacy_score: u32 = signals.iter().map(|s| s.points).sum::<u32>().min(100);
    let adjustment_multiplier = multiplier_for(legitimacy_score, &config.legitimacy_thresholds);

    info!(score = legitimacy_score, multiplier = adjustment_multiplier, "Legitimacy assessed.");
    LegitimacyAssessment { signals, legitimacy_score, adjustment_multiplier }
}

/// Looks the score up in the ordered threshold table; scores below every row
/// keep the neutral multiplier 1.0.
pub fn multiplier_for(score: u32, thresholds: &[LegitimacyThreshold]) -> f64 {
    thresholds.iter().find(|row| score >= row.min_score).map(|row| row.multiplier).unwrap_or(1.0)
}

fn is_institutional_tld(host: &str) -> bool {
    host.ends_with(".gov")
        || host.ends_with(".edu")
        || host.ends_with(".mil")
        || host.contains(".gov.")
        || host.contains(".edu.")
        || host.contains(".ac.")
}
