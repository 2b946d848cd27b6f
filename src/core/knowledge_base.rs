//! Static, read-only knowledge about every check the rule engine can emit.
//!
//! The scoring core only deals in check ids and points; the titles and
//! explanations here exist for callers that render a report to a human.
//! Keeping this data-driven means the scanner's intelligence can grow
//! without touching the engine.

use crate::core::models::{CategoryId, RiskLevel};

/// Human-readable context for one check id.
pub struct CheckDetail {
    /// The machine-readable id findings carry (e.g. "FRM_CROSS_ORIGIN_PASSWORD").
    pub code: &'static str,
    pub title: &'static str,
    pub category: CategoryId,
    /// What the finding means and why it matters.
    pub description: &'static str,
}

static CHECKS: &[CheckDetail] = &[
    // --- URL lexical analysis ---
    CheckDetail {
        code: "LEX_IP_HOST",
        title: "Raw IP Address as Host",
        category: CategoryId::UrlLexical,
        description: "The URL points at a bare IP address instead of a domain name. Legitimate services almost never do this; phishing kits hosted on compromised machines frequently do.",
    },
    CheckDetail {
        code: "LEX_PUNYCODE",
        title: "Punycode Hostname",
        category: CategoryId::UrlLexical,
        description: "The hostname uses punycode (xn--) encoding. Punycode enables internationalized names but is also the vehicle for homoglyph attacks that imitate well-known brands.",
    },
    CheckDetail {
        code: "LEX_USERINFO",
        title: "Userinfo in URL",
        category: CategoryId::UrlLexical,
        description: "Everything before an '@' in the authority is ignored by the browser, so 'https://bank.com@evil.example' actually visits evil.example while looking like the bank.",
    },
    CheckDetail {
        code: "LEX_EXCESSIVE_SUBDOMAINS",
        title: "Deeply Nested Subdomains",
        category: CategoryId::UrlLexical,
        description: "Long subdomain chains are used to push a trusted-looking label into the visible part of the address bar while the registrable domain is something else entirely.",
    },
    CheckDetail {
        code: "LEX_SUSPICIOUS_TLD",
        title: "High-Abuse TLD",
        category: CategoryId::UrlLexical,
        description: "Some top-level domains are disproportionately represented in abuse feeds because registrations there are free or nearly free.",
    },
    CheckDetail {
        code: "LEX_CREDENTIAL_BAIT",
        title: "Credential-Bait Vocabulary",
        category: CategoryId::UrlLexical,
        description: "Words like 'login', 'verify' or 'secure' inside the host or path are a staple of credential phishing lures.",
    },
    CheckDetail {
        code: "LEX_NONSTANDARD_PORT",
        title: "Non-Standard Port",
        category: CategoryId::UrlLexical,
        description: "Serving web content on an unusual port often indicates ad-hoc hosting rather than a production web property.",
    },
    CheckDetail {
        code: "LEX_HYPHEN_PACKED",
        title: "Hyphen-Packed Hostname",
        category: CategoryId::UrlLexical,
        description: "Hostnames stitched together from many hyphenated words are typical of disposable lookalike registrations.",
    },
    CheckDetail {
        code: "LEX_LONG_URL",
        title: "Unusually Long URL",
        category: CategoryId::UrlLexical,
        description: "Very long URLs help hide the actual destination and frequently carry encoded payloads or tracking state.",
    },
    CheckDetail {
        code: "LEX_HEX_SOUP",
        title: "Encoded Path Segments",
        category: CategoryId::UrlLexical,
        description: "Paths dominated by hex or percent-encoded runs usually encode state meant to evade inspection rather than anything human-readable.",
    },
    // --- Domain & DNS signals ---
    CheckDetail {
        code: "DOM_AGE_NEW",
        title: "Recently Registered Domain",
        category: CategoryId::DomainSignals,
        description: "The overwhelming majority of phishing domains are used within days of registration. Young age is one of the strongest single indicators available.",
    },
    CheckDetail {
        code: "DOM_NO_NAMESERVERS",
        title: "No NS Records",
        category: CategoryId::DomainSignals,
        description: "A domain that resolves without exposing NS records suggests an unusual or deliberately minimal DNS setup.",
    },
    CheckDetail {
        code: "DOM_FREE_DNS",
        title: "Free/Dynamic DNS Provider",
        category: CategoryId::DomainSignals,
        description: "Free and dynamic DNS services are legitimate tools that are also heavily abused for short-lived malicious infrastructure.",
    },
    CheckDetail {
        code: "DOM_REGISTRATION_OPAQUE",
        title: "Opaque Registration",
        category: CategoryId::DomainSignals,
        description: "Registration data was available but names no registrar, which is atypical for domains operated by established organizations.",
    },
    // --- TLS certificate ---
    CheckDetail {
        code: "TLS_EXPIRED",
        title: "Expired Certificate",
        category: CategoryId::TlsCertificate,
        description: "The certificate's validity window has ended. Browsers will warn loudly; an operating service would have renewed.",
    },
    CheckDetail {
        code: "TLS_NOT_YET_VALID",
        title: "Certificate Not Yet Valid",
        category: CategoryId::TlsCertificate,
        description: "The certificate's validity window has not started, which points at clock games or a misissued certificate.",
    },
    CheckDetail {
        code: "TLS_SELF_SIGNED",
        title: "Self-Signed Certificate",
        category: CategoryId::TlsCertificate,
        description: "The certificate was issued by the same entity it certifies. No public CA vouches for this host.",
    },
    CheckDetail {
        code: "TLS_VERY_NEW",
        title: "Freshly Issued Certificate",
        category: CategoryId::TlsCertificate,
        description: "A certificate only days old often accompanies a domain stood up for a short-lived campaign.",
    },
    CheckDetail {
        code: "TLS_MISSING",
        title: "Certificate Not Observable",
        category: CategoryId::TlsCertificate,
        description: "The page claims https but no certificate could be observed during the scan.",
    },
    // --- Page content ---
    CheckDetail {
        code: "CNT_BRAND_MISMATCH",
        title: "Brand/Host Mismatch",
        category: CategoryId::Content,
        description: "The page title advertises a well-known brand while being served from an unrelated domain. This is the classic shape of a phishing landing page.",
    },
    CheckDetail {
        code: "CNT_OBFUSCATED_SCRIPT",
        title: "Obfuscated Script",
        category: CategoryId::Content,
        description: "Packed or encoded JavaScript hides behavior from inspection. Benign sites minify; they rarely pipe eval through unescape or atob.",
    },
    CheckDetail {
        code: "CNT_HIDDEN_IFRAME",
        title: "Hidden Iframe",
        category: CategoryId::Content,
        description: "Invisible iframes load third-party content without the visitor's knowledge, a common drive-by and click-fraud vehicle.",
    },
    CheckDetail {
        code: "CNT_META_REFRESH",
        title: "Meta-Refresh Redirect",
        category: CategoryId::Content,
        description: "An immediate meta refresh forwards the visitor somewhere else, frequently used to launder the origin of a malicious destination.",
    },
    CheckDetail {
        code: "CNT_AUTO_DOWNLOAD",
        title: "Pushed Executable Download",
        category: CategoryId::Content,
        description: "The page pushes an executable file at the visitor, either via content-disposition or direct links to binaries.",
    },
    // --- Credential forms ---
    CheckDetail {
        code: "FRM_CROSS_ORIGIN_PASSWORD",
        title: "Password Form Submits Cross-Origin",
        category: CategoryId::Forms,
        description: "A form collecting a password posts its data to a different host than the page it lives on. Almost no legitimate login works this way; credential harvesters almost always do.",
    },
    CheckDetail {
        code: "FRM_INSECURE_ACTION",
        title: "Form Submits Over Plain HTTP",
        category: CategoryId::Forms,
        description: "Form data leaves the page unencrypted, exposing anything typed into it to the network path.",
    },
    CheckDetail {
        code: "FRM_IP_ACTION",
        title: "Form Submits to Raw IP",
        category: CategoryId::Forms,
        description: "The form posts to a bare IP address, bypassing any domain-based trust the page might present.",
    },
    CheckDetail {
        code: "FRM_CREDENTIAL_HARVEST",
        title: "Credential Harvesting Layout",
        category: CategoryId::Forms,
        description: "The page pairs a password field with identity or payment inputs, matching the layout of credential harvesting kits.",
    },
    // --- Redirect behaviour ---
    CheckDetail {
        code: "RED_DOWNGRADE",
        title: "HTTPS→HTTP Downgrade",
        category: CategoryId::Redirects,
        description: "The redirect chain drops from an encrypted to an unencrypted hop, discarding transport security midway.",
    },
    CheckDetail {
        code: "RED_LONG_CHAIN",
        title: "Long Redirect Chain",
        category: CategoryId::Redirects,
        description: "Multiple chained redirects are used to launder traffic through trackers and gates before revealing the real destination.",
    },
    CheckDetail {
        code: "RED_CROSS_DOMAIN",
        title: "Cross-Domain Landing",
        category: CategoryId::Redirects,
        description: "The request ended on a different domain than the one submitted, so the visible URL and the real destination disagree.",
    },
    // --- HTTP security headers ---
    CheckDetail {
        code: "HDR_HSTS_MISSING",
        title: "HSTS Header Missing",
        category: CategoryId::Headers,
        description: "Without Strict-Transport-Security, browsers may still be lured onto an unencrypted connection for this host.",
    },
    CheckDetail {
        code: "HDR_CSP_MISSING",
        title: "CSP Header Missing",
        category: CategoryId::Headers,
        description: "Without a Content-Security-Policy the page has no declared restrictions on where scripts and resources may load from.",
    },
    CheckDetail {
        code: "HDR_XFO_MISSING",
        title: "X-Frame-Options Missing",
        category: CategoryId::Headers,
        description: "The page may be framed by arbitrary sites, enabling clickjacking overlays.",
    },
    CheckDetail {
        code: "HDR_XCTO_MISSING",
        title: "X-Content-Type-Options Missing",
        category: CategoryId::Headers,
        description: "Browsers may MIME-sniff responses, letting a disguised file execute as something else.",
    },
];

/// Looks up the detail for a finding's check id.
pub fn get_check_detail(code: &str) -> Option<&'static CheckDetail> {
    CHECKS.iter().find(|c| c.code == code)
}

/// Caller-side advice for each risk tier. The scoring core owns only the
/// tier itself; label and recommendation are presentation.
pub struct RiskAdvice {
    pub level: RiskLevel,
    pub label: &'static str,
    pub recommendation: &'static str,
}

static RISK_ADVICE: &[RiskAdvice] = &[
    RiskAdvice {
        level: RiskLevel::Safe,
        label: "Safe",
        recommendation: "No meaningful risk indicators. Normal browsing applies.",
    },
    RiskAdvice {
        level: RiskLevel::Low,
        label: "Low Risk",
        recommendation: "Minor indicators only. Proceed, but avoid entering credentials you cannot verify.",
    },
    RiskAdvice {
        level: RiskLevel::Medium,
        label: "Medium Risk",
        recommendation: "Several indicators present. Verify the destination through an independent channel before interacting.",
    },
    RiskAdvice {
        level: RiskLevel::High,
        label: "High Risk",
        recommendation: "Strong indicators of abuse. Do not enter credentials or download anything from this URL.",
    },
    RiskAdvice {
        level: RiskLevel::Critical,
        label: "Critical Risk",
        recommendation: "Confirmed or near-certain malicious behavior. Block the URL and treat any prior interaction as compromised.",
    },
];

pub fn get_risk_advice(level: RiskLevel) -> &'static RiskAdvice {
    // The table covers every variant; the Safe row is an unreachable fallback.
    RISK_ADVICE.iter().find(|a| a.level == level).unwrap_or(&RISK_ADVICE[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::checks::CATALOGUE;

    #[test]
    fn every_catalogue_check_has_knowledge() {
        for category in CATALOGUE {
            for check in category.checks {
                let detail = get_check_detail(check.id)
                    .unwrap_or_else(|| panic!("no knowledge entry for {}", check.id));
                assert_eq!(detail.category, category.id, "category mismatch for {}", check.id);
            }
        }
    }

    #[test]
    fn every_risk_level_has_advice() {
        for level in [
            RiskLevel::Safe,
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            assert_eq!(get_risk_advice(level).level, level);
        }
    }
}
