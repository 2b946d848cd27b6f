// src/core/pipeline/checks.rs

//! The check catalogue.
//!
//! Every check is a pure function over the artifact snapshot: same snapshot,
//! same finding. A check whose required artifact slice is absent returns
//! `Ok(None)`; a check that errors is recorded by the engine as a failed
//! check worth 0 points. `max_points` on a definition is the bound the
//! engine clamps a finding's points to.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::core::config::ArtifactRequirement;
use crate::core::models::{
    ArtifactSnapshot, CategoryId, FetchedContent, Finding, FindingDetail, Severity,
};

type CheckFn = fn(&ArtifactSnapshot) -> Result<Option<Finding>, String>;

/// One check inside a category.
pub struct CheckDef {
    pub id: &'static str,
    /// Upper bound on the points a single finding from this check may carry.
    pub max_points: u32,
    pub run: CheckFn,
}

/// One rule category: which artifacts it needs and which checks it runs.
pub struct CategoryDef {
    pub id: CategoryId,
    pub requires: ArtifactRequirement,
    pub checks: &'static [CheckDef],
}

// --- Static patterns ---

static RE_CREDENTIAL_BAIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(login|log-?in|sign-?in|verify|secure|account|update|confirm|banking|wallet)")
        .expect("static regex")
});
static RE_HEX_SOUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(%[0-9a-fA-F]{2}){4,}|[0-9a-f]{24,}").expect("static regex"));
static RE_FREE_DNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(freenom|afraid\.org|duckdns|no-ip|dynu|freedns)").expect("static regex")
});
static RE_OBFUSCATED_JS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"eval\s*\(\s*(unescape|atob)|document\.write\s*\(\s*unescape|fromCharCode\s*\("#)
        .expect("static regex")
});
static RE_BASE64_BLOB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/]{200,}={0,2}").expect("static regex"));
static RE_EXECUTABLE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(\.exe|\.scr|\.apk|\.msi|\.bat)["']"#).expect("static regex"));

/// TLDs with a strong spam/abuse skew.
const SUSPICIOUS_TLDS: &[&str] =
    &["zip", "mov", "tk", "ml", "ga", "cf", "gq", "top", "work", "click", "loan", "country"];

/// Brands commonly impersonated in credential phishing.
const IMPERSONATED_BRANDS: &[&str] = &[
    "paypal", "apple", "microsoft", "google", "amazon", "netflix", "facebook", "instagram",
    "whatsapp", "chase", "wellsfargo", "dhl", "fedex", "usps",
];

// --- Catalogue ---

static URL_LEXICAL_CHECKS: &[CheckDef] = &[
    CheckDef { id: "LEX_IP_HOST", max_points: 6, run: check_ip_host },
    CheckDef { id: "LEX_PUNYCODE", max_points: 4, run: check_punycode },
    CheckDef { id: "LEX_USERINFO", max_points: 5, run: check_userinfo },
    CheckDef { id: "LEX_EXCESSIVE_SUBDOMAINS", max_points: 3, run: check_excessive_subdomains },
    CheckDef { id: "LEX_SUSPICIOUS_TLD", max_points: 3, run: check_suspicious_tld },
    CheckDef { id: "LEX_CREDENTIAL_BAIT", max_points: 4, run: check_credential_bait },
    CheckDef { id: "LEX_NONSTANDARD_PORT", max_points: 3, run: check_nonstandard_port },
    CheckDef { id: "LEX_HYPHEN_PACKED", max_points: 2, run: check_hyphen_packed },
    CheckDef { id: "LEX_LONG_URL", max_points: 2, run: check_long_url },
    CheckDef { id: "LEX_HEX_SOUP", max_points: 2, run: check_hex_soup },
];

static DOMAIN_SIGNAL_CHECKS: &[CheckDef] = &[
    CheckDef { id: "DOM_AGE_NEW", max_points: 10, run: check_domain_age },
    CheckDef { id: "DOM_NO_NAMESERVERS", max_points: 4, run: check_no_nameservers },
    CheckDef { id: "DOM_FREE_DNS", max_points: 4, run: check_free_dns },
    CheckDef { id: "DOM_REGISTRATION_OPAQUE", max_points: 2, run: check_registration_opaque },
];

static TLS_CHECKS: &[CheckDef] = &[
    CheckDef { id: "TLS_EXPIRED", max_points: 8, run: check_tls_expired },
    CheckDef { id: "TLS_NOT_YET_VALID", max_points: 6, run: check_tls_not_yet_valid },
    CheckDef { id: "TLS_SELF_SIGNED", max_points: 5, run: check_tls_self_signed },
    CheckDef { id: "TLS_VERY_NEW", max_points: 5, run: check_tls_very_new },
    CheckDef { id: "TLS_MISSING", max_points: 4, run: check_tls_missing },
];

static CONTENT_CHECKS: &[CheckDef] = &[
    CheckDef { id: "CNT_BRAND_MISMATCH", max_points: 8, run: check_brand_mismatch },
    CheckDef { id: "CNT_OBFUSCATED_SCRIPT", max_points: 5, run: check_obfuscated_script },
    CheckDef { id: "CNT_HIDDEN_IFRAME", max_points: 5, run: check_hidden_iframe },
    CheckDef { id: "CNT_META_REFRESH", max_points: 4, run: check_meta_refresh },
    CheckDef { id: "CNT_AUTO_DOWNLOAD", max_points: 4, run: check_auto_download },
];

static FORM_CHECKS: &[CheckDef] = &[
    CheckDef { id: "FRM_CROSS_ORIGIN_PASSWORD", max_points: 15, run: check_cross_origin_password },
    CheckDef { id: "FRM_INSECURE_ACTION", max_points: 6, run: check_insecure_action },
    CheckDef { id: "FRM_IP_ACTION", max_points: 5, run: check_ip_action },
    CheckDef { id: "FRM_CREDENTIAL_HARVEST", max_points: 4, run: check_credential_harvest },
];

static REDIRECT_CHECKS: &[CheckDef] = &[
    CheckDef { id: "RED_DOWNGRADE", max_points: 5, run: check_redirect_downgrade },
    CheckDef { id: "RED_LONG_CHAIN", max_points: 4, run: check_long_chain },
    CheckDef { id: "RED_CROSS_DOMAIN", max_points: 4, run: check_cross_domain_redirect },
];

static HEADER_CHECKS: &[CheckDef] = &[
    CheckDef { id: "HDR_CSP_MISSING", max_points: 2, run: check_csp_missing },
    CheckDef { id: "HDR_HSTS_MISSING", max_points: 1, run: check_hsts_missing },
    CheckDef { id: "HDR_XFO_MISSING", max_points: 1, run: check_xfo_missing },
    CheckDef { id: "HDR_XCTO_MISSING", max_points: 1, run: check_xcto_missing },
];

/// The full, fixed category catalogue.
pub static CATALOGUE: &[CategoryDef] = &[
    CategoryDef {
        id: CategoryId::UrlLexical,
        requires: ArtifactRequirement::UrlOnly,
        checks: URL_LEXICAL_CHECKS,
    },
    CategoryDef {
        id: CategoryId::DomainSignals,
        requires: ArtifactRequirement::Dns,
        checks: DOMAIN_SIGNAL_CHECKS,
    },
    CategoryDef {
        id: CategoryId::TlsCertificate,
        requires: ArtifactRequirement::Content,
        checks: TLS_CHECKS,
    },
    CategoryDef {
        id: CategoryId::Content,
        requires: ArtifactRequirement::Content,
        checks: CONTENT_CHECKS,
    },
    CategoryDef { id: CategoryId::Forms, requires: ArtifactRequirement::Content, checks: FORM_CHECKS },
    CategoryDef {
        id: CategoryId::Redirects,
        requires: ArtifactRequirement::Content,
        checks: REDIRECT_CHECKS,
    },
    CategoryDef {
        id: CategoryId::Headers,
        requires: ArtifactRequirement::Content,
        checks: HEADER_CHECKS,
    },
];

pub fn category_def(id: CategoryId) -> Option<&'static CategoryDef> {
    CATALOGUE.iter().find(|c| c.id == id)
}

// --- Helpers ---

fn host_is_ip(host: &str) -> bool {
    host.trim_start_matches('[').trim_end_matches(']').parse::<std::net::IpAddr>().is_ok()
}

fn content(snapshot: &ArtifactSnapshot) -> Option<&FetchedContent> {
    snapshot.content.as_ref()
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("selector '{selector}': {e}"))
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Resolves a form action against the page URL and returns the absolute
/// target, or `None` for fragment/empty/relative-same-page actions.
fn resolve_action(page: &str, action: &str) -> Option<Url> {
    let action = action.trim();
    if action.is_empty() || action.starts_with('#') {
        return None;
    }
    Url::parse(page).ok()?.join(action).ok()
}

// --- URL lexical checks ---

fn check_ip_host(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let host = &snapshot.fingerprint.host;
    if host_is_ip(host) {
        return Ok(Some(Finding::new(
            "LEX_IP_HOST",
            Severity::Critical,
            6,
            format!("Host is a raw IP address ({host}) instead of a domain name"),
        )));
    }
    Ok(None)
}

fn check_punycode(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    if snapshot.fingerprint.host.contains("xn--") {
        return Ok(Some(
            Finding::new(
                "LEX_PUNYCODE",
                Severity::Warning,
                4,
                "Host uses punycode, a common vehicle for homoglyph impersonation",
            )
            .with_detail(FindingDetail::MatchedPattern { pattern: "xn--".to_string() }),
        ));
    }
    Ok(None)
}

fn check_userinfo(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    // An '@' before the host makes everything left of it decorative:
    // https://paypal.com@evil.example/ lands on evil.example.
    if snapshot.fingerprint.canonical_url.split('/').nth(2).is_some_and(|a| a.contains('@')) {
        return Ok(Some(Finding::new(
            "LEX_USERINFO",
            Severity::Critical,
            5,
            "URL embeds userinfo ('@'), hiding the real destination host",
        )));
    }
    Ok(None)
}

fn check_excessive_subdomains(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let host = &snapshot.fingerprint.host;
    if host_is_ip(host) {
        return Ok(None);
    }
    let labels = host.split('.').count();
    if labels > 4 {
        return Ok(Some(
            Finding::new(
                "LEX_EXCESSIVE_SUBDOMAINS",
                Severity::Warning,
                3,
                format!("Host nests {labels} labels deep, a common cloaking pattern"),
            )
            .with_detail(FindingDetail::Count { value: labels as u32 }),
        ));
    }
    Ok(None)
}

fn check_suspicious_tld(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let host = &snapshot.fingerprint.host;
    if host_is_ip(host) {
        return Ok(None);
    }
    if let Some(tld) = host.rsplit('.').next() {
        if SUSPICIOUS_TLDS.contains(&tld) {
            return Ok(Some(Finding::new(
                "LEX_SUSPICIOUS_TLD",
                Severity::Warning,
                3,
                format!("Top-level domain '.{tld}' has a strong abuse skew"),
            )));
        }
    }
    Ok(None)
}

fn check_credential_bait(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let haystack = format!("{} {}", snapshot.fingerprint.host, snapshot.fingerprint.path);
    if let Some(m) = RE_CREDENTIAL_BAIT.find(&haystack) {
        return Ok(Some(
            Finding::new(
                "LEX_CREDENTIAL_BAIT",
                Severity::Warning,
                4,
                "URL carries credential-bait vocabulary in its host or path",
            )
            .with_detail(FindingDetail::MatchedPattern { pattern: m.as_str().to_string() }),
        ));
    }
    Ok(None)
}

fn check_nonstandard_port(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    if let Some(port) = snapshot.fingerprint.port {
        return Ok(Some(Finding::new(
            "LEX_NONSTANDARD_PORT",
            Severity::Warning,
            3,
            format!("URL targets non-standard port {port}"),
        )));
    }
    Ok(None)
}

fn check_hyphen_packed(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let hyphens = snapshot.fingerprint.host.matches('-').count();
    if hyphens >= 3 {
        return Ok(Some(
            Finding::new(
                "LEX_HYPHEN_PACKED",
                Severity::Info,
                2,
                format!("Host contains {hyphens} hyphens, typical of throwaway lookalike domains"),
            )
            .with_detail(FindingDetail::Count { value: hyphens as u32 }),
        ));
    }
    Ok(None)
}

fn check_long_url(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let len = snapshot.fingerprint.canonical_url.len();
    if len > 100 {
        return Ok(Some(
            Finding::new(
                "LEX_LONG_URL",
                Severity::Info,
                2,
                format!("Canonical URL is {len} characters long"),
            )
            .with_detail(FindingDetail::Count { value: len as u32 }),
        ));
    }
    Ok(None)
}

fn check_hex_soup(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    if RE_HEX_SOUP.is_match(&snapshot.fingerprint.path) {
        return Ok(Some(Finding::new(
            "LEX_HEX_SOUP",
            Severity::Info,
            2,
            "Path is dominated by hex or percent-encoded runs",
        )));
    }
    Ok(None)
}

// --- Domain signal checks ---

fn check_domain_age(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(days) = snapshot.domain.as_ref().and_then(|d| d.age_days) else {
        return Ok(None);
    };
    let points = if days < 7 {
        10
    } else if days < 30 {
        8
    } else if days < 90 {
        5
    } else {
        return Ok(None);
    };
    Ok(Some(
        Finding::new(
            "DOM_AGE_NEW",
            Severity::Critical,
            points,
            format!("Domain was registered only {days} days ago"),
        )
        .with_detail(FindingDetail::DomainAge { days }),
    ))
}

fn check_no_nameservers(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(dns) = snapshot.dns.as_ref() else {
        return Ok(None);
    };
    if dns.ip.is_some() && dns.nameservers.is_empty() {
        return Ok(Some(Finding::new(
            "DOM_NO_NAMESERVERS",
            Severity::Warning,
            4,
            "Domain resolves but exposes no NS records",
        )));
    }
    Ok(None)
}

fn check_free_dns(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(dns) = snapshot.dns.as_ref() else {
        return Ok(None);
    };
    for ns in &dns.nameservers {
        if let Some(m) = RE_FREE_DNS.find(ns) {
            return Ok(Some(
                Finding::new(
                    "DOM_FREE_DNS",
                    Severity::Warning,
                    4,
                    format!("Domain is served by free/dynamic DNS ({ns})"),
                )
                .with_detail(FindingDetail::MatchedPattern { pattern: m.as_str().to_string() }),
            ));
        }
    }
    Ok(None)
}

fn check_registration_opaque(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(domain) = snapshot.domain.as_ref() else {
        return Ok(None);
    };
    // Only meaningful when registration data was actually looked up.
    if domain.age_days.is_some() && domain.registrar.is_none() {
        return Ok(Some(Finding::new(
            "DOM_REGISTRATION_OPAQUE",
            Severity::Info,
            2,
            "Registration record carries no registrar identity",
        )));
    }
    Ok(None)
}

// --- TLS certificate checks ---

/// Days since the certificate became valid, derived purely from the snapshot.
fn certificate_age_days(tls: &crate::core::models::TlsInfo) -> i64 {
    let lifetime = tls.not_after.signed_duration_since(tls.not_before).num_days();
    lifetime - tls.days_until_expiry
}

fn check_tls_expired(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(tls) = snapshot.tls() else {
        return Ok(None);
    };
    if !tls.is_valid && tls.days_until_expiry < 0 {
        return Ok(Some(
            Finding::new(
                "TLS_EXPIRED",
                Severity::Critical,
                8,
                format!("Certificate expired {} days ago", -tls.days_until_expiry),
            )
            .with_detail(FindingDetail::CertificateWindow {
                not_before: tls.not_before,
                not_after: tls.not_after,
            }),
        ));
    }
    Ok(None)
}

fn check_tls_not_yet_valid(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(tls) = snapshot.tls() else {
        return Ok(None);
    };
    if !tls.is_valid && tls.days_until_expiry >= 0 {
        return Ok(Some(
            Finding::new(
                "TLS_NOT_YET_VALID",
                Severity::Critical,
                6,
                "Certificate validity window has not started yet",
            )
            .with_detail(FindingDetail::CertificateWindow {
                not_before: tls.not_before,
                not_after: tls.not_after,
            }),
        ));
    }
    Ok(None)
}

fn check_tls_self_signed(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(tls) = snapshot.tls() else {
        return Ok(None);
    };
    if tls.self_signed {
        return Ok(Some(Finding::new(
            "TLS_SELF_SIGNED",
            Severity::Warning,
            5,
            "Certificate is self-signed",
        )));
    }
    Ok(None)
}

fn check_tls_very_new(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(tls) = snapshot.tls() else {
        return Ok(None);
    };
    let age = certificate_age_days(tls);
    if tls.is_valid && (0..7).contains(&age) {
        return Ok(Some(
            Finding::new(
                "TLS_VERY_NEW",
                Severity::Warning,
                5,
                format!("Certificate was issued only {age} days ago"),
            )
            .with_detail(FindingDetail::CertificateWindow {
                not_before: tls.not_before,
                not_after: tls.not_after,
            }),
        ));
    }
    Ok(None)
}

fn check_tls_missing(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    if snapshot.fingerprint.scheme == "https" && c.tls.is_none() {
        return Ok(Some(Finding::new(
            "TLS_MISSING",
            Severity::Warning,
            4,
            "Page was served over https but no certificate could be observed",
        )));
    }
    Ok(None)
}

// --- Page content checks ---

fn check_brand_mismatch(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let selector = parse_selector("title")?;
    let title = document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().to_ascii_lowercase())
        .unwrap_or_default();

    let host = &snapshot.fingerprint.host;
    for brand in IMPERSONATED_BRANDS {
        if title.contains(brand) && !host.contains(brand) {
            return Ok(Some(
                Finding::new(
                    "CNT_BRAND_MISMATCH",
                    Severity::Critical,
                    8,
                    format!("Page title claims '{brand}' but the host is {host}"),
                )
                .with_detail(FindingDetail::MatchedPattern { pattern: brand.to_string() }),
            ));
        }
    }
    Ok(None)
}

fn check_obfuscated_script(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    if RE_OBFUSCATED_JS.is_match(&c.body) || RE_BASE64_BLOB.is_match(&c.body) {
        return Ok(Some(Finding::new(
            "CNT_OBFUSCATED_SCRIPT",
            Severity::Warning,
            5,
            "Page carries obfuscated or packed script content",
        )));
    }
    Ok(None)
}

fn check_hidden_iframe(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let selector = parse_selector("iframe")?;
    for el in document.select(&selector) {
        let zero_sized = el.value().attr("width") == Some("0")
            || el.value().attr("height") == Some("0");
        let hidden_style = el
            .value()
            .attr("style")
            .is_some_and(|s| s.contains("display:none") || s.contains("visibility:hidden"));
        if zero_sized || hidden_style {
            return Ok(Some(Finding::new(
                "CNT_HIDDEN_IFRAME",
                Severity::Warning,
                5,
                "Page embeds a hidden or zero-sized iframe",
            )));
        }
    }
    Ok(None)
}

fn check_meta_refresh(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let selector = parse_selector("meta[http-equiv]")?;
    for el in document.select(&selector) {
        let is_refresh = el
            .value()
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
        let redirects_away =
            el.value().attr("content").is_some_and(|v| v.to_ascii_lowercase().contains("url="));
        if is_refresh && redirects_away {
            return Ok(Some(Finding::new(
                "CNT_META_REFRESH",
                Severity::Warning,
                4,
                "Page immediately meta-refreshes the visitor elsewhere",
            )));
        }
    }
    Ok(None)
}

fn check_auto_download(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let attachment = c
        .headers
        .get("content-disposition")
        .is_some_and(|v| v.to_ascii_lowercase().contains("attachment"));
    if attachment || RE_EXECUTABLE_LINK.is_match(&c.body) {
        return Ok(Some(Finding::new(
            "CNT_AUTO_DOWNLOAD",
            Severity::Warning,
            4,
            "Page pushes an executable download at the visitor",
        )));
    }
    Ok(None)
}

// --- Form checks ---

fn check_cross_origin_password(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let form_selector = parse_selector("form")?;
    let password_selector = parse_selector("input[type=password]")?;

    for form in document.select(&form_selector) {
        if form.select(&password_selector).next().is_none() {
            continue;
        }
        let Some(action) = form.value().attr("action") else {
            continue;
        };
        let Some(target) = resolve_action(&c.final_url, action) else {
            continue;
        };
        let target_host = target.host_str().unwrap_or_default().to_ascii_lowercase();
        let page_host = host_of(&c.final_url).unwrap_or_default();
        if !target_host.is_empty() && target_host != page_host {
            return Ok(Some(
                Finding::new(
                    "FRM_CROSS_ORIGIN_PASSWORD",
                    Severity::Critical,
                    15,
                    format!("Password form submits to foreign host {target_host}"),
                )
                .with_detail(FindingDetail::FormTarget { action: target.to_string() }),
            ));
        }
    }
    Ok(None)
}

fn check_insecure_action(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let selector = parse_selector("form[action]")?;
    for form in document.select(&selector) {
        let Some(target) =
            form.value().attr("action").and_then(|a| resolve_action(&c.final_url, a))
        else {
            continue;
        };
        if target.scheme() == "http" {
            return Ok(Some(
                Finding::new(
                    "FRM_INSECURE_ACTION",
                    Severity::Critical,
                    6,
                    "Form submits over unencrypted http",
                )
                .with_detail(FindingDetail::FormTarget { action: target.to_string() }),
            ));
        }
    }
    Ok(None)
}

fn check_ip_action(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let selector = parse_selector("form[action]")?;
    for form in document.select(&selector) {
        let Some(target) =
            form.value().attr("action").and_then(|a| resolve_action(&c.final_url, a))
        else {
            continue;
        };
        if target.host_str().is_some_and(host_is_ip) {
            return Ok(Some(
                Finding::new(
                    "FRM_IP_ACTION",
                    Severity::Warning,
                    5,
                    "Form submits to a raw IP address",
                )
                .with_detail(FindingDetail::FormTarget { action: target.to_string() }),
            ));
        }
    }
    Ok(None)
}

fn check_credential_harvest(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let document = Html::parse_document(&c.body);
    let password = parse_selector("input[type=password]")?;
    let identity = parse_selector("input[type=email], input[name*=user], input[name*=card], input[name*=ssn]")?;

    let has_password = document.select(&password).next().is_some();
    let identity_inputs = document.select(&identity).count();
    if has_password && identity_inputs >= 1 {
        return Ok(Some(
            Finding::new(
                "FRM_CREDENTIAL_HARVEST",
                Severity::Warning,
                4,
                "Page pairs a password field with identity or payment inputs",
            )
            .with_detail(FindingDetail::Count { value: identity_inputs as u32 + 1 }),
        ));
    }
    Ok(None)
}

// --- Redirect checks ---

/// The full journey: submitted URL, intermediate hops, final landing URL.
fn journey(snapshot: &ArtifactSnapshot, c: &FetchedContent) -> Vec<String> {
    let mut hops = vec![snapshot.fingerprint.canonical_url.clone()];
    hops.extend(c.redirect_chain.iter().cloned());
    hops.push(c.final_url.clone());
    hops.dedup();
    hops
}

fn check_redirect_downgrade(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let hops = journey(snapshot, c);
    for pair in hops.windows(2) {
        if pair[0].starts_with("https://") && pair[1].starts_with("http://") {
            return Ok(Some(Finding::new(
                "RED_DOWNGRADE",
                Severity::Critical,
                5,
                "Redirect chain downgrades from https to http",
            )));
        }
    }
    Ok(None)
}

fn check_long_chain(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    let hops = c.redirect_chain.len() as u32;
    if hops >= 3 {
        return Ok(Some(
            Finding::new(
                "RED_LONG_CHAIN",
                Severity::Warning,
                4,
                format!("Request bounced through {hops} redirects"),
            )
            .with_detail(FindingDetail::RedirectHops { hops }),
        ));
    }
    Ok(None)
}

fn check_cross_domain_redirect(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    if c.redirect_chain.is_empty() {
        return Ok(None);
    }
    let final_host = host_of(&c.final_url).unwrap_or_default();
    if !final_host.is_empty() && final_host != snapshot.fingerprint.host {
        return Ok(Some(Finding::new(
            "RED_CROSS_DOMAIN",
            Severity::Warning,
            4,
            format!("Redirects land on a different domain ({final_host})"),
        )));
    }
    Ok(None)
}

// --- Security header checks ---

fn missing_header(
    snapshot: &ArtifactSnapshot,
    header: &'static str,
    check_id: &'static str,
    points: u32,
    message: &str,
) -> Result<Option<Finding>, String> {
    let Some(c) = content(snapshot) else {
        return Ok(None);
    };
    if !c.headers.contains_key(header) {
        return Ok(Some(
            Finding::new(check_id, Severity::Info, points, message)
                .with_detail(FindingDetail::Header { name: header.to_string() }),
        ));
    }
    Ok(None)
}

fn check_hsts_missing(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    if snapshot.fingerprint.scheme != "https" {
        return Ok(None);
    }
    missing_header(
        snapshot,
        "strict-transport-security",
        "HDR_HSTS_MISSING",
        1,
        "Strict-Transport-Security header is absent",
    )
}

fn check_csp_missing(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    missing_header(
        snapshot,
        "content-security-policy",
        "HDR_CSP_MISSING",
        2,
        "Content-Security-Policy header is absent",
    )
}

fn check_xfo_missing(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    missing_header(
        snapshot,
        "x-frame-options",
        "HDR_XFO_MISSING",
        1,
        "X-Frame-Options header is absent",
    )
}

fn check_xcto_missing(snapshot: &ArtifactSnapshot) -> Result<Option<Finding>, String> {
    missing_header(
        snapshot,
        "x-content-type-options",
        "HDR_XCTO_MISSING",
        1,
        "X-Content-Type-Options header is absent",
    )
}
