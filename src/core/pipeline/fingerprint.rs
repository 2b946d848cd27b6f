// src/core/pipeline/fingerprint.rs

use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::core::error::ValidationError;
use crate::core::models::UrlFingerprint;

/// Parses and canonicalizes a submitted URL into its fingerprint.
///
/// Pure and fast: no I/O, no clock. The canonical form lowercases scheme and
/// host, strips a trailing dot from the host, elides default ports, drops the
/// fragment, and defaults a missing scheme to https (users paste bare
/// domains). The fingerprint keys the scan cache and the tombstone pre-check,
/// so this must run before any other work.
pub fn fingerprint(raw: &str) -> Result<UrlFingerprint, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Malformed(raw.to_string()));
    }

    // Bare domains are accepted the way a browser accepts them.
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url =
        Url::parse(&with_scheme).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.trim_end_matches('.').to_ascii_lowercase(),
        _ => return Err(ValidationError::MissingHost),
    };

    // Re-setting the normalized host also rejects oddities like empty labels.
    url.set_host(Some(&host))
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    url.set_fragment(None);

    // `Url::port` is None for default ports, which is exactly the elision
    // the canonical form wants.
    let port = url.port();
    let path = if url.path().is_empty() { "/".to_string() } else { url.path().to_string() };
    let query = url.query().map(str::to_string);

    // Userinfo is preserved: it is almost always a cloaking artifact and the
    // lexical rules need to see it.
    let userinfo = match (url.username(), url.password()) {
        ("", None) => String::new(),
        (user, None) => format!("{user}@"),
        (user, Some(pass)) => format!("{user}:{pass}@"),
    };

    let canonical_url = {
        let mut s = format!("{}://{}{}", url.scheme(), userinfo, host);
        if let Some(p) = port {
            s.push_str(&format!(":{p}"));
        }
        s.push_str(&path);
        if let Some(q) = &query {
            s.push('?');
            s.push_str(q);
        }
        s
    };

    let content_hash = hex::encode(Sha256::digest(canonical_url.as_bytes()));
    debug!(canonical = %canonical_url, hash = %content_hash, "Computed URL fingerprint.");

    Ok(UrlFingerprint {
        canonical_url,
        content_hash,
        scheme: url.scheme().to_string(),
        host,
        port,
        path,
        query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_domain_defaults_to_https() {
        let fp = fingerprint("Example.COM").expect("valid");
        assert_eq!(fp.canonical_url, "https://example.com/");
        assert_eq!(fp.scheme, "https");
        assert_eq!(fp.host, "example.com");
        assert_eq!(fp.path, "/");
        assert_eq!(fp.port, None);
    }

    #[test]
    fn equivalent_spellings_share_a_hash() {
        let a = fingerprint("https://example.com:443/login#top").expect("valid");
        let b = fingerprint("https://EXAMPLE.com./login").expect("valid");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.canonical_url, "https://example.com/login");
    }

    #[test]
    fn non_default_port_and_query_survive() {
        let fp = fingerprint("http://example.com:8080/a?b=1").expect("valid");
        assert_eq!(fp.canonical_url, "http://example.com:8080/a?b=1");
        assert_eq!(fp.port, Some(8080));
        assert_eq!(fp.query.as_deref(), Some("b=1"));
    }

    #[test]
    fn rejects_garbage_and_unsupported_schemes() {
        assert!(matches!(fingerprint("   "), Err(ValidationError::Malformed(_))));
        assert!(matches!(
            fingerprint("ftp://example.com"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
        assert!(fingerprint("http://").is_err());
    }

    #[test]
    fn userinfo_survives_canonicalization() {
        let fp = fingerprint("https://paypal.com@evil.example/x").expect("valid");
        assert_eq!(fp.canonical_url, "https://paypal.com@evil.example/x");
        assert_eq!(fp.host, "evil.example");
    }

    #[test]
    fn determinism() {
        let a = fingerprint("https://example.com/x?y=z").expect("valid");
        let b = fingerprint("https://example.com/x?y=z").expect("valid");
        assert_eq!(a, b);
    }
}
