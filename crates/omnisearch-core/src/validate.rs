//! Stateless input validators.
//!
//! Every validator either returns a normalized value or an `INVALID_INPUT` error attributed to
//! the calling provider. URL validation is the exception: it reports `{valid, errors}` so batch
//! callers can aggregate per-item problems.

use crate::{ProviderError, Result};
use serde::Serialize;

pub const DEFAULT_LIMIT_MIN: u32 = 1;
pub const DEFAULT_LIMIT_MAX: u32 = 50;

/// Trim, then strip one layer of matching wrapping quotes (keys pasted from config files).
pub fn validate_api_key(key: Option<&str>, provider: &str) -> Result<String> {
    let Some(raw) = key else {
        return Err(ProviderError::invalid_input(
            format!("API key not found for {provider}"),
            provider,
        ));
    };
    let mut k = raw.trim();
    for q in ['"', '\''] {
        if k.len() >= 2 && k.starts_with(q) && k.ends_with(q) {
            k = k[1..k.len() - 1].trim();
            break;
        }
    }
    if k.is_empty() {
        return Err(ProviderError::invalid_input(
            format!("API key not found for {provider}"),
            provider,
        ));
    }
    Ok(k.to_string())
}

#[derive(Debug, Clone)]
pub struct UrlPolicy {
    pub allowed_protocols: Vec<String>,
    pub require_https: bool,
    pub allow_localhost: bool,
    pub max_length: Option<usize>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            allowed_protocols: vec!["http".to_string(), "https".to_string()],
            require_https: false,
            allow_localhost: true,
            max_length: None,
        }
    }
}

impl UrlPolicy {
    /// Public-internet only: rejects localhost, loopback and `.local` hosts.
    pub fn public() -> Self {
        Self {
            allow_localhost: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

fn is_local_host(host: &str) -> bool {
    let h = host.trim_end_matches('.').to_ascii_lowercase();
    matches!(h.as_str(), "localhost" | "127.0.0.1" | "[::1]" | "::1")
        || h.ends_with(".local")
        || h.ends_with(".localhost")
}

pub fn validate_url(raw: &str, policy: &UrlPolicy) -> UrlValidation {
    let mut errors = Vec::new();
    let s = raw.trim();
    if s.is_empty() {
        errors.push("URL must be a non-empty string".to_string());
        return UrlValidation { valid: false, errors };
    }
    if let Some(max) = policy.max_length {
        if s.len() > max {
            errors.push(format!("URL exceeds maximum length of {max} characters"));
        }
    }
    match url::Url::parse(s) {
        Err(e) => errors.push(format!("Invalid URL format: {e}")),
        Ok(u) => {
            let scheme = u.scheme();
            if !policy
                .allowed_protocols
                .iter()
                .any(|p| p.trim_end_matches(':').eq_ignore_ascii_case(scheme))
            {
                errors.push(format!(
                    "Protocol {scheme}: is not allowed (allowed: {})",
                    policy.allowed_protocols.join(", ")
                ));
            } else if policy.require_https && scheme != "https" {
                errors.push("URL must use HTTPS".to_string());
            }
            match u.host_str() {
                None => errors.push("URL must include a host".to_string()),
                Some(h) if !policy.allow_localhost && is_local_host(h) => {
                    errors.push(format!("Local host {h} is not allowed"));
                }
                Some(_) => {}
            }
        }
    }
    UrlValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Validate a batch; item errors are prefixed with `URL[i]: `.
pub fn validate_urls(urls: &[String], policy: &UrlPolicy) -> UrlValidation {
    let mut errors = Vec::new();
    for (i, u) in urls.iter().enumerate() {
        for e in validate_url(u, policy).errors {
            errors.push(format!("URL[{i}]: {e}"));
        }
    }
    UrlValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Throwing form of [`validate_url`]; returns the trimmed URL.
pub fn require_url(raw: &str, policy: &UrlPolicy, provider: &str) -> Result<String> {
    let v = validate_url(raw, policy);
    if !v.valid {
        return Err(ProviderError::invalid_input(
            format!("Invalid URL: {}", v.errors.join("; ")),
            provider,
        ));
    }
    Ok(raw.trim().to_string())
}

/// Optional integer limit within `[min, max]`.
pub fn validate_limit(
    value: Option<f64>,
    min: u32,
    max: u32,
    field: &str,
    provider: &str,
) -> Result<Option<u32>> {
    let Some(v) = value else {
        return Ok(None);
    };
    if !v.is_finite() || v.fract() != 0.0 || v < min as f64 || v > max as f64 {
        return Err(ProviderError::invalid_input(
            format!("{field} must be an integer between {min} and {max}"),
            provider,
        ));
    }
    Ok(Some(v as u32))
}

#[derive(Debug, Clone, Default)]
pub struct ArrayPolicy {
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub max_item_len: Option<usize>,
    pub allow_empty: bool,
}

/// Optional string list. An empty list is treated as absent unless `allow_empty` is set.
pub fn validate_string_array(
    values: Option<Vec<String>>,
    policy: &ArrayPolicy,
    field: &str,
    provider: &str,
) -> Result<Option<Vec<String>>> {
    let Some(values) = values else {
        return Ok(None);
    };
    if values.is_empty() {
        return Ok(if policy.allow_empty { Some(values) } else { None });
    }
    if let Some(max) = policy.max_items {
        if values.len() > max {
            return Err(ProviderError::invalid_input(
                format!("{field} cannot contain more than {max} items"),
                provider,
            ));
        }
    }
    if let Some(min) = policy.min_items {
        if values.len() < min {
            return Err(ProviderError::invalid_input(
                format!("{field} must contain at least {min} items"),
                provider,
            ));
        }
    }
    if let Some(max_len) = policy.max_item_len {
        if let Some((i, _)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| v.chars().count() > max_len)
        {
            return Err(ProviderError::invalid_input(
                format!("{field}[{i}] exceeds maximum length of {max_len} characters"),
                provider,
            ));
        }
    }
    Ok(Some(values))
}

pub fn validate_enum<'a>(
    value: Option<&str>,
    allowed: &[&'a str],
    required: bool,
    field: &str,
    provider: &str,
) -> Result<Option<&'a str>> {
    match value {
        None if required => Err(ProviderError::invalid_input(
            format!("{field} is required"),
            provider,
        )),
        None => Ok(None),
        Some(v) => allowed.iter().find(|a| **a == v).copied().map(Some).ok_or_else(|| {
            ProviderError::invalid_input(
                format!("Invalid {field} '{v}'. Must be one of: {}", allowed.join(", ")),
                provider,
            )
        }),
    }
}

/// Trim and collapse each run of newlines into one space. Idempotent.
pub fn sanitize_query(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_newline = false;
    for ch in s.chars() {
        if ch == '\n' || ch == '\r' {
            if !in_newline {
                out.push(' ');
                in_newline = true;
            }
        } else {
            out.push(ch);
            in_newline = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn api_key_is_trimmed_and_unquoted() {
        assert_eq!(validate_api_key(Some("  abc  "), "p").unwrap(), "abc");
        assert_eq!(validate_api_key(Some("\"abc\""), "p").unwrap(), "abc");
        assert_eq!(validate_api_key(Some("'abc'"), "p").unwrap(), "abc");
        // Only one layer.
        assert_eq!(validate_api_key(Some("\"'abc'\""), "p").unwrap(), "'abc'");
    }

    #[test]
    fn missing_or_blank_api_key_is_invalid_input() {
        for k in [None, Some(""), Some("   "), Some("\"\"")] {
            let e = validate_api_key(k, "kagi").unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidInput);
            assert_eq!(e.provider, "kagi");
        }
    }

    #[test]
    fn url_policy_rejects_protocols_and_local_hosts() {
        let p = UrlPolicy::public();
        assert!(validate_url("https://example.com/a?b=c", &p).valid);
        let ftp = validate_url("ftp://example.com", &p);
        assert!(!ftp.valid);
        assert!(ftp.errors[0].contains("ftp"));
        for u in [
            "http://localhost:8080",
            "http://127.0.0.1/",
            "http://printer.local",
            "http://[::1]/",
        ] {
            assert!(!validate_url(u, &p).valid, "{u}");
        }
        assert!(!validate_url("not a url", &p).valid);
        assert!(validate_url("http://localhost:1", &UrlPolicy::default()).valid);
    }

    #[test]
    fn url_policy_require_https_and_max_length() {
        let p = UrlPolicy {
            require_https: true,
            max_length: Some(30),
            ..UrlPolicy::default()
        };
        assert!(!validate_url("http://example.com", &p).valid);
        assert!(validate_url("https://example.com", &p).valid);
        let long = format!("https://example.com/{}", "a".repeat(40));
        assert!(!validate_url(&long, &p).valid);
    }

    #[test]
    fn batch_validation_prefixes_index() {
        let urls = vec![
            "https://ok.test".to_string(),
            "ftp://bad.test".to_string(),
        ];
        let v = validate_urls(&urls, &UrlPolicy::default());
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 1);
        assert!(v.errors[0].starts_with("URL[1]: "));
    }

    #[test]
    fn limit_bounds() {
        assert_eq!(validate_limit(None, 1, 50, "limit", "p").unwrap(), None);
        assert_eq!(validate_limit(Some(10.0), 1, 50, "limit", "p").unwrap(), Some(10));
        for bad in [0.0, 51.0, 2.5, f64::NAN] {
            let e = validate_limit(Some(bad), 1, 50, "limit", "p").unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn empty_array_normalizes_to_absent() {
        let p = ArrayPolicy::default();
        assert_eq!(validate_string_array(Some(vec![]), &p, "d", "x").unwrap(), None);
        let allow = ArrayPolicy {
            allow_empty: true,
            ..ArrayPolicy::default()
        };
        assert_eq!(
            validate_string_array(Some(vec![]), &allow, "d", "x").unwrap(),
            Some(vec![])
        );
    }

    #[test]
    fn array_limits() {
        let p = ArrayPolicy {
            min_items: Some(2),
            max_items: Some(3),
            max_item_len: Some(5),
            allow_empty: false,
        };
        let v = |xs: &[&str]| Some(xs.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert!(validate_string_array(v(&["a"]), &p, "d", "x").is_err());
        assert!(validate_string_array(v(&["a", "b", "c", "d"]), &p, "d", "x").is_err());
        let e = validate_string_array(v(&["a", "toolong"]), &p, "d", "x").unwrap_err();
        assert!(e.message.contains("d[1]"));
        assert!(validate_string_array(v(&["a", "b"]), &p, "d", "x").is_ok());
    }

    #[test]
    fn enum_validation() {
        let allowed = ["basic", "advanced"];
        assert_eq!(
            validate_enum(Some("basic"), &allowed, true, "extract_depth", "p").unwrap(),
            Some("basic")
        );
        assert_eq!(validate_enum(None, &allowed, false, "extract_depth", "p").unwrap(), None);
        assert!(validate_enum(None, &allowed, true, "extract_depth", "p").is_err());
        let e = validate_enum(Some("deep"), &allowed, false, "extract_depth", "p").unwrap_err();
        assert!(e.message.contains("basic, advanced"));
    }

    #[test]
    fn sanitize_collapses_newlines() {
        assert_eq!(sanitize_query("  rust\n\nasync\r\nruntime "), "rust async runtime");
        assert_eq!(sanitize_query("\n\n"), "");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(s in ".*") {
            let once = sanitize_query(&s);
            prop_assert_eq!(sanitize_query(&once), once);
        }

        #[test]
        fn public_http_urls_are_valid(
            scheme in prop::sample::select(vec!["http", "https"]),
            label in "[a-z][a-z0-9]{0,10}",
            tld in prop::sample::select(vec!["com", "org", "dev", "io"]),
            path in "[a-z0-9/]{0,12}",
        ) {
            let u = format!("{scheme}://{label}.{tld}/{path}");
            let v = validate_url(&u, &UrlPolicy::public());
            prop_assert!(v.valid, "{} {:?}", u, v.errors);
        }

        #[test]
        fn other_protocols_are_invalid(
            scheme in prop::sample::select(vec!["ftp", "file", "ws", "gopher", "mailto"]),
            label in "[a-z][a-z0-9]{0,10}",
        ) {
            let u = format!("{scheme}://{label}.com/");
            let v = validate_url(&u, &UrlPolicy::public());
            prop_assert!(!v.valid);
            prop_assert!(!v.errors.is_empty());
        }

        #[test]
        fn local_hosts_are_invalid(
            scheme in prop::sample::select(vec!["http", "https"]),
            host in prop::sample::select(vec!["localhost", "127.0.0.1", "nas.local", "box.local"]),
            port in 1u16..65535,
        ) {
            let u = format!("{scheme}://{host}:{port}/");
            let v = validate_url(&u, &UrlPolicy::public());
            prop_assert!(!v.valid);
            prop_assert!(!v.errors.is_empty());
        }
    }
}
