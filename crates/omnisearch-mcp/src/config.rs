//! Environment-driven configuration.
//!
//! Keys are read as `OMNISEARCH_<VENDOR>_API_KEY` first, then the vendor's own variable name.
//! Values are never logged or echoed; callers only ever see booleans.

use omnisearch_core::validate::validate_api_key;
use omnisearch_core::ProviderConfig;
use std::collections::BTreeMap;
use std::path::Path;

pub const ENV_FILE_VAR: &str = "OMNISEARCH_ENV_FILE";
pub const TIMEOUT_VAR: &str = "OMNISEARCH_TIMEOUT_MS";
pub const MAX_RETRIES_VAR: &str = "OMNISEARCH_MAX_RETRIES";
pub const LOG_VAR: &str = "OMNISEARCH_LOG";

/// One upstream account; several providers may share it (e.g. the Firecrawl trio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Vendor {
    Tavily,
    Brave,
    Kagi,
    Exa,
    Perplexity,
    Firecrawl,
    Jina,
}

impl Vendor {
    pub const ALL: [Vendor; 7] = [
        Self::Tavily,
        Self::Brave,
        Self::Kagi,
        Self::Exa,
        Self::Perplexity,
        Self::Firecrawl,
        Self::Jina,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tavily => "tavily",
            Self::Brave => "brave",
            Self::Kagi => "kagi",
            Self::Exa => "exa",
            Self::Perplexity => "perplexity",
            Self::Firecrawl => "firecrawl",
            Self::Jina => "jina",
        }
    }

    /// Candidate variables, in precedence order.
    pub fn key_vars(self) -> &'static [&'static str] {
        match self {
            Self::Tavily => &["OMNISEARCH_TAVILY_API_KEY", "TAVILY_API_KEY"],
            Self::Brave => &["OMNISEARCH_BRAVE_API_KEY", "BRAVE_API_KEY", "BRAVE_SEARCH_API_KEY"],
            Self::Kagi => &["OMNISEARCH_KAGI_API_KEY", "KAGI_API_KEY"],
            Self::Exa => &["OMNISEARCH_EXA_API_KEY", "EXA_API_KEY"],
            Self::Perplexity => &["OMNISEARCH_PERPLEXITY_API_KEY", "PERPLEXITY_API_KEY"],
            Self::Firecrawl => &["OMNISEARCH_FIRECRAWL_API_KEY", "FIRECRAWL_API_KEY"],
            Self::Jina => &["OMNISEARCH_JINA_API_KEY", "JINA_AI_API_KEY"],
        }
    }
}

/// Base URL override slots: `OMNISEARCH_<SLOT>_ENDPOINT`.
pub const ENDPOINT_SLOTS: [&str; 8] = [
    "TAVILY",
    "BRAVE",
    "KAGI",
    "EXA",
    "PERPLEXITY",
    "FIRECRAWL",
    "JINA_READER",
    "JINA_GROUNDING",
];

pub fn endpoint_var(slot: &str) -> String {
    format!("OMNISEARCH_{slot}_ENDPOINT")
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    keys: BTreeMap<Vendor, String>,
    endpoints: BTreeMap<&'static str, String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = BTreeMap::new();
        for vendor in Vendor::ALL {
            let key = vendor
                .key_vars()
                .iter()
                .find_map(|var| validate_api_key(lookup(var).as_deref(), vendor.as_str()).ok());
            if let Some(k) = key {
                keys.insert(vendor, k);
            }
        }
        let mut endpoints = BTreeMap::new();
        for slot in ENDPOINT_SLOTS {
            if let Some(url) = non_empty(lookup(&endpoint_var(slot))) {
                endpoints.insert(slot, url);
            }
        }
        Self {
            timeout_ms: non_empty(lookup(TIMEOUT_VAR)).and_then(|s| s.parse().ok()),
            max_retries: non_empty(lookup(MAX_RETRIES_VAR)).and_then(|s| s.parse().ok()),
            keys,
            endpoints,
        }
    }

    pub fn with_key(mut self, vendor: Vendor, key: impl Into<String>) -> Self {
        self.keys.insert(vendor, key.into());
        self
    }

    pub fn is_configured(&self, vendor: Vendor) -> bool {
        self.keys.contains_key(&vendor)
    }

    /// `{vendor: bool}` for every known vendor.
    pub fn configured_map(&self) -> BTreeMap<&'static str, bool> {
        Vendor::ALL
            .iter()
            .map(|v| (v.as_str(), self.is_configured(*v)))
            .collect()
    }

    /// Build a provider config from the vendor key, or `None` when the vendor has no key.
    ///
    /// `make` supplies the provider's defaults (base URL, auth scheme); overrides from the
    /// environment are applied on top.
    pub fn provider_config(
        &self,
        vendor: Vendor,
        endpoint_slot: &str,
        make: impl FnOnce(String) -> ProviderConfig,
    ) -> Option<ProviderConfig> {
        let key = self.keys.get(&vendor)?;
        let mut cfg = make(key.clone());
        if let Some(url) = self.endpoints.get(endpoint_slot) {
            cfg.base_url = url.clone();
        }
        if let Some(t) = self.timeout_ms {
            cfg.timeout_ms = t;
        }
        if let Some(r) = self.max_retries {
            cfg.max_retries = r;
        }
        Some(cfg)
    }
}

/// Load `KEY=VALUE` lines from `path` without overriding variables already set.
///
/// Blank lines, `#` comments and an optional leading `export ` are skipped. Returns how many
/// variables were set.
pub fn load_env_file(path: &Path) -> std::io::Result<usize> {
    let txt = std::fs::read_to_string(path)?;
    let mut n = 0;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
            n += 1;
        }
    }
    Ok(n)
}

/// Opt-in: only loads when `OMNISEARCH_ENV_FILE` names a file.
pub fn load_env_file_from_env() -> Option<std::io::Result<usize>> {
    let p = non_empty(std::env::var(ENV_FILE_VAR).ok())?;
    Some(load_env_file(Path::new(&p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisearch_core::AuthType;

    struct EnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved: Vec<(String, Option<String>)> = keys
                .iter()
                .map(|k| (k.to_string(), std::env::var(k).ok()))
                .collect();
            for (k, _) in &saved {
                std::env::remove_var(k);
            }
            Self { _lock: lock, saved }
        }

        fn set(&self, k: &str, v: &str) {
            std::env::set_var(k, v);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in self.saved.drain(..) {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn prefixed_key_wins_over_vendor_name() {
        let s = Settings::from_lookup(lookup(&[
            ("OMNISEARCH_TAVILY_API_KEY", "ours"),
            ("TAVILY_API_KEY", "theirs"),
        ]));
        let cfg = s
            .provider_config(Vendor::Tavily, "TAVILY", |k| {
                ProviderConfig::new(k, "https://api.tavily.com", AuthType::Bearer)
            })
            .unwrap();
        assert_eq!(cfg.api_key, "ours");
    }

    #[test]
    fn blank_and_quoted_keys_are_normalized() {
        let s = Settings::from_lookup(lookup(&[
            ("OMNISEARCH_BRAVE_API_KEY", "   "),
            ("BRAVE_API_KEY", ""),
            ("BRAVE_SEARCH_API_KEY", "\"b-key\""),
            ("EXA_API_KEY", "\t"),
        ]));
        assert!(s.is_configured(Vendor::Brave));
        assert!(!s.is_configured(Vendor::Exa));
        let cfg = s
            .provider_config(Vendor::Brave, "BRAVE", |k| {
                ProviderConfig::new(k, "https://api.search.brave.com", AuthType::Bearer)
            })
            .unwrap();
        assert_eq!(cfg.api_key, "b-key");
        assert!(s
            .provider_config(Vendor::Exa, "EXA", |k| {
                ProviderConfig::new(k, "https://api.exa.ai", AuthType::Bearer)
            })
            .is_none());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("FIRECRAWL_API_KEY", "fc"),
            ("OMNISEARCH_FIRECRAWL_ENDPOINT", "http://127.0.0.1:9999"),
            ("OMNISEARCH_TIMEOUT_MS", "1500"),
            ("OMNISEARCH_MAX_RETRIES", "nope"),
        ]));
        let cfg = s
            .provider_config(Vendor::Firecrawl, "FIRECRAWL", |k| {
                ProviderConfig::new(k, "https://api.firecrawl.dev", AuthType::Bearer)
            })
            .unwrap();
        assert_eq!(cfg.base_url, "http://127.0.0.1:9999");
        assert_eq!(cfg.timeout_ms, 1500);
        assert_eq!(cfg.max_retries, omnisearch_core::DEFAULT_MAX_RETRIES);
        assert_eq!(s.configured_map()["firecrawl"], true);
        assert_eq!(s.configured_map()["kagi"], false);
    }

    #[test]
    fn from_env_reads_process_environment() {
        let env = EnvGuard::new(&["OMNISEARCH_KAGI_API_KEY", "KAGI_API_KEY"]);
        assert!(!Settings::from_env().is_configured(Vendor::Kagi));
        env.set("KAGI_API_KEY", "k");
        assert!(Settings::from_env().is_configured(Vendor::Kagi));
    }

    #[test]
    fn env_file_never_overrides_process_env() {
        let env = EnvGuard::new(&["OMNISEARCH_TEST_A", "OMNISEARCH_TEST_B", "OMNISEARCH_TEST_C"]);
        env.set("OMNISEARCH_TEST_A", "from-process");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.env");
        std::fs::write(
            &path,
            "# comment\nOMNISEARCH_TEST_A=from-file\nexport OMNISEARCH_TEST_B = b\n\nnot a pair\nOMNISEARCH_TEST_C=\n",
        )
        .unwrap();
        let n = load_env_file(&path).unwrap();
        assert_eq!(n, 2);
        assert_eq!(std::env::var("OMNISEARCH_TEST_A").unwrap(), "from-process");
        assert_eq!(std::env::var("OMNISEARCH_TEST_B").unwrap(), "b");
        assert_eq!(std::env::var("OMNISEARCH_TEST_C").unwrap(), "");
    }
}
