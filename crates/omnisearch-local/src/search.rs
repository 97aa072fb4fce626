use crate::base::{SearchBase, SearchOptions, ValidatedSearch};
use omnisearch_core::operators::QueryOperators;
use omnisearch_core::{AuthType, ProviderConfig, Result, SearchParams, SearchProvider, SearchResult};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Operators that Brave/Kagi understand inline, re-serialized after parsing.
fn native_operator_suffix(ops: &QueryOperators) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(ops.file_types.iter().map(|v| format!("filetype:{v}")));
    parts.extend(ops.intitle.iter().map(|v| format!("intitle:{v}")));
    parts.extend(ops.inurl.iter().map(|v| format!("inurl:{v}")));
    parts.extend(ops.inbody.iter().map(|v| format!("inbody:{v}")));
    parts.extend(ops.inpage.iter().map(|v| format!("inpage:{v}")));
    if let Some(v) = &ops.date_before {
        parts.push(format!("before:{v}"));
    }
    if let Some(v) = &ops.date_after {
        parts.push(format!("after:{v}"));
    }
    parts.extend(ops.force_include.iter().map(|v| format!("+{v}")));
    parts.extend(ops.exclude_terms.iter().map(|v| format!("-{v}")));
    parts.join(" ")
}

fn inline_query(v: &ValidatedSearch) -> String {
    let q = v.domains.apply_to_query(&v.base_with_phrases());
    let suffix = native_operator_suffix(&v.parsed.operators);
    if suffix.is_empty() {
        q
    } else {
        format!("{q} {suffix}")
    }
}

fn meta<const N: usize>(
    pairs: [(&str, Option<serde_json::Value>); N],
) -> BTreeMap<String, serde_json::Value> {
    pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct TavilySearchProvider {
    base: SearchBase,
}

#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    base: SearchBase,
}

#[derive(Debug, Clone)]
pub struct KagiSearchProvider {
    base: SearchBase,
}

#[derive(Debug, Clone)]
pub struct ExaSearchProvider {
    base: SearchBase,
}

impl TavilySearchProvider {
    pub const NAME: &'static str = "tavily";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.tavily.com";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(api_key, Self::DEFAULT_BASE_URL, AuthType::Bearer)
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        let options = SearchOptions {
            max_limit: 20,
            ..SearchOptions::default()
        };
        Self {
            base: SearchBase::new(client, Self::NAME, config, options),
        }
    }
}

impl BraveSearchProvider {
    pub const NAME: &'static str = "brave";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.search.brave.com";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(
            api_key,
            Self::DEFAULT_BASE_URL,
            AuthType::ApiKey {
                header: "X-Subscription-Token".to_string(),
            },
        )
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        let options = SearchOptions {
            max_limit: 20,
            ..SearchOptions::default()
        };
        Self {
            base: SearchBase::new(client, Self::NAME, config, options),
        }
    }
}

impl KagiSearchProvider {
    pub const NAME: &'static str = "kagi";
    pub const DEFAULT_BASE_URL: &'static str = "https://kagi.com/api/v0";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(api_key, Self::DEFAULT_BASE_URL, AuthType::Custom)
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: SearchBase::new(client, Self::NAME, config, SearchOptions::default()),
        }
    }
}

impl ExaSearchProvider {
    pub const NAME: &'static str = "exa";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.exa.ai";

    pub fn default_config(api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig::new(
            api_key,
            Self::DEFAULT_BASE_URL,
            AuthType::ApiKey {
                header: "x-api-key".to_string(),
            },
        )
    }

    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            base: SearchBase::new(client, Self::NAME, config, SearchOptions::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    score: Option<f64>,
    published_date: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for TavilySearchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Tavily web search optimized for factual, citation-ready results"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let v = self.base.validate_search_params(params)?;
        let body = serde_json::json!({
            "query": v.base_with_phrases(),
            "max_results": v.limit,
            "search_depth": "basic",
            "topic": "general",
            "include_answer": false,
            "include_raw_content": false,
            "include_domains": v.domains.include,
            "exclude_domains": v.domains.exclude,
        });

        let parsed: TavilySearchResponse = self
            .base
            .execute_with_retry(|| self.base.http().post_json("/search", &body))
            .await?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title.unwrap_or_default(),
                url: r.url,
                snippet: r.content.unwrap_or_default(),
                score: r.score,
                source_provider: Self::NAME.to_string(),
                metadata: meta([("published_date", r.published_date.map(Into::into))]),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
    age: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Brave independent web index; supports site:, filetype:, intitle: and other operators"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let v = self.base.validate_search_params(params)?;
        let q = inline_query(&v);
        let count = v.limit.to_string();
        let mut query: Vec<(&str, &str)> = vec![("q", q.as_str()), ("count", count.as_str())];
        if let Some(lang) = v.parsed.operators.language.as_deref() {
            query.push(("search_lang", lang));
        }
        if let Some(country) = v.parsed.operators.location.as_deref() {
            query.push(("country", country));
        }

        let parsed: BraveWebSearchResponse = self
            .base
            .execute_with_retry(|| self.base.http().get_json("/res/v1/web/search", &query))
            .await?;

        let results = parsed.web.and_then(|w| w.results).unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title.unwrap_or_default(),
                url: r.url,
                snippet: r.description.unwrap_or_default(),
                score: None,
                source_provider: Self::NAME.to_string(),
                metadata: meta([("age", r.age.map(Into::into))]),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct KagiSearchResponse {
    #[serde(default)]
    data: Vec<KagiSearchItem>,
}

#[derive(Debug, Deserialize)]
struct KagiSearchItem {
    /// 0 = search result, 1 = related searches.
    t: u8,
    url: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
    published: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for KagiSearchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Kagi premium ad-free search results"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let v = self.base.validate_search_params(params)?;
        let q = inline_query(&v);
        let limit = v.limit.to_string();
        let auth = format!("Bot {}", v.api_key);
        let http = self.base.http().with_header("Authorization", &auth);

        let query = [("q", q.as_str()), ("limit", limit.as_str())];

        let parsed: KagiSearchResponse = self
            .base
            .execute_with_retry(|| http.get_json("/search", &query))
            .await?;

        Ok(parsed
            .data
            .into_iter()
            .filter(|d| d.t == 0)
            .filter_map(|d| {
                Some(SearchResult {
                    url: d.url?,
                    title: d.title.unwrap_or_default(),
                    snippet: d.snippet.unwrap_or_default(),
                    score: None,
                    source_provider: Self::NAME.to_string(),
                    metadata: meta([("published", d.published.map(Into::into))]),
                })
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaSearchResponse {
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    url: String,
    title: Option<String>,
    text: Option<String>,
    score: Option<f64>,
    published_date: Option<String>,
    author: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for ExaSearchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Exa neural search; good for semantic and research-style queries"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let v = self.base.validate_search_params(params)?;
        let mut body = serde_json::json!({
            "query": v.base_with_phrases(),
            "numResults": v.limit,
            "type": "auto",
            "contents": { "text": { "maxCharacters": 1000 } },
        });
        if !v.domains.include.is_empty() {
            body["includeDomains"] = serde_json::json!(v.domains.include);
        }
        if !v.domains.exclude.is_empty() {
            body["excludeDomains"] = serde_json::json!(v.domains.exclude);
        }

        let parsed: ExaSearchResponse = self
            .base
            .execute_with_retry(|| self.base.http().post_json("/search", &body))
            .await?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title.unwrap_or_default(),
                url: r.url,
                snippet: r.text.unwrap_or_default(),
                score: r.score,
                source_provider: Self::NAME.to_string(),
                metadata: meta([
                    ("published_date", r.published_date.map(Into::into)),
                    ("author", r.author.map(Into::into)),
                ]),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(query: &str) -> ValidatedSearch {
        let p = BraveSearchProvider::new(
            reqwest::Client::new(),
            BraveSearchProvider::default_config("k"),
        );
        p.base
            .validate_search_params(&SearchParams {
                query: query.to_string(),
                ..SearchParams::default()
            })
            .unwrap()
    }

    #[test]
    fn inline_query_reassembles_operators() {
        let v = validated(r#"tokio "select macro" site:docs.rs filetype:html -async-std"#);
        assert_eq!(
            inline_query(&v),
            r#"tokio "select macro" site:docs.rs filetype:html -async-std"#
        );
        assert_eq!(v.base_with_phrases(), r#"tokio "select macro""#);
    }

    #[test]
    fn parses_minimal_brave_shape() {
        let js = r#"
        {
          "web": {
            "results": [
              {"url":"https://example.com","title":"Example","description":"Hello","age":"2 days ago"}
            ]
          }
        }
        "#;
        let parsed: BraveWebSearchResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.web.unwrap().results.unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].url, "https://example.com");
        assert_eq!(rs[0].description.as_deref(), Some("Hello"));
        assert_eq!(rs[0].age.as_deref(), Some("2 days ago"));
    }

    #[test]
    fn parses_minimal_tavily_shape() {
        let js = r#"
        {
          "results": [
            {"url":"https://example.com","title":"Example","content":"Hello","score":0.9}
          ]
        }
        "#;
        let parsed: TavilySearchResponse = serde_json::from_str(js).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].score, Some(0.9));
        assert!(parsed.results[0].published_date.is_none());
    }

    #[test]
    fn parses_kagi_shape_and_skips_related_searches() {
        let js = r#"
        {
          "meta": {"id": "x"},
          "data": [
            {"t": 0, "rank": 1, "url": "https://a.test", "title": "A", "snippet": "aa"},
            {"t": 1, "list": ["related"]}
          ]
        }
        "#;
        let parsed: KagiSearchResponse = serde_json::from_str(js).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data.iter().filter(|d| d.t == 0).count(), 1);
    }

    #[test]
    fn parses_exa_camel_case_shape() {
        let js = r#"
        {
          "results": [
            {"url":"https://a.test","title":"A","text":"body","score":0.5,"publishedDate":"2024-01-01","author":"me"}
          ]
        }
        "#;
        let parsed: ExaSearchResponse = serde_json::from_str(js).unwrap();
        assert_eq!(parsed.results[0].published_date.as_deref(), Some("2024-01-01"));
        assert_eq!(parsed.results[0].author.as_deref(), Some("me"));
    }

    #[test]
    fn metadata_skips_absent_values() {
        let m = meta([("a", Some(serde_json::json!(1))), ("b", None)]);
        assert_eq!(m.len(), 1);
        assert_eq!(m["a"], 1);
    }
}
