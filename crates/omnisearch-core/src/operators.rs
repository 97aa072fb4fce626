//! Inline search operators (`site:`, `filetype:`, `before:`, quoted phrases, ...).
//!
//! Free-text queries are split into a base query plus typed operators so each search backend
//! can re-express them in its own syntax (query fragments, structured filters, or both).

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOperators {
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    pub file_types: Vec<String>,
    pub intitle: Vec<String>,
    pub inurl: Vec<String>,
    pub inbody: Vec<String>,
    pub inpage: Vec<String>,
    pub language: Option<String>,
    pub location: Option<String>,
    pub date_before: Option<String>,
    pub date_after: Option<String>,
    pub exact_phrases: Vec<String>,
    pub force_include: Vec<String>,
    pub exclude_terms: Vec<String>,
    pub boolean_operators: Vec<String>,
}

impl QueryOperators {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedQuery {
    pub base_query: String,
    pub operators: QueryOperators,
}

#[derive(Clone, Copy)]
enum Slot {
    ExcludeDomain,
    IncludeDomain,
    FileType,
    InTitle,
    InUrl,
    InBody,
    InPage,
    Language,
    Location,
    Before,
    After,
    ExactPhrase,
    ForceInclude,
    ExcludeTerm,
    Boolean,
}

// Order matters: `-site:` must be consumed before `site:`, and bare `-term`/`+term` run
// after every prefixed operator has been stripped.
const PATTERNS: &[(Slot, &str)] = &[
    (Slot::ExcludeDomain, r#"(?:^|\s)-site:(\S+)"#),
    (Slot::IncludeDomain, r#"(?:^|\s)site:(\S+)"#),
    (Slot::FileType, r#"(?:^|\s)(?:filetype|ext):(\S+)"#),
    (Slot::InTitle, r#"(?:^|\s)intitle:(?:"([^"]+)"|(\S+))"#),
    (Slot::InUrl, r#"(?:^|\s)inurl:(?:"([^"]+)"|(\S+))"#),
    (Slot::InBody, r#"(?:^|\s)inbody:(?:"([^"]+)"|(\S+))"#),
    (Slot::InPage, r#"(?:^|\s)inpage:(?:"([^"]+)"|(\S+))"#),
    (Slot::Language, r#"(?:^|\s)(?:lang|language):(\S+)"#),
    (Slot::Location, r#"(?:^|\s)(?:loc|location):(\S+)"#),
    (Slot::Before, r#"(?:^|\s)before:(\S+)"#),
    (Slot::After, r#"(?:^|\s)after:(\S+)"#),
    (Slot::ExactPhrase, r#""([^"]+)""#),
    (Slot::ForceInclude, r#"(?:^|\s)\+(\S+)"#),
    (Slot::ExcludeTerm, r#"(?:^|\s)-(\S+)"#),
    (Slot::Boolean, r#"\b(AND|OR|NOT)\b"#),
];

fn compiled() -> &'static [(Slot, Regex)] {
    static TABLE: OnceLock<Vec<(Slot, Regex)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(slot, pat)| Regex::new(pat).ok().map(|re| (*slot, re)))
            .collect()
    })
}

fn record(ops: &mut QueryOperators, slot: Slot, value: String) {
    match slot {
        Slot::ExcludeDomain => ops.exclude_domains.push(value),
        Slot::IncludeDomain => ops.include_domains.push(value),
        Slot::FileType => ops.file_types.push(value),
        Slot::InTitle => ops.intitle.push(value),
        Slot::InUrl => ops.inurl.push(value),
        Slot::InBody => ops.inbody.push(value),
        Slot::InPage => ops.inpage.push(value),
        Slot::Language => ops.language = Some(value),
        Slot::Location => ops.location = Some(value),
        Slot::Before => ops.date_before = Some(value),
        Slot::After => ops.date_after = Some(value),
        Slot::ExactPhrase => ops.exact_phrases.push(value),
        Slot::ForceInclude => ops.force_include.push(value),
        Slot::ExcludeTerm => ops.exclude_terms.push(value),
        Slot::Boolean => ops.boolean_operators.push(value),
    }
}

pub fn parse_query_operators(query: &str) -> ParsedQuery {
    let mut ops = QueryOperators::default();
    let mut q = query.to_string();
    for (slot, re) in compiled() {
        let mut hit = false;
        for caps in re.captures_iter(&q) {
            let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string());
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                record(&mut ops, *slot, v);
                hit = true;
            }
        }
        if hit {
            q = re.replace_all(&q, " ").into_owned();
        }
    }
    ParsedQuery {
        base_query: q.split_whitespace().collect::<Vec<_>>().join(" "),
        operators: ops,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainFilters {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DomainFilters {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// `site:a` / `(site:a OR site:b)` followed by `-site:x` terms.
    pub fn to_query_fragment(&self) -> String {
        let mut parts = Vec::new();
        match self.include.len() {
            0 => {}
            1 => parts.push(format!("site:{}", self.include[0])),
            _ => parts.push(format!(
                "({})",
                self.include
                    .iter()
                    .map(|d| format!("site:{d}"))
                    .collect::<Vec<_>>()
                    .join(" OR ")
            )),
        }
        for d in &self.exclude {
            parts.push(format!("-site:{d}"));
        }
        parts.join(" ")
    }

    pub fn apply_to_query(&self, base_query: &str) -> String {
        let frag = self.to_query_fragment();
        match (base_query.trim().is_empty(), frag.is_empty()) {
            (_, true) => base_query.trim().to_string(),
            (true, false) => frag,
            (false, false) => format!("{} {frag}", base_query.trim()),
        }
    }
}

fn push_unique(out: &mut Vec<String>, d: &str) {
    let d = d.trim();
    if !d.is_empty() && !out.iter().any(|x| x.eq_ignore_ascii_case(d)) {
        out.push(d.to_string());
    }
}

/// Merge structured include/exclude lists with parsed `site:` / `-site:` operators.
pub fn build_domain_filters(
    include: Option<&[String]>,
    exclude: Option<&[String]>,
    operators: &QueryOperators,
) -> DomainFilters {
    let mut f = DomainFilters::default();
    for d in include.unwrap_or_default().iter().chain(&operators.include_domains) {
        push_unique(&mut f.include, d);
    }
    for d in exclude.unwrap_or_default().iter().chain(&operators.exclude_domains) {
        push_unique(&mut f.exclude, d);
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_operators() {
        let p = parse_query_operators(
            r#"foo site:example.com -site:bad.com "exact phrase" before:2020"#,
        );
        assert_eq!(p.base_query, "foo");
        assert_eq!(p.operators.include_domains, vec!["example.com"]);
        assert_eq!(p.operators.exclude_domains, vec!["bad.com"]);
        assert_eq!(p.operators.exact_phrases, vec!["exact phrase"]);
        assert_eq!(p.operators.date_before.as_deref(), Some("2020"));
        assert!(p.operators.date_after.is_none());
    }

    #[test]
    fn parses_filters_terms_and_booleans() {
        let p = parse_query_operators(
            r#"rust filetype:pdf intitle:"async io" lang:en loc:us after:2021-01-01 +tokio -java OR go"#,
        );
        assert_eq!(p.base_query, "rust go");
        assert_eq!(p.operators.file_types, vec!["pdf"]);
        assert_eq!(p.operators.intitle, vec!["async io"]);
        assert_eq!(p.operators.language.as_deref(), Some("en"));
        assert_eq!(p.operators.location.as_deref(), Some("us"));
        assert_eq!(p.operators.date_after.as_deref(), Some("2021-01-01"));
        assert_eq!(p.operators.force_include, vec!["tokio"]);
        assert_eq!(p.operators.exclude_terms, vec!["java"]);
        assert_eq!(p.operators.boolean_operators, vec!["OR"]);
    }

    #[test]
    fn plain_query_has_no_operators() {
        let p = parse_query_operators("  how   do lifetimes work ");
        assert_eq!(p.base_query, "how do lifetimes work");
        assert!(p.operators.is_empty());
    }

    #[test]
    fn hyphenated_words_are_not_exclusions() {
        let p = parse_query_operators("state-of-the-art retrieval");
        assert_eq!(p.base_query, "state-of-the-art retrieval");
        assert!(p.operators.exclude_terms.is_empty());
    }

    #[test]
    fn domain_filters_merge_and_dedup() {
        let parsed = parse_query_operators("x site:a.com site:b.com -site:c.com");
        let include = vec!["a.com".to_string(), "d.com".to_string()];
        let f = build_domain_filters(Some(&include), None, &parsed.operators);
        assert_eq!(f.include, vec!["a.com", "d.com", "b.com"]);
        assert_eq!(f.exclude, vec!["c.com"]);
        assert_eq!(
            f.to_query_fragment(),
            "(site:a.com OR site:d.com OR site:b.com) -site:c.com"
        );
        assert_eq!(
            f.apply_to_query(&parsed.base_query),
            "x (site:a.com OR site:d.com OR site:b.com) -site:c.com"
        );
    }

    #[test]
    fn single_include_has_no_parens() {
        let f = DomainFilters {
            include: vec!["docs.rs".to_string()],
            exclude: vec![],
        };
        assert_eq!(f.apply_to_query("serde"), "serde site:docs.rs");
        assert_eq!(DomainFilters::default().apply_to_query(" serde "), "serde");
    }
}
