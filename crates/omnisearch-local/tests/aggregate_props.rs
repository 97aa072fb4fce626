use omnisearch_core::{AuthType, ProviderConfig, RawContent};
use omnisearch_local::{ProcessingBase, ProcessingOptions};
use proptest::prelude::*;

fn base() -> ProcessingBase {
    ProcessingBase::new(
        reqwest::Client::new(),
        "props",
        ProviderConfig::new("k", "http://127.0.0.1:9", AuthType::Bearer),
        ProcessingOptions::default(),
    )
}

fn pages() -> impl Strategy<Value = Vec<RawContent>> {
    prop::collection::vec(
        ("[a-z]{1,8}", "[a-zA-Z ]{0,40}").prop_map(|(host, content)| RawContent {
            url: format!("https://{host}.test"),
            content,
        }),
        0..8,
    )
}

proptest! {
    #[test]
    fn aggregate_keeps_every_page_in_order(pages in pages()) {
        let agg = base().aggregate_content(&pages);
        prop_assert_eq!(&agg.raw_contents, &pages);
        let expected_words: usize = pages
            .iter()
            .map(|p| p.content.split_whitespace().count())
            .sum();
        prop_assert_eq!(agg.total_word_count, expected_words);

        let mut cursor = 0usize;
        for p in &pages {
            let found = agg.content[cursor..].find(p.content.as_str());
            prop_assert!(found.is_some());
            cursor += found.unwrap_or_default() + p.content.len();
        }
    }

    #[test]
    fn aggregate_separates_multiple_pages(pages in pages()) {
        let agg = base().aggregate_content(&pages);
        let seps = agg.content.matches("\n\n---\n\n").count();
        prop_assert_eq!(seps, pages.len().saturating_sub(1));
    }
}
