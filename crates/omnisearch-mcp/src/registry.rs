//! Startup wiring: which providers exist, and the four routing tables the tools use.

use crate::config::{Settings, Vendor};
use omnisearch_core::{EnhancementProvider, ProcessingProvider, SearchProvider};
use omnisearch_local::{
    firecrawl, kagi, BraveSearchProvider, Dispatcher, ExaSearchProvider,
    FirecrawlCrawlProvider, FirecrawlExtractProvider, FirecrawlScrapeProvider,
    JinaGroundingProvider, JinaReaderProvider, KagiEnrichmentProvider, KagiFastGptProvider,
    KagiSearchProvider, KagiSummarizerProvider, PerplexitySearchProvider, TavilyExtractProvider,
    TavilySearchProvider, UnifiedEnhancement, UnifiedProcessing, UnifiedSearch,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub enum RegisteredProvider {
    Search(Arc<dyn SearchProvider>),
    Processing(Arc<dyn ProcessingProvider>),
    Enhancement(Arc<dyn EnhancementProvider>),
}

impl RegisteredProvider {
    pub fn name(&self) -> &str {
        match self {
            Self::Search(p) => p.name(),
            Self::Processing(p) => p.name(),
            Self::Enhancement(p) => p.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Search(p) => p.description(),
            Self::Processing(p) => p.description(),
            Self::Enhancement(p) => p.description(),
        }
    }

    pub fn capability(&self) -> &'static str {
        match self {
            Self::Search(_) => "search",
            Self::Processing(_) => "processing",
            Self::Enhancement(_) => "enhancement",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub capability: &'static str,
    pub description: String,
    pub routes: Vec<String>,
}

/// Built once at startup; immutable afterwards.
pub struct ToolRegistry {
    providers: BTreeMap<String, (RegisteredProvider, Vec<String>)>,
    web_search: UnifiedSearch,
    ai_search: UnifiedSearch,
    web_extract: UnifiedProcessing,
    enhance_content: UnifiedEnhancement,
}

struct Builder {
    providers: BTreeMap<String, (RegisteredProvider, Vec<String>)>,
    web_search: Dispatcher<dyn SearchProvider>,
    ai_search: Dispatcher<dyn SearchProvider>,
    web_extract: Dispatcher<dyn ProcessingProvider>,
    enhance_content: Dispatcher<dyn EnhancementProvider>,
}

impl Builder {
    fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            web_search: Dispatcher::new("web_search", "provider"),
            ai_search: Dispatcher::new("ai_search", "provider"),
            web_extract: Dispatcher::new("web_extract", "mode"),
            enhance_content: Dispatcher::new("enhance_content", "mode"),
        }
    }

    fn record(&mut self, p: RegisteredProvider, route: String) {
        self.providers
            .entry(p.name().to_string())
            .or_insert_with(|| (p, Vec::new()))
            .1
            .push(route);
    }

    fn web(mut self, key: &str, p: Arc<dyn SearchProvider>) -> Self {
        self.record(RegisteredProvider::Search(p.clone()), format!("web_search.provider={key}"));
        self.web_search = self.web_search.register(key, p);
        self
    }

    fn ai(mut self, key: &str, p: Arc<dyn SearchProvider>) -> Self {
        self.record(RegisteredProvider::Search(p.clone()), format!("ai_search.provider={key}"));
        self.ai_search = self.ai_search.register(key, p);
        self
    }

    fn extract(mut self, key: &str, p: Arc<dyn ProcessingProvider>) -> Self {
        self.record(RegisteredProvider::Processing(p.clone()), format!("web_extract.mode={key}"));
        self.web_extract = self.web_extract.register(key, p);
        self
    }

    fn enhance(mut self, key: &str, p: Arc<dyn EnhancementProvider>) -> Self {
        self.record(
            RegisteredProvider::Enhancement(p.clone()),
            format!("enhance_content.mode={key}"),
        );
        self.enhance_content = self.enhance_content.register(key, p);
        self
    }

    fn finish(self) -> ToolRegistry {
        ToolRegistry {
            providers: self.providers,
            web_search: UnifiedSearch::new(self.web_search),
            ai_search: UnifiedSearch::new(self.ai_search),
            web_extract: UnifiedProcessing::new(self.web_extract),
            enhance_content: UnifiedEnhancement::new(self.enhance_content),
        }
    }
}

impl ToolRegistry {
    /// Register every provider whose vendor has a key; the rest stay invisible.
    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Self {
        let mut b = Builder::new();
        let c = || client.clone();

        if let Some(cfg) = settings.provider_config(
            Vendor::Tavily,
            "TAVILY",
            TavilySearchProvider::default_config,
        ) {
            b = b
                .web("tavily", Arc::new(TavilySearchProvider::new(c(), cfg.clone())))
                .extract("extract", Arc::new(TavilyExtractProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(
            Vendor::Brave,
            "BRAVE",
            BraveSearchProvider::default_config,
        ) {
            b = b.web("brave", Arc::new(BraveSearchProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(Vendor::Kagi, "KAGI", kagi::default_config) {
            b = b
                .web("kagi", Arc::new(KagiSearchProvider::new(c(), cfg.clone())))
                .ai("kagi_fastgpt", Arc::new(KagiFastGptProvider::new(c(), cfg.clone())))
                .extract("summarize", Arc::new(KagiSummarizerProvider::new(c(), cfg.clone())))
                .enhance("enrich", Arc::new(KagiEnrichmentProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(
            Vendor::Exa,
            "EXA",
            ExaSearchProvider::default_config,
        ) {
            b = b.web("exa", Arc::new(ExaSearchProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(
            Vendor::Perplexity,
            "PERPLEXITY",
            PerplexitySearchProvider::default_config,
        ) {
            b = b.ai("perplexity", Arc::new(PerplexitySearchProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(
            Vendor::Firecrawl,
            "FIRECRAWL",
            firecrawl::default_config,
        ) {
            b = b
                .extract("scrape", Arc::new(FirecrawlScrapeProvider::new(c(), cfg.clone())))
                .extract("crawl", Arc::new(FirecrawlCrawlProvider::new(c(), cfg.clone())))
                .extract("structured", Arc::new(FirecrawlExtractProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(
            Vendor::Jina,
            "JINA_READER",
            JinaReaderProvider::default_config,
        ) {
            b = b.extract("read", Arc::new(JinaReaderProvider::new(c(), cfg)));
        }
        if let Some(cfg) = settings.provider_config(
            Vendor::Jina,
            "JINA_GROUNDING",
            JinaGroundingProvider::default_config,
        ) {
            b = b.enhance("fact_check", Arc::new(JinaGroundingProvider::new(c(), cfg)));
        }

        let r = b.finish();
        tracing::info!(
            providers = r.providers.len(),
            web_search = ?r.web_search.dispatcher().keys(),
            ai_search = ?r.ai_search.dispatcher().keys(),
            web_extract = ?r.web_extract.dispatcher().keys(),
            enhance_content = ?r.enhance_content.dispatcher().keys(),
            "provider registry built"
        );
        r
    }

    pub fn web_search(&self) -> &UnifiedSearch {
        &self.web_search
    }

    pub fn ai_search(&self) -> &UnifiedSearch {
        &self.ai_search
    }

    pub fn web_extract(&self) -> &UnifiedProcessing {
        &self.web_extract
    }

    pub fn enhance_content(&self) -> &UnifiedEnhancement {
        &self.enhance_content
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.get(name).map(|(p, _)| p)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers
            .values()
            .map(|(p, routes)| ProviderInfo {
                name: p.name().to_string(),
                capability: p.capability(),
                description: p.description().to_string(),
                routes: routes.clone(),
            })
            .collect()
    }

    /// `{tool: [selector values]}` for the four routing tools.
    pub fn routes(&self) -> BTreeMap<&'static str, Vec<String>> {
        let keys = |ks: Vec<&str>| ks.into_iter().map(str::to_string).collect::<Vec<_>>();
        BTreeMap::from([
            ("web_search", keys(self.web_search.dispatcher().keys())),
            ("ai_search", keys(self.ai_search.dispatcher().keys())),
            ("web_extract", keys(self.web_extract.dispatcher().keys())),
            ("enhance_content", keys(self.enhance_content.dispatcher().keys())),
        ])
    }
}
