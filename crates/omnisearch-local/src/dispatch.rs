//! Capability routing: one logical operation, many interchangeable backends.

use omnisearch_core::{
    EnhancementProvider, EnhancementResult, ProcessingProvider, ProcessingResult, ProviderError,
    Result, SearchParams, SearchProvider, SearchResult, UrlInput,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed selector → provider table, filled once at startup.
pub struct Dispatcher<P: ?Sized> {
    name: String,
    selector: &'static str,
    routes: BTreeMap<String, Arc<P>>,
}

impl<P: ?Sized> Dispatcher<P> {
    pub fn new(name: impl Into<String>, selector: &'static str) -> Self {
        Self {
            name: name.into(),
            selector,
            routes: BTreeMap::new(),
        }
    }

    pub fn register(mut self, key: impl Into<String>, provider: Arc<P>) -> Self {
        self.routes.insert(key.into(), provider);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &'static str {
        self.selector
    }

    pub fn keys(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route(&self, key: Option<&str>) -> Result<&Arc<P>> {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Err(ProviderError::invalid_input(
                format!("{} is required", self.selector),
                &self.name,
            ));
        };
        let provider = self.routes.get(key).ok_or_else(|| {
            let valid = if self.routes.is_empty() {
                "none configured".to_string()
            } else {
                self.keys().join(", ")
            };
            ProviderError::invalid_input(
                format!("Invalid {} '{key}'. Valid options: {valid}", self.selector),
                &self.name,
            )
        })?;
        tracing::debug!(dispatcher = %self.name, selector = self.selector, key, "routing call");
        Ok(provider)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSearchParams {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(flatten)]
    pub params: SearchParams,
}

/// Routes by `provider`; used for both web search and AI answer engines.
pub struct UnifiedSearch {
    dispatch: Dispatcher<dyn SearchProvider>,
}

impl UnifiedSearch {
    pub fn new(dispatch: Dispatcher<dyn SearchProvider>) -> Self {
        Self { dispatch }
    }

    pub fn dispatcher(&self) -> &Dispatcher<dyn SearchProvider> {
        &self.dispatch
    }

    pub async fn search(&self, req: &UnifiedSearchParams) -> Result<Vec<SearchResult>> {
        let p = self.dispatch.route(req.provider.as_deref())?;
        p.search(&req.params).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedProcessingParams {
    #[serde(default)]
    pub mode: Option<String>,
    pub url: UrlInput,
    #[serde(default)]
    pub extract_depth: Option<String>,
}

/// Routes by processing `mode` (extract, scrape, crawl, ...).
pub struct UnifiedProcessing {
    dispatch: Dispatcher<dyn ProcessingProvider>,
}

impl UnifiedProcessing {
    pub fn new(dispatch: Dispatcher<dyn ProcessingProvider>) -> Self {
        Self { dispatch }
    }

    pub fn dispatcher(&self) -> &Dispatcher<dyn ProcessingProvider> {
        &self.dispatch
    }

    pub async fn process_content(&self, req: &UnifiedProcessingParams) -> Result<ProcessingResult> {
        let p = self.dispatch.route(req.mode.as_deref())?;
        p.process_content(&req.url, req.extract_depth.as_deref()).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEnhancementParams {
    #[serde(default)]
    pub mode: Option<String>,
    pub content: String,
}

/// Routes by enhancement `mode` (fact_check, enrich).
pub struct UnifiedEnhancement {
    dispatch: Dispatcher<dyn EnhancementProvider>,
}

impl UnifiedEnhancement {
    pub fn new(dispatch: Dispatcher<dyn EnhancementProvider>) -> Self {
        Self { dispatch }
    }

    pub fn dispatcher(&self) -> &Dispatcher<dyn EnhancementProvider> {
        &self.dispatch
    }

    pub async fn enhance_content(
        &self,
        req: &UnifiedEnhancementParams,
    ) -> Result<EnhancementResult> {
        let p = self.dispatch.route(req.mode.as_deref())?;
        p.enhance_content(&req.content).await
    }
}
