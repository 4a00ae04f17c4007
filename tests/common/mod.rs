// tests/common/mod.rs
//
// Shared fakes for integration tests: scripted LLM, canned news provider,
// in-memory article fetcher.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use competitor_research::ai_adapter::{CompletionFuture, CompletionRequest, LlmClient};
use competitor_research::analyze::curation::LlmCurator;
use competitor_research::ingest::article::{
    ArticleFailure, ArticleFetcher, ArticleOutcome, FetchedArticle,
};
use competitor_research::ingest::providers::google_news::GoogleNewsProvider;
use competitor_research::ingest::types::{NewsItem, NewsProvider, NewsQuery};
use competitor_research::research::ResearchPipeline;

pub const COMPANY_FEED: &str = include_str!("../fixtures/google_news_company.xml");
pub const SITE_FEED: &str = include_str!("../fixtures/google_news_site.xml");
pub const ARTICLE_HTML: &str = include_str!("../fixtures/article.html");

/// Answers by the first rule whose needle occurs in the prompt; no match is an error.
#[derive(Default)]
pub struct ScriptedLlm {
    rules: Vec<(String, String)>,
    pub calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, answer: &str) -> Self {
        self.rules.push((needle.to_string(), answer.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a> {
        self.calls.lock().unwrap().push(req.clone());
        let answer = self
            .rules
            .iter()
            .find(|(needle, _)| req.prompt.contains(needle.as_str()))
            .map(|(_, a)| a.clone());
        Box::pin(async move { answer.ok_or_else(|| anyhow!("no scripted answer")) })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// News provider keyed by search terms (`"Acme"`, `"site:acme.com"`); unknown terms error.
#[derive(Default)]
pub struct CannedNews {
    by_terms: HashMap<String, Vec<NewsItem>>,
    pub queries: Mutex<Vec<NewsQuery>>,
}

impl CannedNews {
    pub fn with(mut self, terms: &str, items: Vec<NewsItem>) -> Self {
        self.by_terms.insert(terms.to_string(), items);
        self
    }

    /// The Acme fixture feeds, parsed by the real RSS reader.
    pub async fn acme() -> Self {
        let feeds = GoogleNewsProvider::from_fixtures(COMPANY_FEED, SITE_FEED, 25);
        let company = feeds
            .search(&NewsQuery::Company("Acme".into()))
            .await
            .unwrap();
        let site = feeds
            .search(&NewsQuery::Site("acme.com".into()))
            .await
            .unwrap();
        Self::default()
            .with("Acme", company)
            .with("site:acme.com", site)
    }
}

#[async_trait]
impl NewsProvider for CannedNews {
    async fn search(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        self.queries.lock().unwrap().push(query.clone());
        self.by_terms
            .get(&query.as_search_terms())
            .cloned()
            .ok_or_else(|| anyhow!("news backend unavailable"))
    }

    fn name(&self) -> &'static str {
        "Canned"
    }
}

/// Every URL succeeds with `Body of <title>` unless listed as failing.
#[derive(Default)]
pub struct StubFetcher {
    failing: HashSet<String>,
    pub requested: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArticleFetcher for StubFetcher {
    async fn fetch(&self, item: &NewsItem) -> ArticleOutcome {
        self.requested.lock().unwrap().push(item.url.clone());
        if self.failing.contains(&item.url) {
            return ArticleOutcome::Absent {
                item: item.clone(),
                reason: ArticleFailure::Status(404),
            };
        }
        ArticleOutcome::Fetched(FetchedArticle {
            item: item.clone(),
            title: item.title.clone(),
            text: format!("Body of {}", item.title),
        })
    }
}

pub const CURATED_WITH_INVENTION: &str = r#"['Acme raises $10M, in Series B', 'Acme CFO resigns', 'Acme buys the moon', 'Acme launches Widget X - TechDaily', 'Acme opens Berlin office today']"#;

/// Knowledge + curation answers for the Acme scenario.
pub fn acme_llm(curation_answer: &str) -> ScriptedLlm {
    ScriptedLlm::new()
        .on("Filter the news results", curation_answer)
        .on("Find detailed information about", "Acme focuses on pricing.")
        .on("Tell me about the company Acme", "Acme builds widgets.")
}

pub fn pipeline(
    llm: Arc<ScriptedLlm>,
    news: Arc<CannedNews>,
    fetcher: Arc<StubFetcher>,
) -> ResearchPipeline {
    let curator = LlmCurator::new(llm.clone(), 10);
    ResearchPipeline::new(llm, news, Arc::new(curator), fetcher)
}
