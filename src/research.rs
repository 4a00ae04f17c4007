//! Per-competitor aggregation and the sequential batch driver.
//!
//! One competitor = focus search (optional) + general search + curated news articles,
//! flattened into a `RawResearchDocument`. Index and curation state never outlive a
//! single competitor.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyze::ai_adapter::{CompletionRequest, DynLlmClient};
use crate::analyze::curation::HeadlineCurator;
use crate::analyze::reconcile::reconcile;
use crate::ingest::article::{fetch_all, ArticleFetcher, ArticleOutcome, FetchedArticle};
use crate::ingest::gather_headlines;
use crate::ingest::types::NewsProvider;
use crate::store::ResearchStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("research_runs_total", "Research batches started.");
        describe_counter!("research_competitors_total", "Competitors processed.");
        describe_counter!(
            "research_competitor_failures_total",
            "Competitors whose research run failed."
        );
    });
}

/* ----------------------------
Competitor input
---------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorRecord {
    pub name: String,
    pub website: String,
}

/// Insertion-ordered `name -> website`. Re-inserting a name replaces the website in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompetitorMap {
    entries: Vec<CompetitorRecord>,
}

impl CompetitorMap {
    pub fn insert(&mut self, name: impl Into<String>, website: impl Into<String>) {
        let name = name.into();
        let website = website.into();
        match self.entries.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.website = website,
            None => self.entries.push(CompetitorRecord { name, website }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<CompetitorRecord> {
        let pos = self.entries.iter().position(|c| c.name == name)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.website.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompetitorRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CompetitorRecord> for CompetitorMap {
    fn from_iter<I: IntoIterator<Item = CompetitorRecord>>(iter: I) -> Self {
        let mut map = CompetitorMap::default();
        for c in iter {
            map.insert(c.name, c.website);
        }
        map
    }
}

/* ----------------------------
Documents
---------------------------- */

/// The research-run record: who asked, about whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorListDocument {
    pub id: Uuid,
    pub company_name: String,
    pub competitors: CompetitorMap,
    pub created_at: DateTime<Utc>,
}

impl CompetitorListDocument {
    pub fn new(company_name: impl Into<String>, competitors: CompetitorMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_name: company_name.into(),
            competitors,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResearchDocument {
    pub id: Uuid,
    pub competitor_name: String,
    pub raw_data: String,
    pub created_at: DateTime<Utc>,
}

/// What happened inside one competitor's news pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub candidates: usize,
    pub indexed: usize,
    pub curated: usize,
    pub curation_parse_failed: bool,
    pub unmatched: Vec<String>,
    pub articles_fetched: usize,
    pub articles_dropped: Vec<ArticleOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorResearch {
    pub document: RawResearchDocument,
    pub stats: PipelineStats,
}

/* ----------------------------
Text assembly
---------------------------- */

pub fn general_search_prompt(name: &str, website: &str) -> String {
    format!("Tell me about the company {name} - {website}")
}

pub fn focus_search_prompt(name: &str, website: &str, focus_area: &str) -> String {
    format!("Find detailed information about {focus_area} of the company {name} - {website}")
}

/// One bylined entry: `Title: ..\nPublished Date: ..\n{body}\n`.
pub fn format_article(article: &FetchedArticle) -> String {
    format!(
        "Title: {}\nPublished Date: {}\n{}\n",
        article.title, article.item.published_date, article.text
    )
}

/// Concatenate the sections. The `Specific Research` section exists only when a focus ran.
pub fn assemble_raw_data(
    competitor_name: &str,
    focus_text: Option<&str>,
    general_text: &str,
    articles: &[FetchedArticle],
) -> String {
    let mut out = String::new();
    if let Some(focus) = focus_text {
        out.push_str("Specific Research:\n");
        out.push_str(focus);
        out.push('\n');
    }
    out.push_str("General Research:\n");
    out.push_str(general_text);
    out.push('\n');
    out.push_str(&format!("Recent Articles about {competitor_name}:\n"));
    let entries: Vec<String> = articles.iter().map(format_article).collect();
    out.push_str(&entries.join("\n"));
    out
}

/* ----------------------------
Pipeline
---------------------------- */

pub struct ResearchPipeline {
    knowledge: DynLlmClient,
    news: Arc<dyn NewsProvider>,
    curator: Arc<dyn HeadlineCurator>,
    fetcher: Arc<dyn ArticleFetcher>,
}

impl ResearchPipeline {
    pub fn new(
        knowledge: DynLlmClient,
        news: Arc<dyn NewsProvider>,
        curator: Arc<dyn HeadlineCurator>,
        fetcher: Arc<dyn ArticleFetcher>,
    ) -> Self {
        Self {
            knowledge,
            news,
            curator,
            fetcher,
        }
    }

    /// Single-competitor entry point.
    pub async fn produce_raw_research(
        &self,
        competitor_name: &str,
        website: &str,
        focus_area: &str,
    ) -> Result<RawResearchDocument> {
        Ok(self
            .research_competitor(competitor_name, website, focus_area)
            .await?
            .document)
    }

    /// Same as `produce_raw_research`, plus what was dropped along the way.
    pub async fn research_competitor(
        &self,
        competitor_name: &str,
        website: &str,
        focus_area: &str,
    ) -> Result<CompetitorResearch> {
        let focus_area = focus_area.trim();

        let focus_text = if focus_area.is_empty() {
            None
        } else {
            let req = CompletionRequest::new(focus_search_prompt(competitor_name, website, focus_area));
            Some(
                self.knowledge
                    .complete(&req)
                    .await
                    .context("specific research search")?,
            )
        };

        let general_text = self
            .knowledge
            .complete(&CompletionRequest::new(general_search_prompt(
                competitor_name,
                website,
            )))
            .await
            .context("general research search")?;

        let index = gather_headlines(self.news.as_ref(), competitor_name, website).await?;
        let curated = self
            .curator
            .curate(index.candidates(), competitor_name)
            .await
            .context("headline curation")?;
        let resolved = reconcile(&curated.headlines, &index);
        let outcomes = fetch_all(self.fetcher.as_ref(), &resolved.items).await;

        let mut articles = Vec::with_capacity(outcomes.len());
        let mut dropped = Vec::new();
        for outcome in outcomes {
            match outcome {
                ArticleOutcome::Fetched(a) => articles.push(a),
                absent => dropped.push(absent),
            }
        }

        let stats = PipelineStats {
            candidates: index.candidates().len(),
            indexed: index.len(),
            curated: curated.headlines.len(),
            curation_parse_failed: curated.parse_failed,
            unmatched: resolved.unmatched,
            articles_fetched: articles.len(),
            articles_dropped: dropped,
        };
        tracing::info!(
            competitor = competitor_name,
            indexed = stats.indexed,
            curated = stats.curated,
            unmatched = stats.unmatched.len(),
            fetched = stats.articles_fetched,
            dropped = stats.articles_dropped.len(),
            "competitor research assembled"
        );

        let raw_data = assemble_raw_data(
            competitor_name,
            focus_text.as_deref(),
            &general_text,
            &articles,
        );
        Ok(CompetitorResearch {
            document: RawResearchDocument {
                id: Uuid::new_v4(),
                competitor_name: competitor_name.to_string(),
                raw_data,
                created_at: Utc::now(),
            },
            stats,
        })
    }

    /// Record the run, then research every competitor in order.
    pub async fn submit(
        &self,
        company_name: &str,
        competitors: CompetitorMap,
        focus_area: &str,
        store: &dyn ResearchStore,
    ) -> Result<BatchReport> {
        let run = CompetitorListDocument::new(company_name, competitors);
        store.insert_run(&run).await.context("saving research run")?;
        Ok(self.run_batch(&run, focus_area, store).await)
    }

    /// Sequential, per-entity isolated. A failed competitor is reported and skipped.
    pub async fn run_batch(
        &self,
        run: &CompetitorListDocument,
        focus_area: &str,
        store: &dyn ResearchStore,
    ) -> BatchReport {
        ensure_metrics_described();
        counter!("research_runs_total").increment(1);

        let mut results = Vec::with_capacity(run.competitors.len());
        for competitor in run.competitors.iter() {
            counter!("research_competitors_total").increment(1);
            let outcome = self.research_and_store(run.id, competitor, focus_area, store).await;
            let result = match outcome {
                Ok(research) => CompetitorResult {
                    competitor_name: competitor.name.clone(),
                    website: competitor.website.clone(),
                    status: RunStatus::Ok,
                    document_id: Some(research.document.id),
                    stats: Some(research.stats),
                    error: None,
                },
                Err(e) => {
                    tracing::error!(
                        run_id = %run.id,
                        competitor = %competitor.name,
                        error = ?e,
                        "competitor research failed"
                    );
                    counter!("research_competitor_failures_total").increment(1);
                    CompetitorResult {
                        competitor_name: competitor.name.clone(),
                        website: competitor.website.clone(),
                        status: RunStatus::Failed,
                        document_id: None,
                        stats: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            results.push(result);
        }

        let report = BatchReport {
            run_id: run.id,
            company_name: run.company_name.clone(),
            results,
        };
        tracing::info!(
            run_id = %run.id,
            ok = report.succeeded(),
            failed = report.failed(),
            "research batch finished"
        );
        report
    }

    async fn research_and_store(
        &self,
        run_id: Uuid,
        competitor: &CompetitorRecord,
        focus_area: &str,
        store: &dyn ResearchStore,
    ) -> Result<CompetitorResearch> {
        let research = self
            .research_competitor(&competitor.name, &competitor.website, focus_area)
            .await?;
        store
            .insert_raw(run_id, &research.document)
            .await
            .context("saving raw research document")?;
        store
            .write_raw_file(run_id, &competitor.name, &research.document.raw_data)
            .await
            .context("writing raw research file")?;
        Ok(research)
    }
}

/* ----------------------------
Batch report
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorResult {
    pub competitor_name: String,
    pub website: String,
    pub status: RunStatus,
    pub document_id: Option<Uuid>,
    pub stats: Option<PipelineStats>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub company_name: String,
    pub results: Vec<CompetitorResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == RunStatus::Ok)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
