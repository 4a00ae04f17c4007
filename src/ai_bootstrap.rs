// src/ai_bootstrap.rs
//! Wires configs into a ready pipeline: LLM clients, news provider, curator, fetcher, store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::analyze::ai_adapter::{build_clients_from_config, default_cache_dir, LlmClients};
use crate::analyze::curation::LlmCurator;
use crate::analyze::report::ReportGenerator;
use crate::config::ai::AiConfig;
use crate::config::research::ResearchConfig;
use crate::ingest::article::HttpArticleFetcher;
use crate::ingest::providers::google_news::GoogleNewsProvider;
use crate::notify::{DigestNotifier, EmailSender};
use crate::research::ResearchPipeline;
use crate::store::{FileStore, ResearchStore};

pub struct AppRuntime {
    pub ai: AiConfig,
    pub research: ResearchConfig,
    pub pipeline: Arc<ResearchPipeline>,
    pub reports: Arc<ReportGenerator>,
    pub store: Arc<dyn ResearchStore>,
    pub notifier: Option<Arc<dyn DigestNotifier>>,
}

impl AppRuntime {
    /// Load `AI_CONFIG_PATH` / `RESEARCH_CONFIG_PATH` (or their defaults) and build everything.
    pub fn from_env() -> Result<Self> {
        let ai = AiConfig::load_default().context("loading AI config")?;
        let research = ResearchConfig::load().context("loading research config")?;
        Self::from_configs(ai, research)
    }

    pub fn from_configs(ai: AiConfig, research: ResearchConfig) -> Result<Self> {
        // Safe diagnostics: providers + enabled + key presence only
        info!(
            enabled = ai.enabled,
            knowledge = %ai.knowledge.provider,
            reasoning = %ai.reasoning.provider,
            knowledge_key = !ai.knowledge.api_key.is_empty(),
            reasoning_key = !ai.reasoning.api_key.is_empty(),
            "AI config loaded"
        );
        let LlmClients {
            knowledge,
            reasoning,
        } = build_clients_from_config(&ai, default_cache_dir())?;

        let news = GoogleNewsProvider::from_settings(&research.news)?;
        let fetcher = HttpArticleFetcher::new(&research.article)?;
        let curator = LlmCurator::new(reasoning.clone(), research.curation.max_headlines);
        let pipeline = ResearchPipeline::new(
            knowledge.clone(),
            Arc::new(news),
            Arc::new(curator),
            Arc::new(fetcher),
        );

        let store = FileStore::open(&research.storage.dir)
            .with_context(|| format!("opening store at {}", research.storage.dir.display()))?;
        info!(dir = %store.root().display(), "research store ready");

        let notifier: Option<Arc<dyn DigestNotifier>> = match EmailSender::from_env() {
            Ok(sender) => Some(Arc::new(sender)),
            Err(e) => {
                warn!(error = %e, "digest email disabled");
                None
            }
        };

        Ok(Self {
            ai,
            research,
            pipeline: Arc::new(pipeline),
            reports: Arc::new(ReportGenerator::new(knowledge, reasoning)),
            store: Arc::new(store),
            notifier,
        })
    }
}
