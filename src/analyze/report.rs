//! Report stage: per-competitor digest text and structured metrics, built from the raw
//! research documents of a run.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyze::ai_adapter::{CompletionRequest, DynLlmClient};
use crate::analyze::curation::strip_code_fence;
use crate::notify::DigestNotifier;
use crate::research::{RunStatus, RawResearchDocument};
use crate::store::ResearchStore;

pub const DEFAULT_METRIC_FIELDS: [&str; 12] = [
    "Website URL",
    "Sector",
    "Industry",
    "Location",
    "Number of Employees",
    "Founding Year",
    "Company Type",
    "Market Cap",
    "Annual Revenue",
    "LinkedIn URL",
    "Tagline",
    "Stock Ticker",
];

/// `"Number of Employees"` -> `"number_of_employees"`.
pub fn convert_field_name(field: &str) -> String {
    static RE_NON: OnceCell<Regex> = OnceCell::new();
    static RE_RUN: OnceCell<Regex> = OnceCell::new();
    let re_non = RE_NON.get_or_init(|| Regex::new(r"[^a-z0-9]").unwrap());
    let re_run = RE_RUN.get_or_init(|| Regex::new(r"__+").unwrap());
    let lower = field.trim().to_lowercase();
    let replaced = re_non.replace_all(&lower, "_");
    re_run
        .replace_all(&replaced, "_")
        .trim_matches('_')
        .to_string()
}

/// Requested metrics: key -> display name, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRequest {
    fields: Vec<(String, String)>,
}

impl MetricsRequest {
    /// Blank names are dropped; an empty request falls back to the default field set.
    pub fn from_display_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for n in names {
            let display = n.as_ref().trim();
            if display.is_empty() {
                continue;
            }
            let key = convert_field_name(display);
            if key.is_empty() || fields.iter().any(|(k, _)| *k == key) {
                continue;
            }
            fields.push((key, display.to_string()));
        }
        if fields.is_empty() {
            return Self::from_display_names(&DEFAULT_METRIC_FIELDS);
        }
        Self { fields }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(_, d)| d.as_str()).collect()
    }

    pub fn display_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, d)| d.as_str())
            .unwrap_or(key)
    }
}

/// Parse model output as a JSON object. Anything unparseable is an empty map.
///
/// Tries, in order: the text as-is (fence stripped), the outermost `{..}` slice, and the
/// same slice with Python literals (`'`, `None`, `True`, `False`) rewritten to JSON.
pub fn parse_metrics_json(raw: &str) -> BTreeMap<String, serde_json::Value> {
    let body = strip_code_fence(raw.trim());
    if let Ok(map) = serde_json::from_str(body) {
        return map;
    }
    let Some(slice) = body
        .find('{')
        .zip(body.rfind('}'))
        .filter(|(a, b)| a < b)
        .map(|(a, b)| &body[a..=b])
    else {
        return BTreeMap::new();
    };
    if let Ok(map) = serde_json::from_str(slice) {
        return map;
    }

    static RE_PY: OnceCell<Regex> = OnceCell::new();
    let re_py = RE_PY.get_or_init(|| Regex::new(r"\b(None|True|False)\b").unwrap());
    let pythonish = slice.replace('\'', "\"");
    let jsonish = re_py.replace_all(&pythonish, |caps: &regex::Captures| {
        match &caps[1] {
            "None" => "null",
            "True" => "true",
            _ => "false",
        }
        .to_string()
    });
    serde_json::from_str(&jsonish).unwrap_or_default()
}

/* ----------------------------
Documents
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestReport {
    pub id: Uuid,
    pub competitor_name: String,
    pub email_report: String,
    pub base_research_document_id: Uuid,
    pub competitors_list_document_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Bookkeeping fields are fixed; model-extracted values live only in `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsDocument {
    pub id: Uuid,
    pub competitor_name: String,
    pub base_research_document_id: Uuid,
    pub competitors_list_document_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// `Metrics about the company {name}:` followed by `Label: value` lines.
pub fn format_metrics_section(
    competitor_name: &str,
    metrics: &BTreeMap<String, serde_json::Value>,
    request: &MetricsRequest,
) -> String {
    let mut out = format!("\n\nMetrics about the company {competitor_name}:\n");
    for (key, value) in metrics {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "None".to_string(),
            other => other.to_string(),
        };
        out.push_str(&format!("{}: {}\n", request.display_for(key), rendered));
    }
    out
}

/* ----------------------------
Prompts
---------------------------- */

const DIGEST_PERSONA: &str = "You are intelligent agent that can generate a comprehensive summary using the latest information provided about a company. Ensure the summary is organized, succinct, and tailored to the specified audience. Use clear section headings and maintain the requested tone throughout the document.
Target Audience - Competitor of the company
Tone and Style - Formal and informative
Summary Format -
1. Company Name: [Name of the Company]
2. Key Events:
Article 1: [Title]
[Published Date]
[2 bullet points to summarize article 1]
Article 2: [Title]
[Published Date]
[2 bullet points to summarize article 2]
...
3. General Research: [Summary of General Research]
4. Specific Research: [Summary of Specific Research]";

const METRICS_PERSONA: &str = "You are intelligent agent that can process raw text data into structured JSON format. Please provide the information in plain JSON format without any additional characters or markdown. Return ONLY the JSON object. If a matching value for a key is not found, let the value be null.";

pub fn digest_prompt(competitor_name: &str, raw_data: &str) -> String {
    format!(
        "Use the articles provided about the company {competitor_name} and write a summary for each and every article. Each article starts with 'Title:', followed by the content. If Specific Research or General Research is present, write a summary about them. If Specific Research or General Research is NOT present, do not generate anything. Send the response in text without any markdown. Use bullets for points.\n\n{raw_data}"
    )
}

pub fn metrics_search_prompt(competitor_name: &str, website: &str, request: &MetricsRequest) -> String {
    format!(
        "I need recent and updated information about the company {competitor_name} - {website}. Please search and provide comprehensive insights based on the following details required: {}.",
        request.display_names().join(", ")
    )
}

/* ----------------------------
Generator
---------------------------- */

pub struct ReportGenerator {
    knowledge: DynLlmClient,
    reasoning: DynLlmClient,
}

impl ReportGenerator {
    pub fn new(knowledge: DynLlmClient, reasoning: DynLlmClient) -> Self {
        Self {
            knowledge,
            reasoning,
        }
    }

    pub async fn write_digest(&self, competitor_name: &str, raw_data: &str) -> Result<String> {
        let req = CompletionRequest::new(digest_prompt(competitor_name, raw_data))
            .with_system(DIGEST_PERSONA);
        self.reasoning.complete(&req).await.context("digest writing")
    }

    /// Search, then structure. Malformed JSON yields an empty map, not an error.
    pub async fn extract_metrics(
        &self,
        competitor_name: &str,
        website: &str,
        request: &MetricsRequest,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        let found = self
            .knowledge
            .complete(&CompletionRequest::new(metrics_search_prompt(
                competitor_name,
                website,
                request,
            )))
            .await
            .context("metrics search")?;

        let req = CompletionRequest::new(format!(
            "Use the company information provided and return the information as a JSON object with keys for : {:?}\n\n{found}",
            request.keys()
        ))
        .with_system(METRICS_PERSONA);
        let raw = self
            .reasoning
            .complete(&req)
            .await
            .context("metrics structuring")?;

        let parsed = parse_metrics_json(&raw);
        if parsed.is_empty() {
            tracing::warn!(competitor = competitor_name, "metrics output is not a JSON object");
            counter!("metrics_parse_failures_total").increment(1);
        }
        Ok(parsed)
    }

    /// Digest + metrics for the run's raw documents (optionally only `only` competitors).
    pub async fn generate(
        &self,
        run_id: Uuid,
        only: &[String],
        request: &MetricsRequest,
        store: &dyn ResearchStore,
        notifier: Option<&dyn DigestNotifier>,
    ) -> Result<ReportBatch> {
        let run = store
            .get_run(run_id)
            .await?
            .with_context(|| format!("unknown research run {run_id}"))?;
        let raw_docs = store.list_raw(run_id).await?;

        let mut results = Vec::new();
        for record in raw_docs {
            let doc = &record.document;
            if !only.is_empty() && !only.iter().any(|n| n == &doc.competitor_name) {
                continue;
            }
            let website = run
                .competitors
                .get(&doc.competitor_name)
                .unwrap_or_default()
                .to_string();
            let result = match self
                .report_one(run_id, doc, &website, request, store, notifier)
                .await
            {
                Ok((digest, metrics)) => ReportResult {
                    competitor_name: doc.competitor_name.clone(),
                    status: RunStatus::Ok,
                    digest: Some(digest),
                    metrics: Some(metrics),
                    error: None,
                },
                Err(e) => {
                    tracing::error!(
                        %run_id,
                        competitor = %doc.competitor_name,
                        error = ?e,
                        "report generation failed"
                    );
                    ReportResult {
                        competitor_name: doc.competitor_name.clone(),
                        status: RunStatus::Failed,
                        digest: None,
                        metrics: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            results.push(result);
        }
        Ok(ReportBatch { run_id, results })
    }

    async fn report_one(
        &self,
        run_id: Uuid,
        doc: &RawResearchDocument,
        website: &str,
        request: &MetricsRequest,
        store: &dyn ResearchStore,
        notifier: Option<&dyn DigestNotifier>,
    ) -> Result<(DigestReport, MetricsDocument)> {
        // nothing is persisted until both model steps succeed
        let text = self.write_digest(&doc.competitor_name, &doc.raw_data).await?;
        let metrics = self
            .extract_metrics(&doc.competitor_name, website, request)
            .await?;
        let section = format_metrics_section(&doc.competitor_name, &metrics, request);

        let digest = DigestReport {
            id: Uuid::new_v4(),
            competitor_name: doc.competitor_name.clone(),
            email_report: text,
            base_research_document_id: doc.id,
            competitors_list_document_id: run_id,
            created_at: Utc::now(),
        };
        let metrics_doc = MetricsDocument {
            id: Uuid::new_v4(),
            competitor_name: doc.competitor_name.clone(),
            base_research_document_id: doc.id,
            competitors_list_document_id: run_id,
            created_at: Utc::now(),
            metrics,
        };
        store.insert_digest(&digest).await?;
        store.insert_metrics(&metrics_doc).await?;
        store
            .append_raw_file(run_id, &doc.competitor_name, &section)
            .await?;

        if let Some(n) = notifier {
            // delivery is best-effort; the stored digest is the source of truth
            if let Err(e) = n.send_digest(&digest).await {
                tracing::warn!(competitor = %digest.competitor_name, error = ?e, "digest delivery failed");
            }
        }
        Ok((digest, metrics_doc))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResult {
    pub competitor_name: String,
    pub status: RunStatus,
    pub digest: Option<DigestReport>,
    pub metrics: Option<MetricsDocument>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBatch {
    pub run_id: Uuid,
    pub results: Vec<ReportResult>,
}
