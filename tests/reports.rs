// tests/reports.rs
//
// Report stage over a MemoryStore: digest + metrics documents, metrics section
// appended to the raw file, competitor filter, isolation, optional delivery.

mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::ScriptedLlm;
use competitor_research::analyze::report::{DigestReport, MetricsRequest, ReportGenerator};
use competitor_research::notify::DigestNotifier;
use competitor_research::research::{
    CompetitorListDocument, CompetitorMap, RawResearchDocument, RunStatus,
};
use competitor_research::store::{MemoryStore, ResearchStore};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl DigestNotifier for RecordingNotifier {
    async fn send_digest(&self, digest: &DigestReport) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(digest.competitor_name.clone());
        Ok(())
    }
}

async fn seeded_store(names: &[(&str, &str)]) -> (MemoryStore, Uuid) {
    let store = MemoryStore::new();
    let mut competitors = CompetitorMap::default();
    for (n, w) in names {
        competitors.insert(*n, *w);
    }
    let run = CompetitorListDocument::new("Me Inc", competitors);
    store.insert_run(&run).await.unwrap();
    for (n, _) in names {
        let raw = format!("General Research:\n{n} text\nRecent Articles about {n}:\n");
        let doc = RawResearchDocument {
            id: Uuid::new_v4(),
            competitor_name: n.to_string(),
            raw_data: raw.clone(),
            created_at: Utc::now(),
        };
        store.insert_raw(run.id, &doc).await.unwrap();
        store.write_raw_file(run.id, n, &raw).await.unwrap();
    }
    (store, run.id)
}

fn generator() -> (ReportGenerator, Arc<ScriptedLlm>) {
    let knowledge = Arc::new(ScriptedLlm::new().on(
        "I need recent and updated information about the company Acme",
        "Acme is an aerospace company founded in 1990.",
    ));
    let reasoning = Arc::new(
        ScriptedLlm::new()
            .on(
                "about the company Acme and write",
                "1. Company Name: Acme\n2. Key Events: none",
            )
            .on(
                "return the information as a JSON object",
                "```json\n{'sector': 'Aerospace', 'founding_year': 1990, 'stock_ticker': None}\n```",
            ),
    );
    (ReportGenerator::new(knowledge.clone(), reasoning), knowledge)
}

#[tokio::test]
async fn writes_digest_metrics_and_appends_section() {
    let (store, run_id) = seeded_store(&[("Acme", "www.acme.com")]).await;
    let (reports, knowledge) = generator();
    let request = MetricsRequest::from_display_names(&["Sector", "Founding Year", "Stock Ticker"]);

    let batch = reports
        .generate(run_id, &[], &request, &store, None)
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 1);
    assert_eq!(batch.results[0].status, RunStatus::Ok);

    let digests = store.digests();
    assert_eq!(digests.len(), 1);
    assert!(digests[0].email_report.starts_with("1. Company Name: Acme"));
    assert_eq!(digests[0].competitors_list_document_id, run_id);

    let metrics = store.metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].metrics["sector"], json!("Aerospace"));
    assert_eq!(metrics[0].metrics["founding_year"], json!(1990));
    assert_eq!(metrics[0].metrics["stock_ticker"], json!(null));
    assert_eq!(
        metrics[0].base_research_document_id,
        digests[0].base_research_document_id
    );

    let file = store.raw_file(run_id, "Acme").unwrap();
    assert!(file.ends_with(
        "Recent Articles about Acme:\n\n\nMetrics about the company Acme:\n\
         Founding Year: 1990\nSector: Aerospace\nStock Ticker: None\n"
    ));

    assert!(knowledge.prompts()[0].ends_with(
        "based on the following details required: Sector, Founding Year, Stock Ticker."
    ));
    assert!(knowledge.prompts()[0].contains("Acme - www.acme.com"));
}

#[tokio::test]
async fn one_competitor_failing_is_isolated_and_filter_applies() {
    // no digest script for Globex
    let (store, run_id) =
        seeded_store(&[("Acme", "acme.com"), ("Globex", "globex.com"), ("Initech", "initech.com")])
            .await;
    let (reports, _) = generator();
    let request = MetricsRequest::from_display_names::<&str>(&[]);

    let only = vec!["Acme".to_string(), "Globex".to_string()];
    let batch = reports
        .generate(run_id, &only, &request, &store, None)
        .await
        .unwrap();

    let statuses: Vec<(&str, RunStatus)> = batch
        .results
        .iter()
        .map(|r| (r.competitor_name.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![("Acme", RunStatus::Ok), ("Globex", RunStatus::Failed)]
    );
    assert!(batch.results[1].error.as_deref().unwrap().contains("digest"));
    assert_eq!(store.digests().len(), 1);
}

#[tokio::test]
async fn digest_is_delivered_when_a_notifier_is_given() {
    let (store, run_id) = seeded_store(&[("Acme", "acme.com")]).await;
    let (reports, _) = generator();
    let notifier = RecordingNotifier::default();

    reports
        .generate(
            run_id,
            &[],
            &MetricsRequest::from_display_names(&["Sector"]),
            &store,
            Some(&notifier),
        )
        .await
        .unwrap();
    assert_eq!(*notifier.sent.lock().unwrap(), vec!["Acme".to_string()]);
}

#[tokio::test]
async fn unknown_run_is_an_error() {
    let store = MemoryStore::new();
    let (reports, _) = generator();
    let request = MetricsRequest::from_display_names::<&str>(&[]);
    assert!(reports
        .generate(Uuid::new_v4(), &[], &request, &store, None)
        .await
        .is_err());
}

#[tokio::test]
async fn metrics_failure_leaves_nothing_persisted() {
    let (store, run_id) = seeded_store(&[("Acme", "acme.com")]).await;
    let before = store.raw_file(run_id, "Acme").unwrap();
    // digest succeeds, the knowledge model has nothing to say
    let reasoning = Arc::new(ScriptedLlm::new().on(
        "about the company Acme and write",
        "1. Company Name: Acme",
    ));
    let reports = ReportGenerator::new(Arc::new(ScriptedLlm::new()), reasoning);

    let batch = reports
        .generate(
            run_id,
            &[],
            &MetricsRequest::from_display_names::<&str>(&[]),
            &store,
            None,
        )
        .await
        .unwrap();

    assert_eq!(batch.results[0].status, RunStatus::Failed);
    assert!(batch.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("metrics search"));
    assert!(store.digests().is_empty());
    assert!(store.metrics().is_empty());
    assert_eq!(store.raw_file(run_id, "Acme").unwrap(), before);
}
