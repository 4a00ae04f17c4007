//! Persistence sink for runs, raw research, digests and metrics.
//!
//! `FileStore` keeps one JSON file per document (`{dir}/{collection}/{id}.json`) and the
//! flat raw-text files under `{dir}/raw_data_files/{run_id}/`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::analyze::report::{DigestReport, MetricsDocument};
use crate::research::{CompetitorListDocument, RawResearchDocument};

/// A raw research document together with the run it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResearchRecord {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub document: RawResearchDocument,
}

#[async_trait]
pub trait ResearchStore: Send + Sync {
    async fn insert_run(&self, run: &CompetitorListDocument) -> Result<()>;
    async fn get_run(&self, run_id: Uuid) -> Result<Option<CompetitorListDocument>>;
    async fn insert_raw(&self, run_id: Uuid, doc: &RawResearchDocument) -> Result<()>;
    /// Raw documents for a run, oldest first.
    async fn list_raw(&self, run_id: Uuid) -> Result<Vec<RawResearchRecord>>;
    async fn insert_digest(&self, digest: &DigestReport) -> Result<()>;
    async fn insert_metrics(&self, metrics: &MetricsDocument) -> Result<()>;
    /// Digests written for a run, oldest first.
    async fn list_digests(&self, run_id: Uuid) -> Result<Vec<DigestReport>>;
    /// Metrics documents written for a run, oldest first.
    async fn list_metrics(&self, run_id: Uuid) -> Result<Vec<MetricsDocument>>;
    /// Replace the competitor's raw text file for this run.
    async fn write_raw_file(&self, run_id: Uuid, competitor: &str, text: &str) -> Result<()>;
    /// Append to the competitor's raw text file (used for the metrics section).
    async fn append_raw_file(&self, run_id: Uuid, competitor: &str, text: &str) -> Result<()>;
}

/* ----------------------------
In-memory store
---------------------------- */

#[derive(Debug, Default)]
struct MemoryInner {
    runs: Vec<CompetitorListDocument>,
    raw: Vec<RawResearchRecord>,
    digests: Vec<DigestReport>,
    metrics: Vec<MetricsDocument>,
    files: Vec<((Uuid, String), String)>,
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))
    }

    pub fn digests(&self) -> Vec<DigestReport> {
        self.lock().map(|g| g.digests.clone()).unwrap_or_default()
    }

    pub fn metrics(&self) -> Vec<MetricsDocument> {
        self.lock().map(|g| g.metrics.clone()).unwrap_or_default()
    }

    pub fn raw_file(&self, run_id: Uuid, competitor: &str) -> Option<String> {
        let g = self.lock().ok()?;
        g.files
            .iter()
            .find(|((r, c), _)| *r == run_id && c == competitor)
            .map(|(_, text)| text.clone())
    }
}

#[async_trait]
impl ResearchStore for MemoryStore {
    async fn insert_run(&self, run: &CompetitorListDocument) -> Result<()> {
        self.lock()?.runs.push(run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<CompetitorListDocument>> {
        Ok(self.lock()?.runs.iter().find(|r| r.id == run_id).cloned())
    }

    async fn insert_raw(&self, run_id: Uuid, doc: &RawResearchDocument) -> Result<()> {
        self.lock()?.raw.push(RawResearchRecord {
            run_id,
            document: doc.clone(),
        });
        Ok(())
    }

    async fn list_raw(&self, run_id: Uuid) -> Result<Vec<RawResearchRecord>> {
        Ok(self
            .lock()?
            .raw
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn insert_digest(&self, digest: &DigestReport) -> Result<()> {
        self.lock()?.digests.push(digest.clone());
        Ok(())
    }

    async fn insert_metrics(&self, metrics: &MetricsDocument) -> Result<()> {
        self.lock()?.metrics.push(metrics.clone());
        Ok(())
    }

    async fn list_digests(&self, run_id: Uuid) -> Result<Vec<DigestReport>> {
        Ok(self
            .lock()?
            .digests
            .iter()
            .filter(|d| d.competitors_list_document_id == run_id)
            .cloned()
            .collect())
    }

    async fn list_metrics(&self, run_id: Uuid) -> Result<Vec<MetricsDocument>> {
        Ok(self
            .lock()?
            .metrics
            .iter()
            .filter(|m| m.competitors_list_document_id == run_id)
            .cloned()
            .collect())
    }

    async fn write_raw_file(&self, run_id: Uuid, competitor: &str, text: &str) -> Result<()> {
        let mut g = self.lock()?;
        let key = (run_id, competitor.to_string());
        match g.files.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = text.to_string(),
            None => g.files.push((key, text.to_string())),
        }
        Ok(())
    }

    async fn append_raw_file(&self, run_id: Uuid, competitor: &str, text: &str) -> Result<()> {
        let mut g = self.lock()?;
        let key = (run_id, competitor.to_string());
        match g.files.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.push_str(text),
            None => g.files.push((key, text.to_string())),
        }
        Ok(())
    }
}

/* ----------------------------
File store
---------------------------- */

const RUNS: &str = "competitors_list";
const RAW: &str = "base_research";
const DIGESTS: &str = "news";
const METRICS: &str = "metrics";
const RAW_FILES: &str = "raw_data_files";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for sub in [RUNS, RAW, DIGESTS, METRICS, RAW_FILES] {
            fs::create_dir_all(root.join(sub))
                .with_context(|| format!("creating {}", root.join(sub).display()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_file_path(&self, run_id: Uuid, competitor: &str) -> PathBuf {
        self.root
            .join(RAW_FILES)
            .join(run_id.to_string())
            .join(format!("{}.txt", safe_file_stem(competitor)))
    }

    fn doc_path(&self, collection: &str, id: Uuid) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    fn write_doc<T: Serialize>(&self, collection: &str, id: Uuid, doc: &T) -> Result<()> {
        let path = self.doc_path(collection, id);
        let json = serde_json::to_vec_pretty(doc).context("serializing document")?;
        write_atomic(&path, &json)
    }

    fn read_collection<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let dir = self.root.join(collection);
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_str(&data) {
                Ok(doc) => out.push(doc),
                Err(e) => tracing::warn!(path = %path.display(), error = ?e, "skipping unreadable document"),
            }
        }
        Ok(out)
    }
}

/// Filesystem-safe version of a competitor name; keeps letters, digits, `-`, `_`, spaces.
///
/// A name that had to be rewritten gets a short hash suffix so "Acme/Co" and "Acme_Co"
/// land in different files.
pub fn safe_file_stem(name: &str) -> String {
    let trimmed = name.trim();
    let stem: String = trimmed
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        return "unnamed".to_string();
    }
    if stem == trimmed {
        return stem;
    }
    let hash = Sha256::digest(trimmed.as_bytes());
    let suffix: String = hash.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("{stem}-{suffix}")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl ResearchStore for FileStore {
    async fn insert_run(&self, run: &CompetitorListDocument) -> Result<()> {
        self.write_doc(RUNS, run.id, run)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<CompetitorListDocument>> {
        let path = self.doc_path(RUNS, run_id);
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(
                serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn insert_raw(&self, run_id: Uuid, doc: &RawResearchDocument) -> Result<()> {
        let record = RawResearchRecord {
            run_id,
            document: doc.clone(),
        };
        self.write_doc(RAW, doc.id, &record)
    }

    async fn list_raw(&self, run_id: Uuid) -> Result<Vec<RawResearchRecord>> {
        let mut docs: Vec<RawResearchRecord> = self
            .read_collection::<RawResearchRecord>(RAW)?
            .into_iter()
            .filter(|r| r.run_id == run_id)
            .collect();
        docs.sort_by_key(|r| r.document.created_at);
        Ok(docs)
    }

    async fn insert_digest(&self, digest: &DigestReport) -> Result<()> {
        self.write_doc(DIGESTS, digest.id, digest)
    }

    async fn insert_metrics(&self, metrics: &MetricsDocument) -> Result<()> {
        self.write_doc(METRICS, metrics.id, metrics)
    }

    async fn list_digests(&self, run_id: Uuid) -> Result<Vec<DigestReport>> {
        let mut docs: Vec<DigestReport> = self
            .read_collection::<DigestReport>(DIGESTS)?
            .into_iter()
            .filter(|d| d.competitors_list_document_id == run_id)
            .collect();
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn list_metrics(&self, run_id: Uuid) -> Result<Vec<MetricsDocument>> {
        let mut docs: Vec<MetricsDocument> = self
            .read_collection::<MetricsDocument>(METRICS)?
            .into_iter()
            .filter(|m| m.competitors_list_document_id == run_id)
            .collect();
        docs.sort_by_key(|m| m.created_at);
        Ok(docs)
    }

    async fn write_raw_file(&self, run_id: Uuid, competitor: &str, text: &str) -> Result<()> {
        write_atomic(&self.raw_file_path(run_id, competitor), text.as_bytes())
    }

    async fn append_raw_file(&self, run_id: Uuid, competitor: &str, text: &str) -> Result<()> {
        let path = self.raw_file_path(run_id, competitor);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        f.write_all(text.as_bytes())?;
        Ok(())
    }
}
