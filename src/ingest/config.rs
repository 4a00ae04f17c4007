// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::research::{CompetitorMap, CompetitorRecord};

const ENV_PATH: &str = "COMPETITORS_PATH";

/// Load a competitor list from an explicit path. Supports TOML or JSON formats.
pub fn load_competitors_from(path: &Path) -> Result<CompetitorMap> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading competitors from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_competitors(&content, ext.as_str())
}

/// Load competitors using env var + fallbacks:
/// 1) $COMPETITORS_PATH
/// 2) config/competitors.toml
/// 3) config/competitors.json
pub fn load_competitors_default() -> Result<CompetitorMap> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_competitors_from(&pb);
        } else {
            return Err(anyhow!("COMPETITORS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/competitors.toml");
    if toml_p.exists() {
        return load_competitors_from(&toml_p);
    }
    let json_p = PathBuf::from("config/competitors.json");
    if json_p.exists() {
        return load_competitors_from(&json_p);
    }
    Ok(CompetitorMap::default())
}

fn parse_competitors(s: &str, hint_ext: &str) -> Result<CompetitorMap> {
    let try_toml = hint_ext == "toml" || s.contains("[[competitors]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported competitors format"))
}

fn parse_toml(s: &str) -> Result<CompetitorMap> {
    #[derive(serde::Deserialize)]
    struct TomlList {
        competitors: Vec<CompetitorRecord>,
    }
    let v: TomlList = toml::from_str(s)?;
    Ok(clean_list(v.competitors))
}

/// JSON accepts either `[{"name": .., "website": ..}]` or an object `{"Name": "site"}`.
/// Object key order is the document order (`preserve_order`).
fn parse_json(s: &str) -> Result<CompetitorMap> {
    if let Ok(list) = serde_json::from_str::<Vec<CompetitorRecord>>(s) {
        return Ok(clean_list(list));
    }
    let raw = serde_json::from_str::<serde_json::Value>(s)?;
    let obj = raw
        .as_object()
        .ok_or_else(|| anyhow!("expected a list or an object of competitors"))?;
    let mut pairs = Vec::with_capacity(obj.len());
    for (name, website) in obj {
        let website = website
            .as_str()
            .ok_or_else(|| anyhow!("website for `{name}` must be a string"))?;
        pairs.push((name.clone(), website.to_string()));
    }
    Ok(clean_list(
        pairs
            .into_iter()
            .map(|(name, website)| CompetitorRecord { name, website })
            .collect(),
    ))
}

/// Trim names and websites; entries missing either are dropped.
pub fn clean_list(items: Vec<CompetitorRecord>) -> CompetitorMap {
    let mut map = CompetitorMap::default();
    for it in items {
        let name = it.name.trim();
        let website = it.website.trim();
        if !name.is_empty() && !website.is_empty() {
            map.insert(name, website);
        }
    }
    map
}
