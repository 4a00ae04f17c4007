//! Map curated headline strings back to indexed news items.

use metrics::counter;
use serde::Serialize;

use crate::ingest::index::HeadlineIndex;
use crate::ingest::normalize_key;
use crate::ingest::types::NewsItem;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Resolved items, in curated order.
    pub items: Vec<NewsItem>,
    /// Curated titles with no index entry (invented or mangled by the model).
    pub unmatched: Vec<String>,
}

/// Trim each curated title, normalize it, look it up. Misses are collected, never fatal.
///
/// Only whitespace is trimmed before normalizing; separators produced by leading or
/// trailing punctuation stay part of the key.
pub fn reconcile(curated: &[String], index: &HeadlineIndex) -> Reconciliation {
    let mut out = Reconciliation::default();
    for title in curated {
        let key = normalize_key(title.trim());
        match index.get(&key) {
            Some(item) => out.items.push(item.clone()),
            None => {
                tracing::debug!(%key, "curated headline not in index");
                out.unmatched.push(title.clone());
            }
        }
    }
    if !out.unmatched.is_empty() {
        counter!("headlines_unmatched_total").increment(out.unmatched.len() as u64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> HeadlineIndex {
        HeadlineIndex::build(
            vec![
                NewsItem::new("Acme launches Widget", "u1", "d1"),
                NewsItem::new("Acme CFO resigns", "u2", "d2"),
            ],
            vec![NewsItem::new("Acme wins lawsuit", "u3", "d3")],
        )
    }

    #[test]
    fn unknown_titles_are_dropped_order_kept() {
        let curated = vec![
            "Acme wins lawsuit".to_string(),
            "Totally invented".to_string(),
            "  acme launches widget ".to_string(),
        ];
        let r = reconcile(&curated, &index());
        let urls: Vec<&str> = r.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["u3", "u1"]);
        assert_eq!(r.unmatched, vec!["Totally invented".to_string()]);
    }

    #[test]
    fn trailing_punctuation_is_a_miss() {
        let r = reconcile(&["Acme CFO resigns.".to_string()], &index());
        assert!(r.items.is_empty());
        assert_eq!(r.unmatched.len(), 1);
    }
}
