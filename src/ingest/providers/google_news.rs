// src/ingest/providers/google_news.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

use crate::config::research::NewsSettings;
use crate::ingest::types::{NewsItem, NewsProvider, NewsQuery};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// Google News RSS search, bounded by a recency window and a result cap.
pub struct GoogleNewsProvider {
    mode: Mode,
    max_results: usize,
}

enum Mode {
    /// Canned RSS bodies: (company query, site query).
    Fixture { company: String, site: String },
    Http {
        client: reqwest::Client,
        base_url: String,
        period_days: u32,
        language: String,
        country: String,
    },
}

impl GoogleNewsProvider {
    pub fn from_settings(settings: &NewsSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("competitor-research/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building news http client")?;
        Ok(Self {
            mode: Mode::Http {
                client,
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                period_days: settings.period_days,
                language: settings.language.clone(),
                country: settings.country.clone(),
            },
            max_results: settings.max_results,
        })
    }

    pub fn from_fixtures(company_xml: &str, site_xml: &str, max_results: usize) -> Self {
        Self {
            mode: Mode::Fixture {
                company: company_xml.to_string(),
                site: site_xml.to_string(),
            },
            max_results,
        }
    }

    /// Search URL in the shape Google News expects: `q=<terms> when:7d&hl=en-US&gl=US&ceid=US:en`.
    pub fn search_url(
        base_url: &str,
        query: &NewsQuery,
        period_days: u32,
        language: &str,
        country: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(&format!("{base_url}/rss/search"))
            .with_context(|| format!("invalid news base url {base_url}"))?;
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("{} when:{period_days}d", query.as_search_terms()),
            )
            .append_pair("hl", &format!("{language}-{country}"))
            .append_pair("gl", country)
            .append_pair("ceid", &format!("{country}:{language}"));
        Ok(url)
    }

    fn parse_items_from_str(s: &str, max_results: usize) -> Result<Vec<NewsItem>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing google news rss xml")?;

        let out = rss
            .channel
            .item
            .into_iter()
            .filter_map(|it| {
                let title = it.title?.trim().to_string();
                let url = it.link?.trim().to_string();
                if title.is_empty() || url.is_empty() {
                    return None;
                }
                Some(NewsItem {
                    title,
                    url,
                    published_date: it.pub_date.unwrap_or_default(),
                })
            })
            .take(max_results)
            .collect();
        Ok(out)
    }
}

#[async_trait]
impl NewsProvider for GoogleNewsProvider {
    async fn search(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture { company, site } => {
                let body = match query {
                    NewsQuery::Company(_) => company,
                    NewsQuery::Site(_) => site,
                };
                Self::parse_items_from_str(body, self.max_results)
            }
            Mode::Http {
                client,
                base_url,
                period_days,
                language,
                country,
            } => {
                let url = Self::search_url(base_url, query, *period_days, language, country)?;
                let resp = client.get(url).send().await.map_err(|e| {
                    tracing::warn!(error = ?e, provider = "GoogleNews", "provider http error");
                    e
                });
                let body = resp
                    .context("google news http get()")?
                    .error_for_status()
                    .context("google news non-2xx")?
                    .text()
                    .await
                    .context("google news http .text()")?;
                Self::parse_items_from_str(&body, self.max_results)
            }
        }
    }

    fn name(&self) -> &'static str {
        "GoogleNews"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
