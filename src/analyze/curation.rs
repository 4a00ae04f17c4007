//! Headline curation: an LLM picks the top headlines, we parse its list output.
//!
//! The model is asked for a Python-style list literal. `parse_headline_list` is the only
//! place that looks at the raw text; a parse failure yields an empty list plus a flag.

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;

use crate::analyze::ai_adapter::{CompletionRequest, DynLlmClient};

/// Hard ceiling on curated headlines per competitor, whatever the config says.
pub const MAX_HEADLINES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CuratedHeadlines {
    /// Headlines in model order, at most `min(max_headlines, candidates)` long.
    pub headlines: Vec<String>,
    /// The model answered but the answer was not a list of strings.
    pub parse_failed: bool,
}

#[async_trait]
pub trait HeadlineCurator: Send + Sync {
    /// Transport errors propagate; malformed output does not.
    async fn curate(&self, candidates: &[String], company_name: &str) -> Result<CuratedHeadlines>;
}

pub struct LlmCurator {
    llm: DynLlmClient,
    max_headlines: usize,
}

impl LlmCurator {
    pub fn new(llm: DynLlmClient, max_headlines: usize) -> Self {
        Self {
            llm,
            max_headlines: max_headlines.clamp(1, MAX_HEADLINES),
        }
    }
}

pub fn curation_persona(company_name: &str, max_headlines: usize) -> String {
    format!(
        "You are an expert news analyst. You have been given a list of news article headlines about the company {company_name}. Your task is to identify and return the top {max_headlines} headlines that are the most important and impactful.
Consider the following criteria when evaluating each headline:
- Uniqueness: Avoid selecting multiple headlines that discuss the same event or topic. Each of the top {max_headlines} headlines should cover a distinct and different event or aspect.
- Relevance: How directly the headline pertains to significant events or developments related to the company (e.g., major financial moves, significant product launches, legal issues, executive changes, etc.).
- Impact: The potential effect of the news on the company's operations, stock price, public perception, or industry standing.

OUTPUT FORMAT - A list containing the headlines - [\"Headline 1\", \"Headline 2\", ...]

Please return the top {max_headlines} headlines. If the input has less than {max_headlines} headlines, return all. Make sure all the headlines are returned in the same format as input."
    )
}

#[async_trait]
impl HeadlineCurator for LlmCurator {
    async fn curate(&self, candidates: &[String], company_name: &str) -> Result<CuratedHeadlines> {
        if candidates.is_empty() {
            return Ok(CuratedHeadlines::default());
        }

        let input = serde_json::to_string(candidates)?;
        let req = CompletionRequest::new(format!(
            "Filter the news results and give top {} headlines in a list. Return ONLY the list.\n\n{input}",
            self.max_headlines
        ))
        .with_system(curation_persona(company_name, self.max_headlines));
        let raw = self.llm.complete(&req).await?;

        let cap = self.max_headlines.min(candidates.len());
        Ok(match parse_headline_list(&raw) {
            Some(mut headlines) => {
                headlines.truncate(cap);
                CuratedHeadlines {
                    headlines,
                    parse_failed: false,
                }
            }
            None => {
                tracing::warn!(
                    company = company_name,
                    output_len = raw.len(),
                    "curation output is not a list"
                );
                counter!("curation_parse_failures_total").increment(1);
                CuratedHeadlines {
                    headlines: Vec::new(),
                    parse_failed: true,
                }
            }
        })
    }
}

/// Parse a list literal of strings: `["a", 'b', ...]`, optionally inside a ``` fence.
///
/// Accepts single or double quotes with backslash escapes and a trailing comma.
/// Anything else (prose around the list, non-string elements) is `None`.
pub fn parse_headline_list(raw: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(raw.trim());
    if let Ok(v) = serde_json::from_str::<Vec<String>>(body) {
        return Some(v);
    }
    ListLiteral::new(body).parse()
}

pub(crate) fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop an optional language tag on the opening line
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

struct ListLiteral<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> ListLiteral<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            chars: s.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse(mut self) -> Option<Vec<String>> {
        self.skip_ws();
        if self.chars.next()? != '[' {
            return None;
        }
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.peek()? {
                ']' => {
                    self.chars.next();
                    break;
                }
                '"' | '\'' => {
                    out.push(self.string()?);
                    self.skip_ws();
                    match self.chars.next()? {
                        ',' => continue,
                        ']' => break,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
        self.skip_ws();
        // trailing garbage means the model added prose
        if self.chars.next().is_some() {
            return None;
        }
        Some(out)
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.chars.next()?;
        let mut s = String::new();
        loop {
            match self.chars.next()? {
                '\\' => match self.chars.next()? {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    other => s.push(other),
                },
                c if c == quote => return Some(s),
                c => s.push(c),
            }
        }
    }
}
