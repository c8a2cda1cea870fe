//! Free, no-registration access to SEC EDGAR filings (10-Q, 10-K).
//!
//! SEC.gov requires a descriptive User-Agent on every request and asks for at
//! most 10 requests/sec; a small politeness delay between the submissions
//! lookup and the document fetch keeps us far under that.

use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::cache::TickerCache;

const ENABLE_LOGS: bool = true;

use crate::log_info;

const TICKER_MAP_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const POLITENESS_DELAY: Duration = Duration::from_millis(150);
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Error)]
pub enum EdgarError {
    #[error("EDGAR request failed: {0}")]
    Http(String),
    #[error("no CIK found for ticker {0}")]
    UnknownTicker(String),
    #[error("no {form} filing found for {ticker}")]
    NoFiling { ticker: String, form: String },
    #[error("unexpected EDGAR response shape: {0}")]
    Parse(String),
}

pub struct EdgarClient {
    agent: ureq::Agent,
    user_agent: String,
    cache: TickerCache,
}

impl EdgarClient {
    pub fn new(user_agent: String, cache: TickerCache) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(HTTP_TIMEOUT)
            .build();
        Self {
            agent,
            user_agent,
            cache,
        }
    }

    /// Resolves a ticker symbol (e.g. AAPL) to its zero-padded CIK number
    /// (0000320193). The full ticker map is cached on first fetch.
    pub fn cik_for_ticker(&self, ticker: &str) -> Result<String, EdgarError> {
        let ticker = ticker.trim().to_uppercase();
        if let Some(cik) = self.cache.get(&ticker) {
            return Ok(cik);
        }

        log_info!("Fetching EDGAR ticker map...");
        let body = self.fetch(TICKER_MAP_URL)?;
        let companies: Value =
            serde_json::from_str(&body).map_err(|e| EdgarError::Parse(e.to_string()))?;

        // Shape: {"0": {"cik_str": 320193, "ticker": "AAPL", "title": "..."}, ...}
        let map = companies
            .as_object()
            .ok_or_else(|| EdgarError::Parse("ticker map is not an object".into()))?;
        for entry in map.values() {
            let (Some(t), Some(cik)) = (
                entry.get("ticker").and_then(Value::as_str),
                entry.get("cik_str").and_then(Value::as_u64),
            ) else {
                continue;
            };
            self.cache.put(t.to_uppercase(), pad_cik(cik));
        }

        self.cache
            .get(&ticker)
            .ok_or(EdgarError::UnknownTicker(ticker))
    }

    /// Fetches the full text of the latest filing of `form_type` ("10-Q" or
    /// "10-K") for the ticker, with markup stripped.
    pub fn latest_filing_text(&self, ticker: &str, form_type: &str) -> Result<String, EdgarError> {
        let cik = self.cik_for_ticker(ticker)?;
        log_info!("Found CIK for {ticker}: {cik}");

        let url = format!("https://data.sec.gov/submissions/CIK{cik}.json");
        let body = self.fetch(&url)?;
        let history: Value =
            serde_json::from_str(&body).map_err(|e| EdgarError::Parse(e.to_string()))?;

        let (accession, document) =
            find_latest_filing(&history, form_type).ok_or_else(|| EdgarError::NoFiling {
                ticker: ticker.to_string(),
                form: form_type.to_string(),
            })?;

        let doc_url = document_url(&cik, &accession, &document)?;
        log_info!("Fetching document: {doc_url}");

        thread::sleep(POLITENESS_DELAY);
        let html = self.fetch(&doc_url)?;
        Ok(clean_html(&html))
    }

    fn fetch(&self, url: &str) -> Result<String, EdgarError> {
        self.agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .set("Accept-Encoding", "gzip, deflate")
            .call()
            .map_err(|e| EdgarError::Http(e.to_string()))?
            .into_string()
            .map_err(|e| EdgarError::Http(e.to_string()))
    }
}

fn pad_cik(cik: u64) -> String {
    format!("{cik:010}")
}

/// Picks the newest filing matching `form_type` out of the submissions
/// history. Returns (accession number, primary document name).
fn find_latest_filing(history: &Value, form_type: &str) -> Option<(String, String)> {
    let recent = history.get("filings")?.get("recent")?;
    let forms = recent.get("form")?.as_array()?;
    let accessions = recent.get("accessionNumber")?.as_array()?;
    let documents = recent.get("primaryDocument")?.as_array()?;

    // Filings are listed newest first; the first match wins.
    let idx = forms
        .iter()
        .position(|form| form.as_str() == Some(form_type))?;
    Some((
        accessions.get(idx)?.as_str()?.to_string(),
        documents.get(idx)?.as_str()?.to_string(),
    ))
}

/// Archive URL for a filing document. The CIK loses its leading zeros in the
/// path and the accession number loses its dashes.
fn document_url(cik: &str, accession: &str, document: &str) -> Result<String, EdgarError> {
    let cik_int: u64 = cik
        .parse()
        .map_err(|_| EdgarError::Parse(format!("bad CIK '{cik}'")))?;
    let accession_clean = accession.replace('-', "");
    Ok(format!(
        "https://www.sec.gov/Archives/edgar/data/{cik_int}/{accession_clean}/{document}"
    ))
}

/// Strips markup from a filing document: script/style blocks, comments, tags,
/// the handful of entities EDGAR documents actually use, then collapses
/// whitespace.
pub(crate) fn clean_html(html: &str) -> String {
    let without_blocks = strip_blocks(html);

    let mut text = String::with_capacity(without_blocks.len());
    let mut in_tag = false;
    for c in without_blocks.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes `<script>`/`<style>` elements with their contents, and HTML
/// comments, case-insensitively.
fn strip_blocks(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    // ASCII-only lowering keeps byte offsets aligned with the original.
    let lower: String = html.chars().map(|c| c.to_ascii_lowercase()).collect();
    let mut i = 0;

    while i < html.len() {
        let rest = &lower[i..];
        // An unclosed block swallows the rest of the document; filings with
        // truncated scripts are not worth salvaging past that point.
        let skip_to = if rest.starts_with("<script") {
            Some(
                rest.find("</script>")
                    .map(|end| i + end + "</script>".len())
                    .unwrap_or(html.len()),
            )
        } else if rest.starts_with("<style") {
            Some(
                rest.find("</style>")
                    .map(|end| i + end + "</style>".len())
                    .unwrap_or(html.len()),
            )
        } else if rest.starts_with("<!--") {
            Some(rest.find("-->").map(|end| i + end + "-->".len()).unwrap_or(html.len()))
        } else {
            None
        };

        match skip_to {
            Some(next) => i = next,
            None => {
                // Advance one char, respecting UTF-8 boundaries.
                let step = html[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                out.push_str(&html[i..i + step]);
                i += step;
            }
        }
    }
    out
}
