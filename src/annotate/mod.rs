//! The annotation pipeline: filing fetch → keyword retrieval → optional LLM
//! summary → formatted note text.
//!
//! This whole module is a collaborator of the session layer with one hard
//! contract: [`AnnotationSource::fetch`] never fails. Data-source and
//! summarization problems are folded into the returned text so an annotation
//! request virtually never aborts because a fetch went wrong.

pub mod cache;
pub mod edgar;
pub mod retrieve;
pub mod summarize;

use chrono::Utc;

use crate::excel::context::{CellContext, UNKNOWN_LINE_ITEM, UNKNOWN_TICKER};
use edgar::EdgarClient;
use summarize::{SummarizeError, Summarizer};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// What the worker calls to turn cell context into note text.
pub trait AnnotationSource {
    /// Returns the annotation body. Must not fail: internal errors come back
    /// as human-readable text.
    fn fetch(&self, context: &CellContext, prompt: Option<&str>) -> String;
}

pub struct Annotator {
    edgar: EdgarClient,
    summarizer: Summarizer,
    form_type: String,
}

impl Annotator {
    pub fn new(edgar: EdgarClient, summarizer: Summarizer, form_type: String) -> Self {
        Self {
            edgar,
            summarizer,
            form_type,
        }
    }

    fn filing_content(&self, ticker: &str) -> Result<String, String> {
        if ticker == UNKNOWN_TICKER {
            // No ticker to resolve; fall back to the bundled sample so the
            // tool still produces something on an unlabeled sheet.
            return Ok(SAMPLE_TRANSCRIPT.to_string());
        }
        self.edgar
            .latest_filing_text(ticker, &self.form_type)
            .map_err(|e| e.to_string())
    }

    fn summarize_or_excerpts(&self, excerpts: &str, topic: &str) -> (String, &'static str) {
        match self.summarizer.summarize(excerpts, topic) {
            Ok(summary) => (summary, "AI Summarized"),
            Err(SummarizeError::MissingApiKey) => {
                log_info!("No summarizer API key; embedding raw excerpts");
                (excerpts.to_string(), "Excerpts")
            }
            Err(err) => (
                format!("AI summary failed: {err}\n\n{excerpts}"),
                "Excerpts",
            ),
        }
    }
}

impl AnnotationSource for Annotator {
    fn fetch(&self, context: &CellContext, prompt: Option<&str>) -> String {
        log_info!(
            "Fetch: {} | {} | {}",
            context.ticker,
            context.period,
            context.line_item
        );

        // A custom prompt steers retrieval; otherwise the line item does, with
        // a broad default when the sheet gave us nothing.
        let topic = match prompt {
            Some(p) => p.to_string(),
            None if context.line_item == UNKNOWN_LINE_ITEM => "Financial Highlights".to_string(),
            None => context.line_item.clone(),
        };

        let (body_text, source_label) = match self.filing_content(&context.ticker) {
            Ok(content) if content.trim().is_empty() => (
                format!(
                    "No filing data found for {} ({}).",
                    context.ticker, context.period
                ),
                "none",
            ),
            Ok(content) => {
                let excerpts = retrieve::retrieve_context(&content, &topic);
                self.summarize_or_excerpts(&excerpts, &topic)
            }
            Err(err) => (format!("Error fetching filing: {err}"), "none"),
        };

        let mut note = format!(
            "--- AXE KEY INSIGHTS ---\n\
             Target: {} | Period: {}\n\
             Topic: {}\n\
             Source: {} ({})\n\
             Generated: {}\n\n\
             {}",
            context.ticker,
            context.period,
            topic,
            self.form_type,
            source_label,
            Utc::now().format("%Y-%m-%d %H:%M UTC"),
            body_text
        );

        if let Some(p) = prompt {
            note.push_str(&format!("\n\n--- ANALYST PROMPT ---\nQ: {p}"));
        }
        note
    }
}

/// Sample transcript used when the sheet has no ticker to look up.
const SAMPLE_TRANSCRIPT: &str = "\
Speaker 1 (CEO): Good afternoon. We are pleased to report strong results for the quarter.

Our total revenue grew 15% year-over-year to $25 billion, driven by strong performance in our Cloud segment.

The Cloud segment specifically saw a 30% increase in sales, reaching $10 billion. We are seeing massive demand for our AI infrastructure.

Operating margin improved by 200 basis points due to our operational efficiency initiatives.

Speaker 2 (CFO): I will provide more details on the financials. Net income was $5 billion, an increase of 10%.

We are updating our guidance for the next fiscal year. We expect revenue to grow between 10% and 12%.";
