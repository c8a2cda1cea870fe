//! Keyword-scored paragraph retrieval over filing text.
//!
//! Deliberately simple: split into paragraphs, count query-term hits, return
//! the top three unique chunks. The interesting engineering lives in the host
//! session layer, not here.

const MAX_CANDIDATES: usize = 5;
const MAX_CHUNKS: usize = 3;

/// Finds the paragraphs most relevant to `query`. Returns a quoted, blank-line
/// separated block, or a fixed "nothing found" line.
pub fn retrieve_context(text: &str, query: &str) -> String {
    if text.trim().is_empty() {
        return "No content available.".to_string();
    }

    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    // Short words ("of", "the", "net") match everywhere; keep the specific ones.
    let mut search_terms: Vec<&str> = keywords
        .iter()
        .map(String::as_str)
        .filter(|k| k.len() > 3)
        .collect();
    if search_terms.is_empty() {
        search_terms = keywords.iter().map(String::as_str).collect();
    }
    if search_terms.is_empty() {
        return "No specific comments found for this item.".to_string();
    }

    let mut scored: Vec<(usize, &str)> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let lower = p.to_lowercase();
            let score = search_terms.iter().filter(|t| lower.contains(**t)).count();
            (score, p)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    // Stable sort keeps document order among equally scored paragraphs.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut chunks: Vec<&str> = Vec::new();
    for (_, chunk) in scored.into_iter().take(MAX_CANDIDATES) {
        if !chunks.contains(&chunk) {
            chunks.push(chunk);
            if chunks.len() >= MAX_CHUNKS {
                break;
            }
        }
    }

    if chunks.is_empty() {
        return "No specific comments found for this item.".to_string();
    }

    chunks
        .iter()
        .map(|c| format!("> {c}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}
