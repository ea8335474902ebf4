//! Text formatting for the document table, answer footers and the citation
//! detail view.

use chrono::{DateTime, Utc};
use shared::domain::Citation;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// `0 B`, `512 B`, `1.5 KB`, `2.25 MB`: base 1024, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut unit = 0;
    let mut scale = 1u64;
    while unit + 1 < SIZE_UNITS.len() && bytes >= scale * 1024 {
        scale *= 1024;
        unit += 1;
    }
    let value = (bytes as f64 / scale as f64 * 100.0).round() / 100.0;
    format!("{value} {}", SIZE_UNITS[unit])
}

/// `Jan 2, 2024, 03:04 PM` (UTC).
pub fn format_upload_time(time: &DateTime<Utc>) -> String {
    time.format("%b %-d, %Y, %I:%M %p").to_string()
}

/// `1.23s`.
pub fn format_processing_time(processing_time_ms: f64) -> String {
    format!("{:.2}s", processing_time_ms / 1000.0)
}

/// `87%`.
pub fn format_confidence(confidence_score: f64) -> String {
    format!("{:.0}%", confidence_score.clamp(0.0, 1.0) * 100.0)
}

/// `[1] [2] [3]`, the "Sources" row under an answer.
pub fn format_sources(citations: &[Citation]) -> String {
    citations
        .iter()
        .map(|citation| format!("[{}]", citation.citation_id))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn describe_citation(citation: &Citation) -> String {
    let mut out = format!("Citation #{}\n{}\n", citation.citation_id, citation.filename);
    if let Some(page) = citation.page_number {
        out.push_str(&format!("Page {page}\n"));
    }
    out.push_str(&format!(
        "Confidence: {}\n\n{}\n\nChunk ID: {}\nDocument ID: {}",
        format_confidence(citation.confidence_score),
        citation.text,
        citation.chunk_id,
        citation.document_id
    ));
    out
}

#[cfg(test)]
#[path = "tests/display_tests.rs"]
mod tests;
