/// BEIR-style JSONL corpus reader
///
/// One document per line: `{"_id": "doc42", "title": "...", "text": "..."}`.
use crate::error::{Result, TrilaneError};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CorpusItem {
    /// Source key, e.g. `doc42`
    #[serde(rename = "_id")]
    pub key: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
}

/// Read a JSONL corpus file, stopping after `max_documents` items
pub fn read_corpus(path: &Path, max_documents: Option<usize>) -> Result<Vec<CorpusItem>> {
    let file = File::open(path).map_err(|e| TrilaneError::Io {
        source: e,
        context: format!("Failed to open corpus {}", path.display()),
    })?;

    let items = parse_corpus(BufReader::new(file), max_documents)?;
    info!("Loaded {} documents from {}", items.len(), path.display());
    Ok(items)
}

pub fn parse_corpus<R: BufRead>(reader: R, max_documents: Option<usize>) -> Result<Vec<CorpusItem>> {
    let limit = max_documents.unwrap_or(usize::MAX);
    let mut items = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        if items.len() >= limit {
            debug!("Reached max_documents={}, stopping", limit);
            break;
        }
        let line = line.map_err(|e| TrilaneError::Io {
            source: e,
            context: format!("Failed to read corpus line {}", line_no + 1),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let item: CorpusItem = serde_json::from_str(&line).map_err(|e| TrilaneError::Json {
            source: e,
            context: format!("Malformed corpus line {}", line_no + 1),
        })?;
        items.push(item);
    }

    Ok(items)
}

/// Numeric point id from a source key: strip `prefix`, parse the rest.
///
/// The prefix is required and the remainder must be plain ASCII digits, so
/// two distinct keys never map to the same point.
pub fn parse_document_id(key: &str, prefix: &str) -> Result<u64> {
    let invalid = |reason: String| TrilaneError::Parse {
        key: key.to_string(),
        reason,
    };

    let digits = key
        .strip_prefix(prefix)
        .ok_or_else(|| invalid(format!("missing prefix '{}'", prefix)))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("'{}' is not a decimal number", digits)));
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(invalid(format!("'{}' has leading zeros", digits)));
    }
    digits.parse::<u64>().map_err(|e| invalid(e.to_string()))
}
