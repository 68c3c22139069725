//! Whole-file driver for the bank's fixed-width TXT.

pub mod line;

use std::collections::HashMap;
use std::path::Path;

use conciliar_core::{CancelFlag, DiagnosticsItem, NormalizedRow, Severity};
use serde_json::json;

use crate::error::ExtractError;
use line::{parse_line, LineOutcome};

/// Error diagnostics kept per file before truncation kicks in.
const MAX_ERROR_DIAGNOSTICS: usize = 50;

/// U+FFFD count above which the UTF-8 decode is considered wrong.
const ENCODING_FALLBACK_THRESHOLD: usize = 10;

/// Parse result for one bank file.
#[derive(Debug)]
pub struct BankParseResult {
    pub rows: Vec<NormalizedRow>,
    pub diagnostics: Vec<DiagnosticsItem>,
    /// Most frequent competence across all rows, when any was detected.
    pub competence: Option<String>,
}

/// Read and parse a bank TXT file.
pub fn parse_file(path: &Path, cancel: &CancelFlag) -> Result<BankParseResult, ExtractError> {
    let bytes = std::fs::read(path)?;
    parse_bytes(&bytes, cancel)
}

/// Parse raw file bytes: UTF-8 first, with a Windows-1252 re-decode when the
/// lossy pass produced too many replacement characters (legacy bank exports
/// are Latin-1 encoded).
pub fn parse_bytes(bytes: &[u8], cancel: &CancelFlag) -> Result<BankParseResult, ExtractError> {
    let utf8 = String::from_utf8_lossy(bytes);
    let replacement_count = utf8.matches('\u{FFFD}').count();

    if replacement_count > ENCODING_FALLBACK_THRESHOLD {
        let fallback = DiagnosticsItem::info(
            "BANK_ENCODING_FALLBACK",
            format!("{replacement_count} invalid UTF-8 characters, re-decoding as Latin-1"),
        )
        .with_details(json!({ "invalid_chars": replacement_count }));

        let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        let mut result = parse_text(&decoded, cancel)?;
        result.diagnostics.insert(0, fallback);
        return Ok(result);
    }

    parse_text(&utf8, cancel)
}

/// Parse already-decoded bank file text.
pub fn parse_text(text: &str, cancel: &CancelFlag) -> Result<BankParseResult, ExtractError> {
    let mut rows: Vec<NormalizedRow> = Vec::new();
    let mut diagnostics: Vec<DiagnosticsItem> = Vec::new();

    let mut total_lines = 0usize;
    let mut valid_count = 0usize;
    let mut error_count = 0usize;
    let mut header_count = 0usize;

    // Competence frequency, with first-seen order for deterministic ties.
    let mut competence_counts: HashMap<String, usize> = HashMap::new();
    let mut competence_order: Vec<String> = Vec::new();

    for (idx, raw_line) in text.split('\n').enumerate() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        total_lines += 1;

        match parse_line(raw_line, idx + 1) {
            LineOutcome::Blank => {}
            LineOutcome::Header(_) => header_count += 1,
            LineOutcome::Row(row) => {
                valid_count += 1;
                if let Some(comp) = row.meta.as_ref().and_then(|m| m.competence.clone()) {
                    let count = competence_counts.entry(comp.clone()).or_insert(0);
                    if *count == 0 {
                        competence_order.push(comp);
                    }
                    *count += 1;
                }
                rows.push(row);
            }
            LineOutcome::Diag(diag) => {
                if diag.severity == Severity::Error {
                    error_count += 1;
                    // Cap error entries to bound memory on pathological files.
                    if error_count <= MAX_ERROR_DIAGNOSTICS {
                        diagnostics.push(diag);
                    }
                } else {
                    diagnostics.push(diag);
                }
            }
        }
    }

    if header_count > 0 {
        diagnostics.insert(
            0,
            DiagnosticsItem::info(
                "BANK_HEADER_COUNT",
                format!("{header_count} header line(s) detected"),
            )
            .with_details(json!({ "header_count": header_count })),
        );
    }

    let summary_severity = if error_count > 0 { Severity::Warn } else { Severity::Info };
    diagnostics.push(
        DiagnosticsItem::new(
            summary_severity,
            "BANK_PARSE_SUMMARY",
            format!("processed {total_lines} lines: {valid_count} valid, {error_count} with errors"),
        )
        .with_details(json!({
            "total_lines": total_lines,
            "valid_count": valid_count,
            "error_count": error_count,
            "header_count": header_count,
        })),
    );

    if error_count > MAX_ERROR_DIAGNOSTICS {
        let omitted = error_count - MAX_ERROR_DIAGNOSTICS;
        diagnostics.push(
            DiagnosticsItem::warn(
                "BANK_ERRORS_TRUNCATED",
                format!("{omitted} additional error(s) omitted"),
            )
            .with_details(json!({
                "total_errors": error_count,
                "shown": MAX_ERROR_DIAGNOSTICS,
            })),
        );
    }

    // Strictly-greater comparison so the first competence to reach the
    // maximum count wins ties.
    let mut competence: Option<String> = None;
    let mut best = 0usize;
    for comp in competence_order {
        let count = competence_counts.get(&comp).copied().unwrap_or(0);
        if count > best {
            best = count;
            competence = Some(comp);
        }
    }

    Ok(BankParseResult { rows, diagnostics, competence })
}
