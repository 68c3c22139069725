//! Per-line parser for the bank's fixed-width TXT layout.
//!
//! Layout (0-indexed byte offsets):
//! - 0: record type (`1` = header, `2` = data)
//! - 1..10: sequence number
//! - 22..34: full registration id (12 digits: 10 base + 2 suffix)
//! - 34..44: event code (10 digits)
//! - 44..50: competence (`MMYYYY`)
//! - 50..57: value in minor units (7 digits)

use conciliar_core::{
    round_money, Confidence, DiagnosticsItem, NormalizedRow, RawRef, RowMeta, RowSource,
};
use serde_json::json;

/// Minimum data-line length to carry a value field.
pub const MIN_LINE_LENGTH: usize = 57;

const IDENTIFIER: std::ops::Range<usize> = 22..34;
const EVENT: std::ops::Range<usize> = 34..44;
const COMPETENCE: std::ops::Range<usize> = 44..50;
const VALUE: std::ops::Range<usize> = 50..57;

/// What a single line turned into. At most one row or one diagnostic.
#[derive(Debug)]
pub enum LineOutcome {
    /// Blank/whitespace-only line, ignored silently.
    Blank,
    /// Header line (`info` diagnostic, aggregated by the file driver).
    Header(DiagnosticsItem),
    /// Valid data line.
    Row(NormalizedRow),
    /// Anything else (`error` for malformed data lines, `warn` for unknown
    /// record types).
    Diag(DiagnosticsItem),
}

/// Parse one raw line (1-based `line_no`).
pub fn parse_line(line: &str, line_no: usize) -> LineOutcome {
    let clean: String = line.chars().filter(|&c| c != '\r' && c != '\n').collect();

    if clean.trim().is_empty() {
        return LineOutcome::Blank;
    }

    match clean.as_bytes()[0] {
        b'1' => LineOutcome::Header(
            DiagnosticsItem::info("BANK_HEADER", "bank file header detected")
                .with_details(json!({ "line_no": line_no, "raw": prefix(&clean, 50) })),
        ),
        b'2' => parse_data_line(&clean, line_no),
        other => LineOutcome::Diag(
            DiagnosticsItem::warn(
                "BANK_UNKNOWN_LINE_TYPE",
                format!("line {line_no}: unknown record type '{}'", other as char),
            )
            .with_details(json!({
                "line_no": line_no,
                "record_type": (other as char).to_string(),
                "raw": prefix(&clean, 50),
            })),
        ),
    }
}

fn parse_data_line(clean: &str, line_no: usize) -> LineOutcome {
    if clean.len() < MIN_LINE_LENGTH {
        return LineOutcome::Diag(
            DiagnosticsItem::error(
                "BANK_LINE_TOO_SHORT",
                format!(
                    "line {line_no} too short ({} chars, minimum {MIN_LINE_LENGTH})",
                    clean.len()
                ),
            )
            .with_details(json!({ "line_no": line_no, "length": clean.len(), "raw": clean })),
        );
    }

    let identifier_raw = field(clean, IDENTIFIER);
    let Some(identifier) = parse_identifier(identifier_raw) else {
        return LineOutcome::Diag(
            DiagnosticsItem::error(
                "BANK_INVALID_MATRICULA",
                format!("line {line_no}: invalid registration id \"{identifier_raw}\""),
            )
            .with_details(json!({
                "line_no": line_no,
                "identifier_raw": identifier_raw,
                "raw": clean,
            })),
        );
    };

    let value_raw = field(clean, VALUE);
    if value_raw.len() != 7 || !all_digits(value_raw) {
        return LineOutcome::Diag(
            DiagnosticsItem::error(
                "BANK_INVALID_VALOR",
                format!("line {line_no}: invalid value \"{value_raw}\""),
            )
            .with_details(json!({ "line_no": line_no, "value_raw": value_raw, "raw": clean })),
        );
    }
    let cents: u64 = value_raw.parse().unwrap_or(0);
    let value = round_money(cents as f64 / 100.0);

    // Absent/garbled competence is tolerated without a diagnostic.
    let competence_raw = field(clean, COMPETENCE);
    let competence = if competence_raw.len() == 6 && all_digits(competence_raw) {
        Some(format!("{}/{}", &competence_raw[0..2], &competence_raw[2..6]))
    } else {
        None
    };

    let event_raw = field(clean, EVENT);
    let event = if !event_raw.is_empty() && all_digits(event_raw) {
        event_raw.parse::<u64>().ok().map(|n| n.to_string())
    } else {
        None
    };

    LineOutcome::Row(NormalizedRow {
        source: RowSource::Bank,
        identifier,
        value,
        name: None,
        national_id: None,
        meta: Some(RowMeta {
            competence,
            event,
            confidence: Some(Confidence::High),
            ..RowMeta::default()
        }),
        raw_ref: Some(RawRef {
            line_no: Some(line_no),
            raw: Some(clean.to_string()),
            ..RawRef::default()
        }),
    })
}

/// `"000000008501"` → `"85-1"` (10-digit base + 2-digit suffix, zeros dropped).
fn parse_identifier(window: &str) -> Option<String> {
    if window.len() != 12 || !all_digits(window) {
        return None;
    }
    let base: u64 = window[0..10].parse().ok()?;
    let suffix: u64 = window[10..12].parse().ok()?;
    Some(format!("{base}-{suffix}"))
}

/// Byte-offset window, empty when the slice falls off the line or splits a
/// multi-byte character (both then fail the digit checks).
fn field(line: &str, range: std::ops::Range<usize>) -> &str {
    line.get(range).unwrap_or("")
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn prefix(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
