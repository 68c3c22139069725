//! Free-text extractor for reports that arrive as plain text pulled out of
//! documents upstream.
//!
//! Two independent passes over the same input, first success wins:
//!
//! 1. **Standard pass** — registration id and value co-located on one line.
//! 2. **Column-separated fallback** — some text extractions emit each visual
//!    column as its own run of lines, so ids and valued rows appear in two
//!    separate groups; they are collected independently and correlated by
//!    order of appearance.

use conciliar_core::{
    normalize_identifier, CancelFlag, Confidence, DiagnosticsItem, Money, NormalizedRow, RawRef,
    RowMeta, RowSource,
};
use regex::Regex;
use serde_json::json;

use crate::brl::parse_brl;
use crate::error::ExtractError;
use crate::report::CompetencePatterns;

const IDENTIFIER_START: &str = r"^(\d{1,6}-\d{1,3})\b";
const IDENTIFIER_ANYWHERE: &str = r"\b(\d{1,6}-\d{1,3})\b";
const MONEY: &str = r"\b\d{1,3}(?:\.\d{3})*,\d{2}\b";
const EVENT: &str = r"(?i)Evento:\s*(\d{1,4})";
const NATIONAL_ID: &str = r"\d{3}\.\d{3}\.\d{3}-\d{2}";

/// Lines that belong to the report chrome, not the data.
const HEADER_LINE: &str = r"(?i)^(Matrícula$|Nome do Trabalhador|Relação de Trabalhadores|PREFEITURA MUNICIPAL|RUA\s+\w+|CNPJ:|Fiorilli|Mensal|Folha$|Página\s+\d+|--\s*\d+\s+of\s+\d+\s*--$|Total:|Referência|Qtde\.|Valor$)";

/// Extraction result for one free-text document.
#[derive(Debug)]
pub struct TextExtractionResult {
    pub rows: Vec<NormalizedRow>,
    pub diagnostics: Vec<DiagnosticsItem>,
    pub competence: Option<String>,
    pub events_detected: usize,
}

/// Extract rows from free-form report text.
pub fn extract(text: &str, cancel: &CancelFlag) -> Result<TextExtractionResult, ExtractError> {
    let standard = standard_pass(text, cancel)?;
    if !standard.rows.is_empty() {
        return Ok(standard);
    }
    column_separated_pass(text, cancel)
}

// ---------------------------------------------------------------------------
// Standard pass: id and value on the same line
// ---------------------------------------------------------------------------

fn standard_pass(text: &str, cancel: &CancelFlag) -> Result<TextExtractionResult, ExtractError> {
    let id_start_re = Regex::new(IDENTIFIER_START).unwrap();
    let id_anywhere_re = Regex::new(IDENTIFIER_ANYWHERE).unwrap();
    let money_re = Regex::new(MONEY).unwrap();
    let event_re = Regex::new(EVENT).unwrap();
    let national_id_re = Regex::new(NATIONAL_ID).unwrap();
    let competence_re = CompetencePatterns::new();

    let mut rows: Vec<NormalizedRow> = Vec::new();
    let mut competence: Option<String> = None;
    let mut current_event: Option<String> = None;
    let mut events_detected = 0usize;

    let mut total_lines = 0usize;
    let mut data_lines_detected = 0usize;
    let mut discarded_no_value = 0usize;

    for line in text.lines() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        total_lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if competence.is_none() {
            competence = competence_re.detect(line);
        }

        if let Some(caps) = event_re.captures(line) {
            current_event = Some(format!("{:0>3}", &caps[1]));
            events_detected += 1;
            continue;
        }

        let start_match = id_start_re.captures(line);
        let has_national_id = national_id_re.is_match(line);

        let identifier_raw = match (&start_match, has_national_id) {
            (Some(caps), _) => caps[1].to_string(),
            // A national ID without a leading id belongs to the
            // column-separated layout; leave it to the fallback pass.
            (None, true) => continue,
            (None, false) => match id_anywhere_re.captures(line) {
                Some(caps) => caps[1].to_string(),
                None => continue,
            },
        };
        let Some(identifier) = normalize_identifier(&identifier_raw) else {
            continue;
        };
        data_lines_detected += 1;

        let values: Vec<Money> = money_re
            .find_iter(line)
            .filter_map(|m| parse_brl(m.as_str()))
            .collect();
        let Some(value) = choose_value(&values) else {
            discarded_no_value += 1;
            continue;
        };

        let (name, national_id) = extract_name_national_id(line, &national_id_re, &id_start_re);
        // A single monetary match is unambiguous; multiple mean the
        // tie-break heuristic picked one.
        let confidence = if values.len() == 1 { Confidence::High } else { Confidence::Medium };

        rows.push(make_row(
            identifier,
            value,
            name,
            national_id,
            &competence,
            current_event.clone(),
            confidence,
            line,
        ));
    }

    let mut diagnostics = Vec::new();
    push_common_diagnostics(&mut diagnostics, &competence, events_detected, rows.len());
    if rows.is_empty() {
        diagnostics.push(
            DiagnosticsItem::error("TEXT_ZERO_ROWS", "no row with id and value was extracted")
                .with_details(json!({
                    "data_lines_detected": data_lines_detected,
                    "discarded_no_value": discarded_no_value,
                })),
        );
    } else {
        diagnostics.push(
            DiagnosticsItem::info(
                "TEXT_PARSE_SUMMARY",
                format!("extracted {} rows from {data_lines_detected} detected", rows.len()),
            )
            .with_details(json!({
                "total_lines": total_lines,
                "data_lines_detected": data_lines_detected,
                "extracted_rows": rows.len(),
                "discarded_no_value": discarded_no_value,
                "competence": competence,
                "events_detected": events_detected,
            })),
        );
    }

    Ok(TextExtractionResult { rows, diagnostics, competence, events_detected })
}

// ---------------------------------------------------------------------------
// Fallback pass: ids and valued rows in separate line groups
// ---------------------------------------------------------------------------

struct ValuedEntry {
    name: Option<String>,
    national_id: Option<String>,
    value: Money,
    event: Option<String>,
    raw: String,
}

fn column_separated_pass(
    text: &str,
    cancel: &CancelFlag,
) -> Result<TextExtractionResult, ExtractError> {
    let id_start_re = Regex::new(IDENTIFIER_START).unwrap();
    let money_re = Regex::new(MONEY).unwrap();
    let event_re = Regex::new(EVENT).unwrap();
    let national_id_re = Regex::new(NATIONAL_ID).unwrap();
    let numeric_tail_re = Regex::new(r"^[\d/\s.]*$").unwrap();
    let header_re = Regex::new(HEADER_LINE).unwrap();
    let competence_re = CompetencePatterns::new();

    let mut competence: Option<String> = None;
    let mut current_event: Option<String> = None;
    let mut events_detected = 0usize;
    let mut total_lines = 0usize;

    let mut identifiers: Vec<String> = Vec::new();
    let mut entries: Vec<ValuedEntry> = Vec::new();

    for line in text.lines() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        total_lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if competence.is_none() {
            competence = competence_re.detect(line);
        }

        if let Some(caps) = event_re.captures(line) {
            current_event = Some(format!("{:0>3}", &caps[1]));
            events_detected += 1;
            continue;
        }

        if header_re.is_match(line) {
            continue;
        }

        let start_match = id_start_re.captures(line);
        let has_national_id = national_id_re.is_match(line);

        // Pure id line: starts with an id, carries no national ID, and is
        // either short or trails only numeric/slash/dot content.
        if let (Some(caps), false) = (&start_match, has_national_id) {
            let rest = line[caps.get(0).unwrap().end()..].trim();
            if line.chars().count() < 50 || numeric_tail_re.is_match(rest) {
                if let Some(identifier) = normalize_identifier(&caps[1]) {
                    identifiers.push(identifier);
                    continue;
                }
            }
        }

        // A national ID marks a valued data line.
        if has_national_id {
            let values: Vec<Money> = money_re
                .find_iter(line)
                .filter_map(|m| parse_brl(m.as_str()))
                .collect();
            if let Some(value) = choose_value(&values) {
                let (name, national_id) =
                    extract_name_national_id(line, &national_id_re, &id_start_re);
                entries.push(ValuedEntry {
                    name,
                    national_id,
                    value,
                    event: current_event.clone(),
                    raw: prefix(line, 300),
                });
            }
        }
    }

    // Correlate by order of appearance, up to the shorter list.
    let matched = identifiers.len().min(entries.len());
    let mut rows: Vec<NormalizedRow> = Vec::new();
    for (identifier, entry) in identifiers.iter().take(matched).zip(entries.iter()) {
        rows.push(make_row(
            identifier.clone(),
            entry.value,
            entry.name.clone(),
            entry.national_id.clone(),
            &competence,
            entry.event.clone(),
            Confidence::Medium,
            &entry.raw,
        ));
    }

    let mut diagnostics = Vec::new();
    if rows.is_empty() {
        diagnostics.push(
            DiagnosticsItem::error("TEXT_ZERO_ROWS", "no row with id and value was extracted")
                .with_details(json!({
                    "identifiers_found": identifiers.len(),
                    "valued_entries_found": entries.len(),
                })),
        );
    } else {
        if identifiers.len() != entries.len() {
            diagnostics.push(
                DiagnosticsItem::warn(
                    "TEXT_COLUMN_MISMATCH",
                    format!(
                        "id count ({}) differs from valued-row count ({})",
                        identifiers.len(),
                        entries.len()
                    ),
                )
                .with_details(json!({
                    "identifiers_found": identifiers.len(),
                    "valued_entries_found": entries.len(),
                    "matched": rows.len(),
                })),
            );
        }
        diagnostics.push(
            DiagnosticsItem::info(
                "TEXT_PARSE_SUMMARY",
                format!("extracted {} rows (column-separated layout)", rows.len()),
            )
            .with_details(json!({
                "total_lines": total_lines,
                "identifiers_found": identifiers.len(),
                "valued_entries_found": entries.len(),
                "extracted_rows": rows.len(),
                "competence": competence,
                "events_detected": events_detected,
                "extraction_method": "column_separated",
            })),
        );
    }
    push_common_diagnostics(&mut diagnostics, &competence, events_detected, rows.len());

    Ok(TextExtractionResult { rows, diagnostics, competence, events_detected })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Multi-valued lines carry partials and totals; the last non-zero value is
/// the authoritative amount, or the last value when every one is zero.
/// Heuristic preserved exactly from the legacy extraction rules.
fn choose_value(values: &[Money]) -> Option<Money> {
    match values {
        [] => None,
        [single] => Some(*single),
        _ => values
            .iter()
            .rev()
            .find(|v| **v > 0.0)
            .or(values.last())
            .copied(),
    }
}

/// Name = text before the national ID, with any leading id stripped.
fn extract_name_national_id(
    line: &str,
    national_id_re: &Regex,
    id_start_re: &Regex,
) -> (Option<String>, Option<String>) {
    let Some(m) = national_id_re.find(line) else {
        return (None, None);
    };
    let national_id = Some(m.as_str().to_string());

    let before = line[..m.start()].trim();
    let without_id = id_start_re.replace(before, "");
    let name = without_id.trim();
    let name = if name.chars().count() > 2 {
        Some(name.to_string())
    } else {
        None
    };

    (name, national_id)
}

#[allow(clippy::too_many_arguments)]
fn make_row(
    identifier: String,
    value: Money,
    name: Option<String>,
    national_id: Option<String>,
    competence: &Option<String>,
    event: Option<String>,
    confidence: Confidence,
    raw: &str,
) -> NormalizedRow {
    NormalizedRow {
        source: RowSource::Municipality,
        identifier,
        value,
        name: name.clone(),
        national_id: national_id.clone(),
        meta: Some(RowMeta {
            competence: competence.clone(),
            event,
            confidence: Some(confidence),
            name,
            national_id,
        }),
        raw_ref: Some(RawRef {
            raw: Some(prefix(raw, 300)),
            ..RawRef::default()
        }),
    }
}

fn push_common_diagnostics(
    diagnostics: &mut Vec<DiagnosticsItem>,
    competence: &Option<String>,
    events_detected: usize,
    row_count: usize,
) {
    if competence.is_none() {
        diagnostics.push(DiagnosticsItem::warn(
            "TEXT_COMPETENCIA_NOT_FOUND",
            "no competence period detected in the text",
        ));
    }
    if events_detected == 0 && row_count > 0 {
        diagnostics.push(DiagnosticsItem::warn(
            "TEXT_EVENT_NOT_FOUND",
            "no event marker detected in the text",
        ));
    }
}

fn prefix(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_core::Severity;

    fn run(text: &str) -> TextExtractionResult {
        extract(text, &CancelFlag::new()).unwrap()
    }

    fn find<'a>(result: &'a TextExtractionResult, code: &str) -> Option<&'a DiagnosticsItem> {
        result.diagnostics.iter().find(|d| d.code == code)
    }

    const INLINE: &str = "\
Relação de Trabalhadores por Evento
Mês/Ano: 01/2026
Evento: 2 - CONSIGNADO
85-1 REGINALDO RODRIGUES 000.281.393-99 0,00 400,49
99-1 MARIA WILLANA 000.709.903-79 1.234,56
";

    #[test]
    fn standard_pass_extracts_inline_rows() {
        let result = run(INLINE);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].identifier, "85-1");
        assert_eq!(result.rows[1].identifier, "99-1");
        assert_eq!(result.competence.as_deref(), Some("01/2026"));
        assert_eq!(result.events_detected, 1);
    }

    #[test]
    fn last_non_zero_value_wins() {
        let result = run(INLINE);
        assert_eq!(result.rows[0].value, 400.49);
    }

    #[test]
    fn single_value_line_is_high_confidence() {
        let result = run(INLINE);
        let meta = |i: usize| result.rows[i].meta.clone().unwrap();
        assert_eq!(meta(0).confidence, Some(Confidence::Medium)); // two values
        assert_eq!(meta(1).confidence, Some(Confidence::High)); // one value
    }

    #[test]
    fn name_and_national_id_from_inline_line() {
        let result = run(INLINE);
        let row = &result.rows[0];
        assert_eq!(row.name.as_deref(), Some("REGINALDO RODRIGUES"));
        assert_eq!(row.national_id.as_deref(), Some("000.281.393-99"));
        let meta = row.meta.as_ref().unwrap();
        assert_eq!(meta.name.as_deref(), Some("REGINALDO RODRIGUES"));
        assert_eq!(meta.event.as_deref(), Some("002"));
    }

    #[test]
    fn all_zero_values_fall_back_to_last() {
        let result = run("Evento: 2\n01/2026\n85-1 FULANO DE TAL 0,00 0,00\n");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].value, 0.0);
    }

    #[test]
    fn line_without_value_is_discarded() {
        let result = run("01/2026\nEvento: 2\n85-1 SEM VALOR NENHUM\n99-1 COM VALOR 10,00\n");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].identifier, "99-1");
    }

    const COLUMN_SEPARATED: &str = "\
Relação de Trabalhadores por Evento
Mês/Ano: 01/2026
Evento: 2 - CONSIGNADO
Matrícula
85-1
99-1
Nome do Trabalhador
REGINALDO RODRIGUES 000.281.393-99 400,49
MARIA WILLANA 000.709.903-79 1.234,56
";

    #[test]
    fn fallback_correlates_by_order() {
        let result = run(COLUMN_SEPARATED);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].identifier, "85-1");
        assert_eq!(result.rows[0].value, 400.49);
        assert_eq!(result.rows[0].name.as_deref(), Some("REGINALDO RODRIGUES"));
        assert_eq!(result.rows[1].identifier, "99-1");
        assert_eq!(result.rows[1].value, 1234.56);

        let summary = find(&result, "TEXT_PARSE_SUMMARY").unwrap();
        assert_eq!(
            summary.details.as_ref().unwrap()["extraction_method"],
            "column_separated"
        );
    }

    #[test]
    fn fallback_rows_are_medium_confidence() {
        let result = run(COLUMN_SEPARATED);
        for row in &result.rows {
            assert_eq!(row.meta.as_ref().unwrap().confidence, Some(Confidence::Medium));
        }
    }

    #[test]
    fn fallback_mismatch_emits_warning() {
        let text = "\
01/2026
Evento: 2
85-1
99-1
403-2
REGINALDO RODRIGUES 000.281.393-99 400,49
MARIA WILLANA 000.709.903-79 1.234,56
";
        let result = run(text);
        assert_eq!(result.rows.len(), 2);
        let mismatch = find(&result, "TEXT_COLUMN_MISMATCH").unwrap();
        assert_eq!(mismatch.severity, Severity::Warn);
        assert_eq!(mismatch.details.as_ref().unwrap()["identifiers_found"], 3);
        assert_eq!(mismatch.details.as_ref().unwrap()["valued_entries_found"], 2);
    }

    #[test]
    fn empty_input_reports_zero_rows() {
        let result = run("nada aqui\noutra linha\n");
        assert!(result.rows.is_empty());
        let zero = find(&result, "TEXT_ZERO_ROWS").unwrap();
        assert_eq!(zero.severity, Severity::Error);
    }

    #[test]
    fn missing_competence_and_event_warn() {
        let result = run("85-1 FULANO DE TAL 10,00\n");
        assert_eq!(result.rows.len(), 1);
        assert!(find(&result, "TEXT_COMPETENCIA_NOT_FOUND").is_some());
        assert!(find(&result, "TEXT_EVENT_NOT_FOUND").is_some());
    }

    #[test]
    fn choose_value_rules() {
        assert_eq!(choose_value(&[]), None);
        assert_eq!(choose_value(&[5.0]), Some(5.0));
        assert_eq!(choose_value(&[0.0]), Some(0.0));
        assert_eq!(choose_value(&[1.0, 2.0, 0.0]), Some(2.0));
        assert_eq!(choose_value(&[0.0, 0.0]), Some(0.0));
        assert_eq!(choose_value(&[0.0, 3.0, 4.0]), Some(4.0));
    }

    #[test]
    fn cancel_stops_the_scan() {
        let flag = CancelFlag::new();
        flag.cancel();
        assert!(matches!(extract("85-1 X 1,00\n", &flag), Err(ExtractError::Cancelled)));
    }
}
