//! Delimited "workers by event" report extractor.
//!
//! The report is comma-separated but not a clean table: a header block
//! carries the competence, `Evento:` marker lines open per-event sections,
//! and data lines start with the registration id. Monetary fields appear
//! double-quoted in pt-BR format; the last quoted value on a data line is
//! the authoritative amount.

use conciliar_core::{
    normalize_identifier, CancelFlag, Confidence, DiagnosticsItem, NormalizedRow, RawRef, RowMeta,
    RowSource,
};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeSet;

use crate::brl::parse_brl;
use crate::error::ExtractError;

/// Extraction result for one delimited report.
#[derive(Debug)]
pub struct ReportExtractionResult {
    pub rows: Vec<NormalizedRow>,
    pub diagnostics: Vec<DiagnosticsItem>,
    pub competence: Option<String>,
}

/// Compiled competence patterns. Built once per scan and reused for every
/// line, never recompiled per call.
pub(crate) struct CompetencePatterns {
    slash: Regex,
    compact: Regex,
}

impl CompetencePatterns {
    pub(crate) fn new() -> Self {
        Self {
            slash: Regex::new(r"\b(\d{2})/(\d{4})\b").unwrap(),
            compact: Regex::new(r"\b(0[1-9]|1[0-2])(\d{4})\b").unwrap(),
        }
    }

    /// Detect a competence period in a line: `01/2026` or compact `012026`.
    pub(crate) fn detect(&self, line: &str) -> Option<String> {
        if let Some(caps) = self.slash.captures(line) {
            return Some(format!("{}/{}", &caps[1], &caps[2]));
        }
        self.compact
            .captures(line)
            .map(|caps| format!("{}/{}", &caps[1], &caps[2]))
    }
}

/// Scan the full report text.
pub fn extract(text: &str, cancel: &CancelFlag) -> Result<ReportExtractionResult, ExtractError> {
    let competence_re = CompetencePatterns::new();
    let event_re = Regex::new(r"(?i)Evento:\s*(\d{1,3})").unwrap();
    let identifier_re = Regex::new(r"^(\d{1,6}-\d{1,3}),").unwrap();
    let quoted_value_re = Regex::new(r#""([\d.,]+)""#).unwrap();

    let mut rows: Vec<NormalizedRow> = Vec::new();
    let mut diagnostics: Vec<DiagnosticsItem> = Vec::new();

    let mut total_lines = 0usize;
    let mut data_lines_detected = 0usize;
    let mut discarded_no_value = 0usize;
    let mut events_seen: BTreeSet<String> = BTreeSet::new();

    // Running scan state, scoped to this call.
    let mut competence: Option<String> = None;
    let mut current_event: Option<String> = None;

    for line in text.lines() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        total_lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Competence: first occurrence anywhere in the header block wins.
        if competence.is_none() {
            competence = competence_re.detect(line);
        }

        // Section marker opens a new event, zero-padded to 3 digits.
        if let Some(caps) = event_re.captures(line) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let event = format!("{number:03}");
            events_seen.insert(event.clone());
            current_event = Some(event);
            continue;
        }

        let Some(caps) = identifier_re.captures(line) else {
            continue;
        };
        data_lines_detected += 1;

        let Some(identifier) = normalize_identifier(&caps[1]) else {
            continue;
        };

        // Last quoted value is the report's final/total amount for the line.
        let value = quoted_value_re
            .captures_iter(line)
            .last()
            .and_then(|v| parse_brl(&v[1]));
        let Some(value) = value else {
            discarded_no_value += 1;
            continue;
        };

        rows.push(NormalizedRow {
            source: RowSource::Municipality,
            identifier,
            value,
            name: None,
            national_id: None,
            meta: Some(RowMeta {
                competence: competence.clone(),
                event: current_event.clone(),
                confidence: Some(Confidence::High),
                ..RowMeta::default()
            }),
            raw_ref: Some(RawRef {
                raw: Some(line.to_string()),
                ..RawRef::default()
            }),
        });
    }

    let extracted_rows = rows.len();
    let severity = if extracted_rows > 0 {
        conciliar_core::Severity::Info
    } else {
        conciliar_core::Severity::Error
    };
    diagnostics.push(
        DiagnosticsItem::new(
            severity,
            "prefeitura_csv_v1_summary",
            format!("report extraction: {extracted_rows} rows from {data_lines_detected} data lines"),
        )
        .with_details(json!({
            "total_lines": total_lines,
            "data_lines_detected": data_lines_detected,
            "extracted_rows": extracted_rows,
            "discarded_no_value": discarded_no_value,
            "competence": competence,
            "events_seen_count": events_seen.len(),
            "events_seen": events_seen.iter().collect::<Vec<_>>(),
        })),
    );

    if extracted_rows == 0 {
        diagnostics.push(
            DiagnosticsItem::error(
                "prefeitura_extraction_failed",
                "no data rows extracted from the municipality file",
            )
            .with_details(json!({
                "total_lines": total_lines,
                "data_lines_detected": data_lines_detected,
                "discarded_no_value": discarded_no_value,
            })),
        );
    }

    Ok(ReportExtractionResult { rows, diagnostics, competence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_core::Severity;

    const SAMPLE: &str = r#"
,,PREFEITURA MUNICIPAL DE TESTE,,,,,,,,,,Mês/Ano,
,,"RUA TESTE, 123",,,,,,,,,,,01/2026
,,CNPJ: 00.000.000/0001-00,,,,,,,,,,Folha Mensal,
Relação de Trabalhadores por Evento ,,,,,,,,,,,,,
Matrícula,Nome do Trabalhador,,,,,,,Referência,,Qtde.,,Valor,
Evento:  002 - CONSIGNADO BB,,,,,,,,,,,,,
85-1,REGINALDO RODRIGUES,,,,,,000.281.393-99,,1/0,"0,00",,"400,49",
85-1,REGINALDO RODRIGUES,,,,,,000.281.393-99,,1/0,"0,00",,"26,83",
Evento:  015 - CONSIGNADO CEF,,,,,,,,,,,,,
99-1,MARIA WILLANA,,,,,,000.709.903-79,,1/0,"0,00",,"1.234,56",
"#;

    fn run(text: &str) -> ReportExtractionResult {
        extract(text, &CancelFlag::new()).unwrap()
    }

    #[test]
    fn extracts_all_data_lines() {
        let result = run(SAMPLE);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0].identifier, "85-1");
        assert_eq!(result.rows[2].identifier, "99-1");
    }

    #[test]
    fn last_quoted_value_wins() {
        let result = run(SAMPLE);
        assert_eq!(result.rows[0].value, 400.49);
        assert_eq!(result.rows[1].value, 26.83);
        assert_eq!(result.rows[2].value, 1234.56);
    }

    #[test]
    fn competence_from_header_block() {
        let result = run(SAMPLE);
        assert_eq!(result.competence.as_deref(), Some("01/2026"));
        let meta = result.rows[0].meta.as_ref().unwrap();
        assert_eq!(meta.competence.as_deref(), Some("01/2026"));
    }

    #[test]
    fn event_sections_tag_rows_zero_padded() {
        let result = run(SAMPLE);
        let event = |i: usize| {
            let row: &NormalizedRow = &result.rows[i];
            row.meta.as_ref().unwrap().event.clone().unwrap()
        };
        assert_eq!(event(0), "002");
        assert_eq!(event(1), "002");
        assert_eq!(event(2), "015");
    }

    #[test]
    fn rows_are_high_confidence_municipality() {
        let result = run(SAMPLE);
        let meta = result.rows[0].meta.as_ref().unwrap();
        assert_eq!(result.rows[0].source, RowSource::Municipality);
        assert_eq!(meta.confidence, Some(Confidence::High));
    }

    #[test]
    fn summary_diagnostic_counts_events() {
        let result = run(SAMPLE);
        let summary = result
            .diagnostics
            .iter()
            .find(|d| d.code == "prefeitura_csv_v1_summary")
            .unwrap();
        assert_eq!(summary.severity, Severity::Info);
        assert_eq!(summary.details.as_ref().unwrap()["events_seen_count"], 2);
    }

    #[test]
    fn zero_rows_yields_extraction_failed() {
        let result = run("no data here\nanother line\n");
        let failed = result
            .diagnostics
            .iter()
            .find(|d| d.code == "prefeitura_extraction_failed")
            .unwrap();
        assert_eq!(failed.severity, Severity::Error);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn data_line_without_quoted_value_is_discarded() {
        let text = "Evento: 002\n85-1,NO VALUES HERE,,\n12-1,,\"5,00\",\n";
        let result = run(text);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].identifier, "12-1");
        let summary = &result.diagnostics[0];
        assert_eq!(summary.details.as_ref().unwrap()["discarded_no_value"], 1);
        assert_eq!(summary.details.as_ref().unwrap()["data_lines_detected"], 2);
    }

    #[test]
    fn compact_competence_form() {
        let text = "Competência 012026\nEvento: 2\n85-1,X,\"1,00\",\n";
        let result = run(text);
        assert_eq!(result.competence.as_deref(), Some("01/2026"));
        let meta = result.rows[0].meta.as_ref().unwrap();
        assert_eq!(meta.event.as_deref(), Some("002"));
    }

    #[test]
    fn competence_patterns_detect_both_forms() {
        let re = CompetencePatterns::new();
        assert_eq!(re.detect("Mês/Ano: 01/2026").as_deref(), Some("01/2026"));
        assert_eq!(re.detect("Competência 012026").as_deref(), Some("01/2026"));
        assert_eq!(re.detect("132026"), None); // month 13
        assert_eq!(re.detect("sem período"), None);
    }

    #[test]
    fn crlf_input_counts_each_line_once() {
        let text = "Mês/Ano 01/2026\r\nEvento: 002\r\n85-1,NAME,\"2,00\",\r\n";
        let result = run(text);
        assert_eq!(result.rows.len(), 1);
        let summary = &result.diagnostics[0];
        assert_eq!(summary.details.as_ref().unwrap()["total_lines"], 3);
    }

    #[test]
    fn leading_zero_identifier_is_normalized() {
        let text = "Evento: 002\n085-01,NAME,\"2,00\",\n";
        let result = run(text);
        assert_eq!(result.rows[0].identifier, "85-1");
    }
}
