//! Spreadsheet extractor: grid acquisition, column inference, row
//! extraction, and the whole-document quality verdict.

pub mod cell;
pub mod columns;

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use conciliar_core::{
    CancelFlag, DiagnosticsItem, ExtractionQuality, NormalizedRow, RawRef, RowMeta, RowSource,
};
use serde_json::json;

use crate::error::ExtractError;
use crate::report::CompetencePatterns;
use cell::{cell_as_name, cell_as_national_id, Cell, CellPatterns};
use columns::detect_columns;

/// Rows-accepted ratio below which the verdict drops to `parcial`.
const PARTIAL_RATIO: f64 = 0.5;

/// Extraction result for one spreadsheet.
#[derive(Debug)]
pub struct SheetExtractionResult {
    pub rows: Vec<NormalizedRow>,
    pub diagnostics: Vec<DiagnosticsItem>,
    pub competence: Option<String>,
    pub quality: ExtractionQuality,
}

/// Open a workbook, pick the most populated sheet, and extract it.
pub fn extract_file(path: &Path, cancel: &CancelFlag) -> Result<SheetExtractionResult, ExtractError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExtractError::Workbook(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(ExtractError::Workbook("workbook contains no sheets".into()));
    }

    // Best sheet = most used (non-empty) cells; first sheet wins ties.
    let mut best: Option<(String, Range<Data>)> = None;
    let mut best_count = 0usize;
    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| ExtractError::Workbook(format!("cannot read sheet '{name}': {e}")))?;
        let used = range.used_cells().count();
        if best.is_none() || used > best_count {
            best_count = used;
            best = Some((name.clone(), range));
        }
    }
    let (sheet_name, range) = best.expect("at least one sheet");

    let grid: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect();

    let selected = DiagnosticsItem::info(
        "XLSX_SHEET_SELECTED",
        format!("selected sheet \"{sheet_name}\""),
    )
    .with_details(json!({
        "sheet_name": sheet_name,
        "total_sheets": sheet_names.len(),
        "used_cells": best_count,
    }));

    let mut result = extract_grid(&grid, Some(&sheet_name), cancel)?;
    result.diagnostics.insert(0, selected);
    Ok(result)
}

/// Extract from an already-acquired 2-D grid.
pub fn extract_grid(
    grid: &[Vec<Cell>],
    sheet_name: Option<&str>,
    cancel: &CancelFlag,
) -> Result<SheetExtractionResult, ExtractError> {
    let mut diagnostics: Vec<DiagnosticsItem> = Vec::new();

    if grid.is_empty() {
        diagnostics.push(DiagnosticsItem::error(
            "XLSX_ZERO_ROWS",
            "sheet is empty or holds no data",
        ));
        return Ok(failed(diagnostics));
    }

    let Some(map) = detect_columns(grid) else {
        diagnostics.push(DiagnosticsItem::error(
            "XLSX_ZERO_ROWS",
            "could not identify registration-id and value columns",
        ));
        return Ok(failed(diagnostics));
    };

    diagnostics.push(
        DiagnosticsItem::info(
            "XLSX_COLUMNS_DETECTED",
            format!(
                "columns: identifier={}, value={}",
                map.identifier_col, map.value_col
            ),
        )
        .with_details(json!({
            "identifier_col": map.identifier_col,
            "value_col": map.value_col,
            "event_col": map.event_col,
            "name_col": map.name_col,
            "national_id_col": map.national_id_col,
            "confidence": map.confidence,
        })),
    );

    let patterns = CellPatterns::new();
    let competence = scan_competence(grid);
    if competence.is_none() {
        diagnostics.push(DiagnosticsItem::warn(
            "XLSX_COMPETENCIA_NOT_FOUND",
            "no competence period detected in the sheet",
        ));
    }

    let mut rows: Vec<NormalizedRow> = Vec::new();
    let mut discarded = 0usize;
    let mut current_event: Option<String> = None;

    for row in grid {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        // Event section state follows the classified event column.
        if let Some(event_col) = map.event_col {
            if let Some(code) = row.get(event_col).and_then(cell::cell_looks_event) {
                current_event = Some(format!("{code:0>3}"));
            }
        }

        // A row counts only when both identifier and value parse; anything
        // else is a silent discard, not a per-row diagnostic.
        let Some(identifier) = row
            .get(map.identifier_col)
            .and_then(|c| patterns.as_identifier(c))
        else {
            discarded += 1;
            continue;
        };
        let Some(value) = row.get(map.value_col).and_then(|c| patterns.as_monetary(c)) else {
            discarded += 1;
            continue;
        };

        let name = map.name_col.and_then(|c| row.get(c)).and_then(cell_as_name);
        let national_id = map
            .national_id_col
            .and_then(|c| row.get(c))
            .and_then(cell_as_national_id);

        rows.push(NormalizedRow {
            source: RowSource::Municipality,
            identifier,
            value,
            name,
            national_id,
            meta: Some(RowMeta {
                competence: competence.clone(),
                event: current_event.clone(),
                confidence: Some(map.confidence),
                ..RowMeta::default()
            }),
            raw_ref: Some(RawRef {
                sheet: sheet_name.map(str::to_string),
                raw: Some(render_row(row)),
                ..RawRef::default()
            }),
        });
    }

    if current_event.is_none() && !rows.is_empty() {
        diagnostics.push(DiagnosticsItem::warn(
            "XLSX_EVENT_NOT_FOUND",
            "no event code detected in the sheet",
        ));
    }

    if rows.is_empty() {
        diagnostics.push(
            DiagnosticsItem::error(
                "XLSX_ZERO_ROWS",
                "no row with both registration id and value was extracted",
            )
            .with_details(json!({ "total_rows": grid.len(), "discarded": discarded })),
        );
        return Ok(SheetExtractionResult {
            rows: Vec::new(),
            diagnostics,
            competence,
            quality: ExtractionQuality::Falhou,
        });
    }

    diagnostics.push(
        DiagnosticsItem::info(
            "XLSX_PARSE_SUMMARY",
            format!("extracted {} rows from {} grid rows", rows.len(), grid.len()),
        )
        .with_details(json!({
            "total_rows": grid.len(),
            "extracted_rows": rows.len(),
            "discarded": discarded,
            "competence": competence,
        })),
    );

    let ratio = rows.len() as f64 / grid.len() as f64;
    let quality = if ratio < PARTIAL_RATIO
        || map.confidence == conciliar_core::Confidence::Low
        || competence.is_none()
    {
        ExtractionQuality::Parcial
    } else {
        ExtractionQuality::Completa
    };

    Ok(SheetExtractionResult { rows, diagnostics, competence, quality })
}

fn failed(diagnostics: Vec<DiagnosticsItem>) -> SheetExtractionResult {
    SheetExtractionResult {
        rows: Vec::new(),
        diagnostics,
        competence: None,
        quality: ExtractionQuality::Falhou,
    }
}

/// First competence-shaped text cell, scanning row-major.
fn scan_competence(grid: &[Vec<Cell>]) -> Option<String> {
    let competence_re = CompetencePatterns::new();
    for row in grid {
        for cell in row {
            if let Cell::Text(s) = cell {
                if let Some(comp) = competence_re.detect(s) {
                    return Some(comp);
                }
            }
        }
    }
    None
}

/// Compact audit rendering of a grid row, capped at 500 chars.
fn render_row(row: &[Cell]) -> String {
    let mut out = String::new();
    for (idx, cell) in row.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        match cell {
            Cell::Empty => {}
            Cell::Text(s) => out.push_str(s),
            Cell::Number(n) => out.push_str(&n.to_string()),
        }
        if out.len() >= 500 {
            break;
        }
    }
    out.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_core::{Confidence, Severity};

    fn text(s: impl Into<String>) -> Cell {
        Cell::text(s)
    }

    fn grid_with_header() -> Vec<Vec<Cell>> {
        let mut grid = vec![
            vec![text("Competência: 01/2026"), Cell::Empty, Cell::Empty, Cell::Empty],
            vec![text("Evento"), text("Matrícula"), text("Nome"), text("Valor")],
        ];
        for i in 0..8 {
            grid.push(vec![
                text("002"),
                text(format!("{}-1", 85 + i)),
                text("MARIA WILLANA DOS SANTOS"),
                text(format!("40{i},49")),
            ]);
        }
        grid
    }

    fn run(grid: &[Vec<Cell>]) -> SheetExtractionResult {
        extract_grid(grid, Some("Folha"), &CancelFlag::new()).unwrap()
    }

    fn find<'a>(result: &'a SheetExtractionResult, code: &str) -> Option<&'a DiagnosticsItem> {
        result.diagnostics.iter().find(|d| d.code == code)
    }

    #[test]
    fn extracts_rows_with_event_and_competence() {
        let result = run(&grid_with_header());
        assert_eq!(result.rows.len(), 8);
        assert_eq!(result.competence.as_deref(), Some("01/2026"));

        let row = &result.rows[0];
        assert_eq!(row.identifier, "85-1");
        assert_eq!(row.value, 400.49);
        assert_eq!(row.source, RowSource::Municipality);
        let meta = row.meta.as_ref().unwrap();
        assert_eq!(meta.event.as_deref(), Some("002"));
        assert_eq!(meta.competence.as_deref(), Some("01/2026"));
        assert_eq!(row.raw_ref.as_ref().unwrap().sheet.as_deref(), Some("Folha"));
    }

    #[test]
    fn complete_verdict_for_dense_grid() {
        let result = run(&grid_with_header());
        assert_eq!(result.quality, ExtractionQuality::Completa);
        assert!(find(&result, "XLSX_COLUMNS_DETECTED").is_some());
        assert!(find(&result, "XLSX_PARSE_SUMMARY").is_some());
    }

    #[test]
    fn name_populated_from_classified_column() {
        let result = run(&grid_with_header());
        assert_eq!(
            result.rows[0].name.as_deref(),
            Some("MARIA WILLANA DOS SANTOS")
        );
    }

    #[test]
    fn empty_grid_fails() {
        let result = run(&[]);
        assert_eq!(result.quality, ExtractionQuality::Falhou);
        let diag = find(&result, "XLSX_ZERO_ROWS").unwrap();
        assert_eq!(diag.severity, Severity::Error);
    }

    #[test]
    fn unclassifiable_grid_fails() {
        let grid = vec![
            vec![text("só texto"), text("sem estrutura")],
            vec![text("nada"), text("aqui")],
        ];
        let result = run(&grid);
        assert_eq!(result.quality, ExtractionQuality::Falhou);
        assert!(find(&result, "XLSX_ZERO_ROWS").is_some());
        assert!(result.rows.is_empty());
    }

    #[test]
    fn missing_competence_downgrades_to_partial() {
        let mut grid = grid_with_header();
        grid.remove(0); // drop the competence header
        let result = run(&grid);
        assert_eq!(result.competence, None);
        assert_eq!(result.quality, ExtractionQuality::Parcial);
        assert!(find(&result, "XLSX_COMPETENCIA_NOT_FOUND").is_some());
    }

    #[test]
    fn low_ratio_downgrades_to_partial() {
        let mut grid = grid_with_header();
        // Pad with noise so accepted/total < 0.5.
        for _ in 0..12 {
            grid.push(vec![text("observação"), Cell::Empty, Cell::Empty, Cell::Empty]);
        }
        let result = run(&grid);
        assert_eq!(result.rows.len(), 8);
        assert_eq!(result.quality, ExtractionQuality::Parcial);
    }

    #[test]
    fn event_warning_when_no_event_column() {
        let mut grid = vec![vec![text("01/2026"), Cell::Empty]];
        for i in 0..6 {
            grid.push(vec![text(format!("{}-1", i + 1)), text("10,00")]);
        }
        let result = run(&grid);
        assert!(!result.rows.is_empty());
        assert!(result.rows[0].meta.as_ref().unwrap().event.is_none());
        assert!(find(&result, "XLSX_EVENT_NOT_FOUND").is_some());
    }

    #[test]
    fn confidence_propagates_to_rows() {
        let result = run(&grid_with_header());
        let meta = result.rows[0].meta.as_ref().unwrap();
        assert_eq!(meta.confidence, Some(Confidence::High));
    }
}
