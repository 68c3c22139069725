//! Column-role inference over an arbitrary 2-D grid.
//!
//! One pass accumulates a fixed table of per-column signature counters;
//! a pure selection over that table then assigns roles. The value column is
//! ranked by *summed* monetary value, not hit count — reports often carry a
//! zero-valued reference column next to the real amount column.

use conciliar_core::Confidence;

use super::cell::{cell_looks_event, cell_looks_name, Cell, CellPatterns};

/// Share of rows a national-ID signature needs to disqualify a column from
/// being the value column (and to accept the optional name/ID columns).
const OPTIONAL_COLUMN_RATIO: f64 = 0.3;

/// Best-guess column assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub identifier_col: usize,
    pub value_col: usize,
    pub event_col: Option<usize>,
    pub name_col: Option<usize>,
    pub national_id_col: Option<usize>,
    pub confidence: Confidence,
}

/// Per-column signature counters, built in a single pass over the grid.
#[derive(Debug, Clone, Default)]
struct ColumnStats {
    identifier_hits: usize,
    monetary_hits: usize,
    monetary_sum: f64,
    national_id_hits: usize,
    event_hits: usize,
    name_hits: usize,
}

/// Infer column roles. Returns `None` when no identifier column exists or
/// no usable value column remains after exclusions.
pub fn detect_columns(grid: &[Vec<Cell>]) -> Option<ColumnMap> {
    if grid.is_empty() {
        return None;
    }
    let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    if cols == 0 {
        return None;
    }

    // Patterns compile once here, not per cell.
    let patterns = CellPatterns::new();
    let stats = accumulate(grid, cols, &patterns);
    select(&stats, grid.len())
}

fn accumulate(grid: &[Vec<Cell>], cols: usize, patterns: &CellPatterns) -> Vec<ColumnStats> {
    let mut stats = vec![ColumnStats::default(); cols];

    for row in grid {
        for (col, cell) in row.iter().enumerate() {
            let s = &mut stats[col];

            if patterns.as_identifier(cell).is_some() {
                s.identifier_hits += 1;
            }
            if patterns.looks_national_id(cell) {
                s.national_id_hits += 1;
            }
            if cell_looks_name(cell) {
                s.name_hits += 1;
            }
            if let Some(value) = patterns.as_monetary(cell) {
                if value >= 0.0 {
                    s.monetary_hits += 1;
                    s.monetary_sum += value;
                }
            }
            if cell_looks_event(cell).is_some() {
                s.event_hits += 1;
            }
        }
    }

    stats
}

fn select(stats: &[ColumnStats], row_count: usize) -> Option<ColumnMap> {
    let identifier_col = index_of_max(stats.iter().map(|s| s.identifier_hits))?;
    let identifier_hits = stats[identifier_col].identifier_hits;
    if identifier_hits == 0 {
        return None;
    }

    // Columns dominated by national IDs are ID columns, not amounts.
    let national_id_threshold = row_count as f64 * OPTIONAL_COLUMN_RATIO;
    let excluded = |col: usize| {
        col == identifier_col || stats[col].national_id_hits as f64 >= national_id_threshold
    };

    // Largest summed value wins; hit count breaks ties.
    let value_col = stats
        .iter()
        .enumerate()
        .filter(|(col, s)| !excluded(*col) && s.monetary_hits > 0)
        .max_by(|(_, a), (_, b)| {
            a.monetary_sum
                .partial_cmp(&b.monetary_sum)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.monetary_hits.cmp(&b.monetary_hits))
        })
        .map(|(col, _)| col)?;
    let value_hits = stats[value_col].monetary_hits;

    let mut taken = vec![identifier_col, value_col];

    // Optional columns, best-first, never reusing an assigned column.
    let event_col = best_remaining(stats, &taken, |s| s.event_hits)
        .filter(|&col| stats[col].event_hits > 0);
    if let Some(col) = event_col {
        taken.push(col);
    }

    let name_col = best_remaining(stats, &taken, |s| s.name_hits)
        .filter(|&col| stats[col].name_hits as f64 > row_count as f64 * OPTIONAL_COLUMN_RATIO);
    if let Some(col) = name_col {
        taken.push(col);
    }

    let national_id_col = best_remaining(stats, &taken, |s| s.national_id_hits).filter(|&col| {
        stats[col].national_id_hits as f64 > row_count as f64 * OPTIONAL_COLUMN_RATIO
    });

    let identifier_ratio = identifier_hits as f64 / row_count as f64;
    let value_ratio = value_hits as f64 / row_count as f64;
    let confidence = if identifier_ratio >= 0.7 && value_ratio >= 0.7 {
        Confidence::High
    } else if identifier_ratio >= 0.4 && value_ratio >= 0.4 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Some(ColumnMap {
        identifier_col,
        value_col,
        event_col,
        name_col,
        national_id_col,
        confidence,
    })
}

fn best_remaining(
    stats: &[ColumnStats],
    taken: &[usize],
    score: impl Fn(&ColumnStats) -> usize,
) -> Option<usize> {
    stats
        .iter()
        .enumerate()
        .filter(|(col, _)| !taken.contains(col))
        .max_by_key(|(_, s)| score(s))
        .map(|(col, _)| col)
}

fn index_of_max(scores: impl Iterator<Item = usize>) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, score) in scores.enumerate() {
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}
