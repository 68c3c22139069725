//! Cell values and the field signatures used to classify columns.

use calamine::Data;
use conciliar_core::{normalize_identifier, round_money, Money};
use regex::Regex;

use crate::brl::parse_brl;

/// One cell of the externally-deserialized 2-D grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) | Data::DurationIso(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::DateTimeIso(s) => Cell::Text(s.clone()),
            Data::Float(n) => Cell::Number(*n),
            Data::Int(n) => Cell::Number(*n as f64),
            // Serial number; good enough for signature scoring, never a value.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::Bool(_) => Cell::Empty,
        }
    }
}

/// Compiled cell signature patterns. Built once per document scan and
/// passed down, so per-cell classification never recompiles a regex.
pub struct CellPatterns {
    identifier: Regex,
    monetary: Regex,
    national_id: Regex,
}

impl CellPatterns {
    pub fn new() -> Self {
        Self {
            identifier: Regex::new(r"^\d{1,6}-\d{1,3}$").unwrap(),
            monetary: Regex::new(r"^-?\d{1,3}(?:\.\d{3})*(?:,\d{1,2})?$").unwrap(),
            national_id: Regex::new(r"^\d{3}\.\d{3}\.\d{3}-\d{2}$").unwrap(),
        }
    }

    /// Registration id signature: `85-1`, `403-2`. Returns the canonical form.
    pub fn as_identifier(&self, cell: &Cell) -> Option<String> {
        let Cell::Text(s) = cell else { return None };
        let s = s.trim();
        if !self.identifier.is_match(s) {
            return None;
        }
        normalize_identifier(s)
    }

    /// Monetary signature. Numeric cells are taken as-is; text cells must be
    /// pt-BR money-shaped and must not look like a national ID. Plain
    /// dot-decimal text is rejected rather than guessed at.
    pub fn as_monetary(&self, cell: &Cell) -> Option<Money> {
        match cell {
            Cell::Number(n) if n.is_finite() => Some(round_money(*n)),
            Cell::Text(s) => {
                let s = s.trim();
                if self.looks_national_id(cell) {
                    return None;
                }
                if !self.monetary.is_match(s) {
                    return None;
                }
                parse_brl(s)
            }
            _ => None,
        }
    }

    /// National-ID signature: formatted `XXX.XXX.XXX-XX` text, or a bare
    /// 11-digit string.
    pub fn looks_national_id(&self, cell: &Cell) -> bool {
        let Cell::Text(s) = cell else { return false };
        let s = s.trim();
        self.national_id.is_match(s)
            || (s.len() == 11 && s.bytes().all(|b| b.is_ascii_digit()))
    }
}

impl Default for CellPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Short numeric event-code signature: `2`, `015`, `135`.
pub fn cell_looks_event(cell: &Cell) -> Option<String> {
    let s = match cell {
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && *n >= 0.0 && *n < 1000.0 => {
            format!("{}", *n as u32)
        }
        _ => return None,
    };
    if !s.is_empty() && s.len() <= 3 && s.bytes().all(|b| b.is_ascii_digit()) {
        Some(s)
    } else {
        None
    }
}

/// Name-like signature: at least 5 chars, letters and spaces only,
/// containing at least one space.
pub fn cell_looks_name(cell: &Cell) -> bool {
    let Cell::Text(s) = cell else { return false };
    let s = s.trim();
    s.chars().count() >= 5
        && s.contains(' ')
        && s.chars().all(|c| c.is_alphabetic() || c.is_whitespace())
}

/// Extract a cleaned name from a cell, for row population (looser minimum
/// than the column signature).
pub fn cell_as_name(cell: &Cell) -> Option<String> {
    let Cell::Text(s) = cell else { return None };
    let s = s.trim();
    if s.chars().count() >= 3 && s.chars().all(|c| c.is_alphabetic() || c.is_whitespace()) {
        Some(s.to_string())
    } else {
        None
    }
}

/// Extract a formatted national ID from a cell, re-formatting bare digits.
pub fn cell_as_national_id(cell: &Cell) -> Option<String> {
    let Cell::Text(s) = cell else { return None };
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 11 {
        return None;
    }
    Some(format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_signature() {
        let p = CellPatterns::new();
        assert_eq!(p.as_identifier(&Cell::text("85-1")).as_deref(), Some("85-1"));
        assert_eq!(p.as_identifier(&Cell::text(" 403-2 ")).as_deref(), Some("403-2"));
        assert_eq!(p.as_identifier(&Cell::text("085-01")).as_deref(), Some("85-1"));
        assert_eq!(p.as_identifier(&Cell::text("85")), None);
        assert_eq!(p.as_identifier(&Cell::text("000.281.393-99")), None);
        assert_eq!(p.as_identifier(&Cell::Number(85.0)), None);
    }

    #[test]
    fn monetary_signature() {
        let p = CellPatterns::new();
        assert_eq!(p.as_monetary(&Cell::Number(400.49)), Some(400.49));
        assert_eq!(p.as_monetary(&Cell::text("1.234,56")), Some(1234.56));
        assert_eq!(p.as_monetary(&Cell::text("0,00")), Some(0.0));
        assert_eq!(p.as_monetary(&Cell::text("not money")), None);
        assert_eq!(p.as_monetary(&Cell::Empty), None);
    }

    #[test]
    fn monetary_signature_rejects_national_ids() {
        let p = CellPatterns::new();
        assert_eq!(p.as_monetary(&Cell::text("000.281.393-99")), None);
        assert_eq!(p.as_monetary(&Cell::text("00028139399")), None);
    }

    #[test]
    fn national_id_signature() {
        let p = CellPatterns::new();
        assert!(p.looks_national_id(&Cell::text("000.281.393-99")));
        assert!(p.looks_national_id(&Cell::text("00028139399")));
        assert!(!p.looks_national_id(&Cell::text("85-1")));
        assert!(!p.looks_national_id(&Cell::Number(281.0)));
    }

    #[test]
    fn one_patterns_instance_classifies_many_cells() {
        // A single compiled instance serves a whole grid scan.
        let p = CellPatterns::new();
        for i in 0..100 {
            let cell = Cell::text(format!("{}-1", i + 1));
            assert!(p.as_identifier(&cell).is_some());
            assert!(p.as_monetary(&cell).is_none());
        }
    }

    #[test]
    fn event_signature() {
        assert_eq!(cell_looks_event(&Cell::text("002")).as_deref(), Some("002"));
        assert_eq!(cell_looks_event(&Cell::text("15")).as_deref(), Some("15"));
        assert_eq!(cell_looks_event(&Cell::Number(135.0)).as_deref(), Some("135"));
        assert_eq!(cell_looks_event(&Cell::text("1234")), None);
        assert_eq!(cell_looks_event(&Cell::Number(13.5)), None);
    }

    #[test]
    fn name_signature() {
        assert!(cell_looks_name(&Cell::text("MARIA WILLANA")));
        assert!(cell_looks_name(&Cell::text("JOSÉ DA SILVA")));
        assert!(!cell_looks_name(&Cell::text("MARIA"))); // no space
        assert!(!cell_looks_name(&Cell::text("AB C"))); // too short
        assert!(!cell_looks_name(&Cell::text("85-1 MARIA")));
    }

    #[test]
    fn national_id_reformatting() {
        assert_eq!(
            cell_as_national_id(&Cell::text("00028139399")).as_deref(),
            Some("000.281.393-99")
        );
        assert_eq!(
            cell_as_national_id(&Cell::text("000.281.393-99")).as_deref(),
            Some("000.281.393-99")
        );
        assert_eq!(cell_as_national_id(&Cell::text("123")), None);
    }
}
