use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Monetary value in currency units, always rounded to 2 decimal places.
pub type Money = f64;

/// Round to cents. Every monetary value in a [`NormalizedRow`] goes through
/// this exactly once, at construction.
pub fn round_money(value: f64) -> Money {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Canonicalize a `"<base>-<suffix>"` registration key: both digit groups
/// are parsed as integers and re-joined, dropping leading zeros
/// (`"085-01"` → `"85-1"`). Returns `None` unless the input is exactly two
/// hyphen-separated digit groups.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let (base, suffix) = raw.trim().split_once('-')?;
    if base.is_empty()
        || suffix.is_empty()
        || !base.bytes().all(|b| b.is_ascii_digit())
        || !suffix.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let base: u64 = base.parse().ok()?;
    let suffix: u64 = suffix.parse().ok()?;
    Some(format!("{base}-{suffix}"))
}

// ---------------------------------------------------------------------------
// Normalized row
// ---------------------------------------------------------------------------

/// Which side of the reconciliation a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    Bank,
    Municipality,
}

/// How certain the extractor is that the row is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Optional per-row metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    /// Competence period, canonical `MM/YYYY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competence: Option<String>,
    /// Deduction event code (e.g. "002", "15").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// Worker name, when a text-path extractor found one inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Formatted national ID, when found inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
}

/// Provenance pointer back into the raw document. Audit only, never parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_no: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// One normalized payroll-deduction record from either side.
///
/// `identifier` is the canonical `"<base>-<suffix>"` registration key with
/// leading zeros dropped from both integers (`"000000008501"` → `"85-1"`).
/// Immutable once constructed; extractors only ever append finished rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub source: RowSource,
    pub identifier: String,
    pub value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RowMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_ref: Option<RawRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_money_to_cents() {
        assert_eq!(round_money(400.494999), 400.49);
        assert_eq!(round_money(400.495), 400.5);
        assert_eq!(round_money(0.0), 0.0);
        assert_eq!(round_money(40049.0 / 100.0), 400.49);
    }

    #[test]
    fn identifier_drops_leading_zeros() {
        assert_eq!(normalize_identifier("85-1").as_deref(), Some("85-1"));
        assert_eq!(normalize_identifier("085-01").as_deref(), Some("85-1"));
        assert_eq!(normalize_identifier(" 403-2 ").as_deref(), Some("403-2"));
    }

    #[test]
    fn identifier_rejects_malformed_input() {
        assert_eq!(normalize_identifier("85"), None);
        assert_eq!(normalize_identifier("85-"), None);
        assert_eq!(normalize_identifier("-1"), None);
        assert_eq!(normalize_identifier("85-1-2"), None);
        assert_eq!(normalize_identifier("8a-1"), None);
        assert_eq!(normalize_identifier(""), None);
    }

    #[test]
    fn row_serializes_without_empty_optionals() {
        let row = NormalizedRow {
            source: RowSource::Bank,
            identifier: "85-1".into(),
            value: 400.49,
            name: None,
            national_id: None,
            meta: None,
            raw_ref: None,
        };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"source":"bank","identifier":"85-1","value":400.49}"#);
    }
}
