//! pt-BR monetary text parsing (`.` thousands separator, `,` decimal).

use conciliar_core::{round_money, Money};

/// Parse a pt-BR formatted monetary string: `"1.234,56"`, `400,49`, `"0,00"`.
///
/// Surrounding single or double quotes are stripped, thousands dots removed,
/// the decimal comma swapped for a dot, and the result rounded to cents.
/// Returns `None` for empty/whitespace-only or non-numeric input; never
/// fails any other way.
pub fn parse_brl(input: &str) -> Option<Money> {
    let cleaned = input
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');

    if cleaned.is_empty() {
        return None;
    }

    let normalized = cleaned.replace('.', "").replace(',', ".");
    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(round_money(value))
}
