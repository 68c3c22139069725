//! Reconciliation result model.
//!
//! The matching algorithm itself lives outside this codebase; these types
//! define the shape its output must take so extractors and renderers agree.

use serde::{Deserialize, Serialize};

use crate::diag::DiagnosticsItem;
use crate::model::Money;

/// Whole-document extraction quality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionQuality {
    Completa,
    Parcial,
    Falhou,
}

impl std::fmt::Display for ExtractionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completa => write!(f, "completa"),
            Self::Parcial => write!(f, "parcial"),
            Self::Falhou => write!(f, "falhou"),
        }
    }
}

/// Per-identifier reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// Totals agree within tolerance.
    Bateu,
    SoNoBanco,
    SoNaPrefeitura,
    Divergente,
    /// Could not be processed; see the diagnostics trail.
    Diagnostico,
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bateu => write!(f, "bateu"),
            Self::SoNoBanco => write!(f, "so_no_banco"),
            Self::SoNaPrefeitura => write!(f, "so_na_prefeitura"),
            Self::Divergente => write!(f, "divergente"),
            Self::Diagnostico => write!(f, "diagnostico"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_total: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality_total: Option<Money>,
    pub status: ReconciliationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub bateu: usize,
    pub so_no_banco: usize,
    pub so_na_prefeitura: usize,
    pub divergente: usize,
    pub diagnostico: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competence: Option<String>,
    pub quality: ExtractionQuality,
    pub counts: StatusCounts,
    /// `bateu / total`, percent 0..=100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub summary: ReconciliationSummary,
    pub items: Vec<ReconciliationItem>,
    pub diagnostics: Vec<DiagnosticsItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_and_display_agree() {
        for (status, text) in [
            (ReconciliationStatus::Bateu, "bateu"),
            (ReconciliationStatus::SoNoBanco, "so_no_banco"),
            (ReconciliationStatus::SoNaPrefeitura, "so_na_prefeitura"),
            (ReconciliationStatus::Divergente, "divergente"),
            (ReconciliationStatus::Diagnostico, "diagnostico"),
        ] {
            assert_eq!(status.to_string(), text);
            assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{text}\""));
        }
    }

    #[test]
    fn quality_wire_form() {
        assert_eq!(
            serde_json::to_string(&ExtractionQuality::Falhou).unwrap(),
            r#""falhou""#
        );
    }
}
