//! `conciliar-core` — Shared domain model for bank × municipality
//! payroll-deduction reconciliation.
//!
//! Pure types crate: normalized rows, the diagnostics ledger, and the
//! reconciliation result shape. No IO dependencies.

pub mod cancel;
pub mod diag;
pub mod model;
pub mod recon;

pub use cancel::CancelFlag;
pub use diag::{DiagnosticsItem, Severity};
pub use model::{
    normalize_identifier, round_money, Confidence, Money, NormalizedRow, RawRef, RowMeta,
    RowSource,
};
pub use recon::{
    ExtractionQuality, ReconciliationItem, ReconciliationResult, ReconciliationStatus,
    ReconciliationSummary, StatusCounts,
};
