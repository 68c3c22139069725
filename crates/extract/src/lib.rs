//! `conciliar-extract` — Multi-format record extraction and normalization.
//!
//! A family of extractors, one per raw document shape, that all converge on
//! [`conciliar_core::NormalizedRow`] plus a diagnostics trail:
//!
//! - [`bank`] — fixed-width bank TXT (byte-offset field layout)
//! - [`report`] — delimited municipality report with event sections
//! - [`sheet`] — arbitrary 2-D spreadsheet grid, columns inferred
//! - [`text`] — loosely structured text extracted from documents
//!
//! A failed parse of one line/row never aborts a file; every condition is
//! recorded as a diagnostic and the scan continues to completion.

pub mod bank;
pub mod brl;
pub mod error;
pub mod report;
pub mod sheet;
pub mod text;

pub use error::ExtractError;
