//! CLI exit code registry.
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! | Code | Meaning                                        |
//! |------|------------------------------------------------|
//! | 0    | Success                                        |
//! | 1    | Runtime error (decode, workbook, cancelled)    |
//! | 2    | Usage error (bad arguments)                    |
//! | 3    | I/O error (missing or unreadable file)         |
//! | 4    | Extraction verdict `falhou` (no usable rows)   |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Runtime error - decode failure, unreadable workbook, cancellation.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// I/O error - file missing, unreadable, or unwritable.
pub const EXIT_IO: u8 = 3;

/// Extraction failed - the document produced no usable rows.
pub const EXIT_EXTRACTION_FAILED: u8 = 4;
