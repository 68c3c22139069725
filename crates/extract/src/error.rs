use std::fmt;

/// Hard failures of an extraction call.
///
/// Everything recoverable (bad lines, unparseable cells, missing columns)
/// is reported through the diagnostics trail instead; only conditions that
/// make the whole call meaningless surface here.
#[derive(Debug)]
pub enum ExtractError {
    /// File could not be read.
    Io(String),
    /// Workbook could not be opened or a sheet could not be read.
    Workbook(String),
    /// The caller's cancel flag was set mid-scan.
    Cancelled,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Workbook(msg) => write!(f, "workbook error: {msg}"),
            Self::Cancelled => write!(f, "extraction cancelled"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
