// conciliar CLI - payroll deduction extraction from bank and municipality files

mod exit_codes;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use conciliar_core::{
    CancelFlag, Confidence, DiagnosticsItem, ExtractionQuality, NormalizedRow, RowSource, Severity,
};
use conciliar_extract::{bank, report, sheet, text, ExtractError};

use exit_codes::{EXIT_ERROR, EXIT_EXTRACTION_FAILED, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "conciliar")]
#[command(about = "Extract normalized payroll deduction rows from bank and municipality files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a fixed-width bank return TXT
    #[command(after_help = "\
Examples:
  conciliar bank retorno.txt
  conciliar bank retorno.txt --json
  conciliar bank retorno.txt --csv rows.csv
  conciliar bank retorno.txt --json --output result.json")]
    Bank {
        /// Bank return file (fixed-width TXT)
        file: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },

    /// Parse a delimited municipality "workers by event" report
    #[command(after_help = "\
Examples:
  conciliar report relatorio.csv
  conciliar report relatorio.csv --json --output result.json")]
    Report {
        /// Municipality report file (CSV-shaped text)
        file: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },

    /// Parse a municipality spreadsheet (xlsx, xls, xlsb, ods)
    #[command(after_help = "\
Examples:
  conciliar sheet folha.xlsx
  conciliar sheet folha.xlsx --csv rows.csv")]
    Sheet {
        /// Spreadsheet file
        file: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },

    /// Parse free-form report text (e.g. extracted from a PDF)
    #[command(after_help = "\
Examples:
  conciliar text relatorio.txt
  conciliar text relatorio.txt --json")]
    Text {
        /// Plain-text report file
        file: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },

    /// Extract both sides in one pass (no matching is performed)
    #[command(after_help = "\
The municipality format is chosen by extension: xlsx/xls/xlsb/ods use the
spreadsheet extractor, csv uses the delimited-report extractor, anything
else is treated as free-form text.

Examples:
  conciliar run retorno.txt relatorio.csv
  conciliar run retorno.txt folha.xlsx --json --output both.json")]
    Run {
        /// Bank return file (fixed-width TXT)
        bank: PathBuf,

        /// Municipality file (spreadsheet, CSV report, or plain text)
        municipality: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },
}

#[derive(Args)]
struct OutputOpts {
    /// Output JSON to stdout instead of human summary
    #[arg(long)]
    json: bool,

    /// Write JSON output to file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Export normalized rows as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cancel = CancelFlag::new();

    let result = match cli.command {
        Commands::Bank { file, opts } => cmd_bank(&file, &opts, &cancel),
        Commands::Report { file, opts } => cmd_report(&file, &opts, &cancel),
        Commands::Sheet { file, opts } => cmd_sheet(&file, &opts, &cancel),
        Commands::Text { file, opts } => cmd_text(&file, &opts, &cancel),
        Commands::Run { bank, municipality, opts } => {
            cmd_run(&bank, &municipality, &opts, &cancel)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {message}");
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    fn extraction(msg: impl Into<String>) -> Self {
        Self { code: EXIT_EXTRACTION_FAILED, message: msg.into(), hint: None }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn map_extract_err(err: ExtractError) -> CliError {
    match err {
        ExtractError::Io(msg) => CliError::io(msg),
        ExtractError::Workbook(msg) => CliError::runtime(msg),
        ExtractError::Cancelled => CliError::runtime("operation cancelled"),
    }
}

// ============================================================================
// Output envelope
// ============================================================================

#[derive(Serialize)]
struct Meta {
    tool: &'static str,
    version: &'static str,
    run_at: String,
}

impl Meta {
    fn now() -> Self {
        Self {
            tool: "conciliar",
            version: env!("CARGO_PKG_VERSION"),
            run_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct Extraction {
    format: &'static str,
    competence: Option<String>,
    quality: ExtractionQuality,
    row_count: usize,
    rows: Vec<NormalizedRow>,
    diagnostics: Vec<DiagnosticsItem>,
}

impl Extraction {
    fn new(
        format: &'static str,
        rows: Vec<NormalizedRow>,
        diagnostics: Vec<DiagnosticsItem>,
        competence: Option<String>,
        quality: Option<ExtractionQuality>,
    ) -> Self {
        // Extractors without a graded verdict get the binary one.
        let quality = quality.unwrap_or(if rows.is_empty() {
            ExtractionQuality::Falhou
        } else {
            ExtractionQuality::Completa
        });
        Self {
            format,
            competence,
            quality,
            row_count: rows.len(),
            rows,
            diagnostics,
        }
    }
}

#[derive(Serialize)]
struct SingleReport {
    meta: Meta,
    #[serde(flatten)]
    extraction: Extraction,
}

#[derive(Serialize)]
struct CombinedReport {
    meta: Meta,
    bank: Extraction,
    municipality: Extraction,
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_bank(file: &Path, opts: &OutputOpts, cancel: &CancelFlag) -> Result<(), CliError> {
    validate_opts(opts)?;
    let extraction = extract_bank(file, cancel)?;
    emit_single(extraction, "bank", opts)
}

fn cmd_report(file: &Path, opts: &OutputOpts, cancel: &CancelFlag) -> Result<(), CliError> {
    validate_opts(opts)?;
    let text = read_text_file(file)?;
    let result = report::extract(&text, cancel).map_err(map_extract_err)?;
    let extraction = Extraction::new(
        "prefeitura_csv_v1",
        result.rows,
        result.diagnostics,
        result.competence,
        None,
    );
    emit_single(extraction, "report", opts)
}

fn cmd_sheet(file: &Path, opts: &OutputOpts, cancel: &CancelFlag) -> Result<(), CliError> {
    validate_opts(opts)?;
    let extraction = extract_sheet(file, cancel)?;
    emit_single(extraction, "sheet", opts)
}

fn cmd_text(file: &Path, opts: &OutputOpts, cancel: &CancelFlag) -> Result<(), CliError> {
    validate_opts(opts)?;
    let extraction = extract_text(file, cancel)?;
    emit_single(extraction, "text", opts)
}

fn cmd_run(
    bank_file: &Path,
    municipality_file: &Path,
    opts: &OutputOpts,
    cancel: &CancelFlag,
) -> Result<(), CliError> {
    validate_opts(opts)?;

    let bank = extract_bank(bank_file, cancel)?;
    let municipality = extract_municipality(municipality_file, cancel)?;

    let failed = bank.quality == ExtractionQuality::Falhou
        || municipality.quality == ExtractionQuality::Falhou;

    let report = CombinedReport { meta: Meta::now(), bank, municipality };
    write_json_output(&report, opts)?;
    if let Some(path) = &opts.csv {
        let rows: Vec<&NormalizedRow> = report
            .bank
            .rows
            .iter()
            .chain(report.municipality.rows.iter())
            .collect();
        write_rows_csv(path, &rows)?;
        eprintln!("wrote {}", path.display());
    }

    if opts.json {
        print_json(&report)?;
    } else {
        print_summary("bank", &report.bank);
        print_summary("municipality", &report.municipality);
    }

    if failed {
        return Err(CliError::extraction("one side produced no usable rows"));
    }
    Ok(())
}

// ============================================================================
// Extraction wrappers
// ============================================================================

fn extract_bank(file: &Path, cancel: &CancelFlag) -> Result<Extraction, CliError> {
    let result = bank::parse_file(file, cancel).map_err(map_extract_err)?;
    Ok(Extraction::new(
        "bank_fixed_width",
        result.rows,
        result.diagnostics,
        result.competence,
        None,
    ))
}

fn extract_sheet(file: &Path, cancel: &CancelFlag) -> Result<Extraction, CliError> {
    let result = sheet::extract_file(file, cancel).map_err(map_extract_err)?;
    Ok(Extraction::new(
        "xlsx",
        result.rows,
        result.diagnostics,
        result.competence,
        Some(result.quality),
    ))
}

fn extract_text(file: &Path, cancel: &CancelFlag) -> Result<Extraction, CliError> {
    let raw = read_text_file(file)?;
    let result = text::extract(&raw, cancel).map_err(map_extract_err)?;
    Ok(Extraction::new(
        "text",
        result.rows,
        result.diagnostics,
        result.competence,
        None,
    ))
}

/// Dispatch the municipality side by file extension.
fn extract_municipality(file: &Path, cancel: &CancelFlag) -> Result<Extraction, CliError> {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("xlsx") | Some("xls") | Some("xlsb") | Some("ods") => extract_sheet(file, cancel),
        Some("csv") => {
            let text = read_text_file(file)?;
            let result = report::extract(&text, cancel).map_err(map_extract_err)?;
            Ok(Extraction::new(
                "prefeitura_csv_v1",
                result.rows,
                result.diagnostics,
                result.competence,
                None,
            ))
        }
        _ => extract_text(file, cancel),
    }
}

/// Read a file as text: UTF-8, with a Windows-1252 re-decode when the bytes
/// are not valid UTF-8 (legacy municipal exports are Latin-1 encoded).
fn read_text_file(path: &Path) -> Result<String, CliError> {
    let bytes = std::fs::read(path)
        .map_err(|e| CliError::io(format!("{}: {e}", path.display())))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn validate_opts(opts: &OutputOpts) -> Result<(), CliError> {
    if let (Some(output), Some(csv)) = (&opts.output, &opts.csv) {
        if output == csv {
            return Err(CliError::args("--output and --csv point at the same file")
                .with_hint("use distinct paths for the JSON envelope and the CSV export"));
        }
    }
    Ok(())
}

fn emit_single(extraction: Extraction, label: &str, opts: &OutputOpts) -> Result<(), CliError> {
    let failed = extraction.quality == ExtractionQuality::Falhou;
    let report = SingleReport { meta: Meta::now(), extraction };

    write_json_output(&report, opts)?;
    if let Some(path) = &opts.csv {
        let rows: Vec<&NormalizedRow> = report.extraction.rows.iter().collect();
        write_rows_csv(path, &rows)?;
        eprintln!("wrote {}", path.display());
    }

    if opts.json {
        print_json(&report)?;
    } else {
        print_summary(label, &report.extraction);
    }

    if failed {
        return Err(CliError::extraction("extraction produced no usable rows"));
    }
    Ok(())
}

fn write_json_output(report: &impl Serialize, opts: &OutputOpts) -> Result<(), CliError> {
    if let Some(path) = &opts.output {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| CliError::io(format!("{}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn print_json(report: &impl Serialize) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Human summary to stderr, one block per side.
fn print_summary(label: &str, extraction: &Extraction) {
    let competence = extraction.competence.as_deref().unwrap_or("not detected");
    eprintln!(
        "{label}: {} rows, competence {competence}, quality {}",
        extraction.row_count, extraction.quality
    );
    let (info, warn, error) = severity_counts(&extraction.diagnostics);
    eprintln!("  diagnostics: {info} info, {warn} warn, {error} error");
    for diag in &extraction.diagnostics {
        if diag.severity != Severity::Info {
            eprintln!("  [{:?}] {}: {}", diag.severity, diag.code, diag.message);
        }
    }
}

fn severity_counts(diagnostics: &[DiagnosticsItem]) -> (usize, usize, usize) {
    let mut info = 0;
    let mut warn = 0;
    let mut error = 0;
    for diag in diagnostics {
        match diag.severity {
            Severity::Info => info += 1,
            Severity::Warn => warn += 1,
            Severity::Error => error += 1,
        }
    }
    (info, warn, error)
}

fn write_rows_csv(path: &Path, rows: &[&NormalizedRow]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| CliError::io(format!("{}: {e}", path.display())))?;

    writer
        .write_record([
            "source",
            "identifier",
            "value",
            "competence",
            "event",
            "confidence",
            "name",
            "national_id",
        ])
        .map_err(|e| CliError::io(e.to_string()))?;

    for row in rows {
        let meta = row.meta.as_ref();
        let value = format!("{:.2}", row.value);
        writer
            .write_record([
                source_str(row.source),
                row.identifier.as_str(),
                value.as_str(),
                meta.and_then(|m| m.competence.as_deref()).unwrap_or(""),
                meta.and_then(|m| m.event.as_deref()).unwrap_or(""),
                meta.and_then(|m| m.confidence)
                    .map(confidence_str)
                    .unwrap_or(""),
                row.name.as_deref().unwrap_or(""),
                row.national_id.as_deref().unwrap_or(""),
            ])
            .map_err(|e| CliError::io(e.to_string()))?;
    }

    writer.flush().map_err(|e| CliError::io(e.to_string()))
}

fn source_str(source: RowSource) -> &'static str {
    match source {
        RowSource::Bank => "bank",
        RowSource::Municipality => "municipality",
    }
}

fn confidence_str(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "high",
        Confidence::Medium => "medium",
        Confidence::Low => "low",
    }
}
