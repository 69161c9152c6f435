//! CLI binary for invoice2sheets.
//!
//! `serve` runs the HTTP API; `extract` processes one local file and prints
//! the field maps, optionally appending them to the spreadsheet. Both map
//! their flags onto the library's config structs and nothing more.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use invoice2sheets::api::{self, AppState};
use invoice2sheets::{
    Document, DocumentProcessor, ExtractionProgressCallback, FieldMap, FieldQuery, FieldQuerySet,
    GoogleSheetsClient, PairingStrategy, ProcessingConfig, ProgressCallback, ServerConfig,
    ServiceAccountTokenProvider, SheetAppender, SheetsConfig, TextractClient,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar plus one log line per page. Pages may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Rendering");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_prefix("Extracting");
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, field_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{field_count} fields")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(error),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.abandon();
    }

    fn on_document_complete(&self, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} page(s) extracted",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API on port 8000
  invoice2sheets serve --bind 0.0.0.0:8000 \
      --spreadsheet-id 1AbC... --google-credentials secrets/service-account.json

  # Extract one invoice and print the field maps
  invoice2sheets extract nota-fiscal.pdf

  # Extract and append the rows to the spreadsheet
  invoice2sheets extract --append nota-fiscal.pdf --spreadsheet-id 1AbC... \
      --google-credentials secrets/service-account.json

  # Custom questions
  invoice2sheets extract --queries queries.json scan.png

HTTP ROUTES (serve):
  POST /detect-text      multipart field "file" → JSON array, one map per page
  POST /save-in-sheets   JSON array of maps → {"status":"success","updatedCells":n}
  GET  /health           {"status":"ok","version":"..."}

ENVIRONMENT VARIABLES:
  AWS_REGION / AWS_PROFILE / AWS_ACCESS_KEY_ID / ...
                         Analysis service region and credentials, resolved by
                         the default AWS chain (env, ~/.aws files, roles)
  PDFIUM_LIB_PATH        Path to libpdfium (else the system library path)
  RUST_LOG               Log filter, overrides --verbose / --quiet
  INVOICE2SHEETS_*       Every flag below has an env fallback
"#;

/// Extract invoice fields with query-based OCR and append them to a spreadsheet.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2sheets",
    version,
    about = "Extract invoice fields with query-based OCR and append them to a spreadsheet",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INVOICE2SHEETS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INVOICE2SHEETS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Extract fields from one local file.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "INVOICE2SHEETS_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "INVOICE2SHEETS_MAX_UPLOAD_BYTES", default_value_t = 25 * 1024 * 1024)]
    max_upload_bytes: usize,

    #[command(flatten)]
    processing: ProcessingArgs,

    #[command(flatten)]
    sheets: SheetsArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Invoice file: PDF, PNG, JPEG or TIFF.
    input: PathBuf,

    /// Content type of the input. Guessed from the extension when omitted.
    #[arg(long, env = "INVOICE2SHEETS_CONTENT_TYPE")]
    content_type: Option<String>,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "INVOICE2SHEETS_OUTPUT")]
    output: Option<PathBuf>,

    /// Append the extracted rows to the configured spreadsheet.
    #[arg(long, env = "INVOICE2SHEETS_APPEND")]
    append: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE2SHEETS_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    processing: ProcessingArgs,

    #[command(flatten)]
    sheets: SheetsArgs,
}

#[derive(Args, Debug)]
struct ProcessingArgs {
    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "INVOICE2SHEETS_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Number of pages analysed at once.
    #[arg(short, long, env = "INVOICE2SHEETS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-page analysis timeout in seconds.
    #[arg(long, env = "INVOICE2SHEETS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// How query blocks are paired with answers.
    #[arg(long, env = "INVOICE2SHEETS_PAIRING", value_enum, default_value = "positional")]
    pairing: PairingArg,

    /// JSON file with `[{"Text": ..., "Alias": ...}]` replacing the built-in invoice queries.
    #[arg(long, env = "INVOICE2SHEETS_QUERIES")]
    queries: Option<PathBuf>,

    /// Analysis service endpoint override (e.g. a VPC endpoint).
    #[arg(long, env = "INVOICE2SHEETS_TEXTRACT_ENDPOINT")]
    textract_endpoint: Option<String>,
}

#[derive(Args, Debug)]
struct SheetsArgs {
    /// Target spreadsheet ID.
    #[arg(long, env = "INVOICE2SHEETS_SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// A1 range the rows are appended after.
    #[arg(long, env = "INVOICE2SHEETS_SHEET_RANGE", default_value = "Sheet1!A1")]
    sheet_range: String,

    /// Service-account JSON key file.
    #[arg(long, env = "INVOICE2SHEETS_GOOGLE_CREDENTIALS")]
    google_credentials: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Debug)]
enum PairingArg {
    Positional,
    Relationship,
}

impl From<PairingArg> for PairingStrategy {
    fn from(v: PairingArg) -> Self {
        match v {
            PairingArg::Positional => PairingStrategy::Positional,
            PairingArg::Relationship => PairingStrategy::Relationship,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `extract` unless verbose.
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.quiet && !args.no_progress,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Extract(args) => extract(args, show_progress, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_processing_config(&args.processing, None).await?;
    let processor = build_processor(&args.processing, &config).await?;
    let appender = build_appender(&args.sheets)?;
    if appender.is_none() {
        info!("No spreadsheet configured; /save-in-sheets will answer 500");
    }

    let server = ServerConfig {
        bind: args.bind,
        max_upload_bytes: args.max_upload_bytes,
    };
    let app = api::router(AppState::new(processor, appender), &server);

    let listener = tokio::net::TcpListener::bind(server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", server.bind))?;
    info!("Listening on http://{}", server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn extract(args: ExtractArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let appender = if args.append {
        match build_appender(&args.sheets)? {
            Some(appender) => Some(appender),
            None => bail!("--append needs --spreadsheet-id and --google-credentials"),
        }
    } else {
        None
    };

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_processing_config(&args.processing, progress).await?;
    let processor = build_processor(&args.processing, &config).await?;

    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let content_type = args
        .content_type
        .clone()
        .or_else(|| guess_content_type(&args.input).map(str::to_string));
    let name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    let document = Document::new(bytes, content_type.as_deref(), name)?;

    let result = processor
        .process(document)
        .await
        .context("Extraction failed")?;

    let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
    match &args.output {
        Some(path) => tokio::fs::write(path, format!("{json}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    if let Some(appender) = appender {
        let rows: Vec<FieldMap> = result
            .into_pages()
            .into_iter()
            .map(|page| page.into_fields())
            .collect();
        let outcome = appender
            .append(&rows)
            .await
            .context("Spreadsheet append failed")?;
        if !quiet {
            eprintln!(
                "{} {} cells appended to {}",
                green("✔"),
                bold(&outcome.updated_cells.to_string()),
                outcome.updated_range.as_deref().unwrap_or(appender.range()),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
async fn build_processing_config(
    args: &ProcessingArgs,
    progress: Option<ProgressCallback>,
) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .dpi(args.dpi)
        .concurrency(args.concurrency)
        .api_timeout_secs(args.api_timeout)
        .pairing(args.pairing.clone().into());

    if let Some(ref path) = args.queries {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read queries from {}", path.display()))?;
        let queries: Vec<FieldQuery> = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid queries file {}", path.display()))?;
        builder = builder.queries(FieldQuerySet::new(queries).context("Invalid queries")?);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn build_processor(
    args: &ProcessingArgs,
    config: &ProcessingConfig,
) -> Result<DocumentProcessor> {
    let mut textract = TextractClient::from_env(Duration::from_secs(config.api_timeout_secs))
        .await
        .context("Analysis service is not configured")?;
    if let Some(ref endpoint) = args.textract_endpoint {
        textract = textract
            .with_endpoint(endpoint)
            .context("Invalid analysis endpoint")?;
    }
    info!(
        "Analysis service: textract ({}), {} queries, concurrency {}",
        textract.region(),
        config.queries.len(),
        config.concurrency
    );
    Ok(DocumentProcessor::new(Arc::new(textract), config))
}

/// `None` when no spreadsheet is configured at all.
fn build_appender(args: &SheetsArgs) -> Result<Option<SheetAppender>> {
    let (id, credentials) = match (&args.spreadsheet_id, &args.google_credentials) {
        (Some(id), Some(credentials)) => (id, credentials),
        (None, None) => return Ok(None),
        _ => bail!("--spreadsheet-id and --google-credentials must be given together"),
    };

    let config = SheetsConfig::new(id.clone(), credentials.clone()).with_range(&args.sheet_range);
    let tokens =
        ServiceAccountTokenProvider::from_file(&config.credentials_path, config.scopes.clone())
            .with_context(|| {
                format!(
                    "Failed to load service account from {}",
                    config.credentials_path.display()
                )
            })?;
    let client = GoogleSheetsClient::new(Arc::new(tokens), Duration::from_secs(30))
        .context("Failed to build spreadsheet client")?;

    Ok(Some(SheetAppender::from_config(Arc::new(client), &config)))
}

fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
