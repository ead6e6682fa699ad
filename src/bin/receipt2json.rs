//! CLI binary for edgequake-receipt.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, drives `ReceiptService`, and prints records.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use edgequake_receipt::{
    PipelineConfig, PipelineObserver, ProcessingStatus, ReceiptRecord, ReceiptService, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner that names the running stage.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Receipt");
        bar.set_message("Storing upload…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage_start(&self, _id: Uuid, stage: Stage) {
        let msg = match stage {
            Stage::Ocr => "Reading text (OCR)…",
            Stage::Parsing => "Extracting fields (LLM)…",
        };
        self.bar.set_message(msg);
    }

    fn on_stage_complete(&self, _id: Uuid, stage: Stage, output_len: usize) {
        let line = match stage {
            Stage::Ocr => format!("{} OCR done {}", green("✓"), dim(&format!("({output_len} bytes)"))),
            Stage::Parsing => format!("{} Parsed {}", green("✓"), dim(&format!("({output_len} items)"))),
        };
        self.bar.println(line);
    }

    fn on_completed(&self, _id: Uuid) {
        self.bar.finish_and_clear();
    }

    fn on_failed(&self, _id: Uuid, reason: &str) {
        self.bar.println(format!("{} {}", red("✗"), reason));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload and process a photo
  receipt2json --owner me@example.com upload lunch.jpg

  # Multi-page PDF, printed as JSON
  receipt2json --owner me@example.com --json upload statement.pdf

  # Re-run the pipeline for a FAILED receipt
  receipt2json process 6f1c2a9e-4b0e-4f5e-9a43-0d7f3c2b1e88

  # List my receipts, newest first
  receipt2json --owner me@example.com list

  # Just OCR a file, nothing stored
  receipt2json ocr lunch.jpg

PROVIDERS:
  OCR      tesseract (needs --features tesseract), vision (any edgequake-llm vision model)
  LLM      openrouter (OPENROUTER_API_KEY), edgequake (OPENAI_API_KEY, ANTHROPIC_API_KEY, …)

  An unavailable provider falls back to the next available one.

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      OpenRouter API key
  OPENROUTER_MODEL        OpenRouter model ID (default openai/gpt-4o-mini)
  EDGEQUAKE_LLM_PROVIDER  edgequake-llm provider override (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         edgequake-llm model override
  TESSDATA_PREFIX         Tesseract language data directory
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract structured expense data from receipt images and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2json",
    version,
    about = "Extract structured expense data from receipt images and PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Owner of uploaded / listed receipts (usually an e-mail address).
    #[arg(long, global = true, env = "RECEIPT_OWNER")]
    owner: Option<String>,

    /// Directory for stored uploads and records.
    #[arg(long, global = true, env = "RECEIPT_STORAGE_DIR", default_value = "upload-dir")]
    storage_dir: PathBuf,

    /// OCR provider tried first: tesseract or vision.
    #[arg(long, global = true, env = "RECEIPT_OCR_PROVIDER", default_value = "tesseract")]
    ocr_provider: String,

    /// Text-generation provider tried first: openrouter or edgequake.
    #[arg(long, global = true, env = "RECEIPT_LLM_PROVIDER", default_value = "openrouter")]
    llm_provider: String,

    /// OpenRouter API key.
    #[arg(long, global = true, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenRouter model ID.
    #[arg(long, global = true, env = "OPENROUTER_MODEL", default_value = "openai/gpt-4o-mini")]
    model: String,

    /// Tesseract language data directory.
    #[arg(long, global = true, env = "TESSDATA_PREFIX")]
    tessdata: Option<PathBuf>,

    /// Tesseract language(s), e.g. eng or eng+hin.
    #[arg(long, global = true, env = "RECEIPT_OCR_LANG", default_value = "eng")]
    lang: String,

    /// PDF rendering DPI (72–600).
    #[arg(long, global = true, env = "RECEIPT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Directory containing libpdfium.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// LLM request timeout in seconds.
    #[arg(long, global = true, env = "RECEIPT_API_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Print records as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only, no spinner.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a receipt file and process it.
    Upload {
        file: PathBuf,
        /// Override the sniffed content type (image/jpeg, image/png, application/pdf).
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Re-run the pipeline for a stored receipt.
    Process { id: Uuid },
    /// Print one receipt.
    Show { id: Uuid },
    /// List the owner's receipts, newest first.
    List,
    /// OCR a file and print the text; nothing is stored.
    Ocr { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers INFO-level progress, so library logs stay quiet
    // unless -v is given.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || !cli.json {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    match &cli.command {
        Command::Upload { file, content_type } => {
            let owner = require_owner(&cli)?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("receipt")
                .to_string();

            let mut service = ReceiptService::from_config(&config);
            if !cli.quiet && !cli.json {
                service = service.with_observer(CliObserver::new());
            }
            let record = service
                .upload(owner, &bytes, &file_name, content_type.as_deref())
                .await?;
            print_record(&record, cli.json)?;
            exit_on_failure(&record);
        }
        Command::Process { id } => {
            let mut service = ReceiptService::from_config(&config);
            if !cli.quiet && !cli.json {
                service = service.with_observer(CliObserver::new());
            }
            let record = service.process(*id).await?;
            print_record(&record, cli.json)?;
            exit_on_failure(&record);
        }
        Command::Show { id } => {
            let record = ReceiptService::from_config(&config).get(*id).await?;
            print_record(&record, cli.json)?;
        }
        Command::List => {
            let owner = require_owner(&cli)?;
            let records = ReceiptService::from_config(&config)
                .list_for_owner(owner)
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                eprintln!("{}", dim("No receipts."));
            } else {
                for r in &records {
                    println!(
                        "{}  {:<10}  {:<24}  {:>10} {}  {}",
                        r.id,
                        r.status().to_string(),
                        r.merchant_name,
                        r.total_amount,
                        r.currency,
                        r.receipt_date
                    );
                }
            }
        }
        Command::Ocr { file } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let Some(content_type) = edgequake_receipt::pipeline::input::sniff_content_type(&bytes)
            else {
                bail!("{} is not a JPEG, PNG or PDF file", file.display());
            };
            let text = ReceiptService::from_config(&config)
                .extract_text(&bytes, content_type)
                .await?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .default_ocr_provider(&cli.ocr_provider)
        .default_llm_provider(&cli.llm_provider)
        .llm_model(&cli.model)
        .ocr_language(&cli.lang)
        .pdf_dpi(cli.dpi)
        .request_timeout_secs(cli.timeout)
        .storage_dir(&cli.storage_dir);
    if let Some(key) = &cli.api_key {
        builder = builder.llm_api_key(key);
    }
    if let Some(path) = &cli.tessdata {
        builder = builder.tessdata_path(path);
    }
    if let Some(path) = &cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path);
    }
    builder.build().context("Invalid configuration")
}

fn require_owner(cli: &Cli) -> Result<&str> {
    match cli.owner.as_deref().map(str::trim) {
        Some(owner) if !owner.is_empty() => Ok(owner),
        _ => bail!("--owner (or RECEIPT_OWNER) is required for this command"),
    }
}

fn print_record(record: &ReceiptRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    let status = match record.status() {
        ProcessingStatus::Completed => green("COMPLETED"),
        ProcessingStatus::Failed => red("FAILED"),
        other => bold(&other.to_string()),
    };
    println!("{}  {}", bold(&record.id.to_string()), status);
    if let Some(reason) = record.failure_reason() {
        println!("  reason    {}", reason);
    }
    println!("  merchant  {}", record.merchant_name);
    println!("  date      {}", record.receipt_date);
    println!("  total     {} {}", record.total_amount, record.currency);
    if let Some(tax) = record.tax_amount {
        println!("  tax       {} {}", tax, record.currency);
    }
    for item in &record.items {
        let price = item
            .unit_price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} × {}  {}", item.quantity, item.item_name, dim(&price));
    }
    Ok(())
}

fn exit_on_failure(record: &ReceiptRecord) {
    if record.status() == ProcessingStatus::Failed {
        std::process::exit(2);
    }
}
