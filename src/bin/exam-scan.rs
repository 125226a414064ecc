//! CLI binary for edgequake-exam-scan.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ScanConfig` and prints the result as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_exam_scan::pipeline::reindex::plan_chunks;
use edgequake_exam_scan::scan::session_from_paths;
use edgequake_exam_scan::{
    scan, scan_to_file, ProgressCallback, ScanConfig, ScanProgressCallback, ScanStats, ScanStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting chunks, whose message shows
/// the current pipeline status.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_scan_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total_chunks: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:32.green/238}] {pos:>2}/{len} batches  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Scanning");
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, total_pages: usize, total_chunks: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Scanning {total_pages} pages in {total_chunks} batches…"
            ))
        ));
    }

    fn on_status(&self, status: &ScanStatus) {
        self.bar.set_message(status.to_string());
    }

    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, question_count: usize) {
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {}",
            green("✓"),
            chunk,
            total_chunks,
            dim(&format!("{question_count} questions")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {}",
            red("✗"),
            chunk,
            total_chunks,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_scan_complete(&self, total_chunks: usize, failed_chunks: usize) {
        self.bar.finish_and_clear();
        if failed_chunks == 0 {
            eprintln!(
                "{} {} batches read successfully",
                green("✔"),
                bold(&total_chunks.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} batches read  ({} failed)",
                if failed_chunks == total_chunks {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&(total_chunks - failed_chunks).to_string()),
                total_chunks,
                red(&failed_chunks.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan three photographed pages, JSON to stdout
  exam-scan page1.jpg page2.jpg page3.jpg

  # Write the result to a file
  exam-scan scans/*.jpg -o paper.json

  # Show how pages will be batched, without calling the model
  exam-scan --list-only scans/*.jpg

  # Keep diagrams flagged instead of cropping them
  exam-scan --no-crop scans/*.jpg

  # Use another vision provider through edgequake-llm
  exam-scan --provider openai --model gpt-4.1-mini scans/*.jpg

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default transcription backend)
  GOOGLE_API_KEY          Fallback for GEMINI_API_KEY
  OPENAI_API_KEY          OpenAI API key (with --provider openai)
  ANTHROPIC_API_KEY       Anthropic API key (with --provider anthropic)
  EDGEQUAKE_LLM_PROVIDER  Provider to use when no Gemini key is set
  EXAM_SCAN_MODEL         Model ID for --model
  EDGEQUAKE_MODEL         Model ID paired with EDGEQUAKE_LLM_PROVIDER
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Transcribe photographed exam pages into structured questions.
#[derive(Parser, Debug)]
#[command(
    name = "exam-scan",
    version,
    about = "Transcribe photographed exam pages into structured questions",
    long_about = "Read photographed or scanned exam pages with a vision model and emit \
structured JSON: sections, numbered questions, marks, MCQ options, and cropped diagrams. \
Pages are sent three at a time with a pause between batches to respect rate limits.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page images, in reading order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "EXAM_SCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// Model ID (default: gemini-2.0-flash).
    #[arg(long, env = "EXAM_SCAN_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini REST base URL.
    #[arg(long, env = "EXAM_SCAN_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Pages per request.
    #[arg(long, env = "EXAM_SCAN_CHUNK_SIZE", default_value_t = 3)]
    chunk_size: usize,

    /// Pause between requests, in milliseconds.
    #[arg(long, env = "EXAM_SCAN_CHUNK_DELAY_MS", default_value_t = 2500)]
    chunk_delay_ms: u64,

    /// Maximum width of images sent to the model.
    #[arg(long, env = "EXAM_SCAN_MAX_WIDTH", default_value_t = 800)]
    max_width: u32,

    /// JPEG quality of images sent to the model (1–100).
    #[arg(long, env = "EXAM_SCAN_JPEG_QUALITY", default_value_t = 70,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Path to a text file containing a custom transcription prompt.
    #[arg(long, env = "EXAM_SCAN_PROMPT")]
    prompt: Option<PathBuf>,

    /// Max output tokens per request.
    #[arg(long, env = "EXAM_SCAN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Sampling temperature.
    #[arg(long, env = "EXAM_SCAN_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "EXAM_SCAN_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Leave flagged diagrams uncropped.
    #[arg(long, env = "EXAM_SCAN_NO_CROP")]
    no_crop: bool,

    /// Directory for cropped diagrams.
    #[arg(long, env = "EXAM_SCAN_DIAGRAM_DIR")]
    diagram_dir: Option<PathBuf>,

    /// Crop padding as a fraction of the image size.
    #[arg(long, env = "EXAM_SCAN_PADDING", default_value_t = 0.05)]
    padding: f64,

    /// Minimum crop padding in pixels.
    #[arg(long, env = "EXAM_SCAN_MIN_PADDING_PX", default_value_t = 50)]
    min_padding_px: u32,

    /// Print the batch plan and exit without calling the model.
    #[arg(long)]
    list_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "EXAM_SCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXAM_SCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EXAM_SCAN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.list_only;
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

    let session = session_from_paths(cli.images.as_slice()).context("Cannot read input pages")?;

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list_only {
        let plan = plan_chunks(session.len(), cli.chunk_size.max(1));
        println!("{} pages → {} batches", session.len(), plan.len());
        for span in &plan {
            let (first, last) = span.display_range();
            println!("  batch {:>2}: pages {}-{}", span.index + 1, first, last);
            for page in span.pages(session.pages()) {
                println!("    {}", page.source().display());
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run scan ─────────────────────────────────────────────────────────
    let stats = if let Some(ref output_path) = cli.output {
        let stats = scan_to_file(cli.images.as_slice(), output_path, &config)
            .await
            .context("Scan failed")?;
        if !cli.quiet {
            eprintln!("   →  {}", bold(&output_path.display().to_string()));
        }
        stats
    } else {
        let output = scan(&session, &config).await.context("Scan failed")?;
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        for (first, last) in output.failed_ranges() {
            if !cli.quiet {
                eprintln!("{} rescan pages {first}-{last}", cyan("⚠"));
            }
        }
        output.stats
    };

    if !cli.quiet {
        print_summary(&stats);
    }
    Ok(())
}

fn print_summary(stats: &ScanStats) {
    eprintln!(
        "   {} questions in {} sections  —  {}/{} diagrams cropped  —  {}ms total",
        bold(&stats.total_questions.to_string()),
        stats.total_sections,
        stats.diagrams_cropped,
        stats.diagrams_flagged,
        stats.total_duration_ms,
    );
    if stats.failed_chunks > 0 {
        eprintln!(
            "   {}",
            red(&format!("{} batches failed and need rescanning", stats.failed_chunks))
        );
    }
}

/// Map CLI args to `ScanConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder()
        .chunk_size(cli.chunk_size)
        .chunk_delay_ms(cli.chunk_delay_ms)
        .max_image_width(cli.max_width)
        .jpeg_quality(cli.jpeg_quality)
        .max_output_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .crop_diagrams(!cli.no_crop)
        .diagram_padding_fraction(cli.padding)
        .diagram_min_padding_px(cli.min_padding_px);

    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.api_base_url {
        builder = builder.api_base_url(url);
    }
    if let Some(ref dir) = cli.diagram_dir {
        builder = builder.diagram_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
