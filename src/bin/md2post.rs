//! CLI binary for md2post.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use md2post::{
    convert, ConversionConfig, ConversionOutput, ConversionProgressCallback, ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over all copies and diagrams, with a
/// log line per finished item. Items finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-diagram wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading article…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

/// Keep long error messages on one terminal line.
fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, assets: usize, diagrams: usize) {
        self.activate_bar(assets + diagrams);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Copying {assets} asset(s), rendering {diagrams} diagram(s)…"))
        ));
    }

    fn on_asset_copied(&self, _reference: &str, link: &str) {
        self.bar.println(format!("  {} {}", green("✓"), dim(link)));
        self.bar.inc(1);
    }

    fn on_asset_error(&self, reference: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            reference,
            red(&truncate(error, 80))
        ));
        self.bar.inc(1);
    }

    fn on_diagram_start(&self, index: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(format!("diagram {index}"));
    }

    fn on_diagram_complete(&self, index: usize, total: usize) {
        self.bar.println(format!(
            "  {} Diagram {:>2}/{:<2}  {}",
            green("✓"),
            index + 1,
            total,
            self.elapsed(index)
        ));
        self.bar.inc(1);
    }

    fn on_diagram_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Diagram {:>2}/{:<2}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&truncate(error, 80)),
            self.elapsed(index)
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _diagrams_total: usize, _diagrams_rendered: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        if errors > 0 {
            eprintln!("{} {} item(s) failed", cyan("⚠"), red(&errors.to_string()));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Images referenced as /img/... live under ./static
  md2post static drafts/hello-world.md

  # Write somewhere other than ./posts
  md2post --output-dir site/content static drafts/hello-world.md

  # Render diagrams through a Kroki server instead of the Mermaid CLI
  md2post --kroki-url https://kroki.io static drafts/hello-world.md

  # Machine-readable report
  md2post --json static drafts/hello-world.md > report.json

OUTPUT:
  posts/<stem>.md                   converted article
  posts/assets/<stem>/<image>       copied images
  posts/assets/<stem>/diagram-N.png rendered diagrams

RENDERER SETUP:
  npm install -g @mermaid-js/mermaid-cli   provides `mmdc`

ENVIRONMENT VARIABLES:
  Every option can also be set as MD2POST_<OPTION>, e.g. MD2POST_OUTPUT_DIR.
  RUST_LOG overrides the log filter.
"#;

/// Convert a Markdown article into a publish-ready blog post.
#[derive(Parser, Debug)]
#[command(
    name = "md2post",
    version,
    about = "Convert a Markdown article into a publish-ready blog post",
    long_about = "Rewrite an article's YAML front matter into the post schema, copy every \
referenced image into a per-article assets folder and rasterize Mermaid diagrams to PNG.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory that absolute image paths (`/img/a.png`) are resolved against.
    images_root: PathBuf,

    /// Markdown file to convert.
    input: PathBuf,

    /// Directory receiving `<stem>.md` and the assets folder.
    #[arg(long, env = "MD2POST_OUTPUT_DIR", default_value = "posts")]
    output_dir: PathBuf,

    /// Name of the assets folder inside the output directory.
    #[arg(long, env = "MD2POST_ASSETS_DIR_NAME", default_value = "assets")]
    assets_dir_name: String,

    /// Code-fence language tag marking a diagram block.
    #[arg(long, env = "MD2POST_DIAGRAM_LANG", default_value = "mermaid")]
    diagram_lang: String,

    /// Mermaid CLI program.
    #[arg(long, env = "MD2POST_MMDC", default_value = "mmdc")]
    mmdc: PathBuf,

    /// Render diagrams through this Kroki server instead of the Mermaid CLI.
    #[arg(long, env = "MD2POST_KROKI_URL")]
    kroki_url: Option<String>,

    /// Diagram background colour.
    #[arg(long, env = "MD2POST_BACKGROUND", default_value = "transparent")]
    background: String,

    /// Per-diagram render timeout in seconds (default: none).
    #[arg(long, env = "MD2POST_RENDER_TIMEOUT")]
    render_timeout: Option<u64>,

    /// Download timeout for remote images in seconds.
    #[arg(long, env = "MD2POST_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Unordered list marker: *, - or +.
    #[arg(long, env = "MD2POST_BULLET", default_value_t = '*')]
    bullet: char,

    /// Code fence character: ` or ~.
    #[arg(long, env = "MD2POST_FENCE", default_value_t = '`')]
    fence: char,

    /// Wrap paragraphs at this column (0 keeps source line breaks).
    #[arg(long, env = "MD2POST_WRAP", default_value_t = 0)]
    wrap: usize,

    /// Do not insert default front matter into articles that have none.
    #[arg(long, env = "MD2POST_NO_FRONT_MATTER_INSERT")]
    no_front_matter_insert: bool,

    /// Print the conversion report (ConversionOutput) as JSON on stdout.
    #[arg(long, env = "MD2POST_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD2POST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2POST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2POST_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Warnings still matter while the bar runs: they name missing images.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert(&cli.input, &config)
        .await
        .with_context(|| format!("Conversion of {} failed", cli.input.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .images_root(&cli.images_root)
        .output_dir(&cli.output_dir)
        .assets_dir_name(&cli.assets_dir_name)
        .diagram_language(&cli.diagram_lang)
        .diagram_background(&cli.background)
        .mmdc_program(&cli.mmdc)
        .download_timeout_secs(cli.download_timeout)
        .synthesize_front_matter(!cli.no_front_matter_insert)
        .bullet(cli.bullet)
        .fence(cli.fence)
        .wrap_width(cli.wrap);

    if let Some(ref url) = cli.kroki_url {
        builder = builder.kroki_url(url);
    }
    if let Some(secs) = cli.render_timeout {
        builder = builder.render_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ConversionOutput) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}  {}ms",
        if output.is_complete() {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&output.output_path.display().to_string()),
        stats.total_duration_ms,
    );
    eprintln!(
        "   {} asset(s) copied, {} failed  /  {} diagram(s) rendered, {} failed",
        dim(&stats.assets_copied.to_string()),
        dim(&stats.assets_failed.to_string()),
        dim(&stats.diagrams_rendered.to_string()),
        dim(&stats.diagrams_failed.to_string()),
    );
    for asset in &output.assets {
        if let Some(ref e) = asset.error {
            eprintln!("   {} {}", red("✗"), e);
        }
    }
    for diagram in &output.diagrams {
        if let Some(ref e) = diagram.error {
            eprintln!("   {} {}", red("✗"), e);
        }
    }
}
