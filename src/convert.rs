//! Conversion entry points.
//!
//! A run is a single linear sequence:
//!
//! ```text
//! parse → front matter → relocate images → draft
//!       → (copy batch ∥ rasterize) → swap diagrams into the draft → write
//! ```
//!
//! The comrak tree lives in an arena that is dropped before anything is
//! awaited; the draft is plain Markdown text and is parsed again only when
//! at least one diagram rendered. Copies and diagram renders run
//! concurrently and are both awaited before the document is written. Their
//! failures are collected in [`ConversionOutput`]; only the errors listed on
//! [`ConvertError`] abort.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::{ConversionOutput, ConversionStats, DiagramResult, PostFrontMatter};
use crate::pipeline::assets::{self, AssetLayout, AssetPlan, AssetPlanner};
use crate::pipeline::diagram::{self, DiagramBlock, RasterizeContext};
use crate::pipeline::{frontmatter, input, parse, postprocess, render, serialize};
use comrak::Arena;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Convert a Markdown file into a post.
///
/// Writes `<output_dir>/<stem>.md` and fills
/// `<output_dir>/<assets_dir_name>/<stem>/` with the referenced images and
/// rendered diagrams.
///
/// # Errors
/// Returns `Err(ConvertError)` only for fatal errors:
/// - File not found / permission denied / not UTF-8
/// - Malformed front matter
/// - Output or assets directory not writable
///
/// Missing images and failed diagrams are reported in the returned
/// [`ConversionOutput`] instead.
pub async fn convert(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let path = path.as_ref();
    info!("Starting conversion: {}", path.display());
    let source = input::read_source(path).await?;
    convert_document(&source.text, &source.stem, config).await
}

/// Convert Markdown text that did not come from a file.
///
/// `stem` names the output file and assets folder exactly as a file stem
/// would.
///
/// # Example
/// ```rust,no_run
/// use md2post::{convert_str, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder().output_dir("out").build()?;
/// let output = convert_str("---\ntitle: Hi\n---\n\nBody\n", "hi", &config).await?;
/// assert_eq!(output.output_path, std::path::Path::new("out/hi.md"));
/// # Ok(())
/// # }
/// ```
pub async fn convert_str(
    text: &str,
    stem: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    if stem.is_empty() || stem.contains(['/', '\\']) || stem == "." || stem == ".." {
        return Err(ConvertError::InvalidConfig(format!(
            "Document stem must be a plain file name, got '{stem}'"
        )));
    }
    convert_document(&postprocess::normalise_input(text), stem, config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(path, config))
}

/// Everything decided before the first await.
struct Draft {
    header: Option<String>,
    /// Body with images relocated and diagrams still as code.
    body: String,
    front_matter: Option<PostFrontMatter>,
    plan: AssetPlan,
    blocks: Vec<DiagramBlock>,
}

async fn convert_document(
    text: &str,
    stem: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    let progress = config.progress_callback.as_ref();
    let renderer = render::resolve_renderer(config)?;
    let layout = AssetLayout::new(config, stem);

    // ── Steps 1-4: Parse, rewrite front matter, relocate, find diagrams ──
    let Draft {
        header,
        body,
        front_matter,
        plan,
        blocks,
    } = draft(text, &layout, config)?;
    debug!(
        "{} copy job(s), {} skipped reference(s), {} diagram(s)",
        plan.jobs.len(),
        plan.skipped.len(),
        blocks.len()
    );
    if let Some(cb) = progress {
        cb.on_conversion_start(plan.jobs.len(), blocks.len());
    }

    // ── Step 5: Copy batch ∥ rasterize, both awaited ─────────────────────
    assets::ensure_assets_dir(&layout.assets_dir).await?;

    let ctx = RasterizeContext {
        layout: &layout,
        renderer: renderer.as_ref(),
        language: &config.diagram_language,
        background: &config.diagram_background,
        timeout: config.render_timeout_secs.map(Duration::from_secs),
        progress,
    };
    let (copied, (diagrams, render_duration_ms)) = tokio::join!(
        assets::copy_all(plan.jobs, config, progress),
        async {
            let render_start = Instant::now();
            let results = diagram::render_all(&blocks, &ctx).await;
            (results, render_start.elapsed().as_millis() as u64)
        }
    );

    let mut asset_results = copied;
    asset_results.extend(plan.skipped);

    // ── Step 6: Swap rendered blocks for images ──────────────────────────
    let (body, replaced) = finish(body, &diagrams, config)?;

    // ── Step 7: Assemble and write ───────────────────────────────────────
    let markdown = serialize::assemble(header.as_deref(), &body);
    let output_path = config.output_path_for(stem);
    write_atomic(&output_path, &markdown).await?;

    let stats = ConversionStats {
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        ..ConversionStats::tally(&asset_results, &diagrams)
    };

    info!(
        "Wrote {}: {}/{} assets, {}/{} diagrams, {}ms",
        output_path.display(),
        stats.assets_copied,
        stats.assets_total,
        replaced,
        stats.diagrams_total,
        stats.total_duration_ms
    );

    if let Some(cb) = progress {
        cb.on_conversion_complete(stats.diagrams_total, stats.diagrams_rendered);
    }

    Ok(ConversionOutput {
        markdown,
        output_path,
        assets_dir: layout.assets_dir.clone(),
        stem: stem.to_string(),
        front_matter,
        assets: asset_results,
        diagrams,
        stats,
    })
}

fn draft(text: &str, layout: &AssetLayout, config: &ConversionConfig) -> Result<Draft, ConvertError> {
    let split = parse::split_front_matter(text);
    let options = parse::options(&config.style);
    let arena = Arena::new();
    let root = parse::parse_body(&arena, split.body, &options);

    let blocks = diagram::collect_diagrams(root, &config.diagram_language);
    let mut planner = AssetPlanner::new(layout);
    planner.reserve_diagrams(blocks.len());

    // Cover image first, so it leads the asset report.
    let rewritten = frontmatter::apply(
        split.front_matter.as_ref(),
        &mut planner,
        config.synthesize_front_matter,
    )?;
    assets::relocate_images(root, &mut planner);

    Ok(Draft {
        header: rewritten.header,
        body: serialize::to_markdown(root, &config.style)?,
        front_matter: rewritten.front_matter,
        plan: planner.finish(),
        blocks,
    })
}

/// Put rendered diagrams into the drafted body. Returns the new body and the
/// number of blocks replaced.
fn finish(
    body: String,
    diagrams: &[DiagramResult],
    config: &ConversionConfig,
) -> Result<(String, usize), ConvertError> {
    if diagrams.iter().all(|d| d.error.is_some()) {
        return Ok((body, 0));
    }
    let options = parse::options(&config.style);
    let arena = Arena::new();
    let root = parse::parse_body(&arena, &body, &options);
    let replaced = diagram::apply_replacements(&arena, root, diagrams, &config.diagram_language);
    Ok((serialize::to_markdown(root, &config.style)?, replaced))
}

/// Write via `<path>.tmp` and rename, so a failed run never leaves a
/// truncated post behind.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConvertError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| ConvertError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ConvertError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
