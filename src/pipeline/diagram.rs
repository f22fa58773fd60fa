//! Diagram rasterization: replace fenced diagram blocks with rendered PNGs.
//!
//! Three steps, so the tree is never mutated while it is being walked:
//!
//! 1. [`collect_diagrams`]: read-only walk; records each block's source,
//!    numbering blocks from 0 in document order.
//! 2. [`render_all`]: launches every per-diagram pipeline at once and waits
//!    for all of them. Completion order does not matter.
//! 3. [`apply_replacements`]: swaps each successfully rendered block for a
//!    paragraph holding a single image. Failed blocks stay as code.
//!
//! Per-diagram pipeline:
//!
//! ```text
//! write temp-diagram-<i>.png.mmd → render diagram-<i>.png → remove sidecar → validate PNG
//! ```

use crate::error::{DiagramError, RenderError};
use crate::output::DiagramResult;
use crate::pipeline::assets::AssetLayout;
use crate::pipeline::render::{DiagramRenderer, RenderRequest};
use crate::progress::ProgressCallback;
use comrak::nodes::{Ast, AstNode, LineColumn, NodeLink, NodeValue};
use comrak::Arena;
use futures::future::join_all;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// `diagram-<index>.png`
pub fn file_name(index: usize) -> String {
    format!("diagram-{index}.png")
}

/// `temp-diagram-<index>.png.mmd`
pub fn sidecar_name(index: usize) -> String {
    format!("temp-{}.mmd", file_name(index))
}

/// A fenced code block to be rasterized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    pub index: usize,
    pub source: String,
}

impl DiagramBlock {
    pub fn file_name(&self) -> String {
        file_name(self.index)
    }

    pub fn sidecar_name(&self) -> String {
        sidecar_name(self.index)
    }
}

/// Settings shared by every per-diagram pipeline of one document.
pub struct RasterizeContext<'a> {
    pub layout: &'a AssetLayout,
    pub renderer: &'a dyn DiagramRenderer,
    pub language: &'a str,
    pub background: &'a str,
    pub timeout: Option<Duration>,
    pub progress: Option<&'a ProgressCallback>,
}

/// Code blocks whose info string starts with `language`, in document order.
fn diagram_nodes<'a>(root: &'a AstNode<'a>, language: &str) -> Vec<&'a AstNode<'a>> {
    root.descendants()
        .filter(|node| match node.data.borrow().value {
            NodeValue::CodeBlock(ref code) => code
                .info
                .split_whitespace()
                .next()
                .is_some_and(|lang| lang.eq_ignore_ascii_case(language)),
            _ => false,
        })
        .collect()
}

/// Find every code block tagged with `language`, in document order.
pub fn collect_diagrams<'a>(root: &'a AstNode<'a>, language: &str) -> Vec<DiagramBlock> {
    diagram_nodes(root, language)
        .into_iter()
        .enumerate()
        .filter_map(|(index, node)| match node.data.borrow().value {
            NodeValue::CodeBlock(ref code) => Some(DiagramBlock {
                index,
                source: code
                    .literal
                    .strip_suffix('\n')
                    .unwrap_or(&code.literal)
                    .to_string(),
            }),
            _ => None,
        })
        .collect()
}

/// Run every diagram pipeline concurrently and wait for all of them.
///
/// Results are returned in index order.
pub async fn render_all(blocks: &[DiagramBlock], ctx: &RasterizeContext<'_>) -> Vec<DiagramResult> {
    if blocks.is_empty() {
        return Vec::new();
    }
    info!(
        "Rendering {} {} diagram(s) with {}",
        blocks.len(),
        ctx.language,
        ctx.renderer.name()
    );

    let total = blocks.len();
    join_all(blocks.iter().map(|block| render_one(block, total, ctx))).await
}

async fn render_one(block: &DiagramBlock, total: usize, ctx: &RasterizeContext<'_>) -> DiagramResult {
    let started = Instant::now();
    if let Some(cb) = ctx.progress {
        cb.on_diagram_start(block.index, total);
    }

    let file_name = block.file_name();
    let output = ctx.layout.target(&file_name);
    let outcome = run_pipeline(block, &output, ctx).await;

    let mut result = DiagramResult {
        index: block.index,
        file_name: file_name.clone(),
        link: ctx.layout.link(&file_name),
        width: None,
        height: None,
        duration_ms: started.elapsed().as_millis() as u64,
        error: None,
    };

    match outcome {
        Ok((width, height)) => {
            debug!(
                "Diagram {} rendered: {}x{} in {}ms",
                block.index, width, height, result.duration_ms
            );
            result.width = Some(width);
            result.height = Some(height);
            if let Some(cb) = ctx.progress {
                cb.on_diagram_complete(block.index, total);
            }
        }
        Err(e) => {
            warn!("{}; code block kept", e);
            if let Some(cb) = ctx.progress {
                cb.on_diagram_error(block.index, total, &e.to_string());
            }
            result.error = Some(e);
        }
    }
    result
}

async fn run_pipeline(
    block: &DiagramBlock,
    output: &Path,
    ctx: &RasterizeContext<'_>,
) -> Result<(u32, u32), DiagramError> {
    let index = block.index;
    let sidecar = ctx.layout.target(&block.sidecar_name());

    tokio::fs::write(&sidecar, &block.source)
        .await
        .map_err(|e| DiagramError::SidecarWrite {
            index,
            path: sidecar.clone(),
            detail: e.to_string(),
        })?;

    let request = RenderRequest {
        language: ctx.language,
        source: &block.source,
        input: &sidecar,
        output,
        background: ctx.background,
    };
    let rendered = render_with_timeout(ctx, &request, index).await;

    if let Err(e) = tokio::fs::remove_file(&sidecar).await {
        warn!("Could not remove {}: {}", sidecar.display(), e);
    }

    rendered?;
    validate_png(index, output.to_path_buf()).await
}

async fn render_with_timeout(
    ctx: &RasterizeContext<'_>,
    request: &RenderRequest<'_>,
    index: usize,
) -> Result<(), DiagramError> {
    let failed = |e: RenderError| DiagramError::RenderFailed {
        index,
        renderer: ctx.renderer.name().to_string(),
        detail: e.to_string(),
    };

    match ctx.timeout {
        Some(limit) => match tokio::time::timeout(limit, ctx.renderer.render(request)).await {
            Ok(result) => result.map_err(failed),
            Err(_) => Err(DiagramError::Timeout {
                index,
                secs: limit.as_secs(),
            }),
        },
        None => ctx.renderer.render(request).await.map_err(failed),
    }
}

/// Read the rendered image's header; a missing or garbage file is a failure.
async fn validate_png(index: usize, path: PathBuf) -> Result<(u32, u32), DiagramError> {
    let checked = path.clone();
    let dims = tokio::task::spawn_blocking(move || image::image_dimensions(&checked))
        .await
        .map_err(|e| DiagramError::InvalidOutput {
            index,
            path: path.clone(),
            detail: format!("validation task panicked: {e}"),
        })?;

    dims.map_err(|e| DiagramError::InvalidOutput {
        index,
        path,
        detail: e.to_string(),
    })
}

/// Replace each rendered block with an image paragraph.
///
/// Blocks are matched to results by their position among the diagram
/// blocks of `root`. Returns how many blocks were replaced.
pub fn apply_replacements<'a>(
    arena: &'a Arena<AstNode<'a>>,
    root: &'a AstNode<'a>,
    results: &[DiagramResult],
    language: &str,
) -> usize {
    let nodes = diagram_nodes(root, language);
    if nodes.len() != results.len() {
        warn!(
            "Found {} diagram blocks for {} results; replacing the common prefix",
            nodes.len(),
            results.len()
        );
    }

    let mut replaced = 0;
    for (node, result) in nodes.into_iter().zip(results) {
        if result.error.is_some() {
            continue;
        }
        let start = node.data.borrow().sourcepos.start;
        let paragraph = new_node(arena, NodeValue::Paragraph, start);
        let image = new_node(
            arena,
            NodeValue::Image(NodeLink {
                url: result.link.clone(),
                title: String::new(),
            }),
            start,
        );
        image.append(new_node(
            arena,
            NodeValue::Text(alt_text(language, &result.file_name)),
            start,
        ));
        paragraph.append(image);
        node.insert_before(paragraph);
        node.detach();
        replaced += 1;
    }
    replaced
}

fn new_node<'a>(arena: &'a Arena<AstNode<'a>>, value: NodeValue, start: LineColumn) -> &'a AstNode<'a> {
    arena.alloc(AstNode::new(RefCell::new(Ast::new(value, start))))
}

/// `Mermaid diagram diagram-0.png`
fn alt_text(language: &str, file_name: &str) -> String {
    let mut chars = language.chars();
    let label: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{label} diagram {file_name}")
}
