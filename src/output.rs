//! Result types returned by a conversion.

use crate::error::{AssetError, DiagramError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a conversion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The final Markdown, exactly as written to `output_path`.
    pub markdown: String,
    /// Where the Markdown was written.
    pub output_path: PathBuf,
    /// Directory that received copied assets and rendered diagrams.
    pub assets_dir: PathBuf,
    /// Document stem (`hello-world` for `hello-world.md`).
    pub stem: String,
    /// The front matter written to the output; `None` when the document
    /// kept a TOML block or synthesis was disabled.
    pub front_matter: Option<PostFrontMatter>,
    /// One entry per scheduled or skipped asset, cover image first.
    pub assets: Vec<AssetResult>,
    /// One entry per diagram block, in document order.
    pub diagrams: Vec<DiagramResult>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// True when every asset was copied and every diagram rendered.
    pub fn is_complete(&self) -> bool {
        self.assets.iter().all(|a| a.error.is_none())
            && self.diagrams.iter().all(|d| d.error.is_none())
    }
}

/// Front matter in the target platform's schema.
///
/// Field order is the order keys appear in the written YAML block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFrontMatter {
    pub title: String,
    pub published: bool,
    pub description: String,
    pub tags: String,
    pub cover_image: String,
}

/// Where an asset reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// `image.src` in the front matter.
    Cover,
    /// An image in the body, inline or reference-style.
    Image,
}

/// Outcome for one asset reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetResult {
    pub kind: AssetKind,
    /// The reference as written in the source document.
    pub reference: String,
    /// The rewritten reference in the output document.
    pub link: String,
    /// Destination on disk, if a copy was attempted.
    pub target: Option<PathBuf>,
    /// Bytes written, when the copy succeeded.
    pub bytes: u64,
    /// `None` when the asset is in place.
    pub error: Option<AssetError>,
}

/// Outcome for one diagram block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramResult {
    /// 0-based index in document order.
    pub index: usize,
    /// `diagram-<index>.png`
    pub file_name: String,
    /// Reference used in the output document when rendering succeeded.
    pub link: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: u64,
    /// `None` when the code block was replaced by the image.
    pub error: Option<DiagramError>,
}

/// Aggregate counts and timings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub assets_total: usize,
    pub assets_copied: usize,
    pub assets_failed: usize,
    pub diagrams_total: usize,
    pub diagrams_rendered: usize,
    pub diagrams_failed: usize,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
}

impl ConversionStats {
    pub(crate) fn tally(assets: &[AssetResult], diagrams: &[DiagramResult]) -> Self {
        let assets_failed = assets.iter().filter(|a| a.error.is_some()).count();
        let diagrams_failed = diagrams.iter().filter(|d| d.error.is_some()).count();
        Self {
            assets_total: assets.len(),
            assets_copied: assets.len() - assets_failed,
            assets_failed,
            diagrams_total: diagrams.len(),
            diagrams_rendered: diagrams.len() - diagrams_failed,
            diagrams_failed,
            ..Self::default()
        }
    }
}
