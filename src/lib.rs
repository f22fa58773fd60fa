//! # md2post
//!
//! Turn a Markdown article with YAML front matter into a post ready for a
//! blogging platform.
//!
//! ## Pipeline Overview
//!
//! ```text
//! article.md
//!  │
//!  ├─ 1. Parse        front matter split off, body parsed by comrak (GFM)
//!  ├─ 2. Front matter title / published / description / tags / cover_image
//!  ├─ 3. Assets       image references → ./assets/<stem>/<file>, copies planned
//!  ├─ 4. Diagrams     ```mermaid blocks → diagram-N.png (rendered concurrently)
//!  ├─ 5. Serialize    comrak CommonMark writer, front matter put back in front
//!  └─ 6. Output       posts/<stem>.md + posts/assets/<stem>/
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2post::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .images_root("static")
//!         .build()?;
//!     let output = convert("drafts/hello-world.md", &config).await?;
//!     println!("wrote {}", output.output_path.display());
//!     for asset in output.assets.iter().filter(|a| a.error.is_some()) {
//!         eprintln!("missing: {}", asset.reference);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2post` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! md2post = { version = "0.1", default-features = false }
//! ```
//!
//! ## Diagram Renderers
//!
//! | Renderer | Selected by | Needs |
//! |----------|-------------|-------|
//! | [`MermaidCli`] | default | `mmdc` on `PATH` (`npm i -g @mermaid-js/mermaid-cli`) |
//! | [`Kroki`] | `kroki_url` | a reachable Kroki server |
//! | custom | `renderer` | any [`DiagramRenderer`] implementation |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, WriterStyle};
pub use convert::{convert, convert_str, convert_sync};
pub use error::{AssetError, ConvertError, DiagramError, RenderError};
pub use output::{
    AssetKind, AssetResult, ConversionOutput, ConversionStats, DiagramResult, PostFrontMatter,
};
pub use pipeline::render::{DiagramRenderer, Kroki, MermaidCli, RenderRequest};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
