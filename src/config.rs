//! Configuration types for Markdown-to-post conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Output locations are plain fields with
//! defaults (`./posts`, `assets`) so library callers and tests can point a run
//! anywhere without touching the process working directory.

use crate::error::ConvertError;
use crate::pipeline::render::DiagramRenderer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for a Markdown-to-post conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use md2post::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .images_root("static")
///     .output_dir("out/posts")
///     .diagram_language("mermaid")
///     .build()
///     .unwrap();
/// assert_eq!(config.output_dir.to_str(), Some("out/posts"));
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory that absolute image references (`/img/a.png`) are rooted at.
    /// Relative references are joined onto it as well. Default: `.`.
    pub images_root: PathBuf,

    /// Directory receiving `<stem>.md`. Default: `posts`.
    pub output_dir: PathBuf,

    /// Name of the assets directory inside `output_dir`. Assets for a
    /// document live in `<output_dir>/<assets_dir_name>/<stem>/` and are
    /// referenced as `./<assets_dir_name>/<stem>/<file>`. Default: `assets`.
    pub assets_dir_name: String,

    /// Code-fence language tag that marks a diagram block. Default: `mermaid`.
    pub diagram_language: String,

    /// Background passed to the renderer. Default: `transparent`. Only the
    /// Mermaid CLI honours it; Kroki renders with the server's own theme.
    pub diagram_background: String,

    /// Program spawned by the Mermaid CLI renderer. Default: `mmdc`.
    pub mmdc_program: PathBuf,

    /// Base URL of a Kroki server. When set, diagrams are rendered over HTTP
    /// instead of through the Mermaid CLI.
    pub kroki_url: Option<String>,

    /// Pre-constructed renderer. Takes precedence over `kroki_url` and
    /// `mmdc_program`.
    pub renderer: Option<Arc<dyn DiagramRenderer>>,

    /// Per-diagram render timeout in seconds. Default: None (wait forever).
    pub render_timeout_secs: Option<u64>,

    /// Download timeout for remote images in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Insert a default front-matter block into documents that have none.
    /// Default: true.
    pub synthesize_front_matter: bool,

    /// Markdown style used when serialising the output.
    pub style: WriterStyle,

    /// Optional per-asset / per-diagram progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            images_root: PathBuf::from("."),
            output_dir: PathBuf::from("posts"),
            assets_dir_name: "assets".to_string(),
            diagram_language: "mermaid".to_string(),
            diagram_background: "transparent".to_string(),
            mmdc_program: PathBuf::from("mmdc"),
            kroki_url: None,
            renderer: None,
            render_timeout_secs: None,
            download_timeout_secs: 60,
            synthesize_front_matter: true,
            style: WriterStyle::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("images_root", &self.images_root)
            .field("output_dir", &self.output_dir)
            .field("assets_dir_name", &self.assets_dir_name)
            .field("diagram_language", &self.diagram_language)
            .field("diagram_background", &self.diagram_background)
            .field("mmdc_program", &self.mmdc_program)
            .field("kroki_url", &self.kroki_url)
            .field("renderer", &self.renderer.as_ref().map(|r| r.name().to_string()))
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("synthesize_front_matter", &self.synthesize_front_matter)
            .field("style", &self.style)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory holding the assets of the document with the given stem.
    pub fn assets_dir_for(&self, stem: &str) -> PathBuf {
        self.output_dir.join(&self.assets_dir_name).join(stem)
    }

    /// Path the converted document with the given stem is written to.
    pub fn output_path_for(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{stem}.md"))
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn images_root(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.images_root = dir.as_ref().to_path_buf();
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn assets_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.assets_dir_name = name.into();
        self
    }

    pub fn diagram_language(mut self, lang: impl Into<String>) -> Self {
        self.config.diagram_language = lang.into();
        self
    }

    pub fn diagram_background(mut self, background: impl Into<String>) -> Self {
        self.config.diagram_background = background.into();
        self
    }

    pub fn mmdc_program(mut self, program: impl AsRef<Path>) -> Self {
        self.config.mmdc_program = program.as_ref().to_path_buf();
        self
    }

    pub fn kroki_url(mut self, url: impl Into<String>) -> Self {
        self.config.kroki_url = Some(url.into());
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn DiagramRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn synthesize_front_matter(mut self, v: bool) -> Self {
        self.config.synthesize_front_matter = v;
        self
    }

    pub fn style(mut self, style: WriterStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn bullet(mut self, bullet: char) -> Self {
        self.config.style.bullet = bullet;
        self
    }

    pub fn fence(mut self, fence: char) -> Self {
        self.config.style.fence = fence;
        self
    }

    pub fn wrap_width(mut self, width: usize) -> Self {
        self.config.style.wrap_width = width;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.diagram_language.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Diagram language must not be empty".into(),
            ));
        }
        if c.assets_dir_name.is_empty()
            || c.assets_dir_name.contains(['/', '\\'])
            || c.assets_dir_name == ".."
        {
            return Err(ConvertError::InvalidConfig(format!(
                "Assets directory name must be a single path segment, got '{}'",
                c.assets_dir_name
            )));
        }
        c.style.validate()?;
        if let Some(ref url) = c.kroki_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConvertError::InvalidConfig(format!(
                    "Kroki URL must be http(s), got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Writer style ─────────────────────────────────────────────────────────

/// Markdown style choices applied when the document is written back.
///
/// Code blocks are always fenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStyle {
    /// Unordered list marker: `*`, `-` or `+`. Default: `*`.
    pub bullet: char,
    /// Code fence character: `` ` `` or `~`. Default: `` ` ``.
    pub fence: char,
    /// Column to hard-wrap paragraphs at. Default: 0 (no wrapping).
    pub wrap_width: usize,
}

impl Default for WriterStyle {
    fn default() -> Self {
        Self {
            bullet: '*',
            fence: '`',
            wrap_width: 0,
        }
    }
}

impl WriterStyle {
    fn validate(&self) -> Result<(), ConvertError> {
        if !matches!(self.bullet, '*' | '-' | '+') {
            return Err(ConvertError::InvalidConfig(format!(
                "Bullet must be one of '*', '-', '+', got '{}'",
                self.bullet
            )));
        }
        if !matches!(self.fence, '`' | '~') {
            return Err(ConvertError::InvalidConfig(format!(
                "Fence must be '`' or '~', got '{}'",
                self.fence
            )));
        }
        Ok(())
    }
}
