//! Diagram renderers: turn one diagram's source into a PNG on disk.
//!
//! The rasterizer only talks to [`DiagramRenderer`]; which backend runs is
//! decided once per conversion by [`resolve_renderer`]:
//!
//! 1. `config.renderer`: a caller-supplied implementation
//! 2. `config.kroki_url`: [`Kroki`], rendering over HTTP
//! 3. otherwise: [`MermaidCli`], spawning `mmdc`

use crate::config::ConversionConfig;
use crate::error::{ConvertError, RenderError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::debug;

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// Diagram language tag as configured (`mermaid`).
    pub language: &'a str,
    /// Diagram source text.
    pub source: &'a str,
    /// Sidecar file holding `source`.
    pub input: &'a Path,
    /// Where the PNG must be written.
    pub output: &'a Path,
    /// Background colour (`transparent`, `white`, `#f0f0f0` …).
    pub background: &'a str,
}

/// A backend able to rasterize diagram source to PNG.
///
/// Implementations must write the image to `request.output` before
/// returning `Ok`. They may be called concurrently for different diagrams.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &str;

    async fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderError>;
}

/// Pick the renderer for a conversion.
pub fn resolve_renderer(
    config: &ConversionConfig,
) -> Result<Arc<dyn DiagramRenderer>, ConvertError> {
    if let Some(ref renderer) = config.renderer {
        debug!("Using caller-supplied renderer '{}'", renderer.name());
        return Ok(Arc::clone(renderer));
    }
    if let Some(ref url) = config.kroki_url {
        debug!("Using Kroki at {}", url);
        return Ok(Arc::new(Kroki::new(url)?));
    }
    debug!("Using Mermaid CLI '{}'", config.mmdc_program.display());
    Ok(Arc::new(MermaidCli::new(&config.mmdc_program)))
}

// ── Mermaid CLI ──────────────────────────────────────────────────────────

/// Spawns the Mermaid CLI: `mmdc -i <input> -o <output> -b <background>`.
#[derive(Debug, Clone)]
pub struct MermaidCli {
    program: PathBuf,
    name: String,
}

impl MermaidCli {
    pub fn new(program: impl AsRef<Path>) -> Self {
        let program = program.as_ref().to_path_buf();
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self { program, name }
    }
}

#[async_trait]
impl DiagramRenderer for MermaidCli {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderError> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-i")
            .arg(request.input)
            .arg("-o")
            .arg(request.output)
            .arg("-b")
            .arg(request.background)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderError::Spawn {
                program: self.program.display().to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::ExitStatus {
                status: output.status.to_string(),
                stderr: last_lines(&stderr, 5),
            });
        }
        Ok(())
    }
}

/// Tail of a process's stderr; mmdc prints a stack trace before the cause.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

// ── Kroki ────────────────────────────────────────────────────────────────

/// Renders through a Kroki server: `POST <base>/<language>/png`.
///
/// Only the diagram source is sent. `RenderRequest::background` has no
/// counterpart in the request, so the server's default theme applies.
#[derive(Debug, Clone)]
pub struct Kroki {
    base_url: String,
    client: reqwest::Client,
}

impl Kroki {
    pub fn new(base_url: &str) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self, language: &str) -> String {
        format!("{}/{}/png", self.base_url, language.to_ascii_lowercase())
    }
}

#[async_trait]
impl DiagramRenderer for Kroki {
    fn name(&self) -> &str {
        "kroki"
    }

    async fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderError> {
        if request.background != "transparent" {
            debug!("Kroki ignores background '{}'", request.background);
        }
        let url = self.endpoint(request.language);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(request.source.to_string())
            .send()
            .await
            .map_err(|e| RenderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Http(format!(
                "HTTP {}: {}",
                status,
                last_lines(&body, 5)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Http(e.to_string()))?;
        tokio::fs::write(request.output, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mermaid_cli_name_is_file_name() {
        assert_eq!(MermaidCli::new("/usr/local/bin/mmdc").name(), "mmdc");
        assert_eq!(MermaidCli::new("mmdc").name(), "mmdc");
    }

    #[test]
    fn kroki_endpoint() {
        let kroki = Kroki::new("https://kroki.io/").unwrap();
        assert_eq!(kroki.endpoint("Mermaid"), "https://kroki.io/mermaid/png");
    }

    #[test]
    fn resolve_prefers_kroki_over_cli() {
        let config = ConversionConfig::builder()
            .kroki_url("http://localhost:8000")
            .build()
            .unwrap();
        assert_eq!(resolve_renderer(&config).unwrap().name(), "kroki");

        let config = ConversionConfig::default();
        assert_eq!(resolve_renderer(&config).unwrap().name(), "mmdc");
    }

    #[test]
    fn resolve_prefers_explicit_renderer() {
        let explicit: Arc<dyn DiagramRenderer> = Arc::new(MermaidCli::new("my-mmdc"));
        let config = ConversionConfig::builder()
            .kroki_url("http://localhost:8000")
            .renderer(explicit)
            .build()
            .unwrap();
        assert_eq!(resolve_renderer(&config).unwrap().name(), "my-mmdc");
    }

    #[test]
    fn last_lines_keeps_tail() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
        assert_eq!(last_lines("", 3), "");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mmd");
        let output = dir.path().join("out.png");
        std::fs::write(&input, "graph TD; A-->B;").unwrap();

        let cli = MermaidCli::new("md2post-no-such-renderer");
        let err = cli
            .render(&RenderRequest {
                language: "mermaid",
                source: "graph TD; A-->B;",
                input: &input,
                output: &output,
                background: "transparent",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }), "got: {err}");
    }
}
