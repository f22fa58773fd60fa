//! End-to-end conversion tests.
//!
//! Every test works inside its own temporary directory and renders diagrams
//! with an in-process renderer, so no Mermaid CLI or network is needed.

use async_trait::async_trait;
use md2post::{
    convert, AssetError, AssetKind, ConversionConfig, ConversionProgressCallback, ConvertError,
    DiagramError, DiagramRenderer, RenderError, RenderRequest,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Writes an 8×6 PNG. Sources containing `invalid` fail; earlier diagrams
/// sleep longer so completion order is the reverse of document order.
struct FakeRenderer {
    calls: AtomicUsize,
}

impl FakeRenderer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DiagramRenderer for FakeRenderer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let sidecar = tokio::fs::read_to_string(request.input).await?;
        assert_eq!(sidecar, request.source);

        let index: u64 = request
            .output
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("diagram-"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(index * 20))).await;

        if request.source.contains("invalid") {
            return Err(RenderError::ExitStatus {
                status: "exit status: 1".into(),
                stderr: "Parse error on line 1".into(),
            });
        }
        image::RgbaImage::new(8, 6)
            .save(request.output)
            .map_err(|e| RenderError::Http(e.to_string()))
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        std::fs::create_dir_all(ws.images()).unwrap();
        std::fs::create_dir_all(ws.root().join("drafts")).unwrap();
        ws
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn images(&self) -> PathBuf {
        self.root().join("static")
    }

    fn posts(&self) -> PathBuf {
        self.root().join("posts")
    }

    fn add_image(&self, rel: &str, bytes: &[u8]) {
        let path = self.images().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn article(&self, name: &str, text: &str) -> PathBuf {
        let path = self.root().join("drafts").join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn config(&self, renderer: Arc<FakeRenderer>) -> ConversionConfig {
        ConversionConfig::builder()
            .images_root(self.images())
            .output_dir(self.posts())
            .renderer(renderer)
            .build()
            .unwrap()
    }
}

fn front_matter_of(markdown: &str) -> serde_yaml::Mapping {
    let body = markdown
        .strip_prefix("---\n")
        .expect("output starts with front matter");
    let end = body.find("\n---\n").expect("front matter is closed");
    serde_yaml::from_str(&body[..end]).unwrap()
}

// ── Front matter and cover image ─────────────────────────────────────────────

#[tokio::test]
async fn cover_image_is_copied_and_front_matter_rewritten() {
    let ws = Workspace::new();
    ws.add_image("foo/bar.png", b"cover-bytes");
    let path = ws.article(
        "hello-world.md",
        "---\ntitle: Hello World\nsnippet: First post\ntags: [a, b, c]\nimage:\n  src: /foo/bar.png\n---\n\nBody text.\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    let fm = output.front_matter.clone().unwrap();
    assert_eq!(fm.title, "Hello World");
    assert_eq!(fm.description, "First post");
    assert_eq!(fm.tags, "a, b, c");
    assert!(!fm.published);
    assert_eq!(fm.cover_image, "./assets/hello-world/bar.png");

    let copied = ws.posts().join("assets/hello-world/bar.png");
    assert_eq!(std::fs::read(copied).unwrap(), b"cover-bytes");
    assert_eq!(output.assets[0].kind, AssetKind::Cover);
    assert!(output.is_complete());

    assert_eq!(output.output_path, ws.posts().join("hello-world.md"));
    assert_eq!(
        output.markdown,
        "---\ntitle: Hello World\npublished: false\ndescription: First post\ntags: a, b, c\ncover_image: ./assets/hello-world/bar.png\n---\n\nBody text.\n"
    );
}

#[tokio::test]
async fn missing_image_field_gives_bare_assets_prefix() {
    let ws = Workspace::new();
    let path = ws.article("no-cover.md", "---\ntitle: T\n---\n\nText\n");

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    let fm = output.front_matter.unwrap();
    assert_eq!(fm.cover_image, "./assets/no-cover/");
    assert!(output.assets.is_empty());
    assert!(ws.posts().join("assets/no-cover").is_dir());
}

#[tokio::test]
async fn output_front_matter_round_trips() {
    let ws = Workspace::new();
    let path = ws.article("rt.md", "---\ntitle: 'Quotes: \"and\" colons'\nextra: dropped\n---\n");

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();
    let written = std::fs::read_to_string(ws.posts().join("rt.md")).unwrap();
    let fm = front_matter_of(&written);

    let keys: Vec<&str> = fm.keys().filter_map(|k| k.as_str()).collect();
    assert_eq!(
        keys,
        ["title", "published", "description", "tags", "cover_image"]
    );
    assert_eq!(fm.get("published"), Some(&serde_yaml::Value::Bool(false)));
    assert_eq!(
        fm.get("title").and_then(|v| v.as_str()),
        Some("Quotes: \"and\" colons")
    );
    assert_eq!(output.markdown, written);
}

#[tokio::test]
async fn malformed_front_matter_is_fatal_and_writes_nothing() {
    let ws = Workspace::new();
    let path = ws.article("broken.md", "---\ntitle: [unterminated\n---\n\nBody\n");

    let err = convert(&path, &ws.config(FakeRenderer::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::FrontMatter { .. }), "got: {err}");
    assert!(!ws.posts().join("broken.md").exists());
}

#[tokio::test]
async fn missing_source_file_is_fatal() {
    let ws = Workspace::new();
    let err = convert(ws.root().join("drafts/nope.md"), &ws.config(FakeRenderer::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::FileNotFound { .. }), "got: {err}");
}

// ── Image relocation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn body_images_are_relocated_and_copied() {
    let ws = Workspace::new();
    ws.add_image("img/one.png", b"one");
    ws.add_image("two.jpg", b"two");
    let path = ws.article(
        "gallery.md",
        "---\ntitle: G\n---\n\n![first](/img/one.png)\n\n* ![second](two.jpg \"Second\")\n\n![again](/img/one.png)\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    assert!(output.markdown.contains("![first](./assets/gallery/one.png)"));
    assert!(output
        .markdown
        .contains("* ![second](./assets/gallery/two.jpg \"Second\")"));
    assert!(output.markdown.contains("![again](./assets/gallery/one.png)"));
    assert_eq!(
        std::fs::read(ws.posts().join("assets/gallery/one.png")).unwrap(),
        b"one"
    );
    assert_eq!(
        std::fs::read(ws.posts().join("assets/gallery/two.jpg")).unwrap(),
        b"two"
    );
    // Same source referenced twice: one copy, two reported references.
    assert_eq!(output.stats.assets_total, 3);
    assert_eq!(output.stats.assets_copied, 3);
}

#[tokio::test]
async fn missing_image_is_reported_not_fatal() {
    let ws = Workspace::new();
    let path = ws.article("gone.md", "---\ntitle: T\n---\n\n![lost](/img/lost.png)\n");

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    assert!(output.markdown.contains("![lost](./assets/gone/lost.png)"));
    assert!(!output.is_complete());
    assert_eq!(output.stats.assets_failed, 1);
    assert!(matches!(
        output.assets[0].error,
        Some(AssetError::SourceNotFound { .. })
    ));
}

#[tokio::test]
async fn inline_data_uri_is_written_to_assets() {
    let ws = Workspace::new();
    let path = ws.article(
        "inline.md",
        "---\ntitle: T\n---\n\n![dot](data:image/png;base64,aGVsbG8=)\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    assert!(output.markdown.contains("![dot](./assets/inline/inline-0.png)"));
    assert_eq!(
        std::fs::read(ws.posts().join("assets/inline/inline-0.png")).unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn reference_style_images_are_relocated() {
    let ws = Workspace::new();
    ws.add_image("img/logo.png", b"logo");
    let path = ws.article(
        "refs.md",
        "---\ntitle: Refs\n---\n\nSee ![the logo][logo] and [home][site].\n\n[logo]: /img/logo.png \"Logo\"\n[site]: https://example.com/\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    assert!(
        output
            .markdown
            .contains("![the logo](./assets/refs/logo.png \"Logo\")"),
        "got:\n{}",
        output.markdown
    );
    assert!(output.markdown.contains("[home](https://example.com/)"));
    assert_eq!(
        std::fs::read(ws.posts().join("assets/refs/logo.png")).unwrap(),
        b"logo"
    );
}

#[tokio::test]
async fn unfetchable_cover_still_points_into_assets() {
    let ws = Workspace::new();
    let path = ws.article(
        "ftp.md",
        "---\ntitle: T\nimage:\n  src: ftp://files.example.com/covers/c.png\n---\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    assert_eq!(output.front_matter.as_ref().unwrap().cover_image, "./assets/ftp/c.png");
    assert!(!output.is_complete());
    assert!(matches!(
        output.assets[0].error,
        Some(AssetError::UnsupportedScheme { .. })
    ));
}

// ── Diagrams ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn diagrams_replaced_in_document_order() {
    let ws = Workspace::new();
    let path = ws.article(
        "flows.md",
        "---\ntitle: Flows\n---\n\n```mermaid\ngraph TD;\n  A-->B;\n```\n\nBetween.\n\n```mermaid\nsequenceDiagram\n  A->>B: hi\n```\n\n```rust\nfn main() {}\n```\n\n```mermaid\npie\n  \"a\" : 1\n```\n",
    );
    let renderer = FakeRenderer::new();

    let output = convert(&path, &ws.config(renderer.clone())).await.unwrap();

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    let expected = "\n\n![Mermaid diagram diagram-0.png](./assets/flows/diagram-0.png)\n\nBetween.\n\n![Mermaid diagram diagram-1.png](./assets/flows/diagram-1.png)\n\n```rust\nfn main() {}\n```\n\n![Mermaid diagram diagram-2.png](./assets/flows/diagram-2.png)\n";
    assert!(output.markdown.ends_with(expected), "got:\n{}", output.markdown);

    for i in 0..3 {
        let png = ws.posts().join(format!("assets/flows/diagram-{i}.png"));
        assert_eq!(image::image_dimensions(&png).unwrap(), (8, 6));
        let sidecar = ws.posts().join(format!("assets/flows/temp-diagram-{i}.png.mmd"));
        assert!(!sidecar.exists());
    }
    assert_eq!(
        output.diagrams.iter().map(|d| d.index).collect::<Vec<_>>(),
        [0, 1, 2]
    );
    assert_eq!(output.stats.diagrams_rendered, 3);
}

#[tokio::test]
async fn failing_diagram_keeps_its_code_block() {
    let ws = Workspace::new();
    let path = ws.article(
        "mixed.md",
        "---\ntitle: Mixed\n---\n\n```mermaid\ninvalid syntax\n```\n\n```mermaid\ngraph LR;\n```\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    assert!(output.markdown.contains("```mermaid\ninvalid syntax\n```"));
    assert!(output
        .markdown
        .contains("![Mermaid diagram diagram-1.png](./assets/mixed/diagram-1.png)"));
    assert!(matches!(
        output.diagrams[0].error,
        Some(DiagramError::RenderFailed { index: 0, .. })
    ));
    assert_eq!(output.stats.diagrams_failed, 1);
    assert!(!ws.posts().join("assets/mixed/temp-diagram-0.png.mmd").exists());
}

#[tokio::test]
async fn image_named_like_a_diagram_does_not_overwrite_it() {
    let ws = Workspace::new();
    ws.add_image("diagram-0.png", b"user screenshot");
    let path = ws.article(
        "clash.md",
        "---\ntitle: Clash\n---\n\n![shot](/diagram-0.png)\n\n```mermaid\ngraph TD;\n```\n",
    );

    let output = convert(&path, &ws.config(FakeRenderer::new())).await.unwrap();

    let png = ws.posts().join("assets/clash/diagram-0.png");
    assert_eq!(image::image_dimensions(&png).unwrap(), (8, 6));
    assert!(matches!(
        output.assets[0].error,
        Some(AssetError::NameCollision { ref kept, .. }) if kept == "diagram 0"
    ));
    assert!(output.diagrams[0].error.is_none());
    assert!(!output.is_complete());
}

#[tokio::test]
async fn tilde_fence_style_survives_diagram_replacement() {
    let ws = Workspace::new();
    let path = ws.article(
        "tilde.md",
        "```mermaid\ninvalid\n```\n\n```mermaid\ngraph TD;\n```\n",
    );
    let config = ConversionConfig::builder()
        .images_root(ws.images())
        .output_dir(ws.posts())
        .renderer(FakeRenderer::new())
        .fence('~')
        .build()
        .unwrap();

    let output = convert(&path, &config).await.unwrap();

    assert!(
        output.markdown.ends_with(
            "~~~mermaid\ninvalid\n~~~\n\n![Mermaid diagram diagram-1.png](./assets/tilde/diagram-1.png)\n"
        ),
        "got:\n{}",
        output.markdown
    );
}

#[tokio::test]
async fn missing_mermaid_cli_leaves_blocks_in_place() {
    let ws = Workspace::new();
    let path = ws.article("nocli.md", "```mermaid\ngraph TD;\n```\n");
    let config = ConversionConfig::builder()
        .images_root(ws.images())
        .output_dir(ws.posts())
        .mmdc_program(ws.root().join("no-such-mmdc"))
        .build()
        .unwrap();

    let output = convert(&path, &config).await.unwrap();

    assert!(output.markdown.ends_with("```mermaid\ngraph TD;\n```\n"));
    assert!(output.diagrams[0].error.is_some());
}

// ── Whole-run properties ─────────────────────────────────────────────────────

#[tokio::test]
async fn conversion_is_idempotent() {
    let ws = Workspace::new();
    ws.add_image("a.png", b"a");
    let path = ws.article(
        "same.md",
        "---\ntitle: Same\ntags: [x]\nimage:\n  src: a.png\n---\n\n# Heading\n\n- one\n- two\n\n![a](/a.png)\n\n```mermaid\ngraph TD;\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
    );
    let config = ws.config(FakeRenderer::new());

    let first = convert(&path, &config).await.unwrap();
    let second = convert(&path, &config).await.unwrap();

    assert_eq!(first.markdown, second.markdown);
    assert_eq!(
        std::fs::read_to_string(ws.posts().join("same.md")).unwrap(),
        second.markdown
    );
}

#[tokio::test]
async fn progress_callback_sees_every_item() {
    #[derive(Default)]
    struct Counter {
        copied: AtomicUsize,
        failed: AtomicUsize,
        diagrams: AtomicUsize,
        done: AtomicUsize,
    }

    impl ConversionProgressCallback for Counter {
        fn on_asset_copied(&self, _reference: &str, _link: &str) {
            self.copied.fetch_add(1, Ordering::SeqCst);
        }
        fn on_asset_error(&self, _reference: &str, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_diagram_complete(&self, _index: usize, _total: usize) {
            self.diagrams.fetch_add(1, Ordering::SeqCst);
        }
        fn on_conversion_complete(&self, _total: usize, _rendered: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    let ws = Workspace::new();
    ws.add_image("ok.png", b"ok");
    let path = ws.article(
        "events.md",
        "![ok](/ok.png) ![missing](/missing.png)\n\n```mermaid\ngraph TD;\n```\n",
    );
    let counter = Arc::new(Counter::default());
    let config = ConversionConfig::builder()
        .images_root(ws.images())
        .output_dir(ws.posts())
        .renderer(FakeRenderer::new())
        .progress_callback(counter.clone())
        .build()
        .unwrap();

    convert(&path, &config).await.unwrap();

    assert_eq!(counter.copied.load(Ordering::SeqCst), 1);
    assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.diagrams.load(Ordering::SeqCst), 1);
    assert_eq!(counter.done.load(Ordering::SeqCst), 1);
}
