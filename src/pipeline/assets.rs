//! Asset relocation: rewrite image references and copy the files they name
//! into the per-document assets directory.
//!
//! Relocation happens in two phases:
//!
//! 1. **Plan** (synchronous): every reference is classified, its target
//!    file name chosen, and the reference in the tree rewritten to
//!    `./assets/<stem>/<name>` immediately. The result is a list of
//!    [`CopyJob`]s.
//! 2. **Copy** (async): [`copy_all`] runs every job concurrently and joins
//!    them. Failures are reported per asset and never abort the run; the
//!    rewritten reference is kept even if its copy failed.
//!
//! ## Reference kinds
//!
//! | Reference | Source |
//! |-----------|--------|
//! | `/img/a.png` | `<images_root>/img/a.png` |
//! | `img/a.png` | `<images_root>/img/a.png` |
//! | `https://host/a.png` | downloaded |
//! | `data:image/png;base64,…` | decoded, stored as `inline-<n>.png` |
//! | `ftp:`, `mailto:` and other schemes | not fetched; rewritten and reported |
//!
//! Every reference ends up pointing into `./assets/<stem>/`, whether or not
//! its bytes can be fetched.

use crate::config::ConversionConfig;
use crate::error::AssetError;
use crate::output::{AssetKind, AssetResult};
use crate::pipeline::diagram;
use crate::progress::ProgressCallback;
use base64::Engine;
use comrak::nodes::{AstNode, NodeValue};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]+):").unwrap());

/// Where a document's assets live on disk and how the output refers to them.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    pub images_root: PathBuf,
    pub assets_dir: PathBuf,
    /// `./assets/<stem>/`
    pub link_prefix: String,
}

impl AssetLayout {
    pub fn new(config: &ConversionConfig, stem: &str) -> Self {
        Self {
            images_root: config.images_root.clone(),
            assets_dir: config.assets_dir_for(stem),
            link_prefix: format!("./{}/{}/", config.assets_dir_name, stem),
        }
    }

    /// Output-relative reference to a file in the assets directory.
    pub fn link(&self, file_name: &str) -> String {
        format!("{}{}", self.link_prefix, file_name)
    }

    /// On-disk path of a file in the assets directory.
    pub fn target(&self, file_name: &str) -> PathBuf {
        self.assets_dir.join(file_name)
    }

    /// Resolve a local reference against the images root. Leading slashes
    /// root the path there; relative paths are joined as-is.
    pub fn resolve_local(&self, reference: &str) -> PathBuf {
        self.images_root.join(reference.trim_start_matches('/'))
    }
}

/// Where the bytes of an asset come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    File(PathBuf),
    Remote(String),
    Inline(Vec<u8>),
}

impl AssetSource {
    fn describe(&self) -> String {
        match self {
            AssetSource::File(path) => path.display().to_string(),
            AssetSource::Remote(url) => url.clone(),
            AssetSource::Inline(bytes) => format!("<{} inline bytes>", bytes.len()),
        }
    }
}

/// One copy into the assets directory, possibly shared by several references.
#[derive(Debug, Clone)]
pub struct CopyJob {
    pub kind: AssetKind,
    pub reference: String,
    pub link: String,
    pub source: AssetSource,
    pub target: PathBuf,
    /// Further references that resolved to the same source and target.
    pub aliases: Vec<(AssetKind, String)>,
}

/// The planned copies plus references that were rewritten without a copy.
#[derive(Debug, Default)]
pub struct AssetPlan {
    pub jobs: Vec<CopyJob>,
    pub skipped: Vec<AssetResult>,
}

/// Collects copy jobs while references are rewritten.
#[derive(Debug)]
pub struct AssetPlanner<'a> {
    layout: &'a AssetLayout,
    plan: AssetPlan,
    /// file name → index into `plan.jobs`
    claimed: HashMap<String, usize>,
    /// file names written by the rasterizer → diagram label
    reserved: HashMap<String, String>,
    inline_count: usize,
}

impl<'a> AssetPlanner<'a> {
    pub fn new(layout: &'a AssetLayout) -> Self {
        Self {
            layout,
            plan: AssetPlan::default(),
            claimed: HashMap::new(),
            reserved: HashMap::new(),
            inline_count: 0,
        }
    }

    pub fn layout(&self) -> &AssetLayout {
        self.layout
    }

    /// Keep the file names of `count` diagrams (image and sidecar) out of
    /// reach of copied assets.
    pub fn reserve_diagrams(&mut self, count: usize) {
        for index in 0..count {
            let label = format!("diagram {index}");
            self.reserved.insert(diagram::file_name(index), label.clone());
            self.reserved.insert(diagram::sidecar_name(index), label);
        }
    }

    /// Plan the relocation of one reference and return the rewritten one.
    ///
    /// References whose bytes cannot be fetched are still rewritten; the
    /// problem is recorded as a skipped asset.
    pub fn plan(&mut self, kind: AssetKind, reference: &str) -> String {
        let scheme = RE_SCHEME
            .captures(reference)
            .map(|caps| caps[1].to_ascii_lowercase());

        let (source, file_name) = match scheme.as_deref() {
            None => {
                let path = self.layout.resolve_local(reference);
                let name = if reference.is_empty() {
                    None
                } else {
                    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
                };
                (AssetSource::File(path), name)
            }
            Some("http") | Some("https") => {
                (AssetSource::Remote(reference.to_string()), remote_file_name(reference))
            }
            Some("data") => match decode_data_uri(reference) {
                Ok((bytes, ext)) => {
                    let name = format!("inline-{}.{}", self.inline_count, ext);
                    self.inline_count += 1;
                    (AssetSource::Inline(bytes), Some(name))
                }
                Err(error) => {
                    let link = self.layout.link(&last_segment(reference).unwrap_or_default());
                    warn!("Inline image not decoded, rewritten to {}: {}", link, error);
                    return self.skip(kind, reference, link, error);
                }
            },
            Some(other) => {
                let link = self.layout.link(&last_segment(reference).unwrap_or_default());
                warn!("'{}' reference cannot be fetched, rewritten to {}", other, link);
                let error = AssetError::UnsupportedScheme {
                    reference: reference.to_string(),
                    scheme: other.to_string(),
                };
                return self.skip(kind, reference, link, error);
            }
        };

        let Some(file_name) = file_name else {
            let link = self.layout.link("");
            warn!("Reference '{}' has no file name; rewritten to {}", reference, link);
            let error = AssetError::MissingFileName {
                reference: reference.to_string(),
            };
            return self.skip(kind, reference, link, error);
        };

        let link = self.layout.link(&file_name);

        if let Some(owner) = self.reserved.get(&file_name) {
            warn!(
                "'{}' would overwrite the output of {}; skipping copy",
                reference, owner
            );
            let error = AssetError::NameCollision {
                reference: reference.to_string(),
                file_name,
                kept: owner.clone(),
            };
            return self.skip(kind, reference, link, error);
        }

        if let Some(&index) = self.claimed.get(&file_name) {
            let existing = &mut self.plan.jobs[index];
            if existing.source == source {
                existing.aliases.push((kind, reference.to_string()));
                return link;
            }
            warn!(
                "'{}' would overwrite '{}' (from '{}'); skipping copy",
                reference, file_name, existing.reference
            );
            let error = AssetError::NameCollision {
                reference: reference.to_string(),
                file_name,
                kept: existing.reference.clone(),
            };
            return self.skip(kind, reference, link, error);
        }

        debug!("Planned {} → {}", source.describe(), link);
        self.claimed.insert(file_name.clone(), self.plan.jobs.len());
        self.plan.jobs.push(CopyJob {
            kind,
            reference: truncate_reference(reference),
            link: link.clone(),
            source,
            target: self.layout.target(&file_name),
            aliases: Vec::new(),
        });
        link
    }

    /// Record a rewritten reference that gets no copy.
    fn skip(&mut self, kind: AssetKind, reference: &str, link: String, error: AssetError) -> String {
        self.plan.skipped.push(AssetResult {
            kind,
            reference: truncate_reference(reference),
            link: link.clone(),
            target: None,
            bytes: 0,
            error: Some(error),
        });
        link
    }

    pub fn finish(self) -> AssetPlan {
        self.plan
    }
}

/// Rewrite every image in the tree and plan its copy, in document order.
///
/// Reference-style images were resolved by the parser, so they are
/// rewritten like inline ones.
pub fn relocate_images<'a>(root: &'a AstNode<'a>, planner: &mut AssetPlanner<'_>) {
    for node in root.descendants() {
        let mut ast = node.data.borrow_mut();
        if let NodeValue::Image(ref mut image) = ast.value {
            image.url = planner.plan(AssetKind::Image, &image.url);
        }
    }
}

/// Run every copy job concurrently and wait for all of them.
///
/// Returns one [`AssetResult`] per reference (aliases included), in job
/// order.
pub async fn copy_all(
    jobs: Vec<CopyJob>,
    config: &ConversionConfig,
    progress: Option<&ProgressCallback>,
) -> Vec<AssetResult> {
    let client = if jobs
        .iter()
        .any(|job| matches!(job.source, AssetSource::Remote(_)))
    {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| warn!("HTTP client unavailable: {}", e))
            .ok()
    } else {
        None
    };

    let outcomes = join_all(jobs.iter().map(|job| {
        let client = client.as_ref();
        async move {
            let outcome = run_job(job, client).await;
            match &outcome {
                Ok(bytes) => {
                    debug!("Copied {} ({} bytes)", job.link, bytes);
                    if let Some(cb) = progress {
                        cb.on_asset_copied(&job.reference, &job.link);
                    }
                }
                Err(e) => {
                    warn!("Asset not copied: {}", e);
                    if let Some(cb) = progress {
                        cb.on_asset_error(&job.reference, &e.to_string());
                    }
                }
            }
            outcome
        }
    }))
    .await;

    let mut results = Vec::with_capacity(jobs.len());
    for (job, outcome) in jobs.into_iter().zip(outcomes) {
        let (bytes, error) = match outcome {
            Ok(bytes) => (bytes, None),
            Err(e) => (0, Some(e)),
        };
        let references = std::iter::once((job.kind, job.reference)).chain(job.aliases);
        for (kind, reference) in references {
            results.push(AssetResult {
                kind,
                reference,
                link: job.link.clone(),
                target: Some(job.target.clone()),
                bytes,
                error: error.clone(),
            });
        }
    }
    results
}

async fn run_job(job: &CopyJob, client: Option<&reqwest::Client>) -> Result<u64, AssetError> {
    match &job.source {
        AssetSource::File(path) => tokio::fs::copy(path, &job.target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound && !path.exists() {
                AssetError::SourceNotFound {
                    reference: job.reference.clone(),
                    path: path.clone(),
                }
            } else {
                AssetError::CopyFailed {
                    reference: job.reference.clone(),
                    target: job.target.clone(),
                    detail: e.to_string(),
                }
            }
        }),
        AssetSource::Remote(url) => {
            let client = client.ok_or_else(|| AssetError::DownloadFailed {
                url: url.clone(),
                detail: "no HTTP client".into(),
            })?;
            let bytes = download(client, url).await?;
            write_bytes(job, &bytes).await
        }
        AssetSource::Inline(bytes) => write_bytes(job, bytes).await,
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, AssetError> {
    let failed = |detail: String| AssetError::DownloadFailed {
        url: url.to_string(),
        detail,
    };

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed("timed out".into())
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    Ok(bytes.to_vec())
}

async fn write_bytes(job: &CopyJob, bytes: &[u8]) -> Result<u64, AssetError> {
    tokio::fs::write(&job.target, bytes)
        .await
        .map(|()| bytes.len() as u64)
        .map_err(|e| AssetError::CopyFailed {
            reference: job.reference.clone(),
            target: job.target.clone(),
            detail: e.to_string(),
        })
}

/// Text after the last `/`, ignoring any query or fragment.
fn last_segment(reference: &str) -> Option<String> {
    let path = reference.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Last non-empty path segment of a URL.
fn remote_file_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

/// Decode a base64 `data:` URI into its bytes and a file extension.
fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, &'static str), AssetError> {
    let invalid = |detail: &str| AssetError::InvalidDataUri {
        detail: detail.to_string(),
    };

    let rest = &uri["data:".len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator"))?;
    let Some(mime) = meta.strip_suffix(";base64") else {
        return Err(invalid("only base64 data URIs are supported"));
    };
    let mime = mime.split(';').next().unwrap_or_default();

    let ext = match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    };

    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| invalid(&e.to_string()))?;
    Ok((bytes, ext))
}

/// Data URIs can be megabytes long; keep reports readable.
fn truncate_reference(reference: &str) -> String {
    const MAX: usize = 64;
    if reference.len() <= MAX || !reference.starts_with("data:") {
        return reference.to_string();
    }
    let mut end = MAX;
    while !reference.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &reference[..end])
}

/// Ensure the assets directory exists before anything is copied into it.
pub async fn ensure_assets_dir(dir: &Path) -> Result<(), crate::error::ConvertError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| crate::error::ConvertError::CreateDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}
