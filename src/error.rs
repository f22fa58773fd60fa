//! Error types for the md2post library.
//!
//! Two tiers of failure, three types:
//!
//! * [`ConvertError`] (**fatal**): the conversion cannot proceed at all
//!   (missing source file, unparsable front matter, output not writable).
//!   Returned as `Err(ConvertError)` from the top-level `convert*` functions.
//!
//! * [`AssetError`] (**non-fatal**): one referenced image could not be
//!   copied, downloaded or decoded. Stored inside
//!   [`crate::output::AssetResult`]; the rewritten reference stays in the
//!   output document and may dangle.
//!
//! * [`DiagramError`] (**non-fatal**): one diagram failed to render. Stored
//!   inside [`crate::output::DiagramResult`]; the diagram's code block stays
//!   in the output document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the md2post library.
///
/// Per-asset and per-diagram failures use [`AssetError`] and
/// [`DiagramError`] and never abort a run.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source Markdown file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The source file could not be read for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but is not valid UTF-8 text.
    #[error("File is not valid UTF-8: '{path}' (invalid byte at offset {offset})")]
    NotUtf8 { path: PathBuf, offset: usize },

    /// The path has no usable file name to derive the document stem from.
    #[error("Cannot derive a document name from '{path}'")]
    NoFileStem { path: PathBuf },

    // ── Front-matter errors ───────────────────────────────────────────────
    /// The YAML front-matter block is malformed.
    #[error("Front matter is not valid YAML: {detail}")]
    FrontMatter { detail: String },

    /// The YAML front-matter block parsed, but its root is not a mapping.
    #[error("Front matter must be a YAML mapping at the top level, found {found}")]
    FrontMatterNotMapping { found: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output or assets directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AssetError {
    /// The resolved source file does not exist.
    #[error("'{reference}': source file not found at '{path}'")]
    SourceNotFound { reference: String, path: PathBuf },

    /// Copying or writing the asset failed.
    #[error("'{reference}': copy to '{target}' failed: {detail}")]
    CopyFailed {
        reference: String,
        target: PathBuf,
        detail: String,
    },

    /// A remote image could not be downloaded.
    #[error("'{url}': download failed: {detail}")]
    DownloadFailed { url: String, detail: String },

    /// A `data:` URI was not base64 or could not be decoded.
    #[error("inline image could not be decoded: {detail}")]
    InvalidDataUri { detail: String },

    /// The reference uses a scheme that cannot be fetched (`ftp:`, `mailto:` …).
    #[error("'{reference}': '{scheme}' references cannot be fetched, not copied")]
    UnsupportedScheme { reference: String, scheme: String },

    /// The reference resolves to a path without a file name.
    #[error("'{reference}': no file name to copy")]
    MissingFileName { reference: String },

    /// A different source already claimed this file name in the assets directory.
    #[error("'{reference}': '{file_name}' is already taken by '{kept}', not copied")]
    NameCollision {
        reference: String,
        file_name: String,
        kept: String,
    },
}

/// A non-fatal error for a single diagram.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum DiagramError {
    /// The diagram source could not be written to its sidecar file.
    #[error("Diagram {index}: writing source to '{path}' failed: {detail}")]
    SidecarWrite {
        index: usize,
        path: PathBuf,
        detail: String,
    },

    /// The renderer reported a failure.
    #[error("Diagram {index}: renderer '{renderer}' failed: {detail}")]
    RenderFailed {
        index: usize,
        renderer: String,
        detail: String,
    },

    /// The renderer did not finish within the configured timeout.
    #[error("Diagram {index}: rendering timed out after {secs}s")]
    Timeout { index: usize, secs: u64 },

    /// The renderer finished but the output is missing or not an image.
    #[error("Diagram {index}: output '{path}' is not a readable image: {detail}")]
    InvalidOutput {
        index: usize,
        path: PathBuf,
        detail: String,
    },
}

/// Failure reported by a [`crate::pipeline::render::DiagramRenderer`].
///
/// Converted into [`DiagramError::RenderFailed`] by the rasterizer, which
/// knows the diagram index.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer process could not be started.
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The renderer process exited unsuccessfully.
    #[error("exit status {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    /// An HTTP rendering service returned an error.
    #[error("{0}")]
    Http(String),

    /// Reading input or writing output failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
