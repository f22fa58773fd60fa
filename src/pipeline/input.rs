//! Input resolution: read the source Markdown file and derive its stem.
//!
//! All failures here are fatal. The file is checked for existence and read
//! permission up front so callers get a precise error instead of a generic
//! I/O message.

use crate::error::ConvertError;
use crate::pipeline::postprocess;
use std::path::Path;
use tracing::debug;

/// A source document ready for parsing.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name without extension; names the output file and assets folder.
    pub stem: String,
    /// Normalised text (no BOM, LF line endings).
    pub text: String,
}

/// Read a Markdown file from disk.
pub async fn read_source(path: &Path) -> Result<SourceDocument, ConvertError> {
    let stem = document_stem(path)?;

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConvertError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(ConvertError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let text = String::from_utf8(bytes).map_err(|e| ConvertError::NotUtf8 {
        path: path.to_path_buf(),
        offset: e.utf8_error().valid_up_to(),
    })?;

    debug!("Read {} bytes from {}", text.len(), path.display());

    Ok(SourceDocument {
        stem,
        text: postprocess::normalise_input(&text),
    })
}

/// The file name without its extension.
pub fn document_stem(path: &Path) -> Result<String, ConvertError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConvertError::NoFileStem {
            path: path.to_path_buf(),
        })
}
