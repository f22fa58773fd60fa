//! Pipeline stages for Markdown-to-post conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ frontmatter ──▶ assets ──▶ diagram ──▶ serialize
//! (read)    (comrak)  (post schema)   (relocate) (rasterize) (markdown)
//! ```
//!
//! 1. [`input`]      : read the source file, derive the stem
//! 2. [`parse`]      : split off front matter, parse the body with comrak
//! 3. [`frontmatter`]: rewrite the YAML block, plan the cover-image copy
//! 4. [`assets`]     : rewrite image references, plan and run the copies
//! 5. [`diagram`]    : render diagram blocks through a [`render`] backend
//!    and swap them for image paragraphs
//! 6. [`serialize`]  : write the tree back to Markdown, prepend front matter
//!
//! [`postprocess`] holds the text normalisation applied before parsing and
//! after serialisation.

pub mod assets;
pub mod diagram;
pub mod frontmatter;
pub mod input;
pub mod parse;
pub mod postprocess;
pub mod render;
pub mod serialize;
