//! Front-matter transformation into the post schema.
//!
//! | Output key | Source |
//! |------------|--------|
//! | `title` | `title`, or `"Example article title"` |
//! | `published` | always `false` |
//! | `description` | `snippet`, or `"A simple test article"` |
//! | `tags` | `tags` joined with `", "` |
//! | `cover_image` | `image.src` relocated into the assets directory |

use crate::error::ConvertError;
use crate::output::{AssetKind, PostFrontMatter};
use crate::pipeline::assets::AssetPlanner;
use crate::pipeline::parse::{FrontMatterBlock, FrontMatterKind};
use serde_yaml::Value;
use tracing::{debug, info};

pub const DEFAULT_TITLE: &str = "Example article title";
pub const DEFAULT_DESCRIPTION: &str = "A simple test article";

/// The front matter of the output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenFrontMatter {
    /// The post schema, when a YAML block was written.
    pub front_matter: Option<PostFrontMatter>,
    /// The block as it appears at the top of the output, delimiters
    /// included.
    pub header: Option<String>,
}

/// Rewrite the document's front matter.
///
/// The cover image (if any) is planned on `planner` before any body image,
/// so it is always the first copy job. A TOML block is written back as is.
/// A document without front matter gets the defaults when `synthesize` is
/// set.
pub fn apply(
    block: Option<&FrontMatterBlock<'_>>,
    planner: &mut AssetPlanner<'_>,
    synthesize: bool,
) -> Result<RewrittenFrontMatter, ConvertError> {
    let input = match block {
        Some(block) if block.kind == FrontMatterKind::Toml => {
            info!("TOML front matter left unchanged");
            return Ok(RewrittenFrontMatter {
                front_matter: None,
                header: Some(fenced(FrontMatterKind::Toml, block.content)),
            });
        }
        Some(block) => parse_mapping(block.content)?,
        None if synthesize => {
            info!("No front matter found; inserting defaults");
            Value::Mapping(Default::default())
        }
        None => {
            return Ok(RewrittenFrontMatter {
                front_matter: None,
                header: None,
            })
        }
    };

    let front_matter = transform(&input, planner);
    let header = fenced(FrontMatterKind::Yaml, &render(&front_matter)?);
    debug!("Front matter rewritten: cover_image = {}", front_matter.cover_image);
    Ok(RewrittenFrontMatter {
        front_matter: Some(front_matter),
        header: Some(header),
    })
}

fn fenced(kind: FrontMatterKind, content: &str) -> String {
    let delimiter = kind.delimiter();
    if content.is_empty() {
        format!("{delimiter}\n{delimiter}\n")
    } else {
        format!("{delimiter}\n{content}\n{delimiter}\n")
    }
}

/// Parse a front-matter block. An empty block is an empty mapping.
pub fn parse_mapping(text: &str) -> Result<Value, ConvertError> {
    if text.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }
    let value: Value = serde_yaml::from_str(text).map_err(|e| ConvertError::FrontMatter {
        detail: e.to_string(),
    })?;
    match value {
        Value::Mapping(_) => Ok(value),
        Value::Null => Ok(Value::Mapping(Default::default())),
        other => Err(ConvertError::FrontMatterNotMapping {
            found: kind_name(&other).to_string(),
        }),
    }
}

/// Map input keys onto the post schema, planning the cover-image copy.
pub fn transform(input: &Value, planner: &mut AssetPlanner<'_>) -> PostFrontMatter {
    let cover_image = match cover_source(input) {
        Some(src) => planner.plan(AssetKind::Cover, src),
        None => planner.layout().link(""),
    };

    PostFrontMatter {
        title: non_empty_scalar(input, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        published: false,
        description: non_empty_scalar(input, "snippet")
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        tags: join_tags(input.get("tags")),
        cover_image,
    }
}

fn render(front_matter: &PostFrontMatter) -> Result<String, ConvertError> {
    serde_yaml::to_string(front_matter)
        .map(|s| s.trim_end().to_string())
        .map_err(|e| ConvertError::Internal(format!("front matter serialisation: {e}")))
}

fn cover_source(input: &Value) -> Option<&str> {
    input
        .get("image")?
        .get("src")?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// A string, number or boolean value rendered as text; empty strings count
/// as missing.
fn non_empty_scalar(input: &Value, key: &str) -> Option<String> {
    scalar_string(input.get(key)?).filter(|s| !s.is_empty())
}

fn join_tags(tags: Option<&Value>) -> String {
    match tags {
        None | Some(Value::Null) => String::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(scalar_string)
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => scalar_string(other).unwrap_or_default(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        _ => None,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
