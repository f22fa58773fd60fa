//! Markdown parsing.
//!
//! Front matter is split off the text first; only the body goes through
//! comrak. A block counts as front matter when the very first line is `---`
//! (YAML) or `+++` (TOML) and a matching closing line follows.
//!
//! The body is parsed with the GFM extensions (tables, strikethrough,
//! autolinks, task lists, footnotes). Reference-style links and images are
//! resolved by the parser, so every image in the tree carries its final URL.

use crate::config::WriterStyle;
use comrak::nodes::AstNode;
use comrak::{Arena, ListStyleType, Options};
use tracing::debug;

/// Front-matter flavour, chosen by the opening delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontMatterKind {
    Yaml,
    Toml,
}

impl FrontMatterKind {
    pub fn delimiter(self) -> &'static str {
        match self {
            FrontMatterKind::Yaml => "---",
            FrontMatterKind::Toml => "+++",
        }
    }
}

/// A front-matter block without its delimiter lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatterBlock<'a> {
    pub kind: FrontMatterKind,
    pub content: &'a str,
}

/// Source text split into its front matter and Markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDocument<'a> {
    pub front_matter: Option<FrontMatterBlock<'a>>,
    pub body: &'a str,
}

/// Split a leading front-matter block off `text`.
///
/// An unclosed block is not front matter; the whole text is then body.
pub fn split_front_matter(text: &str) -> SplitDocument<'_> {
    let whole = SplitDocument {
        front_matter: None,
        body: text,
    };

    let Some((first, content_start)) = next_line(text, 0) else {
        return whole;
    };
    let kind = match first.trim_end() {
        "---" => FrontMatterKind::Yaml,
        "+++" => FrontMatterKind::Toml,
        _ => return whole,
    };

    let mut line_start = content_start;
    while let Some((line, next)) = next_line(text, line_start) {
        if line.trim_end() == kind.delimiter() {
            let content = text[content_start..line_start]
                .strip_suffix('\n')
                .unwrap_or(&text[content_start..line_start]);
            return SplitDocument {
                front_matter: Some(FrontMatterBlock { kind, content }),
                body: &text[next..],
            };
        }
        line_start = next;
    }

    debug!("Opening front-matter delimiter is never closed; treating it as body");
    whole
}

fn next_line(text: &str, start: usize) -> Option<(&str, usize)> {
    if start >= text.len() {
        return None;
    }
    let rest = &text[start..];
    match rest.find('\n') {
        Some(end) => Some((&rest[..end], start + end + 1)),
        None => Some((rest, text.len())),
    }
}

/// comrak options used both to parse the body and to write it back.
pub fn options(style: &WriterStyle) -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.footnotes = true;

    options.render.list_style = match style.bullet {
        '-' => ListStyleType::Dash,
        '+' => ListStyleType::Plus,
        _ => ListStyleType::Star,
    };
    options.render.width = style.wrap_width;
    options.render.prefer_fenced = true;
    options
}

/// Parse a Markdown body into a tree allocated in `arena`.
pub fn parse_body<'a>(arena: &'a Arena<AstNode<'a>>, body: &str, options: &Options) -> &'a AstNode<'a> {
    let root = comrak::parse_document(arena, body, options);
    debug!("Parsed body: {} top-level blocks", root.children().count());
    root
}
