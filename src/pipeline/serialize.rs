//! Markdown writer: comrak tree → CommonMark/GFM text.
//!
//! comrak's CommonMark formatter does the escaping, so parsing the written
//! body again yields the same tree. Bullet marker, wrap width and fenced
//! code are set on the shared [`comrak::Options`] built by
//! [`crate::pipeline::parse::options`]. comrak always fences with
//! backticks; tilde fences are swapped in afterwards by [`tilde_fences`].
//! The front matter is not part of the tree; [`assemble`] puts it back in
//! front of the body.

use crate::config::WriterStyle;
use crate::error::ConvertError;
use crate::pipeline::{parse, postprocess};
use comrak::nodes::{AstNode, NodeValue};
use comrak::{Arena, Options};

/// Write a parsed body back to Markdown in `style`.
pub fn to_markdown<'a>(root: &'a AstNode<'a>, style: &WriterStyle) -> Result<String, ConvertError> {
    let options = parse::options(style);
    let mut out = Vec::new();
    comrak::format_commonmark(root, &options, &mut out)
        .map_err(|e| ConvertError::Internal(format!("Markdown serialisation failed: {e}")))?;
    let written = String::from_utf8(out)
        .map_err(|e| ConvertError::Internal(format!("serialised Markdown is not UTF-8: {e}")))?;

    Ok(match style.fence {
        '~' => tilde_fences(&written, &options),
        _ => written,
    })
}

/// Rewrite every backtick fence in `written` as a tilde fence.
///
/// The text is parsed again so only real fence lines are touched; a block
/// whose content holds a run of tildes gets a longer fence.
fn tilde_fences(written: &str, options: &Options) -> String {
    let arena = Arena::new();
    let root = comrak::parse_document(&arena, written, options);
    let mut lines: Vec<String> = written.split_inclusive('\n').map(str::to_string).collect();

    for node in root.descendants() {
        let ast = node.data.borrow();
        let NodeValue::CodeBlock(ref code) = ast.value else {
            continue;
        };
        if !code.fenced || code.fence_char != b'`' {
            continue;
        }
        let ticks = "`".repeat(code.fence_length);
        let tildes = "~".repeat((longest_run(&code.literal, '~') + 1).max(3));

        // Lines and columns are 1-based; the block starts at its fence.
        let open = ast.sourcepos.start.line.saturating_sub(1);
        let column = ast.sourcepos.start.column.saturating_sub(1);
        if let Some(line) = lines.get_mut(open) {
            if line.get(column..).is_some_and(|rest| rest.starts_with(&ticks)) {
                line.replace_range(column..column + ticks.len(), &tildes);
            }
        }

        let close = open + code.literal.lines().count() + 1;
        if let Some(line) = lines.get_mut(close) {
            let content = line.trim_end_matches('\n');
            if let Some(prefix) = content.strip_suffix(ticks.as_str()) {
                if prefix.chars().all(|c| c == ' ' || c == '>') {
                    let start = prefix.len();
                    line.replace_range(start..start + ticks.len(), &tildes);
                }
            }
        }
    }
    lines.concat()
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Join the front-matter block and the body into the final document,
/// separated by one blank line and ending in a single newline.
pub fn assemble(header: Option<&str>, body: &str) -> String {
    let mut out = String::with_capacity(header.map_or(0, str::len) + body.len() + 1);
    if let Some(header) = header {
        out.push_str(header);
        if !body.trim().is_empty() {
            out.push('\n');
        }
    }
    out.push_str(body.trim_start_matches('\n'));
    postprocess::finish_output(&out)
}
