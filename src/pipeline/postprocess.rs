//! Text normalisation applied around parsing and serialisation.
//!
//! Input rules run before the parser sees the text; output rules run on the
//! serialised document just before it is written. Both are pure
//! `&str → String` functions so the whole pipeline stays deterministic: the
//! same input always produces byte-identical output.

/// Normalise raw source text before parsing.
///
/// 1. Strip a leading byte-order mark
/// 2. Normalise line endings (CRLF / CR → LF)
pub fn normalise_input(input: &str) -> String {
    let s = strip_bom(input);
    normalise_line_endings(s)
}

/// Finalise serialised Markdown before it is written.
///
/// Ensures the file ends with exactly one newline.
pub fn finish_output(input: &str) -> String {
    ensure_final_newline(input)
}

// ── Rule: Strip byte-order mark ──────────────────────────────────────────────

fn strip_bom(input: &str) -> &str {
    input.strip_prefix('\u{FEFF}').unwrap_or(input)
}

// ── Rule: Normalise line endings ─────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Ensure file ends with single newline ───────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}
