//! Cleanup passes applied to generated Markdown before export.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run every cleanup pass on a generated document.
pub fn run_pipeline(md: &str) -> String {
    let mut result = strip_wrapping_fence(md);

    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Unwrap a fenced document
// ---------------------------------------------------------------------------

/// Models sometimes wrap the whole answer in a ```` ```markdown ```` fence.
/// Remove the fence only when it encloses the entire document.
fn strip_wrapping_fence(md: &str) -> String {
    static OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^```(?:markdown|md)?\s*$").expect("valid regex"));

    let trimmed = md.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() < 2 {
        return md.to_string();
    }

    let opens = OPEN_RE.is_match(lines[0].trim_end());
    let closes = lines.last().is_some_and(|l| l.trim() == "```");
    // An inner fence means the last ``` may close a code block, not the wrapper.
    let inner_fences = lines[1..lines.len() - 1]
        .iter()
        .filter(|l| l.trim_start().starts_with("```"))
        .count();

    if opens && closes && inner_fences % 2 == 0 {
        lines.pop();
        lines.remove(0);
        lines.join("\n")
    } else {
        md.to_string()
    }
}

// ---------------------------------------------------------------------------
// Pass 2: Trailing whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line and normalize line endings.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing newline
// ---------------------------------------------------------------------------

/// Ensure the document ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}
