//! Text cleanup: deterministic normalisation of user-entered free text.
//!
//! Form fields arrive pasted from word processors, chat apps and browser
//! text areas. Before anything is laid out, each value passes through the
//! same ordered rules so both backends see identical text:
//!
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
//! 3. Replace remaining control characters (tabs become a space)
//! 4. Collapse runs of spaces inside a line
//! 5. Trim trailing whitespace per line
//! 6. Collapse 2+ blank lines down to 1
//! 7. Trim leading and trailing blank lines
//!
//! [`clean_markdown`] is the final pass over a generated Markdown document.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every free-text rule in order.
pub fn normalise_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = replace_control_chars(&s);
    let s = collapse_inner_spaces(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Split normalised text into paragraphs at blank lines.
pub fn paragraphs(text: &str) -> Vec<String> {
    RE_PARAGRAPH_BREAK
        .split(text)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Final pass over generated Markdown: LF endings, no trailing spaces, at
/// most one blank line in a row, exactly one final newline.
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

/// Escape characters that would start Markdown syntax inside inline text.
pub fn escape_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '`' | '*' | '_' | '[' | ']' | '#' | '|' | '<' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Replace control characters ──────────────────────────────────────

fn replace_control_chars(input: &str) -> String {
    input
        .chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            '\t' | '\u{00A0}' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

// ── Rule 4: Collapse runs of spaces ─────────────────────────────────────────

static RE_SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn collapse_inner_spaces(input: &str) -> String {
    input
        .lines()
        .map(|line| {
            let indent = line.len() - line.trim_start_matches(' ').len();
            let body = RE_SPACE_RUNS.replace_all(&line[indent..], " ");
            format!("{}{}", &line[..indent], body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}
