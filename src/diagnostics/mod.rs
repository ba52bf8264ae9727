//! Parse diagnostics: spans, line/col, caret-highlights.

use std::fmt::Write as _;
use std::ops::Range;

/// Byte-span in the original source (inclusive start, exclusive end).
pub type Span = Range<usize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: usize, // 1-based
    pub col: usize,  // 1-based, counts chars
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub start: Location,
    pub end: Location,
}

fn offset_to_loc(src: &str, offset: usize) -> Location {
    let mut line = 1usize;
    let mut col = 1usize;
    for (idx, ch) in src.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    Location { line, col }
}

/// The source line containing `offset` and the byte offset where it starts.
fn line_at(src: &str, offset: usize) -> (&str, usize) {
    let offset = offset.min(src.len());
    let start = src[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = src[offset..].find('\n').map_or(src.len(), |i| offset + i);
    (&src[start..end], start)
}

impl Diagnostic {
    pub fn new(src: &str, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            start: offset_to_loc(src, span.start),
            end: offset_to_loc(src, span.end),
            span,
        }
    }

    /// Construct from a chumsky `Simple` error.
    pub fn from_chumsky(src: &str, e: chumsky::error::Simple<char>) -> Self {
        let found = match e.found() {
            Some(c) => format!("'{}'", c.escape_debug()),
            None => "end of input".to_string(),
        };
        let mut expected: Vec<String> = e
            .expected()
            .map(|exp| match exp {
                Some(c) => format!("'{}'", c.escape_debug()),
                None => "end of input".to_string(),
            })
            .collect();
        expected.sort();
        let message = match e.label() {
            Some(label) => format!("unexpected {found} while parsing {label}"),
            None if expected.is_empty() => format!("unexpected {found}"),
            None => format!("unexpected {found}, expected {}", expected.join(", ")),
        };
        Diagnostic::new(src, e.span(), message)
    }
}

/// Render caret-highlight under the selected span (single-line best effort).
pub fn render(src: &str, file: Option<&str>, diag: &Diagnostic) -> String {
    let (line_str, line_off) = line_at(src, diag.span.start);
    let caret_start = src[line_off..diag.span.start.min(src.len()).max(line_off)]
        .chars()
        .count();
    let line_end = line_off + line_str.len();
    let caret_len = src[diag.span.start.min(line_end)..diag.span.end.clamp(line_off, line_end)]
        .chars()
        .count()
        .max(1);

    let mut out = String::new();
    let _ = writeln!(out, "error: {}", diag.message);
    let _ = writeln!(
        out,
        "--> {}:{}:{}",
        file.unwrap_or("<input>"),
        diag.start.line,
        diag.start.col
    );
    let _ = writeln!(out, "{line_str}");
    out.push_str(&" ".repeat(caret_start));
    out.push_str(&"^".repeat(caret_len));
    out
}

pub fn render_all(src: &str, file: Option<&str>, diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(|d| render(src, file, d))
        .collect::<Vec<_>>()
        .join("\n")
}
