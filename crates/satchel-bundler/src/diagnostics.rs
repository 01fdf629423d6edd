//! Source locations and code frames for error reporting.

use serde::{Deserialize, Serialize};

/// Lines of context shown above and below the offending line.
const CONTEXT_LINES: usize = 2;

/// 1-based line/column position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

/// Map a byte offset to a 1-based line and column (in characters).
///
/// Offsets past the end of the source clamp to the last position.
pub fn line_column(source: &str, offset: usize) -> SourceLoc {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);

    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;

    SourceLoc {
        line: line as u32,
        column: column as u32,
    }
}

/// Convert a 1-based line/column position to a byte offset.
pub fn line_col_to_offset(source: &str, line: u32, column: u32) -> Option<usize> {
    if line == 0 {
        return None;
    }

    let mut offset = 0;
    for (idx, text) in source.split('\n').enumerate() {
        if idx + 1 == line as usize {
            let col_bytes = if column <= 1 {
                0
            } else {
                text.char_indices()
                    .nth((column - 1) as usize)
                    .map(|(pos, _)| pos)
                    .unwrap_or(text.len())
            };
            return Some(offset + col_bytes);
        }
        offset += text.len() + 1;
    }

    None
}

/// Render a numbered excerpt of `source` around `loc` with a caret under the column.
///
/// ```
/// use satchel_bundler::diagnostics::{code_frame, SourceLoc};
///
/// let frame = code_frame("let a = 1;\nlet b = ;\n", SourceLoc { line: 2, column: 9 });
/// assert!(frame.contains("> 2 | let b = ;"));
/// ```
pub fn code_frame(source: &str, loc: SourceLoc) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() || loc.line == 0 {
        return String::new();
    }

    let target = (loc.line as usize).min(lines.len());
    let first = target.saturating_sub(CONTEXT_LINES).max(1);
    let last = (target + CONTEXT_LINES).min(lines.len());
    let width = last.to_string().len();

    let mut frame = String::new();
    for number in first..=last {
        let text = lines[number - 1];
        let marker = if number == target { '>' } else { ' ' };
        frame.push_str(&format!("{marker} {number:>width$} | {text}\n"));

        if number == target {
            let padding = " ".repeat(loc.column.saturating_sub(1) as usize);
            frame.push_str(&format!("  {:>width$} | {padding}^\n", ""));
        }
    }

    frame
}
