// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Line unfolding (RFC 5545 §3.1) and folding for output.

const FOLD_LIMIT: usize = 75;

/// Unfolds a raw iCalendar body into logical content lines.
///
/// A line that begins with a single space or horizontal tab is a
/// continuation of the previous line; the leading whitespace character is
/// removed and the remainder appended. Accepts CRLF, bare LF, or bare CR
/// line endings in the input since real-world servers are not always
/// strict about it.
#[must_use]
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in split_physical_lines(text) {
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines.into_iter().filter(|l| !l.is_empty()).collect()
}

fn split_physical_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    loop {
        match rest.find(['\r', '\n']) {
            None => {
                if !rest.is_empty() {
                    lines.push(rest);
                }
                break;
            }
            Some(idx) => {
                lines.push(&rest[..idx]);
                let tail = &rest[idx..];
                if let Some(stripped) = tail.strip_prefix("\r\n") {
                    rest = stripped;
                } else {
                    rest = &tail[1..];
                }
            }
        }
    }
    lines
}

/// Folds a single logical content line into one or more RFC 5545-compliant
/// physical lines (CRLF terminated, continuations prefixed with a single
/// space), never splitting a UTF-8 codepoint across the boundary.
#[must_use]
pub fn fold_line(line: &str) -> String {
    let mut out = String::new();
    let mut remaining = line;
    let mut first = true;

    while !remaining.is_empty() {
        let budget = if first { FOLD_LIMIT } else { FOLD_LIMIT - 1 };
        let cut = codepoint_boundary_at_or_before(remaining, budget);
        if cut >= remaining.len() {
            if !first {
                out.push(' ');
            }
            out.push_str(remaining);
            out.push_str("\r\n");
            break;
        }
        if !first {
            out.push(' ');
        }
        out.push_str(&remaining[..cut]);
        out.push_str("\r\n");
        remaining = &remaining[cut..];
        first = false;
    }

    if line.is_empty() {
        out.push_str("\r\n");
    }
    out
}

/// Folds and joins several logical lines into a complete CRLF-terminated body.
#[must_use]
pub fn fold_all<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    lines.into_iter().map(fold_line).collect()
}

fn codepoint_boundary_at_or_before(s: &str, max_bytes: usize) -> usize {
    if s.len() <= max_bytes {
        return s.len();
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfolds_continuation_lines() {
        let text = "BEGIN:VEVENT\r\nSUMMARY:Long su\r\n mmary\r\nEND:VEVENT\r\n";
        let lines = unfold(text);
        assert_eq!(
            lines,
            vec![
                "BEGIN:VEVENT".to_string(),
                "SUMMARY:Long summary".to_string(),
                "END:VEVENT".to_string(),
            ]
        );
    }

    #[test]
    fn unfolds_tab_continuation() {
        let text = "SUMMARY:Foo\r\n\tBar\r\n";
        assert_eq!(unfold(text), vec!["SUMMARY:FooBar".to_string()]);
    }

    #[test]
    fn folds_short_line_unchanged() {
        let folded = fold_line("SUMMARY:Team Meeting");
        assert_eq!(folded, "SUMMARY:Team Meeting\r\n");
    }

    #[test]
    fn folds_long_line_at_75_octets() {
        let value = "x".repeat(200);
        let line = format!("DESCRIPTION:{value}");
        let folded = fold_line(&line);
        for physical in folded.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(physical.len() <= 75);
        }
        let roundtrip = unfold(&folded);
        assert_eq!(roundtrip, vec![line]);
    }

    #[test]
    fn folds_without_splitting_utf8_codepoints() {
        let value = "\u{1F600}".repeat(40); // 4-byte emoji
        let line = format!("SUMMARY:{value}");
        let folded = fold_line(&line);
        assert!(folded.is_char_boundary(0));
        let roundtrip = unfold(&folded);
        assert_eq!(roundtrip, vec![line]);
    }
}
