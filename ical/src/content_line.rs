// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Shared content-line tokenizer used by both the structural parser and
//! the patching serializer. Delimiter boundaries come from a `logos`
//! lexer, the same crate `aimcal-ical`'s `lexer.rs` uses to tokenize RFC
//! 5545 source. The token set here is narrower than the teacher's: this
//! crate only ever splits a line into name/params/value, never builds a
//! typed grammar over the value text, so the teacher's `Word`/`Symbol`/
//! `Escape`/`UnicodeText` distinctions collapse into a single `Text` run.

use logos::Logos;

/// Content-line delimiter tokens.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    #[token("\"")]
    DQuote,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("=")]
    Equal,
    #[regex(r#"[^";:=]+"#)]
    Text,
}

/// A single unfolded `NAME;PARAM=VALUE;...:VALUE` content line.
#[derive(Debug, Clone)]
pub(crate) struct ContentLine {
    pub(crate) name: String,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) value: String,
}

impl ContentLine {
    pub(crate) fn parse(raw: &str) -> Self {
        // The `Text` regex covers every byte not in `";:="`, so every
        // token lexes successfully; `Err(())` never occurs here.
        let tokens: Vec<(Token, std::ops::Range<usize>)> = Token::lexer(raw)
            .spanned()
            .filter_map(|(tok, span)| tok.ok().map(|t| (t, span)))
            .collect();

        let name_end = tokens
            .iter()
            .position(|(t, _)| matches!(t, Token::Semicolon | Token::Colon))
            .map_or(raw.len(), |i| tokens[i].1.start);
        let name = raw[..name_end].to_ascii_uppercase();

        let mut idx = tokens
            .iter()
            .position(|(_, span)| span.start >= name_end)
            .unwrap_or(tokens.len());

        let mut params = Vec::new();
        while idx < tokens.len() && tokens[idx].0 == Token::Semicolon {
            idx += 1; // skip ';'
            let pname_start = tokens.get(idx).map_or(raw.len(), |(_, s)| s.start);
            while idx < tokens.len() && tokens[idx].0 != Token::Equal {
                idx += 1;
            }
            let pname_end = tokens.get(idx).map_or(raw.len(), |(_, s)| s.start);
            let pname = raw
                .get(pname_start..pname_end)
                .unwrap_or_default()
                .to_ascii_uppercase();
            idx += 1; // skip '='

            let vstart = tokens.get(idx).map_or(raw.len(), |(_, s)| s.start);
            let mut in_quotes = false;
            while idx < tokens.len() {
                match tokens[idx].0 {
                    Token::DQuote => in_quotes = !in_quotes,
                    Token::Semicolon | Token::Colon if !in_quotes => break,
                    _ => {}
                }
                idx += 1;
            }
            let vend = tokens.get(idx).map_or(raw.len(), |(_, s)| s.start);
            let pvalue = raw
                .get(vstart..vend)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string();
            params.push((pname, pvalue));
        }

        let value = if idx < tokens.len() && tokens[idx].0 == Token::Colon {
            unescape(&raw[tokens[idx].1.end..])
        } else {
            String::new()
        };

        Self { name, params, value }
    }

    pub(crate) fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Is this line `BEGIN:<kind>` (case-insensitive on both name and kind)?
    pub(crate) fn is_begin(&self, kind: &str) -> bool {
        self.name.eq_ignore_ascii_case("BEGIN") && self.value.eq_ignore_ascii_case(kind)
    }

    /// Is this line `END:<kind>`?
    pub(crate) fn is_end(&self, kind: &str) -> bool {
        self.name.eq_ignore_ascii_case("END") && self.value.eq_ignore_ascii_case(kind)
    }
}

pub(crate) fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n' | 'N') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(';') => out.push(';'),
                Some(',') => out.push(','),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Escapes a `TEXT` value per RFC 5545 §3.3.11 for use as an output value.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}
