//! Byte pattern rules evaluated over memory windows.
//!
//! A rule source is one of:
//!
//! * a double-quoted string literal: `"ui_boot"`
//! * a hex byte pattern with `??` wildcards: `48 8B ?? 05`
//! * a regular expression between slashes: `/foo[0-9]+/`
//!
//! The regular expression engine is an external dependency; this module only
//! owns the integration contract, so swapping the engine stays local.

use crate::error::Error;
use regex::bytes::Regex;
use std::fmt;

/// Longest window overlap reserved for unsized (regex) rules.
const REGEX_OVERLAP: usize = 255;

#[derive(Debug, Clone)]
pub struct PatternRule {
    source: String,
    kind: RuleKind,
}

#[derive(Debug, Clone)]
enum RuleKind {
    /// Literal byte needle.
    Bytes(Vec<u8>),
    /// Hex pattern with wildcard positions masked out. `mask[i]` is set for
    /// significant bytes.
    Masked { bytes: Vec<u8>, mask: Vec<bool> },
    Regex(Regex),
}

impl PatternRule {
    /// Compile a rule from its source form.
    pub fn compile(source: &str) -> Result<PatternRule, Error> {
        let trimmed = source.trim();

        let kind = if trimmed.len() >= 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
            let re = Regex::new(&trimmed[1..trimmed.len() - 1])
                .map_err(|e| Error::RuleCompile(e.to_string()))?;
            RuleKind::Regex(re)
        } else if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            let bytes = unescape(&trimmed[1..trimmed.len() - 1])?;

            if bytes.is_empty() {
                return Err(Error::RuleCompile(String::from("empty string literal")));
            }

            RuleKind::Bytes(bytes)
        } else {
            parse_hex_pattern(trimmed)?
        };

        Ok(PatternRule {
            source: source.to_string(),
            kind,
        })
    }

    /// The source the rule was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// How many bytes of window overlap the rule needs so matches crossing a
    /// window boundary are not lost.
    pub fn window_overlap(&self) -> usize {
        match &self.kind {
            RuleKind::Bytes(bytes) => bytes.len().saturating_sub(1),
            RuleKind::Masked { bytes, .. } => bytes.len().saturating_sub(1),
            RuleKind::Regex(..) => REGEX_OVERLAP,
        }
    }

    /// Scan a window, yielding `(offset, length)` for every match.
    pub fn scan(&self, data: &[u8]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();

        match &self.kind {
            RuleKind::Bytes(needle) => find_all(needle, data, &mut out),
            RuleKind::Masked { bytes, mask } => find_all_masked(bytes, mask, data, &mut out),
            RuleKind::Regex(re) => {
                out.extend(re.find_iter(data).map(|m| (m.start(), m.end() - m.start())));
            }
        }

        out
    }
}

impl fmt::Display for PatternRule {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.source.fmt(fmt)
    }
}

/// Find every occurrence of a literal needle, skipping with memchr.
fn find_all(needle: &[u8], data: &[u8], out: &mut Vec<(usize, usize)>) {
    if needle.is_empty() || data.len() < needle.len() {
        return;
    }

    let last = data.len() - needle.len();
    let mut offset = 0usize;

    while offset <= last {
        let index = match memchr::memchr(needle[0], &data[offset..=last]) {
            Some(index) => offset + index,
            None => return,
        };

        if &data[index..index + needle.len()] == needle {
            out.push((index, needle.len()));
        }

        offset = index + 1;
    }
}

/// Find every occurrence of a masked pattern, anchored on its first
/// significant byte.
fn find_all_masked(bytes: &[u8], mask: &[bool], data: &[u8], out: &mut Vec<(usize, usize)>) {
    let len = bytes.len();

    if len == 0 || data.len() < len {
        return;
    }

    // compile rejects all-wildcard patterns, so an anchor exists.
    let anchor = match mask.iter().position(|m| *m) {
        Some(anchor) => anchor,
        None => return,
    };

    let last_anchor = data.len() - len + anchor;
    let mut at = anchor;

    while at <= last_anchor {
        let index = match memchr::memchr(bytes[anchor], &data[at..=last_anchor]) {
            Some(index) => at + index,
            None => return,
        };

        let start = index - anchor;

        let hit = bytes
            .iter()
            .zip(mask.iter())
            .zip(&data[start..start + len])
            .all(|((b, m), d)| !*m || b == d);

        if hit {
            out.push((start, len));
        }

        at = index + 1;
    }
}

fn parse_hex_pattern(source: &str) -> Result<RuleKind, Error> {
    let mut bytes = Vec::new();
    let mut mask = Vec::new();

    for token in source.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(0);
            mask.push(false);
            continue;
        }

        if token.len() != 2 {
            return Err(Error::RuleCompile(format!("bad pattern token: {}", token)));
        }

        let b = u8::from_str_radix(token, 16)
            .map_err(|_| Error::RuleCompile(format!("bad pattern token: {}", token)))?;

        bytes.push(b);
        mask.push(true);
    }

    if bytes.is_empty() {
        return Err(Error::RuleCompile(String::from("empty pattern")));
    }

    if mask.iter().all(|m| !*m) {
        return Err(Error::RuleCompile(String::from(
            "pattern consists only of wildcards",
        )));
    }

    if mask.iter().all(|m| *m) {
        return Ok(RuleKind::Bytes(bytes));
    }

    Ok(RuleKind::Masked { bytes, mask })
}

fn unescape(source: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(source.len());
    let mut it = source.bytes();

    while let Some(b) = it.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }

        match it.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'"') => out.push(b'"'),
            Some(b't') => out.push(b'\t'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'0') => out.push(0),
            Some(b'x') => {
                let hi = it.next();
                let lo = it.next();

                let value = match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        let s = [hi, lo];
                        let s = std::str::from_utf8(&s)
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok());
                        s
                    }
                    _ => None,
                };

                match value {
                    Some(value) => out.push(value),
                    None => {
                        return Err(Error::RuleCompile(String::from("bad \\x escape")));
                    }
                }
            }
            other => {
                return Err(Error::RuleCompile(format!(
                    "bad escape: \\{}",
                    other.map(|b| b as char).unwrap_or(' ')
                )));
            }
        }
    }

    Ok(out)
}
