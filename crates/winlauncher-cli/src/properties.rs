//! `.properties` files in the Java `Properties.load` dialect.
//!
//! Keys end at the first unescaped `=`, `:` or whitespace.  Lines ending in
//! an odd number of backslashes continue on the next line, whose leading
//! whitespace is dropped.  `#` and `!` start comment lines.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::error::CliError;

#[derive(Debug, Error)]
#[error("line {line}: {reason}")]
pub struct PropertiesError {
    pub line: usize,
    pub reason: String,
}

/// Key/value pairs in file order.  A repeated key keeps its first position
/// and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

const WHITESPACE: [char; 3] = [' ', '\t', '\x0C'];

impl Properties {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|source| CliError::PropertiesUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let properties = Self::parse(&text).map_err(|source| CliError::PropertiesSyntax {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = properties.len(), "parsed properties");
        Ok(properties)
    }

    pub fn parse(text: &str) -> Result<Self, PropertiesError> {
        let mut properties = Properties::default();
        let mut lines = text.lines().enumerate();
        while let Some((index, line)) = lines.next() {
            let line = line.trim_start_matches(WHITESPACE);
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let mut logical = line.to_string();
            while continues(&logical) {
                logical.pop();
                match lines.next() {
                    Some((_, next)) => logical.push_str(next.trim_start_matches(WHITESPACE)),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical).map_err(|reason| PropertiesError {
                line: index + 1,
                reason,
            })?;
            properties.insert(key, value);
        }
        Ok(properties)
    }

    pub fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// An odd run of trailing backslashes escapes the line break.
fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> Result<(String, String), String> {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || WHITESPACE.contains(&c) {
            key_end = i;
            break;
        }
    }

    let rest = line[key_end..].trim_start_matches(WHITESPACE);
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest)
        .trim_start_matches(WHITESPACE);
    Ok((unescape(&line[..key_end])?, unescape(rest)?))
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut buf = [0u16; 2];
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        let c = if c == '\\' {
            match chars.next() {
                Some('t') => '\t',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('f') => '\x0C',
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    if hex.len() != 4 || !hex.chars().all(|h| h.is_ascii_hexdigit()) {
                        return Err(format!("malformed \\uxxxx escape '\\u{hex}'"));
                    }
                    let unit = u16::from_str_radix(&hex, 16).map_err(|e| e.to_string())?;
                    units.push(unit);
                    continue;
                }
                Some(other) => other,
                None => break,
            }
        } else {
            c
        };
        units.extend_from_slice(c.encode_utf16(&mut buf));
    }
    String::from_utf16(&units).map_err(|_| format!("unpaired surrogate in '{raw}'"))
}
