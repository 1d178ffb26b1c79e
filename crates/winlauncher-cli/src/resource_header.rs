//! Resource IDs from a C resource header.
//!
//! Only whole lines of the form `#define NAME NUMBER` count; conditionals,
//! hex constants and anything else are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, trace};

use crate::error::CliError;

const DEFINE_PATTERN: &str = r"^#define\s+(\w+)\s+(\d+)$";

#[derive(Debug, Clone)]
pub struct ResourceHeader {
    path: PathBuf,
    ids: BTreeMap<String, u16>,
}

impl ResourceHeader {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|source| CliError::HeaderUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse header text; `path` is used for diagnostics only.
    pub fn parse(text: &str, path: &Path) -> Result<Self, CliError> {
        let define = Regex::new(DEFINE_PATTERN).map_err(CliError::HeaderPattern)?;
        let mut ids = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            let Some(caps) = define.captures(line.trim()) else {
                continue;
            };
            let name = &caps[1];
            let value = &caps[2];
            let id: u16 = value.parse().map_err(|_| CliError::HeaderIdOverflow {
                path: path.to_path_buf(),
                line: index + 1,
                name: name.to_string(),
                value: value.to_string(),
            })?;
            trace!(name, id, "resource id");
            ids.insert(name.to_string(), id);
        }
        debug!(path = %path.display(), defines = ids.len(), "parsed resource header");
        Ok(Self {
            path: path.to_path_buf(),
            ids,
        })
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.ids.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<u16, CliError> {
        self.get(name).ok_or_else(|| CliError::MissingDefine {
            path: self.path.clone(),
            name: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
