//! CLI error type and its process exit codes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::properties::PropertiesError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("cannot read resource header {}", path.display())]
    HeaderUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid #define pattern")]
    HeaderPattern(#[source] regex::Error),

    #[error("{}:{line}: resource ID {value} of {name} does not fit in 16 bits", path.display())]
    HeaderIdOverflow {
        path: PathBuf,
        line: usize,
        name: String,
        value: String,
    },

    #[error("resource header {} does not define {name}", path.display())]
    MissingDefine { path: PathBuf, name: String },

    #[error("cannot read properties file {}", path.display())]
    PropertiesUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse properties file {}", path.display())]
    PropertiesSyntax {
        path: PathBuf,
        #[source]
        source: PropertiesError,
    },

    #[error("properties file {} has no {key} entry", path.display())]
    MissingProperty { path: PathBuf, key: &'static str },

    #[error("invalid {key} '{value}'")]
    BadVersion {
        key: &'static str,
        value: String,
        #[source]
        source: winlauncher_core::Error,
    },

    #[error("icon not found: {}", .0.display())]
    IconMissing(PathBuf),

    #[error("splash bitmap not found: {}", .0.display())]
    SplashMissing(PathBuf),

    #[error("launcher generation failed")]
    Generation(#[from] winlauncher_core::Error),
}

impl CliError {
    /// Process exit code for this failure.  Argument errors (1) are
    /// reported by clap before a `CliError` can exist.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::TemplateMissing(_) => 2,
            CliError::HeaderUnreadable { .. }
            | CliError::HeaderPattern(_)
            | CliError::HeaderIdOverflow { .. }
            | CliError::MissingDefine { .. } => 3,
            CliError::PropertiesUnreadable { .. }
            | CliError::PropertiesSyntax { .. }
            | CliError::MissingProperty { .. }
            | CliError::BadVersion { .. } => 4,
            CliError::IconMissing(_) | CliError::SplashMissing(_) => 5,
            CliError::Generation(_) => 6,
        }
    }
}
