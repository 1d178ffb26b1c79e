//! Error types shared by every layer of the launcher generator.

use thiserror::Error;

/// Result type for launcher generation.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading, editing or writing an image.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying file-system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The first two bytes are not `MZ`.
    #[error("invalid DOS signature 0x{0:04X} (expected 0x5A4D)")]
    InvalidDosSignature(u16),

    /// The four bytes at `e_lfanew` are not `PE\0\0`.
    #[error("invalid PE signature 0x{0:08X} (expected 0x00004550)")]
    InvalidPeSignature(u32),

    /// Optional-header magic is neither PE32 nor PE32+.
    #[error("unsupported optional header magic 0x{0:04X}")]
    UnsupportedOptionalHeader(u16),

    /// Not enough input bytes for the structure being read.
    #[error("truncated {what}: needed {needed} byte(s) at offset 0x{offset:X}, {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Structurally invalid input that is not simply short.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// A data directory slot the generator relies on is absent.
    #[error("image has {available} data directories, directory {index} is required")]
    MissingDataDirectory { index: usize, available: usize },

    /// The template was built without an RT_STRING resource.
    #[error("cannot find string table in template resources")]
    StringTableNotFound,

    /// A string-table entry longer than its `u16` length prefix allows.
    #[error("string {id} is {units} UTF-16 units long, at most 65535 fit in a string table")]
    StringTooLong { id: u16, units: usize },

    /// A resource type or entry needed by a mutation is absent.
    #[error("cannot find {kind} resource{}", .id.map(|id| format!(" {id}")).unwrap_or_default())]
    ResourceNotFound { kind: &'static str, id: Option<u16> },

    /// The `.ico` input is not a usable icon container.
    #[error("invalid icon file: {0}")]
    InvalidIcon(String),

    /// The `VS_VERSIONINFO` resource is unusable.
    #[error("version info: {0}")]
    VersionInfo(String),

    /// A version string is not four dot-separated numbers.
    #[error("invalid version '{0}': expected four dot-separated numbers in 0..=65535")]
    InvalidVersion(String),

    /// A node was written at a different offset than assigned by the last
    /// offset reset, i.e. the tree changed after `reset_offsets`.
    #[error("{what} written at offset 0x{actual:X}, layout assigned 0x{expected:X}")]
    LayoutMismatch {
        what: &'static str,
        expected: u64,
        actual: u64,
    },

    /// Post-write checks found one or more invariant violations.
    #[error("output verification failed:\n  - {}", .0.join("\n  - "))]
    Verification(Vec<String>),
}

impl Error {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Error::Malformed {
            what,
            reason: reason.into(),
        }
    }
}
