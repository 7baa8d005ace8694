//! Error surface for the fragment store.
//!
//! One flat enum, mirroring the teacher's per-module error style
//! (`SuperblockError`, `CodecError`) collapsed to a single type since the
//! engine has one contract rather than several independently fallible
//! subsystems. Struct-like variants carry diagnostic payloads so a caller
//! (CLI, server) gets a useful message without re-deriving context.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("invalid format — bad magic, not a fragment store file")]
    InvalidFormat,

    #[error("unsupported format version {found} (this build handles version {})", crate::header::FORMAT_VERSION)]
    UnsupportedVersion { found: u8 },

    #[error("bad header: {reason}")]
    BadHeader { reason: String },

    #[error("bad version name: {reason}")]
    BadVersionName { reason: String },

    #[error("too many versions: {count} (maximum {})", crate::header::MAX_VERSIONS)]
    TooManyVersions { count: usize },

    #[error("no versions supplied — at least one is required")]
    NoVersions,

    #[error("unknown version: {name}")]
    UnknownVersion { name: String },

    #[error("fragment not found: {id:04x}")]
    FragmentNotFound { id: u16 },

    #[error("bad fragment id: {text:?} (expected 4 lowercase hex digits)")]
    BadFragmentId { text: String },

    #[error("payload too large: chunk would be {chunk_len} bytes (maximum 65535)")]
    PayloadTooLarge { chunk_len: usize },

    #[error("corrupt payload: {reason}")]
    CorruptPayload { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FragmentError {
    /// Stable machine-readable code for the server-layer `{code, message}` contract.
    pub fn code(&self) -> &'static str {
        match self {
            FragmentError::InvalidFormat => "invalid_format",
            FragmentError::UnsupportedVersion { .. } => "unsupported_version",
            FragmentError::BadHeader { .. } => "bad_header",
            FragmentError::BadVersionName { .. } => "bad_version_name",
            FragmentError::TooManyVersions { .. } => "too_many_versions",
            FragmentError::NoVersions => "no_versions",
            FragmentError::UnknownVersion { .. } => "unknown_version",
            FragmentError::FragmentNotFound { .. } => "fragment_not_found",
            FragmentError::BadFragmentId { .. } => "bad_fragment_id",
            FragmentError::PayloadTooLarge { .. } => "payload_too_large",
            FragmentError::CorruptPayload { .. } => "corrupt_payload",
            FragmentError::Io(_) => "io",
        }
    }

    pub(crate) fn closed() -> Self {
        FragmentError::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            "fragment store is not open",
        ))
    }
}
