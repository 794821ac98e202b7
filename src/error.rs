//! The error taxonomy shared by every layer of the virtual filesystem.
//!
//! `RepoAdapter`, `CommitIndex`, and every `Node` operation return
//! `Result<_, VfmError>`. Adapters translate `VfmError` into their own
//! protocol's error type exactly once, at the boundary.

use std::fmt;

/// The four-way error taxonomy from the design spec.
#[derive(Debug, thiserror::Error)]
pub enum VfmError {
    /// The requested name or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not implemented for this node kind, or this is a
    /// read-only filesystem and the request was a write.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A read against the underlying repository failed.
    #[error("repository io error: {0}")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An object was readable but malformed in a way the VFM cannot use
    /// (e.g. a symlink entry whose blob target is not valid UTF-8).
    #[error("corrupt object: {0}")]
    Corrupt(String),
}

impl VfmError {
    pub fn not_found(what: impl fmt::Display) -> Self {
        VfmError::NotFound(what.to_string())
    }

    pub fn not_supported(what: impl fmt::Display) -> Self {
        VfmError::NotSupported(what.to_string())
    }

    pub fn corrupt(what: impl fmt::Display) -> Self {
        VfmError::Corrupt(what.to_string())
    }

    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        VfmError::Io(Box::new(err))
    }
}

/// `gix` object-database lookups surface their own error types per
/// operation (`find::existing::Error`, etc.); rather than enumerate them
/// all, anything that isn't obviously "missing" is folded into `Io`.
impl From<gix::object::find::existing::Error> for VfmError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        VfmError::io(err)
    }
}

pub type VfmResult<T> = Result<T, VfmError>;
