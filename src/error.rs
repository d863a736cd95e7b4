//! Error types for ZIM archive access.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZimError {
    #[error("cannot open {}: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("unsupported cluster compression: {0}")]
    UnsupportedCompression(u8),

    #[error("redirect chain starting at entry {index} exceeds {hops} hops")]
    RedirectLoop { index: u32, hops: usize },

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("archive has no content entries")]
    NoContentEntries,

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ZimError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        ZimError::CorruptArchive(msg.into())
    }

    /// True for a well-formed query that matched nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ZimError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ZimError>;
