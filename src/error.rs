//! Centralized error types for as4shell.

use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::toolkit::ToolkitError;

/// All errors produced by the as4shell library.
#[derive(Error, Debug)]
pub enum As4Error {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O error while reading or writing attachment content.
    #[error("I/O error on attachment '{content_id}': {source}")]
    AttachmentIo {
        content_id: String,
        source: std::io::Error,
    },

    /// The content provider of an attachment yielded no stream.
    #[error("Attachment '{0}' has no content")]
    NoContent(String),

    /// A single-use content source was opened a second time.
    #[error("Content of attachment '{0}' was already consumed")]
    ContentConsumed(String),

    /// A step that reads attachments more than once got a single-use source.
    #[error("Attachment '{0}' has a single-use source but must be read more than once")]
    SingleUseSource(String),

    /// A domain invariant was violated while building a message.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The WS-Security toolkit failed to sign or encrypt.
    #[error("WS-Security failure: {0}")]
    Security(#[from] ToolkitError),

    /// A MIME structure could not be generated or parsed.
    #[error("MIME error: {0}")]
    Mime(String),

    /// A SOAP envelope could not be written or read.
    #[error("XML error: {0}")]
    Xml(String),

    /// An algorithm or codec identifier is not known.
    #[error("Unknown {kind} identifier: '{id}'")]
    UnknownAlgorithm { kind: &'static str, id: String },

    /// The resource manager was closed before the resource was registered.
    #[error("Resource manager is already closed")]
    ResourceManagerClosed,

    /// An invalid path was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, As4Error>`.
pub type Result<T> = std::result::Result<T, As4Error>;

impl As4Error {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `AttachmentIo` variant for the given content ID.
    pub fn attachment_io(content_id: impl Into<String>, source: std::io::Error) -> Self {
        Self::AttachmentIo {
            content_id: content_id.into(),
            source,
        }
    }

    /// Wrap any displayable XML writer/reader failure.
    pub fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml(err.to_string())
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `As4Error::io`).
impl From<std::io::Error> for As4Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
