//! Boundary to the external WS-Security toolkit.
//!
//! The low-level XML-DSig / XML-Enc work is not done in this crate. A
//! toolkit implementation receives the SOAP document, an explicit request
//! and an [`AttachmentCallback`] through which it streams attachment
//! content in and, when encrypting, streams the replacement content out.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use super::algorithm::{CryptAlgorithm, DigestAlgorithm, SignAlgorithm};
use crate::attachment::{Attachment, BoxedStream};
use crate::error::As4Error;
use crate::resource::ResourceManager;
use crate::soap::SoapDocument;

/// Failure reported by a WS-Security toolkit.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ToolkitError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolkitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Resolves `cid:` references for the toolkit.
pub trait AttachmentCallback {
    /// Content IDs of all attachments, in message order.
    fn content_ids(&self) -> Vec<String>;

    /// Open a fresh stream over the transmitted content of `content_id`.
    fn open(&mut self, content_id: &str) -> Result<BoxedStream, ToolkitError>;

    /// Sink for the encrypted replacement of `content_id`.
    ///
    /// The toolkit must flush the writer before returning.
    fn encrypted_output(&mut self, content_id: &str)
        -> Result<Box<dyn Write + Send>, ToolkitError>;
}

/// What to sign and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub key_alias: String,
    pub cert_alias: Option<String>,
    pub signature_algorithm: SignAlgorithm,
    pub digest_algorithm: DigestAlgorithm,
    /// Reference URIs: `#<wsu:Id>` for envelope parts, `cid:<id>` for attachments.
    pub references: Vec<String>,
}

/// What to encrypt and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptRequest {
    pub cert_alias: String,
    pub algorithm: CryptAlgorithm,
    pub encrypt_body: bool,
    /// Content IDs of the attachments to encrypt.
    pub attachments: Vec<String>,
}

/// An XML-DSig / XML-Enc implementation for SOAP messages with attachments.
pub trait WsSecurityToolkit {
    /// Return a copy of `doc` with a `wsse:Security` header signing every
    /// reference of `request`.
    fn sign(
        &self,
        doc: &SoapDocument,
        request: &SignRequest,
        attachments: &mut dyn AttachmentCallback,
    ) -> Result<SoapDocument, ToolkitError>;

    /// Return a copy of `doc` with the requested parts encrypted. Encrypted
    /// attachment content is written through
    /// [`AttachmentCallback::encrypted_output`].
    fn encrypt(
        &self,
        doc: &SoapDocument,
        request: &EncryptRequest,
        attachments: &mut dyn AttachmentCallback,
    ) -> Result<SoapDocument, ToolkitError>;
}

/// [`AttachmentCallback`] over the attachments of one exchange.
///
/// Streams and replacement files are registered with the resource manager.
/// The first crate-level failure is kept so callers can report it instead
/// of the toolkit's wrapped version.
pub(crate) struct AttachmentBridge<'a> {
    attachments: &'a [Attachment],
    res_mgr: &'a ResourceManager,
    replacements: Vec<(String, PathBuf)>,
    failure: Option<As4Error>,
}

impl<'a> AttachmentBridge<'a> {
    pub(crate) fn new(attachments: &'a [Attachment], res_mgr: &'a ResourceManager) -> Self {
        Self {
            attachments,
            res_mgr,
            replacements: Vec::new(),
            failure: None,
        }
    }

    /// Take the first failure raised inside the callback.
    pub(crate) fn take_failure(&mut self) -> Option<As4Error> {
        self.failure.take()
    }

    /// Replacement files written by the toolkit, by content ID.
    pub(crate) fn into_replacements(self) -> Vec<(String, PathBuf)> {
        self.replacements
    }

    fn fail(&mut self, err: As4Error) -> ToolkitError {
        let wrapped = ToolkitError::new(err.to_string());
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        wrapped
    }

    fn find(&self, content_id: &str) -> Option<&'a Attachment> {
        let id = content_id.strip_prefix("cid:").unwrap_or(content_id);
        self.attachments.iter().find(|a| a.id() == id)
    }
}

impl AttachmentCallback for AttachmentBridge<'_> {
    fn content_ids(&self) -> Vec<String> {
        self.attachments.iter().map(|a| a.id().to_string()).collect()
    }

    fn open(&mut self, content_id: &str) -> Result<BoxedStream, ToolkitError> {
        let Some(att) = self.find(content_id) else {
            return Err(ToolkitError::new(format!(
                "no attachment with content ID '{content_id}'"
            )));
        };
        match att.content_stream(self.res_mgr) {
            Ok(stream) => Ok(Box::new(stream)),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn encrypted_output(
        &mut self,
        content_id: &str,
    ) -> Result<Box<dyn Write + Send>, ToolkitError> {
        let Some(att) = self.find(content_id) else {
            return Err(ToolkitError::new(format!(
                "no attachment with content ID '{content_id}'"
            )));
        };
        let id = att.id().to_string();
        let path = match self.res_mgr.create_temp_file() {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        let file = match File::create(&path) {
            Ok(f) => f,
            Err(e) => return Err(self.fail(As4Error::io(&path, e))),
        };
        debug!(content_id = %id, path = %path.display(), "Spooling encrypted attachment");
        self.replacements.push((id, path));
        Ok(Box::new(BufWriter::new(file)))
    }
}
