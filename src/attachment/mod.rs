//! Attachments: streaming, re-readable payloads with MIME metadata.
//!
//! The content of an attachment is never held by the attachment itself.
//! It owns a [`ContentSource`] that opens a fresh stream on demand, and every
//! stream it opens is registered with the exchange's [`ResourceManager`].

pub mod incoming;
pub mod outgoing;
pub mod source;

use std::io::Read;
use std::str::FromStr;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compression::CompressionMode;
use crate::error::{As4Error, Result};
use crate::resource::{ManagedStream, ResourceManager};

pub use incoming::{can_be_kept_in_memory, InboundPart, DEFAULT_IN_MEMORY_THRESHOLD};
pub use source::{BoxedStream, ContentSource};

/// Prefix for generated content IDs.
pub const CONTENT_ID_PREFIX: &str = "as4shell";

/// Transmitted MIME type of an attachment after encryption.
pub const ENCRYPTED_MIME_TYPE: &str = "application/octet-stream";

pub const HEADER_CONTENT_DESCRIPTION: &str = "Content-Description";
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const HEADER_CONTENT_ID: &str = "Content-ID";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";

/// Value of the `Content-Description` header on every attachment.
pub const ATTACHMENT_DESCRIPTION: &str = "Attachment";

/// MIME Content-Transfer-Encoding of an attachment part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentTransferEncoding {
    #[serde(rename = "binary")]
    Binary,
    #[serde(rename = "8bit")]
    EightBit,
    #[serde(rename = "7bit")]
    SevenBit,
    #[serde(rename = "base64")]
    Base64,
}

impl ContentTransferEncoding {
    /// Header value for this encoding.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::EightBit => "8bit",
            Self::SevenBit => "7bit",
            Self::Base64 => "base64",
        }
    }

    /// Case-insensitive lookup by header value.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "binary" => Some(Self::Binary),
            "8bit" => Some(Self::EightBit),
            "7bit" => Some(Self::SevenBit),
            "base64" => Some(Self::Base64),
            _ => None,
        }
    }
}

impl FromStr for ContentTransferEncoding {
    type Err = As4Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| As4Error::UnknownAlgorithm {
            kind: "content-transfer-encoding",
            id: s.to_string(),
        })
    }
}

impl std::fmt::Display for ContentTransferEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One attachment of an AS4 message.
#[derive(Debug)]
pub struct Attachment {
    id: String,
    mime_type: Option<String>,
    uncompressed_mime_type: Option<String>,
    headers: Vec<(String, String)>,
    source: Option<ContentSource>,
    transfer_encoding: Option<ContentTransferEncoding>,
    compression: Option<CompressionMode>,
    charset: Option<&'static Encoding>,
    encrypted: bool,
}

impl Attachment {
    /// Create an attachment with the given ID and (uncompressed) MIME type.
    pub fn new(id: impl Into<String>, mime_type: Option<&str>) -> Self {
        let mut att = Self {
            id: id.into(),
            mime_type: None,
            uncompressed_mime_type: None,
            headers: Vec::new(),
            source: None,
            transfer_encoding: None,
            compression: None,
            charset: None,
            encrypted: false,
        };
        att.overwrite_mime_type(mime_type);
        att
    }

    /// Generate a fresh content ID.
    pub fn generate_id() -> String {
        format!("{CONTENT_ID_PREFIX}-{}", Uuid::new_v4())
    }

    /// The content ID, without angle brackets.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Reference to this attachment as used in `href` and signature references.
    pub fn cid_reference(&self) -> String {
        format!("cid:{}", self.id)
    }

    /// Transmitted MIME type (the codec's type when compressed).
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// MIME type of the content before compression.
    pub fn uncompressed_mime_type(&self) -> Option<&str> {
        self.uncompressed_mime_type.as_deref()
    }

    /// Set both the transmitted and the uncompressed MIME type.
    ///
    /// An active compression mode keeps the transmitted type at the codec's type.
    pub fn overwrite_mime_type(&mut self, mime_type: Option<&str>) {
        self.uncompressed_mime_type = mime_type.map(String::from);
        self.mime_type = match (self.encrypted, self.compression) {
            (true, _) => Some(ENCRYPTED_MIME_TYPE.to_string()),
            (false, Some(mode)) => Some(mode.mime_type().to_string()),
            (false, None) => self.uncompressed_mime_type.clone(),
        };
        self.sync_content_type_header();
    }

    pub fn compression_mode(&self) -> Option<CompressionMode> {
        self.compression
    }

    pub fn has_compression_mode(&self) -> bool {
        self.compression.is_some()
    }

    /// Mark the content as compressed with `mode`.
    ///
    /// The transmitted MIME type becomes the codec's MIME type. The original
    /// type stays available through [`uncompressed_mime_type`](Self::uncompressed_mime_type).
    pub fn set_compression_mode(&mut self, mode: CompressionMode) -> &mut Self {
        self.compression = Some(mode);
        if !self.encrypted {
            self.mime_type = Some(mode.mime_type().to_string());
            self.sync_content_type_header();
        }
        self
    }

    /// Remove the compression mode, restoring the uncompressed MIME type.
    pub fn clear_compression_mode(&mut self) -> &mut Self {
        self.compression = None;
        if !self.encrypted {
            self.mime_type = self.uncompressed_mime_type.clone();
            self.sync_content_type_header();
        }
        self
    }

    /// Whether the content was replaced by its encrypted form.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Record that the content now is WS-Security encrypted data.
    pub(crate) fn mark_encrypted(&mut self) {
        self.encrypted = true;
        self.mime_type = Some(ENCRYPTED_MIME_TYPE.to_string());
        self.sync_content_type_header();
    }

    /// Effective Content-Transfer-Encoding.
    ///
    /// `binary` unless set explicitly, or `8bit` when only a charset was set.
    pub fn content_transfer_encoding(&self) -> ContentTransferEncoding {
        match (self.transfer_encoding, self.charset) {
            (Some(cte), _) => cte,
            (None, Some(_)) => ContentTransferEncoding::EightBit,
            (None, None) => ContentTransferEncoding::Binary,
        }
    }

    pub fn set_content_transfer_encoding(&mut self, cte: ContentTransferEncoding) -> &mut Self {
        self.transfer_encoding = Some(cte);
        self
    }

    /// Charset of textual content. Defaults to ISO-8859-1.
    pub fn charset(&self) -> &'static Encoding {
        self.charset.unwrap_or(encoding_rs::WINDOWS_1252)
    }

    pub fn has_charset(&self) -> bool {
        self.charset.is_some()
    }

    pub fn set_charset(&mut self, charset: &'static Encoding) -> &mut Self {
        self.charset = Some(charset);
        self
    }

    /// All MIME headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Value of the last header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append a header, keeping any existing header with the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replace every header named `name` with a single entry at the position
    /// of the first one, or append it if absent.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(first) => {
                self.headers[first] = (name.to_string(), value);
                let mut idx = 0;
                self.headers.retain(|(n, _)| {
                    let keep = idx <= first || !n.eq_ignore_ascii_case(name);
                    idx += 1;
                    keep
                });
            }
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Remove every header named `name` (case-insensitive).
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Install the content source.
    pub fn set_source(&mut self, source: ContentSource) {
        self.source = Some(source);
    }

    pub fn source(&self) -> Option<&ContentSource> {
        self.source.as_ref()
    }

    /// Whether the content can be read more than once.
    pub fn is_reopenable(&self) -> bool {
        self.source.as_ref().is_some_and(ContentSource::is_reopenable)
    }

    /// Open a fresh stream over the (possibly compressed) transmitted content.
    pub fn content_stream(&self, res_mgr: &ResourceManager) -> Result<ManagedStream> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| As4Error::NoContent(self.id.clone()))?;
        let stream = source.open(&self.id)?;
        res_mgr.adopt(stream)
    }

    /// Open a fresh stream over the content with compression undone.
    pub fn uncompressed_stream(&self, res_mgr: &ResourceManager) -> Result<ManagedStream> {
        match self.compression {
            Some(mode) => {
                let source = self
                    .source
                    .as_ref()
                    .ok_or_else(|| As4Error::NoContent(self.id.clone()))?;
                let stream = source.open(&self.id)?;
                res_mgr.adopt(mode.unwrap(stream))
            }
            None => self.content_stream(res_mgr),
        }
    }

    /// Read the whole uncompressed content into memory.
    pub fn read_uncompressed(&self, res_mgr: &ResourceManager) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.uncompressed_stream(res_mgr)?
            .read_to_end(&mut out)
            .map_err(|e| As4Error::attachment_io(&self.id, e))?;
        Ok(out)
    }

    fn sync_content_type_header(&mut self) {
        if let Some(mime) = self.mime_type.clone() {
            self.set_header(HEADER_CONTENT_TYPE, mime);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_rewrites_mime_type() {
        let mut att = Attachment::new("a1", Some("application/xml"));
        assert_eq!(att.mime_type(), Some("application/xml"));
        assert!(!att.has_compression_mode());

        att.set_compression_mode(CompressionMode::Gzip);
        assert_eq!(att.mime_type(), Some("application/gzip"));
        assert_eq!(att.uncompressed_mime_type(), Some("application/xml"));
        assert_eq!(att.header(HEADER_CONTENT_TYPE), Some("application/gzip"));

        att.clear_compression_mode();
        assert_eq!(att.mime_type(), Some("application/xml"));
        assert_eq!(att.header(HEADER_CONTENT_TYPE), Some("application/xml"));
    }

    #[test]
    fn test_overwrite_mime_type_while_compressed() {
        let mut att = Attachment::new("a1", Some("application/gzip"));
        att.set_compression_mode(CompressionMode::Gzip);
        att.overwrite_mime_type(Some("text/plain"));
        assert_eq!(att.mime_type(), Some("application/gzip"));
        assert_eq!(att.uncompressed_mime_type(), Some("text/plain"));
    }

    #[test]
    fn test_transfer_encoding_defaults() {
        let mut att = Attachment::new("a1", Some("text/plain"));
        assert_eq!(att.content_transfer_encoding(), ContentTransferEncoding::Binary);
        att.set_charset(encoding_rs::UTF_8);
        assert_eq!(att.content_transfer_encoding(), ContentTransferEncoding::EightBit);
        att.set_content_transfer_encoding(ContentTransferEncoding::Base64);
        assert_eq!(att.content_transfer_encoding(), ContentTransferEncoding::Base64);
    }

    #[test]
    fn test_charset_default() {
        let att = Attachment::new("a1", None);
        assert!(!att.has_charset());
        assert_eq!(att.charset(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_header_order_and_duplicates() {
        let mut att = Attachment::new("a1", Some("text/plain"));
        att.add_header("X-Custom", "1");
        att.add_header("X-Custom", "2");
        att.add_header("X-Other", "o");
        assert_eq!(att.headers().len(), 4);
        assert_eq!(att.header("x-custom"), Some("2"));

        att.set_header("X-Custom", "3");
        let names: Vec<&str> = att.headers().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Content-Type", "X-Custom", "X-Other"]);
        assert_eq!(att.header("X-Custom"), Some("3"));
    }

    #[test]
    fn test_no_source_is_no_content() {
        let att = Attachment::new("a1", None);
        let mgr = ResourceManager::new();
        assert!(matches!(att.content_stream(&mgr), Err(As4Error::NoContent(_))));
    }

    #[test]
    fn test_content_stream_registered_with_manager() {
        let mut att = Attachment::new("a1", Some("text/plain"));
        att.set_source(ContentSource::from_bytes(b"hello".to_vec()));
        let mgr = ResourceManager::new();
        let stream = att.content_stream(&mgr).unwrap();
        mgr.close();
        assert!(stream.is_closed());
    }

    #[test]
    fn test_encrypted_mime_type_survives_compression_change() {
        let mut att = Attachment::new("a1", Some("application/xml"));
        att.set_compression_mode(CompressionMode::Gzip);
        att.mark_encrypted();
        assert_eq!(att.mime_type(), Some(ENCRYPTED_MIME_TYPE));
        att.set_compression_mode(CompressionMode::Gzip);
        assert_eq!(att.mime_type(), Some(ENCRYPTED_MIME_TYPE));
        assert_eq!(att.uncompressed_mime_type(), Some("application/xml"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Attachment::generate_id();
        let b = Attachment::generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with("as4shell-"));
    }
}
