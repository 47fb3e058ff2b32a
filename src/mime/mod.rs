//! SOAP-with-attachments `multipart/related` packaging.
//!
//! [`generate`] lays out the parts, [`MimePackage::write_to`] streams them.
//! Attachment content is read from its source while writing and is never
//! buffered in full.

pub mod parse;

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::write::EncoderWriter;
use tracing::debug;
use uuid::Uuid;

use crate::attachment::{
    Attachment, ContentTransferEncoding, ENCRYPTED_MIME_TYPE, HEADER_CONTENT_ID,
    HEADER_CONTENT_TRANSFER_ENCODING, HEADER_CONTENT_TYPE,
};
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;
use crate::soap::{SoapDocument, SoapVersion};

pub use parse::{parse, parse_message, ParsedMime};

const CRLF: &[u8] = b"\r\n";
const BASE64_LINE_LEN: usize = 76;

/// Content attached to a body part.
#[derive(Debug, Clone, Copy)]
pub enum PartContent<'a> {
    Envelope(&'a SoapDocument),
    Attachment(&'a Attachment),
}

/// One part of a multipart message with an ordered header list.
#[derive(Debug, Clone, Default)]
pub struct MimeBodyPart<'a> {
    headers: Vec<(String, String)>,
    content: Option<PartContent<'a>>,
}

impl<'a> MimeBodyPart<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the header in place, or append it.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Attach content. Like common MIME builders this resets the
    /// Content-Type and Content-Transfer-Encoding headers, so both must be
    /// set afterwards.
    pub fn set_content(&mut self, content: PartContent<'a>) {
        self.remove_header(HEADER_CONTENT_TYPE);
        self.remove_header(HEADER_CONTENT_TRANSFER_ENCODING);
        self.content = Some(content);
    }

    pub fn content(&self) -> Option<PartContent<'a>> {
        self.content
    }

    fn transfer_encoding(&self) -> ContentTransferEncoding {
        self.header(HEADER_CONTENT_TRANSFER_ENCODING)
            .and_then(ContentTransferEncoding::from_id)
            .unwrap_or(ContentTransferEncoding::Binary)
    }
}

/// A laid-out multipart message, ready to be streamed.
#[derive(Debug, Clone)]
pub struct MimePackage<'a> {
    soap_version: SoapVersion,
    boundary: String,
    parts: Vec<MimeBodyPart<'a>>,
}

/// Fresh multipart boundary.
pub fn generate_boundary() -> String {
    format!("----=_Part_{}", Uuid::new_v4().simple())
}

/// Lay out the envelope followed by the attachments in list order.
pub fn generate<'a>(
    soap_version: SoapVersion,
    envelope: &'a SoapDocument,
    attachments: &'a [Attachment],
) -> MimePackage<'a> {
    generate_with_boundary(soap_version, envelope, attachments, generate_boundary())
}

/// [`generate`] with a caller-chosen boundary.
pub fn generate_with_boundary<'a>(
    soap_version: SoapVersion,
    envelope: &'a SoapDocument,
    attachments: &'a [Attachment],
    boundary: String,
) -> MimePackage<'a> {
    let mut parts = Vec::with_capacity(attachments.len() + 1);

    let mut soap_part = MimeBodyPart::new();
    soap_part.set_content(PartContent::Envelope(envelope));
    soap_part.set_header(
        HEADER_CONTENT_TYPE,
        format!("{}; charset=UTF-8", soap_version.mime_type()),
    );
    soap_part.set_header(
        HEADER_CONTENT_TRANSFER_ENCODING,
        ContentTransferEncoding::Binary.id(),
    );
    parts.push(soap_part);

    for att in attachments {
        let mut part = MimeBodyPart::new();
        part.set_header(HEADER_CONTENT_ID, format!("<{}>", att.id()));
        part.set_content(PartContent::Attachment(att));
        part.set_header(HEADER_CONTENT_TYPE, attachment_content_type(att));
        part.set_header(
            HEADER_CONTENT_TRANSFER_ENCODING,
            att.content_transfer_encoding().id(),
        );
        for (name, value) in att.headers() {
            if [HEADER_CONTENT_ID, HEADER_CONTENT_TYPE, HEADER_CONTENT_TRANSFER_ENCODING]
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name))
            {
                continue;
            }
            part.add_header(name.clone(), value.clone());
        }
        parts.push(part);
    }

    let package = MimePackage {
        soap_version,
        boundary,
        parts,
    };
    debug!(
        parts = package.parts.len(),
        boundary = %package.boundary,
        "Generated MIME package"
    );
    package
}

/// Content-Type of an attachment part, with the charset of textual content.
fn attachment_content_type(att: &Attachment) -> String {
    let mime = att.mime_type().unwrap_or(ENCRYPTED_MIME_TYPE);
    if att.has_charset() && !att.is_encrypted() && !att.has_compression_mode() {
        format!("{mime}; charset={}", att.charset().name())
    } else {
        mime.to_string()
    }
}

impl<'a> MimePackage<'a> {
    pub fn soap_version(&self) -> SoapVersion {
        self.soap_version
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[MimeBodyPart<'a>] {
        &self.parts
    }

    /// `multipart/related` content type including the boundary.
    pub fn content_type(&self) -> String {
        format!(
            "multipart/related; type=\"{}\"; boundary=\"{}\"",
            self.soap_version.mime_type(),
            self.boundary
        )
    }

    /// Message-level headers the transport has to send.
    pub fn global_headers(&self) -> Vec<(String, String)> {
        vec![
            ("MIME-Version".to_string(), "1.0".to_string()),
            (HEADER_CONTENT_TYPE.to_string(), self.content_type()),
        ]
    }

    /// Stream the multipart body (without message headers) into `out`.
    ///
    /// On error the output is incomplete and must be discarded.
    pub fn write_to(&self, out: &mut dyn Write, res_mgr: &ResourceManager) -> Result<()> {
        for part in &self.parts {
            write!(out, "--{}\r\n", self.boundary)?;
            for (name, value) in &part.headers {
                write!(out, "{name}: {value}\r\n")?;
            }
            out.write_all(CRLF)?;

            match part.content {
                Some(PartContent::Envelope(doc)) => out.write_all(doc.as_bytes())?,
                Some(PartContent::Attachment(att)) => {
                    let stream = att.content_stream(res_mgr)?;
                    copy_encoded(stream, out, part.transfer_encoding())
                        .map_err(|e| As4Error::attachment_io(att.id(), e))?;
                }
                None => {}
            }
            out.write_all(CRLF)?;
        }
        write!(out, "--{}--\r\n", self.boundary)?;
        out.flush()?;
        Ok(())
    }

    /// Stream message headers followed by the body.
    pub fn write_message_to(&self, out: &mut dyn Write, res_mgr: &ResourceManager) -> Result<()> {
        for (name, value) in self.global_headers() {
            write!(out, "{name}: {value}\r\n")?;
        }
        out.write_all(CRLF)?;
        self.write_to(out, res_mgr)
    }

    /// Whole message including headers, buffered in memory.
    pub fn to_bytes(&self, res_mgr: &ResourceManager) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_message_to(&mut buf, res_mgr)?;
        Ok(buf)
    }
}

/// Copy `input` to `out`, applying the transfer encoding.
fn copy_encoded(
    mut input: impl Read,
    out: &mut dyn Write,
    cte: ContentTransferEncoding,
) -> io::Result<u64> {
    match cte {
        ContentTransferEncoding::Base64 => {
            let mut encoder = EncoderWriter::new(LineWrap::new(out), &BASE64);
            let n = io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
            Ok(n)
        }
        _ => io::copy(&mut input, out),
    }
}

/// Inserts CRLF after every 76 bytes of base64 output.
struct LineWrap<'w> {
    inner: &'w mut dyn Write,
    column: usize,
}

impl<'w> LineWrap<'w> {
    fn new(inner: &'w mut dyn Write) -> Self {
        Self { inner, column: 0 }
    }
}

impl Write for LineWrap<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            if self.column == BASE64_LINE_LEN {
                self.inner.write_all(CRLF)?;
                self.column = 0;
            }
            let take = rest.len().min(BASE64_LINE_LEN - self.column);
            self.inner.write_all(&rest[..take])?;
            self.column += take;
            rest = &rest[take..];
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::outgoing::create_outgoing_bytes;
    use crate::attachment::ContentSource;
    use crate::compression::CompressionMode;

    fn envelope() -> SoapDocument {
        SoapDocument::new(
            SoapVersion::Soap12,
            r#"<S12:Envelope xmlns:S12="http://www.w3.org/2003/05/soap-envelope"><S12:Body/></S12:Envelope>"#,
        )
    }

    #[test]
    fn test_set_content_resets_type_and_encoding() {
        let doc = envelope();
        let mut part = MimeBodyPart::new();
        part.set_header(HEADER_CONTENT_ID, "<x>");
        part.set_header(HEADER_CONTENT_TYPE, "text/plain");
        part.set_header(HEADER_CONTENT_TRANSFER_ENCODING, "8bit");
        part.set_content(PartContent::Envelope(&doc));
        assert_eq!(part.header(HEADER_CONTENT_ID), Some("<x>"));
        assert_eq!(part.header(HEADER_CONTENT_TYPE), None);
        assert_eq!(part.header(HEADER_CONTENT_TRANSFER_ENCODING), None);
    }

    #[test]
    fn test_attachment_part_header_order() {
        let mgr = ResourceManager::new();
        let att = create_outgoing_bytes(
            b"<a/>".to_vec(),
            "a.xml",
            "application/xml",
            Some(CompressionMode::Gzip),
            &mgr,
        )
        .unwrap();
        let doc = envelope();
        let atts = [att];
        let package = generate(SoapVersion::Soap12, &doc, &atts);

        assert_eq!(package.parts().len(), 2);
        let part = &package.parts()[1];
        let names: Vec<&str> = part.headers().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Content-ID",
                "Content-Type",
                "Content-Transfer-Encoding",
                "Content-Description",
                "Content-Disposition"
            ]
        );
        assert_eq!(part.header("Content-Type"), Some("application/gzip"));
        assert_eq!(part.header("Content-Transfer-Encoding"), Some("binary"));
    }

    #[test]
    fn test_envelope_part_and_content_type() {
        let doc = envelope();
        let package = generate(SoapVersion::Soap11, &doc, &[]);
        let root = &package.parts()[0];
        assert_eq!(root.header("Content-Type"), Some("text/xml; charset=UTF-8"));
        assert!(package
            .content_type()
            .starts_with("multipart/related; type=\"text/xml\"; boundary=\"----=_Part_"));
        assert_eq!(
            package.global_headers()[0],
            ("MIME-Version".to_string(), "1.0".to_string())
        );
    }

    #[test]
    fn test_written_layout() {
        let mgr = ResourceManager::new();
        let mut att = Attachment::new("a1", Some("text/plain"));
        att.set_source(ContentSource::from_bytes(b"hello".to_vec()));
        let doc = envelope();
        let atts = [att];
        let package = generate(SoapVersion::Soap12, &doc, &atts);

        let mut body = Vec::new();
        package.write_to(&mut body, &mgr).unwrap();
        let text = String::from_utf8(body).unwrap();
        let b = package.boundary();

        assert!(text.starts_with(&format!("--{b}\r\nContent-Type: application/soap+xml; charset=UTF-8\r\n")));
        assert!(text.contains("Content-ID: <a1>\r\nContent-Type: text/plain\r\nContent-Transfer-Encoding: binary\r\n\r\nhello\r\n"));
        assert!(text.ends_with(&format!("\r\n--{b}--\r\n")));
    }

    #[test]
    fn test_base64_lines_wrapped() {
        let mgr = ResourceManager::new();
        let data: Vec<u8> = (0..200u8).collect();
        let mut att = Attachment::new("bin", Some("application/octet-stream"));
        att.set_source(ContentSource::from_bytes(data.clone()));
        att.set_content_transfer_encoding(ContentTransferEncoding::Base64);
        let doc = envelope();
        let atts = [att];
        let package = generate(SoapVersion::Soap12, &doc, &atts);

        let mut body = Vec::new();
        package.write_to(&mut body, &mgr).unwrap();
        let text = String::from_utf8(body).unwrap();
        let start = text.find("base64\r\n\r\n").unwrap() + "base64\r\n\r\n".len();
        let end = text[start..].find("\r\n--").unwrap() + start;
        let encoded = &text[start..end];

        assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
        assert_eq!(encoded.split("\r\n").next().unwrap().len(), 76);
        let joined: String = encoded.split("\r\n").collect();
        assert_eq!(base64::Engine::decode(&BASE64, joined).unwrap(), data);
    }

    #[test]
    fn test_missing_content_aborts_write() {
        let mgr = ResourceManager::new();
        let doc = envelope();
        let atts = [Attachment::new("void", Some("text/plain"))];
        let package = generate(SoapVersion::Soap12, &doc, &atts);
        let mut sink = Vec::new();
        assert!(matches!(
            package.write_to(&mut sink, &mgr),
            Err(As4Error::NoContent(_))
        ));
    }
}
