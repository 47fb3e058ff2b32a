//! Inbound MIME parsing: split a received message into envelope and attachments.

use std::borrow::Cow;

use base64::Engine;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, MessageParser, MessagePart, PartType};
use tracing::debug;

use crate::attachment::incoming::create_incoming;
use crate::attachment::{Attachment, InboundPart};
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;
use crate::soap::{SoapDocument, SoapVersion};

/// Envelope and attachments of a received message.
#[derive(Debug)]
pub struct ParsedMime {
    pub envelope: SoapDocument,
    pub attachments: Vec<Attachment>,
}

/// Parse a transport body given its Content-Type header.
///
/// A plain SOAP content type yields the envelope without attachments.
/// Multipart bodies are copied once behind a synthetic header block, since
/// the parser works on a single contiguous message. Peak memory is about
/// twice the body size.
pub fn parse(
    content_type: &str,
    body: &[u8],
    res_mgr: &ResourceManager,
    threshold: u64,
) -> Result<ParsedMime> {
    let bare = content_type.split(';').next().unwrap_or("").trim();
    if SoapVersion::from_mime_type(bare).is_some() {
        return Ok(ParsedMime {
            envelope: envelope_from_bytes(body)?,
            attachments: Vec::new(),
        });
    }
    if !bare.eq_ignore_ascii_case("multipart/related") {
        return Err(As4Error::Mime(format!("unsupported content type '{bare}'")));
    }

    let head = format!("Content-Type: {content_type}\r\nMIME-Version: 1.0\r\n\r\n");
    let mut raw = Vec::with_capacity(head.len() + body.len());
    raw.extend_from_slice(head.as_bytes());
    raw.extend_from_slice(body);
    parse_message(&raw, res_mgr, threshold)
}

/// Parse a complete MIME message (headers and body).
pub fn parse_message(
    raw: &[u8],
    res_mgr: &ResourceManager,
    threshold: u64,
) -> Result<ParsedMime> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| As4Error::Mime("message could not be parsed".into()))?;
    let root = message
        .parts
        .first()
        .ok_or_else(|| As4Error::Mime("message has no parts".into()))?;

    let PartType::Multipart(ids) = &root.body else {
        return Ok(ParsedMime {
            envelope: envelope_from_bytes(root.contents())?,
            attachments: Vec::new(),
        });
    };

    let mut parts = ids.iter().filter_map(|id| message.parts.get(*id as usize));
    let soap_part = parts
        .next()
        .ok_or_else(|| As4Error::Mime("multipart message without parts".into()))?;
    let envelope = envelope_from_bytes(soap_part.contents())?;

    let mut attachments = Vec::new();
    for part in parts {
        let body = part_body(message.raw_message(), part)?;
        let inbound = InboundPart {
            headers: part_headers(message.raw_message(), part),
            body: &body,
        };
        attachments.push(create_incoming(&inbound, res_mgr, threshold)?);
    }

    debug!(
        soap_version = %envelope.version(),
        attachments = attachments.len(),
        "Parsed MIME message"
    );
    Ok(ParsedMime {
        envelope,
        attachments,
    })
}

fn envelope_from_bytes(bytes: &[u8]) -> Result<SoapDocument> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| As4Error::Mime(format!("SOAP envelope is not valid UTF-8: {e}")))?;
    SoapDocument::parse(xml)
}

/// Content of a part, byte for byte as the sender wrote it.
///
/// Taken from the raw message so text parts are never transcoded. Only
/// the Content-Transfer-Encoding is undone.
fn part_body<'r>(raw: &'r [u8], part: &MessagePart<'_>) -> Result<Cow<'r, [u8]>> {
    let content_id = || {
        part.headers
            .iter()
            .find(|h| h.name.as_str().eq_ignore_ascii_case("Content-ID"))
            .and_then(|h| h.value.as_text())
            .unwrap_or("<unnamed>")
            .to_string()
    };
    if part.is_encoding_problem {
        return Err(As4Error::Mime(format!(
            "part {} is malformed or truncated",
            content_id()
        )));
    }
    let encoded = raw
        .get(part.raw_body_offset()..part.raw_end_offset())
        .ok_or_else(|| As4Error::Mime(format!("part {} is truncated", content_id())))?;

    match part.encoding {
        Encoding::None => Ok(Cow::Borrowed(encoded)),
        Encoding::Base64 => {
            let compact: Vec<u8> = encoded
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map(Cow::Owned)
                .map_err(|e| As4Error::Mime(format!("part {}: invalid base64: {e}", content_id())))
        }
        Encoding::QuotedPrintable => quoted_printable_decode(encoded)
            .map(Cow::Owned)
            .ok_or_else(|| {
                As4Error::Mime(format!("part {}: invalid quoted-printable", content_id()))
            }),
    }
}

/// Part headers with their raw (unfolded) values, in wire order.
fn part_headers(raw: &[u8], part: &MessagePart<'_>) -> Vec<(String, String)> {
    part.headers
        .iter()
        .map(|h| {
            let name = h.name.as_str().to_string();
            let value = raw_header_value(raw, h.offset_start as usize, h.offset_end as usize, &name)
                .or_else(|| h.value.as_text().map(String::from))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

fn raw_header_value(raw: &[u8], start: usize, end: usize, name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(raw.get(start..end)?);
    let mut value = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let stripped = value
        .get(..name.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(name))
        .and(value.get(name.len()..))
        .and_then(|rest| rest.strip_prefix(':'))
        .map(|rest| rest.trim_start().to_string());
    if let Some(stripped) = stripped {
        value = stripped;
    }
    Some(value)
}
