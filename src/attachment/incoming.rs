//! Factory for attachments received in a MIME message.

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};

use tracing::debug;

use super::source::ContentSource;
use super::{
    Attachment, ContentTransferEncoding, ATTACHMENT_DESCRIPTION, HEADER_CONTENT_DESCRIPTION,
    HEADER_CONTENT_ID, HEADER_CONTENT_TRANSFER_ENCODING, HEADER_CONTENT_TYPE,
};
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;

/// Parts up to this many bytes are kept in memory (64 KiB).
pub const DEFAULT_IN_MEMORY_THRESHOLD: u64 = 64 * 1024;

/// Whether a part of `len` bytes stays in memory under `threshold`.
pub fn can_be_kept_in_memory(len: u64, threshold: u64) -> bool {
    len <= threshold
}

/// A decoded body part of an inbound MIME message.
#[derive(Debug, Clone)]
pub struct InboundPart<'a> {
    /// Raw part headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Decoded part content.
    pub body: &'a [u8],
}

impl InboundPart<'_> {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Content-ID with the surrounding angle brackets removed.
    pub fn content_id(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_ID)
            .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>'))
    }

    /// Content-Type without parameters.
    pub fn mime_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// `charset` parameter of the Content-Type header.
    pub fn charset(&self) -> Option<&str> {
        let value = self.header(HEADER_CONTENT_TYPE)?;
        value.split(';').skip(1).find_map(|param| {
            let (key, val) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| val.trim().trim_matches('"'))
        })
    }
}

/// Turn an inbound MIME part into an [`Attachment`].
///
/// Parts of at most `threshold` bytes stay in memory as a single-use
/// source. Larger parts are spooled to a managed temp file and can be read
/// any number of times.
pub fn create_incoming(
    part: &InboundPart<'_>,
    res_mgr: &ResourceManager,
    threshold: u64,
) -> Result<Attachment> {
    let content_id = part
        .content_id()
        .filter(|id| !id.is_empty())
        .map(String::from)
        .ok_or_else(|| As4Error::Mime("attachment part without Content-ID".into()))?;

    let mut att = Attachment::new(content_id, part.mime_type());

    let len = part.body.len() as u64;
    if can_be_kept_in_memory(len, threshold) {
        att.set_source(ContentSource::single_use(Cursor::new(part.body.to_vec())));
    } else {
        let temp = res_mgr.create_temp_file()?;
        let file = File::create(&temp).map_err(|e| As4Error::io(&temp, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(part.body)
            .and_then(|_| writer.flush())
            .map_err(|e| As4Error::io(&temp, e))?;
        att.set_source(ContentSource::from_file(temp));
    }

    if let Some(cte) = part
        .header(HEADER_CONTENT_TRANSFER_ENCODING)
        .and_then(ContentTransferEncoding::from_id)
    {
        att.set_content_transfer_encoding(cte);
    }
    if let Some(charset) = part
        .charset()
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
    {
        att.set_charset(charset);
    }

    for (name, value) in &part.headers {
        att.add_header(name.clone(), value.clone());
    }

    // Authoritative over whatever the sender put in the part
    att.set_header(HEADER_CONTENT_DESCRIPTION, ATTACHMENT_DESCRIPTION);
    att.set_header(HEADER_CONTENT_ID, format!("<{}>", att.id()));
    if let Some(mime) = att.mime_type().map(String::from) {
        att.set_header(HEADER_CONTENT_TYPE, mime);
    }

    debug!(
        content_id = att.id(),
        size = len,
        in_memory = !att.is_reopenable(),
        "Created incoming attachment"
    );
    Ok(att)
}
