//! Factories for attachments that are about to be sent.
//!
//! Compression happens here, before anything else touches the content, so
//! that a later signature covers exactly the transmitted bytes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::source::{ensure_file, ContentSource};
use super::{
    Attachment, ATTACHMENT_DESCRIPTION, HEADER_CONTENT_DESCRIPTION, HEADER_CONTENT_DISPOSITION,
    HEADER_CONTENT_ID, HEADER_CONTENT_TYPE,
};
use crate::compression::CompressionMode;
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;

/// Assign a fresh ID and write the descriptive headers.
///
/// Order: description, disposition, ID, type.
fn add_outgoing_headers(att: &mut Attachment, filename: &str) {
    att.set_id(Attachment::generate_id());
    att.remove_header(HEADER_CONTENT_TYPE);

    att.set_header(HEADER_CONTENT_DESCRIPTION, ATTACHMENT_DESCRIPTION);
    att.set_header(
        HEADER_CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", filename.replace('"', "")),
    );
    att.set_header(HEADER_CONTENT_ID, format!("<{}>", att.id()));
    if let Some(mime) = att.mime_type().map(String::from) {
        att.set_header(HEADER_CONTENT_TYPE, mime);
    }
}

/// Compress everything from `input` into a new managed temp file.
///
/// The temp file is registered before writing starts, so it is cleaned up
/// even when compression fails halfway.
fn compress_to_temp_file(
    mut input: impl Read,
    mode: CompressionMode,
    res_mgr: &ResourceManager,
) -> Result<PathBuf> {
    let target = res_mgr.create_temp_file()?;
    let file = File::create(&target).map_err(|e| As4Error::io(&target, e))?;
    let mut writer = mode.wrap(BufWriter::new(file));
    std::io::copy(&mut input, &mut writer).map_err(|e| As4Error::io(&target, e))?;
    let mut inner = writer.finish().map_err(|e| As4Error::io(&target, e))?;
    inner.flush().map_err(|e| As4Error::io(&target, e))?;
    Ok(target)
}

/// Create an outgoing attachment from a file on disk.
///
/// Without compression the original file is read directly on every access.
/// With compression the file is compressed once into a managed temp file.
pub fn create_outgoing_file(
    path: &Path,
    mime_type: &str,
    compression: Option<CompressionMode>,
    res_mgr: &ResourceManager,
) -> Result<Attachment> {
    ensure_file(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| As4Error::InvalidPath(path.display().to_string()))?;

    let mut att = Attachment::new(String::new(), Some(mime_type));
    add_outgoing_headers(&mut att, &filename);

    let real_file = match compression {
        Some(mode) => {
            att.set_compression_mode(mode);
            let src = File::open(path).map_err(|e| As4Error::io(path, e))?;
            compress_to_temp_file(BufReader::new(src), mode, res_mgr)?
        }
        None => path.to_path_buf(),
    };

    debug!(
        content_id = att.id(),
        file = %path.display(),
        compression = ?compression,
        "Created outgoing file attachment"
    );
    att.set_source(ContentSource::from_file(real_file));
    Ok(att)
}

/// Create an outgoing attachment from in-memory bytes.
pub fn create_outgoing_bytes(
    data: impl Into<Arc<[u8]>>,
    filename: &str,
    mime_type: &str,
    compression: Option<CompressionMode>,
    res_mgr: &ResourceManager,
) -> Result<Attachment> {
    if filename.trim().is_empty() {
        return Err(As4Error::InvalidPath("attachment filename is empty".into()));
    }
    let data: Arc<[u8]> = data.into();

    let mut att = Attachment::new(String::new(), Some(mime_type));
    add_outgoing_headers(&mut att, filename);

    match compression {
        Some(mode) => {
            att.set_compression_mode(mode);
            let compressed = compress_to_temp_file(&data[..], mode, res_mgr)?;
            att.set_source(ContentSource::from_file(compressed));
        }
        None => att.set_source(ContentSource::from_bytes(data)),
    }

    debug!(
        content_id = att.id(),
        filename,
        compression = ?compression,
        "Created outgoing in-memory attachment"
    );
    Ok(att)
}
