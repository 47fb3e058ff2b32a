//! Content sources that hand out readable streams for attachment payloads.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{As4Error, Result};

/// A boxed, sendable byte stream.
pub type BoxedStream = Box<dyn Read + Send>;

/// Factory behind a [`ContentSource::Reopenable`] source.
///
/// Returning `Ok(None)` means the source currently has no content.
pub type StreamFactory = Arc<dyn Fn() -> io::Result<Option<BoxedStream>> + Send + Sync>;

/// Where the bytes of an attachment come from.
///
/// Signing reads every attachment once and packaging reads it again, so
/// outbound attachments always use [`Reopenable`](Self::Reopenable).
/// [`SingleUse`](Self::SingleUse) is used for small inbound parts that are
/// read exactly once by the receiver.
pub enum ContentSource {
    /// Opens a fresh, independent stream on every call. Safe to call concurrently.
    Reopenable(StreamFactory),
    /// Holds one stream that can be taken exactly once.
    SingleUse(Mutex<Option<BoxedStream>>),
}

impl ContentSource {
    /// Reopenable source backed by an arbitrary factory.
    pub fn reopenable<F>(factory: F) -> Self
    where
        F: Fn() -> io::Result<Option<BoxedStream>> + Send + Sync + 'static,
    {
        Self::Reopenable(Arc::new(factory))
    }

    /// Reopenable source reading a file through a buffered reader.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self::reopenable(move || {
            let file = File::open(&path)?;
            Ok(Some(Box::new(BufReader::new(file)) as BoxedStream))
        })
    }

    /// Reopenable source over shared in-memory bytes.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        let data: Arc<[u8]> = data.into();
        Self::reopenable(move || Ok(Some(Box::new(Cursor::new(Arc::clone(&data))) as BoxedStream)))
    }

    /// Source that yields `stream` once.
    pub fn single_use<R: Read + Send + 'static>(stream: R) -> Self {
        Self::SingleUse(Mutex::new(Some(Box::new(stream))))
    }

    /// Whether [`open`](Self::open) may be called more than once.
    pub fn is_reopenable(&self) -> bool {
        matches!(self, Self::Reopenable(_))
    }

    /// Open a stream. `content_id` is only used for error reporting.
    pub fn open(&self, content_id: &str) -> Result<BoxedStream> {
        match self {
            Self::Reopenable(factory) => match factory() {
                Ok(Some(stream)) => Ok(stream),
                Ok(None) => Err(As4Error::NoContent(content_id.to_string())),
                Err(e) => Err(As4Error::attachment_io(content_id, e)),
            },
            Self::SingleUse(slot) => slot
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
                .ok_or_else(|| As4Error::ContentConsumed(content_id.to_string())),
        }
    }
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reopenable(_) => f.write_str("ContentSource::Reopenable"),
            Self::SingleUse(slot) => {
                let taken = slot.lock().map(|s| s.is_none()).unwrap_or(true);
                write!(f, "ContentSource::SingleUse {{ taken: {taken} }}")
            }
        }
    }
}

/// Whether `path` names a readable regular file.
pub(crate) fn ensure_file(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| As4Error::io(path, e))?;
    if meta.is_file() {
        Ok(())
    } else {
        Err(As4Error::InvalidPath(path.display().to_string()))
    }
}
