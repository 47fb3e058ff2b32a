//! Payload compression codecs.
//!
//! AS4 compresses attachments before they are signed, so the signature
//! covers the bytes that are transmitted. Every codec carries the MIME type
//! that identifies its output on the wire.

use std::io::{self, Read, Write};
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::As4Error;

/// A compression algorithm usable for attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionMode {
    /// RFC 1952 GZIP, the only codec required by the AS4 profile.
    #[serde(rename = "gzip")]
    Gzip,
}

impl CompressionMode {
    /// All known codecs.
    pub const ALL: &'static [CompressionMode] = &[CompressionMode::Gzip];

    /// Stable identifier used in configuration.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
        }
    }

    /// MIME type of compressed content.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Gzip => "application/gzip",
        }
    }

    /// File extension (including the dot) for compressed files.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
        }
    }

    /// Wrap `out` so that everything written to it gets compressed.
    ///
    /// The returned writer must be [`finish`](CompressWriter::finish)ed to
    /// write the trailer.
    pub fn wrap<W: Write>(&self, out: W) -> CompressWriter<W> {
        match self {
            Self::Gzip => CompressWriter::Gzip(GzEncoder::new(out, Compression::default())),
        }
    }

    /// Wrap `input` so that reading from it yields decompressed bytes.
    pub fn unwrap<R: Read>(&self, input: R) -> DecompressReader<R> {
        match self {
            Self::Gzip => DecompressReader::Gzip(GzDecoder::new(input)),
        }
    }

    /// Look up a codec by its identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.id() == id)
    }

    /// Look up a codec by identifier, falling back to `default` for
    /// missing or unknown identifiers.
    pub fn from_id_or_default(id: Option<&str>, default: Option<Self>) -> Option<Self> {
        id.and_then(Self::from_id).or(default)
    }

    /// Look up a codec by the MIME type of its output.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        let bare = mime_type.split(';').next().unwrap_or("").trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.mime_type().eq_ignore_ascii_case(bare))
    }
}

impl FromStr for CompressionMode {
    type Err = As4Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| As4Error::UnknownAlgorithm {
            kind: "compression",
            id: s.to_string(),
        })
    }
}

impl std::fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Compressing writer returned by [`CompressionMode::wrap`].
pub enum CompressWriter<W: Write> {
    Gzip(GzEncoder<W>),
}

impl<W: Write> CompressWriter<W> {
    /// Flush remaining compressed data and the trailer, returning the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Gzip(enc) => enc.finish(),
        }
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(enc) => enc.flush(),
        }
    }
}

/// Decompressing reader returned by [`CompressionMode::unwrap`].
pub enum DecompressReader<R: Read> {
    Gzip(GzDecoder<R>),
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(dec) => dec.read(buf),
        }
    }
}
