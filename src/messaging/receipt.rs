//! Receipt signals with non-repudiation information.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MessageInfo;
use crate::attachment::Attachment;
use crate::crypto::DigestAlgorithm;
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;

/// Digest of one received part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDigest {
    pub uri: String,
    pub digest_algorithm: DigestAlgorithm,
    /// Base64 encoded digest.
    pub digest_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptMessage {
    pub info: MessageInfo,
    pub references: Vec<ReferenceDigest>,
}

impl ReceiptMessage {
    pub fn create(info: MessageInfo, references: Vec<ReferenceDigest>) -> Self {
        Self { info, references }
    }

    /// Receipt digesting the transmitted content of every attachment.
    ///
    /// Content is streamed through the digest, never buffered whole.
    pub fn create_non_repudiation(
        info: MessageInfo,
        attachments: &[Attachment],
        res_mgr: &ResourceManager,
        digest: DigestAlgorithm,
    ) -> Result<Self> {
        let mut references = Vec::with_capacity(attachments.len());
        for att in attachments {
            let stream = att.content_stream(res_mgr)?;
            let value = digest
                .digest_reader(stream)
                .map_err(|e| As4Error::attachment_io(att.id(), e))?;
            references.push(ReferenceDigest {
                uri: att.cid_reference(),
                digest_algorithm: digest,
                digest_value: BASE64.encode(value),
            });
        }
        debug!(references = references.len(), digest = %digest, "Created receipt");
        Ok(Self { info, references })
    }
}
