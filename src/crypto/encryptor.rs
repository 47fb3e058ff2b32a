//! Encryption of a (possibly signed) SOAP document and its attachments.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::algorithm::CryptAlgorithm;
use super::toolkit::{AttachmentBridge, EncryptRequest, WsSecurityToolkit};
use crate::attachment::{Attachment, ContentSource};
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;
use crate::soap::SoapDocument;

/// Parameters of one encryption call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParams {
    /// Alias of the receiver's certificate.
    pub cert_alias: String,
    pub algorithm: CryptAlgorithm,
    pub encrypt_body: bool,
}

impl EncryptionParams {
    pub fn new(cert_alias: impl Into<String>) -> Self {
        Self {
            cert_alias: cert_alias.into(),
            algorithm: CryptAlgorithm::DEFAULT,
            encrypt_body: true,
        }
    }
}

/// Encrypt `doc` and every attachment.
///
/// The toolkit writes each encrypted attachment into a managed temp file,
/// which then becomes the attachment's reopenable source. Every attachment
/// must have been replaced when the toolkit returns.
pub fn encrypt_message(
    toolkit: &dyn WsSecurityToolkit,
    doc: &SoapDocument,
    attachments: &mut [Attachment],
    res_mgr: &ResourceManager,
    params: &EncryptionParams,
) -> Result<SoapDocument> {
    let request = EncryptRequest {
        cert_alias: params.cert_alias.clone(),
        algorithm: params.algorithm,
        encrypt_body: params.encrypt_body,
        attachments: attachments.iter().map(|a| a.id().to_string()).collect(),
    };
    debug!(
        attachments = request.attachments.len(),
        algorithm = %params.algorithm,
        body = params.encrypt_body,
        "Encrypting message"
    );

    let (encrypted, replacements) = {
        let mut bridge = AttachmentBridge::new(attachments, res_mgr);
        match toolkit.encrypt(doc, &request, &mut bridge) {
            Ok(encrypted) => (encrypted, bridge.into_replacements()),
            Err(e) => return Err(bridge.take_failure().unwrap_or(As4Error::Security(e))),
        }
    };

    // All or nothing: resolve every replacement before touching an attachment
    let paths = attachments
        .iter()
        .map(|att| {
            replacements
                .iter()
                .rev()
                .find(|(id, _)| id == att.id())
                .map(|(_, path)| path.clone())
                .ok_or_else(|| {
                    As4Error::InvalidMessage(format!(
                        "no encrypted content produced for attachment '{}'",
                        att.id()
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    for (att, path) in attachments.iter_mut().zip(paths) {
        att.set_source(ContentSource::from_file(path));
        att.mark_encrypted();
    }

    info!(attachments = attachments.len(), "Message encrypted");
    Ok(encrypted)
}
