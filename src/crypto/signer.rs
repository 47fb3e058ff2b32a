//! Signing of a SOAP document and its attachments.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::algorithm::{DigestAlgorithm, SignAlgorithm};
use super::toolkit::{AttachmentBridge, SignRequest, WsSecurityToolkit};
use crate::attachment::Attachment;
use crate::error::{As4Error, Result};
use crate::resource::ResourceManager;
use crate::soap::{SoapDocument, BODY_WSU_ID, MESSAGING_WSU_ID};

/// Parameters of one signing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningParams {
    pub key_alias: String,
    pub cert_alias: Option<String>,
    pub signature_algorithm: SignAlgorithm,
    pub digest_algorithm: DigestAlgorithm,
    /// Also reference the SOAP Body.
    pub sign_body: bool,
}

impl SigningParams {
    /// Default algorithms, body signed.
    pub fn new(key_alias: impl Into<String>) -> Self {
        Self {
            key_alias: key_alias.into(),
            cert_alias: None,
            signature_algorithm: SignAlgorithm::DEFAULT,
            digest_algorithm: DigestAlgorithm::DEFAULT,
            sign_body: true,
        }
    }

    /// Reference URIs covered by the signature, in document order.
    pub fn references(&self, attachments: &[Attachment]) -> Vec<String> {
        let mut refs = vec![format!("#{MESSAGING_WSU_ID}")];
        if self.sign_body {
            refs.push(format!("#{BODY_WSU_ID}"));
        }
        refs.extend(attachments.iter().map(Attachment::cid_reference));
        refs
    }
}

/// Sign `doc` and every attachment.
///
/// Each attachment is read by the toolkit now and again when packaged, so a
/// single-use source is rejected before the toolkit is called.
pub fn create_signed_message(
    toolkit: &dyn WsSecurityToolkit,
    doc: &SoapDocument,
    attachments: &[Attachment],
    res_mgr: &ResourceManager,
    params: &SigningParams,
) -> Result<SoapDocument> {
    if let Some(att) = attachments.iter().find(|a| !a.is_reopenable()) {
        return Err(As4Error::SingleUseSource(att.id().to_string()));
    }

    let request = SignRequest {
        key_alias: params.key_alias.clone(),
        cert_alias: params.cert_alias.clone(),
        signature_algorithm: params.signature_algorithm,
        digest_algorithm: params.digest_algorithm,
        references: params.references(attachments),
    };
    debug!(
        references = request.references.len(),
        algorithm = %params.signature_algorithm,
        digest = %params.digest_algorithm,
        "Signing message"
    );

    let mut bridge = AttachmentBridge::new(attachments, res_mgr);
    match toolkit.sign(doc, &request, &mut bridge) {
        Ok(signed) => {
            info!(attachments = attachments.len(), "Message signed");
            Ok(signed)
        }
        Err(e) => Err(bridge.take_failure().unwrap_or(As4Error::Security(e))),
    }
}
