//! One outbound send or one inbound receive, end to end.
//!
//! Outbound: message → SOAP document → sign → encrypt → MIME package.
//! Compression already happened when the attachments were created.
//! Inbound: MIME → envelope + attachments → compression state restored
//! from the `eb:PartProperties` of the envelope.

use std::io::Write;

use tracing::{debug, info};

use crate::attachment::{Attachment, HEADER_CONTENT_TYPE};
use crate::compression::CompressionMode;
use crate::crypto::{create_signed_message, encrypt_message, WsSecurityToolkit};
use crate::error::{As4Error, Result};
use crate::messaging::As4Message;
use crate::mime::{self, MimePackage, ParsedMime};
use crate::pmode::{PModeLeg, PModeLegSecurity};
use crate::resource::ResourceManager;
use crate::soap::{EnvelopeSummary, SoapDocument, SoapVersion};

/// Sign, then encrypt, as far as `security` asks for it.
pub fn secure_document(
    doc: SoapDocument,
    attachments: &mut [Attachment],
    security: &PModeLegSecurity,
    toolkit: &dyn WsSecurityToolkit,
    res_mgr: &ResourceManager,
) -> Result<SoapDocument> {
    let mut doc = doc;
    if let Some(params) = security.signing_params()? {
        doc = create_signed_message(toolkit, &doc, attachments, res_mgr, &params)?;
    }
    if let Some(params) = security.encryption_params()? {
        doc = encrypt_message(toolkit, &doc, attachments, res_mgr, &params)?;
    }
    Ok(doc)
}

/// A message ready for the transport.
#[derive(Debug)]
pub enum OutboundMessage {
    /// Bare SOAP envelope, no attachments.
    Soap(SoapDocument),
    /// SOAP with attachments.
    Mime {
        envelope: SoapDocument,
        attachments: Vec<Attachment>,
        boundary: String,
    },
}

impl OutboundMessage {
    pub fn envelope(&self) -> &SoapDocument {
        match self {
            Self::Soap(doc) => doc,
            Self::Mime { envelope, .. } => envelope,
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        match self {
            Self::Soap(_) => &[],
            Self::Mime { attachments, .. } => attachments,
        }
    }

    pub fn is_mime(&self) -> bool {
        matches!(self, Self::Mime { .. })
    }

    /// The MIME layout, for multipart messages.
    pub fn package(&self) -> Option<MimePackage<'_>> {
        match self {
            Self::Soap(_) => None,
            Self::Mime {
                envelope,
                attachments,
                boundary,
            } => Some(mime::generate_with_boundary(
                envelope.version(),
                envelope,
                attachments,
                boundary.clone(),
            )),
        }
    }

    /// Value of the HTTP Content-Type header.
    pub fn content_type(&self) -> String {
        match self.package() {
            Some(package) => package.content_type(),
            None => format!("{}; charset=UTF-8", self.envelope().version().mime_type()),
        }
    }

    /// Headers the transport sends along with the body.
    pub fn global_headers(&self) -> Vec<(String, String)> {
        match self.package() {
            Some(package) => package.global_headers(),
            None => vec![(HEADER_CONTENT_TYPE.to_string(), self.content_type())],
        }
    }

    /// Stream the transport body into `out`.
    pub fn write_to(&self, out: &mut dyn Write, res_mgr: &ResourceManager) -> Result<()> {
        match self.package() {
            Some(package) => package.write_to(out, res_mgr),
            None => {
                out.write_all(self.envelope().as_bytes())?;
                Ok(())
            }
        }
    }

    /// Transport body buffered in memory.
    pub fn to_bytes(&self, res_mgr: &ResourceManager) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, res_mgr)?;
        Ok(buf)
    }
}

/// Build, secure and package a message for `leg`.
///
/// A toolkit is required as soon as the leg asks for signing or encryption.
pub fn prepare_outbound(
    message: &As4Message,
    mut attachments: Vec<Attachment>,
    leg: &PModeLeg,
    toolkit: Option<&dyn WsSecurityToolkit>,
    res_mgr: &ResourceManager,
) -> Result<OutboundMessage> {
    let soap_version = leg.protocol.soap_version();
    let mut doc = message.to_soap_document(soap_version)?;

    let security = &leg.security;
    if security.requires_toolkit()? {
        let toolkit = toolkit.ok_or_else(|| {
            As4Error::InvalidMessage("leg requires WS-Security but no toolkit was given".into())
        })?;
        doc = secure_document(doc, &mut attachments, security, toolkit, res_mgr)?;
    }

    info!(
        message_id = %message.message_info().message_id,
        kind = ?message.kind(),
        soap_version = %soap_version,
        attachments = attachments.len(),
        "Prepared outbound message"
    );
    if attachments.is_empty() {
        Ok(OutboundMessage::Soap(doc))
    } else {
        Ok(OutboundMessage::Mime {
            envelope: doc,
            attachments,
            boundary: mime::generate_boundary(),
        })
    }
}

/// A received message.
#[derive(Debug)]
pub struct InboundMessage {
    pub envelope: SoapDocument,
    pub summary: EnvelopeSummary,
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn soap_version(&self) -> SoapVersion {
        self.envelope.version()
    }

    pub fn attachment(&self, content_id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id() == content_id)
    }
}

/// Parse a received transport body.
pub fn receive_inbound(
    content_type: &str,
    body: &[u8],
    res_mgr: &ResourceManager,
    threshold: u64,
) -> Result<InboundMessage> {
    finish_inbound(mime::parse(content_type, body, res_mgr, threshold)?)
}

/// Parse a stored message, MIME headers included.
pub fn receive_message(
    raw: &[u8],
    res_mgr: &ResourceManager,
    threshold: u64,
) -> Result<InboundMessage> {
    finish_inbound(mime::parse_message(raw, res_mgr, threshold)?)
}

fn finish_inbound(parsed: ParsedMime) -> Result<InboundMessage> {
    let summary = EnvelopeSummary::read(&parsed.envelope)?;

    let mut attachments = parsed.attachments;
    for att in &mut attachments {
        let Some(part) = summary.part(att.id()) else {
            debug!(content_id = att.id(), "Attachment without PartInfo");
            continue;
        };
        if let Some(mime_type) = part.mime_type.as_deref() {
            att.overwrite_mime_type(Some(mime_type));
        }
        if let Some(compression) = part.compression_type.as_deref() {
            let mode = CompressionMode::from_mime_type(compression).ok_or_else(|| {
                As4Error::UnknownAlgorithm {
                    kind: "compression",
                    id: compression.to_string(),
                }
            })?;
            att.set_compression_mode(mode);
        }
    }

    info!(
        message_id = summary.message_id.as_deref().unwrap_or("<none>"),
        attachments = attachments.len(),
        signed = summary.has_security_header,
        "Received inbound message"
    );
    Ok(InboundMessage {
        envelope: parsed.envelope,
        summary,
        attachments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::outgoing::create_outgoing_bytes;
    use crate::messaging::user::{DEFAULT_ROLE, DEFAULT_SERVICE, TEST_ACTION};
    use crate::messaging::{CollaborationInfo, MessageInfo, Party, PartyInfo, UserMessage};
    use crate::pmode::PModeLegProtocol;
    use crate::soap::MessageKind;

    fn leg() -> PModeLeg {
        PModeLeg::new(
            PModeLegProtocol::create_for_default_soap_version(Some("https://msh.example".into())),
            PModeLegSecurity::default(),
        )
    }

    fn user(attachments: &[Attachment]) -> As4Message {
        UserMessage::create(
            MessageInfo::new(),
            PartyInfo {
                from: Party::new("a", DEFAULT_ROLE),
                to: Party::new("b", DEFAULT_ROLE),
            },
            CollaborationInfo::new(DEFAULT_SERVICE, TEST_ACTION),
            vec![],
            None,
            attachments,
        )
        .into()
    }

    #[test]
    fn test_without_attachments_is_plain_soap() {
        let mgr = ResourceManager::new();
        let out = prepare_outbound(&user(&[]), vec![], &leg(), None, &mgr).unwrap();
        assert!(!out.is_mime());
        assert_eq!(out.content_type(), "application/soap+xml; charset=UTF-8");
        assert_eq!(
            out.global_headers(),
            vec![("Content-Type".to_string(), out.content_type())]
        );

        let body = out.to_bytes(&mgr).unwrap();
        let inbound = receive_inbound(&out.content_type(), &body, &mgr, 1024).unwrap();
        assert_eq!(inbound.summary.kind, Some(MessageKind::User));
        assert!(inbound.attachments.is_empty());
    }

    #[test]
    fn test_security_without_toolkit_rejected() {
        let mgr = ResourceManager::new();
        let mut leg = leg();
        leg.security.signature_algorithm = Some(crate::crypto::SignAlgorithm::RsaSha256);
        leg.security.key_alias = Some("k".into());
        let res = prepare_outbound(&user(&[]), vec![], &leg, None, &mgr);
        assert!(matches!(res, Err(As4Error::InvalidMessage(_))));
    }

    #[test]
    fn test_compression_restored_on_receive() {
        let mgr = ResourceManager::new();
        let att = create_outgoing_bytes(
            b"<Order>42</Order>".to_vec(),
            "order.xml",
            "application/xml",
            Some(CompressionMode::Gzip),
            &mgr,
        )
        .unwrap();
        let message = user(std::slice::from_ref(&att));
        let out = prepare_outbound(&message, vec![att], &leg(), None, &mgr).unwrap();
        assert!(out.is_mime());
        let content_type = out.content_type();
        let body = out.to_bytes(&mgr).unwrap();
        // Stable boundary between content type and body
        assert!(content_type.contains(&out.package().unwrap().boundary().to_string()));

        let rx = ResourceManager::new();
        let inbound = receive_inbound(&content_type, &body, &rx, 1024).unwrap();
        assert_eq!(inbound.attachments.len(), 1);
        let received = &inbound.attachments[0];
        assert_eq!(received.compression_mode(), Some(CompressionMode::Gzip));
        assert_eq!(received.uncompressed_mime_type(), Some("application/xml"));
        assert_eq!(received.read_uncompressed(&rx).unwrap(), b"<Order>42</Order>");
    }

    #[test]
    fn test_receive_stored_message() {
        let mgr = ResourceManager::new();
        let att = create_outgoing_bytes(b"a,b;1,2".to_vec(), "data.csv", "text/csv", None, &mgr)
            .unwrap();
        let message = user(std::slice::from_ref(&att));
        let out = prepare_outbound(&message, vec![att], &leg(), None, &mgr).unwrap();
        let mut stored = Vec::new();
        out.package().unwrap().write_message_to(&mut stored, &mgr).unwrap();

        let inbound = receive_message(&stored, &mgr, 1024).unwrap();
        assert_eq!(
            inbound.summary.message_id.as_deref(),
            Some(message.message_info().message_id.as_str())
        );
        let received = inbound.attachment(out.attachments()[0].id()).unwrap();
        assert_eq!(received.mime_type(), Some("text/csv"));
        assert!(!received.has_compression_mode());
        assert_eq!(received.read_uncompressed(&mgr).unwrap(), b"a,b;1,2");
    }
}
