//! Integration tests for the outbound and inbound message pipeline.

use std::io::{Read, Write};
use std::sync::Mutex;

use assert_fs::prelude::*;
use base64::Engine;

use as4shell::attachment::outgoing::{create_outgoing_bytes, create_outgoing_file};
use as4shell::attachment::Attachment;
use as4shell::compression::CompressionMode;
use as4shell::crypto::{
    AttachmentCallback, CryptAlgorithm, DigestAlgorithm, EncryptRequest, SignAlgorithm,
    SignRequest, ToolkitError, WsSecurityToolkit,
};
use as4shell::error::As4Error;
use as4shell::messaging::user::{DEFAULT_ROLE, DEFAULT_SERVICE, TEST_ACTION};
use as4shell::messaging::{
    As4Message, CollaborationInfo, EbmsErrorKind, ErrorMessage, MessageInfo, Party, PartyInfo,
    ReceiptMessage, UserMessage,
};
use as4shell::pipeline::{prepare_outbound, receive_inbound};
use as4shell::pmode::{PModeLeg, PModeLegProtocol, PModeLegSecurity};
use as4shell::resource::ResourceManager;
use as4shell::soap::{MessageKind, SoapDocument, SoapVersion, WSSE_NS};

const INVOICE: &str = "<Invoice><Line qty=\"3\">Widget</Line><Line qty=\"1\">Gadget</Line></Invoice>";

/// Toolkit stand-in: records references, adds a `wsse:Security` header
/// with one digest per reference, and XORs attachments for encryption.
#[derive(Default)]
struct FakeToolkit {
    signed: Mutex<Vec<String>>,
    encrypted: Mutex<Vec<String>>,
}

impl WsSecurityToolkit for FakeToolkit {
    fn sign(
        &self,
        doc: &SoapDocument,
        request: &SignRequest,
        attachments: &mut dyn AttachmentCallback,
    ) -> Result<SoapDocument, ToolkitError> {
        let mut security = format!("<wsse:Security xmlns:wsse=\"{WSSE_NS}\">");
        for uri in &request.references {
            let digest = match uri.strip_prefix("cid:") {
                Some(cid) => request
                    .digest_algorithm
                    .digest_reader(attachments.open(cid)?)
                    .map_err(|e| ToolkitError::with_source("digest", e))?,
                None => request.digest_algorithm.digest_bytes(doc.as_bytes()),
            };
            security.push_str(&format!(
                "<Reference URI=\"{uri}\">{}</Reference>",
                base64::engine::general_purpose::STANDARD.encode(digest)
            ));
            self.signed.lock().unwrap().push(uri.clone());
        }
        security.push_str("</wsse:Security>");

        let header = format!("<{}:Header>", doc.version().prefix());
        let xml = doc
            .as_str()
            .replacen(&header, &format!("{header}{security}"), 1);
        SoapDocument::parse(xml).map_err(|e| ToolkitError::with_source("reparse", e))
    }

    fn encrypt(
        &self,
        doc: &SoapDocument,
        request: &EncryptRequest,
        attachments: &mut dyn AttachmentCallback,
    ) -> Result<SoapDocument, ToolkitError> {
        for cid in &request.attachments {
            let mut plain = Vec::new();
            attachments
                .open(cid)?
                .read_to_end(&mut plain)
                .map_err(|e| ToolkitError::with_source("read", e))?;
            let mut out = attachments.encrypted_output(cid)?;
            let cipher: Vec<u8> = plain.iter().map(|b| b ^ 0x5A).collect();
            out.write_all(&cipher)
                .and_then(|_| out.flush())
                .map_err(|e| ToolkitError::with_source("write", e))?;
            self.encrypted.lock().unwrap().push(cid.clone());
        }
        Ok(doc.clone())
    }
}

fn user_message(attachments: &[Attachment]) -> As4Message {
    UserMessage::create(
        MessageInfo::new(),
        PartyInfo {
            from: Party::new("urn:org:sender", DEFAULT_ROLE),
            to: Party::new("urn:org:receiver", DEFAULT_ROLE),
        },
        CollaborationInfo::new(DEFAULT_SERVICE, TEST_ACTION),
        Vec::new(),
        None,
        attachments,
    )
    .into()
}

fn signing_leg(version: SoapVersion) -> PModeLeg {
    let security = PModeLegSecurity {
        signature_algorithm: Some(SignAlgorithm::RsaSha256),
        key_alias: Some("sender".into()),
        sign_body: true,
        ..PModeLegSecurity::default()
    };
    PModeLeg::new(
        PModeLegProtocol::new(Some("https://receiver.example/as4".into()), version),
        security,
    )
}

// ─── Test 1: Compressed file attachment survives sign → MIME → parse ──

#[test]
fn test_signed_compressed_roundtrip() {
    let dir = assert_fs::TempDir::new().unwrap();
    let file = dir.child("invoice.xml");
    file.write_str(INVOICE).unwrap();

    let sender = ResourceManager::new();
    let att = create_outgoing_file(
        file.path(),
        "application/xml",
        Some(CompressionMode::Gzip),
        &sender,
    )
    .unwrap();
    let cid = att.id().to_string();
    let message = user_message(std::slice::from_ref(&att));

    let toolkit = FakeToolkit::default();
    let outbound = prepare_outbound(
        &message,
        vec![att],
        &signing_leg(SoapVersion::Soap12),
        Some(&toolkit),
        &sender,
    )
    .unwrap();

    assert_eq!(
        *toolkit.signed.lock().unwrap(),
        vec![
            "#ebMessaging".to_string(),
            "#soapBody".to_string(),
            format!("cid:{cid}")
        ]
    );

    let content_type = outbound.content_type();
    assert!(content_type.starts_with("multipart/related; type=\"application/soap+xml\""));
    let body = outbound.to_bytes(&sender).unwrap();

    let receiver = ResourceManager::new();
    let inbound = receive_inbound(&content_type, &body, &receiver, 64 * 1024).unwrap();
    assert_eq!(inbound.summary.kind, Some(MessageKind::User));
    assert!(inbound.summary.has_security_header);
    assert_eq!(
        inbound.summary.message_id.as_deref(),
        Some(message.message_info().message_id.as_str())
    );

    let received = inbound.attachment(&cid).unwrap();
    assert_eq!(received.compression_mode(), Some(CompressionMode::Gzip));
    assert_eq!(received.mime_type(), Some("application/gzip"));
    assert_eq!(received.uncompressed_mime_type(), Some("application/xml"));
    assert_eq!(received.read_uncompressed(&receiver).unwrap(), INVOICE.as_bytes());
}

// ─── Test 2: Attachment part header order on the wire ───────────────

#[test]
fn test_attachment_part_header_order() {
    let mgr = ResourceManager::new();
    let att = create_outgoing_bytes(INVOICE.as_bytes().to_vec(), "invoice.xml", "application/xml", None, &mgr)
        .unwrap();
    let message = user_message(std::slice::from_ref(&att));
    let leg = PModeLeg::new(
        PModeLegProtocol::create_for_default_soap_version(None),
        PModeLegSecurity::default(),
    );
    let outbound = prepare_outbound(&message, vec![att], &leg, None, &mgr).unwrap();
    let package = outbound.package().unwrap();

    let names: Vec<&str> = package.parts()[1]
        .headers()
        .iter()
        .map(|(n, _)| n.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "Content-ID",
            "Content-Type",
            "Content-Transfer-Encoding",
            "Content-Description",
            "Content-Disposition",
        ]
    );
    assert_eq!(package.parts()[1].header("Content-Type"), Some("application/xml"));
    assert_eq!(
        package.parts()[1].header("Content-Disposition"),
        Some("attachment; filename=\"invoice.xml\"")
    );
}

// ─── Test 3: Sign then encrypt replaces attachment content ─────────

#[test]
fn test_sign_then_encrypt() {
    let mgr = ResourceManager::new();
    let plain = b"confidential payload".to_vec();
    let att = create_outgoing_bytes(plain.clone(), "secret.bin", "application/octet-stream", None, &mgr)
        .unwrap();
    let cid = att.id().to_string();
    let message = user_message(std::slice::from_ref(&att));

    let mut leg = signing_leg(SoapVersion::Soap11);
    leg.security.encryption_algorithm = Some(CryptAlgorithm::Aes128Gcm);
    leg.security.cert_alias = Some("receiver".into());

    let toolkit = FakeToolkit::default();
    let outbound = prepare_outbound(&message, vec![att], &leg, Some(&toolkit), &mgr).unwrap();

    // Signature was computed over the plain content
    assert_eq!(toolkit.signed.lock().unwrap().len(), 3);
    assert_eq!(*toolkit.encrypted.lock().unwrap(), vec![cid.clone()]);

    let sent = &outbound.attachments()[0];
    assert!(sent.is_encrypted());
    assert_eq!(sent.mime_type(), Some("application/octet-stream"));
    let mut cipher = Vec::new();
    sent.content_stream(&mgr).unwrap().read_to_end(&mut cipher).unwrap();
    let expected: Vec<u8> = plain.iter().map(|b| b ^ 0x5A).collect();
    assert_eq!(cipher, expected);

    let body = outbound.to_bytes(&mgr).unwrap();
    let inbound = receive_inbound(&outbound.content_type(), &body, &mgr, 1024).unwrap();
    assert_eq!(inbound.soap_version(), SoapVersion::Soap11);
    let mut received = Vec::new();
    inbound
        .attachment(&cid)
        .unwrap()
        .content_stream(&mgr)
        .unwrap()
        .read_to_end(&mut received)
        .unwrap();
    assert_eq!(received, expected);
}

// ─── Test 4: Single-use attachment is refused before signing ────────

#[test]
fn test_single_use_attachment_refused_for_signing() {
    let mgr = ResourceManager::new();
    let mut att = Attachment::new("once@example", Some("text/plain"));
    att.set_source(as4shell::attachment::ContentSource::single_use(std::io::Cursor::new(
        b"stream".to_vec(),
    )));
    let message = user_message(std::slice::from_ref(&att));

    let toolkit = FakeToolkit::default();
    let res = prepare_outbound(
        &message,
        vec![att],
        &signing_leg(SoapVersion::Soap12),
        Some(&toolkit),
        &mgr,
    );
    assert!(matches!(res, Err(As4Error::SingleUseSource(id)) if id == "once@example"));
    assert!(toolkit.signed.lock().unwrap().is_empty());
}

// ─── Test 5: Error signal as plain SOAP ─────────────────────────────

#[test]
fn test_error_signal_plain_soap() {
    let mgr = ResourceManager::new();
    let error = EbmsErrorKind::DecompressionFailure.to_error(Some("orig@sender"), None);
    let message: As4Message = ErrorMessage::create(
        MessageInfo::new().with_ref_to_message_id("orig@sender"),
        vec![error],
    )
    .unwrap()
    .into();
    let leg = PModeLeg::new(
        PModeLegProtocol::new(None, SoapVersion::Soap11),
        PModeLegSecurity::default(),
    );

    let outbound = prepare_outbound(&message, Vec::new(), &leg, None, &mgr).unwrap();
    assert!(!outbound.is_mime());
    assert_eq!(outbound.content_type(), "text/xml; charset=UTF-8");

    let body = outbound.to_bytes(&mgr).unwrap();
    let inbound = receive_inbound(&outbound.content_type(), &body, &mgr, 1024).unwrap();
    assert_eq!(inbound.summary.kind, Some(MessageKind::Error));
    assert_eq!(inbound.summary.error_codes, vec!["EBMS:0303".to_string()]);
    assert_eq!(inbound.summary.ref_to_message_id.as_deref(), Some("orig@sender"));
}

// ─── Test 6: Non-repudiation receipt digests what was received ──────

#[test]
fn test_receipt_over_received_attachments() {
    let mgr = ResourceManager::new();
    let att = create_outgoing_bytes(b"abc".to_vec(), "abc.txt", "text/plain", None, &mgr).unwrap();
    let message = user_message(std::slice::from_ref(&att));
    let leg = PModeLeg::new(
        PModeLegProtocol::create_for_default_soap_version(None),
        PModeLegSecurity::default(),
    );
    let outbound = prepare_outbound(&message, vec![att], &leg, None, &mgr).unwrap();
    let body = outbound.to_bytes(&mgr).unwrap();

    let rx = ResourceManager::new();
    let inbound = receive_inbound(&outbound.content_type(), &body, &rx, 1024).unwrap();
    let receipt = ReceiptMessage::create_non_repudiation(
        MessageInfo::new().with_ref_to_message_id(message.message_info().message_id.clone()),
        &inbound.attachments,
        &rx,
        DigestAlgorithm::Sha256,
    )
    .unwrap();
    assert_eq!(receipt.references.len(), 1);
    assert_eq!(
        receipt.references[0].digest_value,
        "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
    );

    let receipt: As4Message = receipt.into();
    let doc = receipt.to_soap_document(SoapVersion::Soap12).unwrap();
    assert!(doc.as_str().contains("ebbp:NonRepudiationInformation"));
}

// ─── Test 7: Half-configured security aborts instead of sending plain ─

#[test]
fn test_encryption_without_certificate_aborts() {
    let mgr = ResourceManager::new();
    let att = create_outgoing_bytes(b"plain".to_vec(), "p.txt", "text/plain", None, &mgr).unwrap();
    let message = user_message(std::slice::from_ref(&att));
    let leg = PModeLeg::new(
        PModeLegProtocol::create_for_default_soap_version(None),
        PModeLegSecurity {
            encryption_algorithm: Some(CryptAlgorithm::Aes128Gcm),
            ..PModeLegSecurity::default()
        },
    );

    let toolkit = FakeToolkit::default();
    let res = prepare_outbound(&message, vec![att], &leg, Some(&toolkit), &mgr);
    assert!(matches!(res, Err(As4Error::InvalidMessage(_))));
    assert!(toolkit.encrypted.lock().unwrap().is_empty());

    let mut unsigned = signing_leg(SoapVersion::Soap12);
    unsigned.security.key_alias = None;
    let res = prepare_outbound(&message, Vec::new(), &unsigned, None, &mgr);
    assert!(matches!(res, Err(As4Error::InvalidMessage(_))));
}

// ─── Test 8: Non-UTF-8 text attachment arrives byte for byte ────────

#[test]
fn test_text_attachment_not_transcoded() {
    let latin: &[u8] = b"caf\xe9 \xff\xfe end";
    let mgr = ResourceManager::new();
    let att = create_outgoing_bytes(latin.to_vec(), "menu.txt", "text/plain", None, &mgr).unwrap();
    let cid = att.id().to_string();
    let message = user_message(std::slice::from_ref(&att));
    let leg = PModeLeg::new(
        PModeLegProtocol::create_for_default_soap_version(None),
        PModeLegSecurity::default(),
    );
    let outbound = prepare_outbound(&message, vec![att], &leg, None, &mgr).unwrap();
    let body = outbound.to_bytes(&mgr).unwrap();

    let rx = ResourceManager::new();
    let inbound = receive_inbound(&outbound.content_type(), &body, &rx, 1024).unwrap();
    let mut received = Vec::new();
    inbound
        .attachment(&cid)
        .unwrap()
        .content_stream(&rx)
        .unwrap()
        .read_to_end(&mut received)
        .unwrap();
    assert_eq!(received, latin);
}
