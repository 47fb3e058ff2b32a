//! SOAP envelope serialization of ebMS3 messages.

use chrono::SecondsFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::ebms_error::EbmsError;
use super::user::{Party, UserMessage};
use super::{As4Message, MessageInfo, DSIG_NS, EBBP_NS, EBMS_NS};
use crate::error::{As4Error, Result};
use crate::soap::{SoapVersion, BODY_WSU_ID, MESSAGING_WSU_ID, WSU_NS};

/// Thin wrapper mapping writer failures into [`As4Error::Xml`].
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(As4Error::xml)
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.event(Event::Start(el))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.event(Event::Empty(el))
    }

    fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attrs)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Copy an already serialized XML fragment verbatim.
    fn raw(&mut self, fragment: &str) -> Result<()> {
        self.event(Event::Text(BytesText::from_escaped(fragment)))
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(As4Error::xml)
    }
}

pub(super) fn write_envelope(message: &As4Message, version: SoapVersion) -> Result<String> {
    let soap = version.prefix();
    let envelope = format!("{soap}:Envelope");
    let header = format!("{soap}:Header");
    let body = format!("{soap}:Body");
    let xmlns_soap = format!("xmlns:{soap}");
    let must_understand = format!("{soap}:mustUnderstand");

    let mut out = XmlOut::new();
    out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    out.start(
        &envelope,
        &[
            (xmlns_soap.as_str(), version.namespace_uri()),
            ("xmlns:eb", EBMS_NS),
            ("xmlns:wsu", WSU_NS),
        ],
    )?;

    out.start(&header, &[])?;
    out.start(
        "eb:Messaging",
        &[
            (must_understand.as_str(), version.must_understand_value()),
            ("wsu:Id", MESSAGING_WSU_ID),
        ],
    )?;
    match message {
        As4Message::User(user) => write_user_message(&mut out, user)?,
        As4Message::Error(error) => {
            out.start("eb:SignalMessage", &[])?;
            write_message_info(&mut out, error.info())?;
            for e in error.errors() {
                write_error(&mut out, e)?;
            }
            out.end("eb:SignalMessage")?;
        }
        As4Message::Receipt(receipt) => {
            out.start("eb:SignalMessage", &[])?;
            write_message_info(&mut out, &receipt.info)?;
            out.start("eb:Receipt", &[])?;
            out.start(
                "ebbp:NonRepudiationInformation",
                &[("xmlns:ebbp", EBBP_NS), ("xmlns:ds", DSIG_NS)],
            )?;
            for r in &receipt.references {
                out.start("ebbp:MessagePartNRInformation", &[])?;
                out.start("ds:Reference", &[("URI", r.uri.as_str())])?;
                out.empty(
                    "ds:DigestMethod",
                    &[("Algorithm", crate::crypto::AlgorithmId::uri(&r.digest_algorithm))],
                )?;
                out.text_element("ds:DigestValue", &[], &r.digest_value)?;
                out.end("ds:Reference")?;
                out.end("ebbp:MessagePartNRInformation")?;
            }
            out.end("ebbp:NonRepudiationInformation")?;
            out.end("eb:Receipt")?;
            out.end("eb:SignalMessage")?;
        }
    }
    out.end("eb:Messaging")?;
    out.end(&header)?;

    let payload = match message {
        As4Message::User(user) => user.payload.as_deref(),
        _ => None,
    };
    match payload {
        Some(fragment) => {
            out.start(&body, &[("wsu:Id", BODY_WSU_ID)])?;
            out.raw(fragment)?;
            out.end(&body)?;
        }
        None => out.empty(&body, &[("wsu:Id", BODY_WSU_ID)])?,
    }

    out.end(&envelope)?;
    out.finish()
}

fn write_message_info(out: &mut XmlOut, info: &MessageInfo) -> Result<()> {
    out.start("eb:MessageInfo", &[])?;
    out.text_element(
        "eb:Timestamp",
        &[],
        &info.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    )?;
    out.text_element("eb:MessageId", &[], &info.message_id)?;
    if let Some(ref_to) = &info.ref_to_message_id {
        out.text_element("eb:RefToMessageId", &[], ref_to)?;
    }
    out.end("eb:MessageInfo")
}

fn write_party(out: &mut XmlOut, name: &str, party: &Party) -> Result<()> {
    out.start(name, &[])?;
    for id in &party.ids {
        match &id.party_type {
            Some(t) => out.text_element("eb:PartyId", &[("type", t.as_str())], &id.value)?,
            None => out.text_element("eb:PartyId", &[], &id.value)?,
        }
    }
    out.text_element("eb:Role", &[], &party.role)?;
    out.end(name)
}

fn write_user_message(out: &mut XmlOut, user: &UserMessage) -> Result<()> {
    out.start("eb:UserMessage", &[])?;
    write_message_info(out, &user.info)?;

    out.start("eb:PartyInfo", &[])?;
    write_party(out, "eb:From", &user.party_info.from)?;
    write_party(out, "eb:To", &user.party_info.to)?;
    out.end("eb:PartyInfo")?;

    let collab = &user.collaboration_info;
    out.start("eb:CollaborationInfo", &[])?;
    if let Some(agreement) = &collab.agreement_ref {
        out.text_element("eb:AgreementRef", &[], agreement)?;
    }
    match &collab.service.service_type {
        Some(t) => out.text_element("eb:Service", &[("type", t.as_str())], &collab.service.value)?,
        None => out.text_element("eb:Service", &[], &collab.service.value)?,
    }
    out.text_element("eb:Action", &[], &collab.action)?;
    out.text_element("eb:ConversationId", &[], &collab.conversation_id)?;
    out.end("eb:CollaborationInfo")?;

    if !user.properties.is_empty() {
        out.start("eb:MessageProperties", &[])?;
        for p in &user.properties {
            out.text_element("eb:Property", &[("name", p.name.as_str())], &p.value)?;
        }
        out.end("eb:MessageProperties")?;
    }

    if !user.part_infos.is_empty() {
        out.start("eb:PayloadInfo", &[])?;
        for part in &user.part_infos {
            let attrs: Vec<(&str, &str)> = part
                .href
                .as_deref()
                .map(|h| ("href", h))
                .into_iter()
                .collect();
            if part.properties.is_empty() {
                out.empty("eb:PartInfo", &attrs)?;
                continue;
            }
            out.start("eb:PartInfo", &attrs)?;
            out.start("eb:PartProperties", &[])?;
            for p in &part.properties {
                out.text_element("eb:Property", &[("name", p.name.as_str())], &p.value)?;
            }
            out.end("eb:PartProperties")?;
            out.end("eb:PartInfo")?;
        }
        out.end("eb:PayloadInfo")?;
    }

    out.end("eb:UserMessage")
}

fn write_error(out: &mut XmlOut, error: &EbmsError) -> Result<()> {
    let mut attrs: Vec<(&str, &str)> = vec![
        ("errorCode", error.error_code.as_str()),
        ("severity", error.severity.id()),
    ];
    if let Some(category) = error.category {
        attrs.push(("category", category.id()));
    }
    if let Some(r) = &error.ref_to_message_in_error {
        attrs.push(("refToMessageInError", r.as_str()));
    }
    if let Some(origin) = &error.origin {
        attrs.push(("origin", origin.as_str()));
    }
    if let Some(short) = &error.short_description {
        attrs.push(("shortDescription", short.as_str()));
    }

    if error.description.is_none() && error.error_detail.is_none() {
        return out.empty("eb:Error", &attrs);
    }
    out.start("eb:Error", &attrs)?;
    if let Some(desc) = &error.description {
        out.text_element("eb:Description", &[("xml:lang", desc.lang.as_str())], &desc.value)?;
    }
    if let Some(detail) = &error.error_detail {
        out.text_element("eb:ErrorDetail", &[], detail)?;
    }
    out.end("eb:Error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::user::{CollaborationInfo, PartyInfo, Property, DEFAULT_ROLE};
    use crate::messaging::{Description, EbmsErrorKind, ErrorMessage, ReceiptMessage, ReferenceDigest};
    use crate::crypto::DigestAlgorithm;
    use crate::soap::{EnvelopeSummary, MessageKind, SoapDocument};

    fn user_message(payload: Option<&str>) -> As4Message {
        UserMessage::create(
            MessageInfo::new(),
            PartyInfo {
                from: Party::new("sender & co", DEFAULT_ROLE),
                to: Party::new("receiver", DEFAULT_ROLE),
            },
            CollaborationInfo::new("urn:svc", "Deliver"),
            vec![Property::new("originalSender", "urn:oasis:a")],
            payload.map(String::from),
            &[],
        )
        .into()
    }

    #[test]
    fn test_user_message_envelope() {
        let msg = user_message(Some("<inv:Invoice xmlns:inv=\"urn:inv\">1</inv:Invoice>"));
        let doc = msg.to_soap_document(SoapVersion::Soap12).unwrap();
        let xml = doc.as_str();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<S12:Envelope xmlns:S12=\"http://www.w3.org/2003/05/soap-envelope\""));
        assert!(xml.contains("S12:mustUnderstand=\"true\" wsu:Id=\"ebMessaging\""));
        assert!(xml.contains("<S12:Body wsu:Id=\"soapBody\"><inv:Invoice xmlns:inv=\"urn:inv\">1</inv:Invoice></S12:Body>"));
        assert!(xml.contains("sender &amp; co"));

        let parsed = SoapDocument::parse(xml.to_string()).unwrap();
        assert_eq!(parsed.version(), SoapVersion::Soap12);
        let summary = EnvelopeSummary::read(&parsed).unwrap();
        assert_eq!(summary.kind, Some(MessageKind::User));
        assert_eq!(summary.message_id.as_deref(), Some(msg.message_info().message_id.as_str()));
        assert_eq!(summary.parts.len(), 1);
    }

    #[test]
    fn test_soap11_must_understand() {
        let doc = user_message(None).to_soap_document(SoapVersion::Soap11).unwrap();
        assert!(doc.as_str().contains("S11:mustUnderstand=\"1\""));
        assert!(doc.as_str().contains("<S11:Body wsu:Id=\"soapBody\"/>"));
    }

    #[test]
    fn test_error_message_envelope() {
        let errors = vec![
            EbmsErrorKind::ValueInconsistent.to_error(Some("m1"), Some(Description::en("bad part"))),
            EbmsErrorKind::Other.to_error(None, None),
        ];
        let msg: As4Message = ErrorMessage::create(MessageInfo::new().with_ref_to_message_id("m1"), errors)
            .unwrap()
            .into();
        let doc = msg.to_soap_document(SoapVersion::Soap12).unwrap();
        assert!(doc.as_str().contains("<eb:Description xml:lang=\"en\">bad part</eb:Description>"));

        let summary = EnvelopeSummary::read(&doc).unwrap();
        assert_eq!(summary.kind, Some(MessageKind::Error));
        assert_eq!(summary.error_codes, vec!["EBMS:0003", "EBMS:0004"]);
        assert_eq!(summary.ref_to_message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_receipt_envelope() {
        let msg: As4Message = ReceiptMessage::create(
            MessageInfo::new(),
            vec![ReferenceDigest {
                uri: "cid:a1".into(),
                digest_algorithm: DigestAlgorithm::Sha256,
                digest_value: "AAAA".into(),
            }],
        )
        .into();
        let doc = msg.to_soap_document(SoapVersion::Soap12).unwrap();
        assert!(doc
            .as_str()
            .contains("<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>"));
        let summary = EnvelopeSummary::read(&doc).unwrap();
        assert_eq!(summary.kind, Some(MessageKind::Receipt));
    }
}
