//! Read the ebMS3 essentials out of a received envelope.
//!
//! This is not a schema binding. It walks the document once with quick-xml
//! and picks up what the receiving side needs to match attachments and to
//! route the message.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;

use super::{SoapDocument, SoapVersion};
use crate::error::{As4Error, Result};

/// Kind of ebMS3 message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Receipt,
    Error,
    /// A signal message without receipt or error.
    Signal,
}

/// One `eb:PartInfo` of the payload info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartSummary {
    pub href: Option<String>,
    pub mime_type: Option<String>,
    pub compression_type: Option<String>,
    pub properties: Vec<(String, String)>,
}

impl PartSummary {
    /// Content ID referenced by a `cid:` href.
    pub fn content_id(&self) -> Option<&str> {
        self.href.as_deref().and_then(|h| h.strip_prefix("cid:"))
    }
}

/// What a receiver needs to know about an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeSummary {
    pub soap_version: SoapVersion,
    pub kind: Option<MessageKind>,
    pub message_id: Option<String>,
    pub ref_to_message_id: Option<String>,
    pub timestamp: Option<String>,
    pub parts: Vec<PartSummary>,
    /// Error codes of the `eb:Error` entries of an error signal.
    pub error_codes: Vec<String>,
    pub has_security_header: bool,
}

impl EnvelopeSummary {
    pub fn read(doc: &SoapDocument) -> Result<Self> {
        let mut summary = EnvelopeSummary {
            soap_version: doc.version(),
            kind: None,
            message_id: None,
            ref_to_message_id: None,
            timestamp: None,
            parts: Vec::new(),
            error_codes: Vec::new(),
            has_security_header: false,
        };

        let mut reader = Reader::from_str(doc.as_str());
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut property_name: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    summary.element(e, &stack, &mut property_name);
                    stack.push(local_name(e));
                }
                Ok(Event::Empty(ref e)) => summary.element(e, &stack, &mut property_name),
                Ok(Event::Text(ref e)) => {
                    let text = e.unescape().map_err(As4Error::xml)?;
                    summary.text(&stack, text.trim(), &mut property_name);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(As4Error::xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(summary)
    }

    fn element(&mut self, e: &BytesStart, stack: &[String], property_name: &mut Option<String>) {
        let name = local_name(e);
        let within = |n: &str| stack.iter().any(|s| s == n);

        match name.as_str() {
            "Security" if within("Header") => self.has_security_header = true,
            "UserMessage" => self.kind = Some(MessageKind::User),
            "SignalMessage" if self.kind.is_none() => self.kind = Some(MessageKind::Signal),
            "Receipt" if within("SignalMessage") => self.kind = Some(MessageKind::Receipt),
            "Error" if within("SignalMessage") => {
                self.kind = Some(MessageKind::Error);
                if let Some(code) = attr_value(e, b"errorCode") {
                    self.error_codes.push(code);
                }
            }
            "PartInfo" if within("Messaging") => self.parts.push(PartSummary {
                href: attr_value(e, b"href"),
                ..Default::default()
            }),
            "Property" if within("PartProperties") => *property_name = attr_value(e, b"name"),
            _ => {}
        }
    }

    fn text(&mut self, stack: &[String], text: &str, property_name: &mut Option<String>) {
        let Some(current) = stack.last() else {
            return;
        };
        if !stack.iter().any(|s| s == "Messaging") || text.is_empty() {
            return;
        }
        match current.as_str() {
            "MessageId" if self.message_id.is_none() => self.message_id = Some(text.to_string()),
            "RefToMessageId" if self.ref_to_message_id.is_none() => {
                self.ref_to_message_id = Some(text.to_string())
            }
            "Timestamp" if self.timestamp.is_none() => self.timestamp = Some(text.to_string()),
            "Property" => {
                if let (Some(name), Some(part)) = (property_name.take(), self.parts.last_mut()) {
                    match name.as_str() {
                        "MimeType" => part.mime_type = Some(text.to_string()),
                        "CompressionType" => part.compression_type = Some(text.to_string()),
                        _ => {}
                    }
                    part.properties.push((name, text.to_string()));
                }
            }
            _ => {}
        }
    }

    /// Part info entry referencing `content_id`.
    pub fn part(&self, content_id: &str) -> Option<&PartSummary> {
        self.parts.iter().find(|p| p.content_id() == Some(content_id))
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_MESSAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<S12:Envelope xmlns:S12="http://www.w3.org/2003/05/soap-envelope"
              xmlns:eb="http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/">
  <S12:Header>
    <wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"/>
    <eb:Messaging S12:mustUnderstand="true">
      <eb:UserMessage>
        <eb:MessageInfo>
          <eb:Timestamp>2024-05-01T10:00:00Z</eb:Timestamp>
          <eb:MessageId>m1@example</eb:MessageId>
        </eb:MessageInfo>
        <eb:PayloadInfo>
          <eb:PartInfo href="cid:att-1">
            <eb:PartProperties>
              <eb:Property name="MimeType">application/xml</eb:Property>
              <eb:Property name="CompressionType">application/gzip</eb:Property>
            </eb:PartProperties>
          </eb:PartInfo>
          <eb:PartInfo href="cid:att-2"/>
        </eb:PayloadInfo>
      </eb:UserMessage>
    </eb:Messaging>
  </S12:Header>
  <S12:Body><MessageId>not-this-one</MessageId></S12:Body>
</S12:Envelope>"#;

    #[test]
    fn test_read_user_message() {
        let doc = SoapDocument::parse(USER_MESSAGE).unwrap();
        let summary = EnvelopeSummary::read(&doc).unwrap();
        assert_eq!(summary.soap_version, SoapVersion::Soap12);
        assert_eq!(summary.kind, Some(MessageKind::User));
        assert_eq!(summary.message_id.as_deref(), Some("m1@example"));
        assert_eq!(summary.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert!(summary.has_security_header);
        assert_eq!(summary.parts.len(), 2);

        let first = summary.part("att-1").unwrap();
        assert_eq!(first.mime_type.as_deref(), Some("application/xml"));
        assert_eq!(first.compression_type.as_deref(), Some("application/gzip"));
        assert_eq!(summary.part("att-2").unwrap().mime_type, None);
    }

    #[test]
    fn test_read_error_signal() {
        let xml = r#"<S11:Envelope xmlns:S11="http://schemas.xmlsoap.org/soap/envelope/"
            xmlns:eb="http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/">
          <S11:Header><eb:Messaging><eb:SignalMessage>
            <eb:MessageInfo><eb:MessageId>e1</eb:MessageId><eb:RefToMessageId>m1</eb:RefToMessageId></eb:MessageInfo>
            <eb:Error errorCode="EBMS:0004" severity="failure" shortDescription="Other"/>
          </eb:SignalMessage></eb:Messaging></S11:Header><S11:Body/></S11:Envelope>"#;
        let summary = EnvelopeSummary::read(&SoapDocument::parse(xml).unwrap()).unwrap();
        assert_eq!(summary.kind, Some(MessageKind::Error));
        assert_eq!(summary.ref_to_message_id.as_deref(), Some("m1"));
        assert_eq!(summary.error_codes, vec!["EBMS:0004"]);
        assert!(!summary.has_security_header);
    }
}
