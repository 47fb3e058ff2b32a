//! SOAP envelopes: versions, the serialized document and inbound inspection.

pub mod summary;

use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{As4Error, Result};

pub use summary::{EnvelopeSummary, MessageKind, PartSummary};

pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// `wsu:Id` of the `eb:Messaging` header block.
pub const MESSAGING_WSU_ID: &str = "ebMessaging";
/// `wsu:Id` of the SOAP Body.
pub const BODY_WSU_ID: &str = "soapBody";

/// SOAP protocol version of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// AS4 mandates SOAP 1.2.
    pub const AS4_DEFAULT: SoapVersion = SoapVersion::Soap12;

    pub fn namespace_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// MIME type of a serialized envelope.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml",
            Self::Soap12 => "application/soap+xml",
        }
    }

    /// Namespace prefix used when writing envelopes.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Soap11 => "S11",
            Self::Soap12 => "S12",
        }
    }

    /// Value of a `mustUnderstand` attribute set to true.
    pub fn must_understand_value(&self) -> &'static str {
        match self {
            Self::Soap11 => "1",
            Self::Soap12 => "true",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Self::Soap11 => "1.1",
            Self::Soap12 => "1.2",
        }
    }

    pub fn from_namespace_uri(uri: &str) -> Option<Self> {
        match uri {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }

    /// Look up by MIME type, ignoring parameters and case.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        let bare = mime_type.split(';').next().unwrap_or("").trim();
        [Self::Soap11, Self::Soap12]
            .into_iter()
            .find(|v| v.mime_type().eq_ignore_ascii_case(bare))
    }
}

impl Default for SoapVersion {
    fn default() -> Self {
        Self::AS4_DEFAULT
    }
}

impl FromStr for SoapVersion {
    type Err = As4Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.1" => Ok(Self::Soap11),
            "1.2" => Ok(Self::Soap12),
            other => Err(As4Error::UnknownAlgorithm {
                kind: "SOAP version",
                id: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SOAP {}", self.version())
    }
}

/// A serialized SOAP envelope together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapDocument {
    version: SoapVersion,
    xml: String,
}

impl SoapDocument {
    pub fn new(version: SoapVersion, xml: impl Into<String>) -> Self {
        Self {
            version,
            xml: xml.into(),
        }
    }

    /// Wrap received XML, detecting the SOAP version from the root element.
    pub fn parse(xml: impl Into<String>) -> Result<Self> {
        let xml = xml.into();
        let version = detect_version(&xml)?;
        Ok(Self { version, xml })
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.xml.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.xml.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xml.is_empty()
    }

    pub fn into_string(self) -> String {
        self.xml
    }
}

/// Resolve the namespace of the root `Envelope` element.
fn detect_version(xml: &str) -> Result<SoapVersion> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() != b"Envelope" {
                    return Err(As4Error::Xml("root element is not a SOAP Envelope".into()));
                }
                let wanted: Vec<u8> = match e.name().prefix() {
                    Some(prefix) => [b"xmlns:".as_slice(), prefix.as_ref()].concat(),
                    None => b"xmlns".to_vec(),
                };
                let ns = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == wanted.as_slice())
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                return ns
                    .as_deref()
                    .and_then(SoapVersion::from_namespace_uri)
                    .ok_or_else(|| {
                        As4Error::Xml(format!(
                            "unrecognized SOAP envelope namespace: {}",
                            ns.as_deref().unwrap_or("<none>")
                        ))
                    });
            }
            Ok(Event::Eof) => return Err(As4Error::Xml("document has no root element".into())),
            Err(e) => return Err(As4Error::xml(e)),
            _ => {}
        }
        buf.clear();
    }
}
