//! ebMS3 message domain model.
//!
//! Messages are plain data built by factories. Serialization into a SOAP
//! envelope happens in [`As4Message::to_soap_document`].

pub mod ebms_error;
pub mod receipt;
pub mod user;
mod xml;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::soap::{MessageKind, SoapDocument, SoapVersion};

pub use ebms_error::{Description, EbmsError, EbmsErrorKind, ErrorCategory, ErrorMessage, Severity};
pub use receipt::{ReceiptMessage, ReferenceDigest};
pub use user::{
    CollaborationInfo, PartInfo, Party, PartyId, PartyInfo, Property, Service, UserMessage,
};

/// ebMS3 core namespace.
pub const EBMS_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";
/// ebBP signals namespace (non-repudiation information).
pub const EBBP_NS: &str = "http://docs.oasis-open.org/ebxml-bp/ebbp-signals-2.0";
/// XML-DSig namespace.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Domain part of generated message IDs.
pub const MESSAGE_ID_DOMAIN: &str = "as4shell";

/// Common header of every ebMS3 message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub ref_to_message_id: Option<String>,
}

impl MessageInfo {
    /// Fresh message ID, current time, no reference.
    pub fn new() -> Self {
        Self {
            message_id: Self::generate_message_id(),
            timestamp: Utc::now(),
            ref_to_message_id: None,
        }
    }

    pub fn with_ref_to_message_id(mut self, ref_to: impl Into<String>) -> Self {
        self.ref_to_message_id = Some(ref_to.into());
        self
    }

    /// `<uuid>@as4shell`
    pub fn generate_message_id() -> String {
        format!("{}@{MESSAGE_ID_DOMAIN}", Uuid::new_v4())
    }
}

impl Default for MessageInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Any message this crate can build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum As4Message {
    User(UserMessage),
    Error(ErrorMessage),
    Receipt(ReceiptMessage),
}

impl As4Message {
    pub fn message_info(&self) -> &MessageInfo {
        match self {
            Self::User(m) => &m.info,
            Self::Error(m) => m.info(),
            Self::Receipt(m) => &m.info,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::User(_) => MessageKind::User,
            Self::Error(_) => MessageKind::Error,
            Self::Receipt(_) => MessageKind::Receipt,
        }
    }

    /// Serialize into a SOAP envelope of the given version.
    pub fn to_soap_document(&self, version: SoapVersion) -> Result<SoapDocument> {
        let xml = xml::write_envelope(self, version)?;
        Ok(SoapDocument::new(version, xml))
    }
}

impl From<UserMessage> for As4Message {
    fn from(m: UserMessage) -> Self {
        Self::User(m)
    }
}

impl From<ErrorMessage> for As4Message {
    fn from(m: ErrorMessage) -> Self {
        Self::Error(m)
    }
}

impl From<ReceiptMessage> for As4Message {
    fn from(m: ReceiptMessage) -> Self {
        Self::Receipt(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_unique() {
        let a = MessageInfo::new();
        let b = MessageInfo::new();
        assert_ne!(a.message_id, b.message_id);
        assert!(a.message_id.ends_with("@as4shell"));
        assert!(a.ref_to_message_id.is_none());
    }

    #[test]
    fn test_ref_to_message_id() {
        let info = MessageInfo::new().with_ref_to_message_id("orig@peer");
        assert_eq!(info.ref_to_message_id.as_deref(), Some("orig@peer"));
    }
}
