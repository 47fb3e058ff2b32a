//! User messages: the business payload carrier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MessageInfo;
use crate::attachment::Attachment;

pub const DEFAULT_ROLE: &str =
    "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/defaultRole";
pub const DEFAULT_SERVICE: &str =
    "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/service";
pub const TEST_ACTION: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/test";

/// Part property carrying the original MIME type of a payload.
pub const PROPERTY_MIME_TYPE: &str = "MimeType";
/// Part property carrying the compression MIME type of a payload.
pub const PROPERTY_COMPRESSION_TYPE: &str = "CompressionType";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyId {
    pub value: String,
    pub party_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub ids: Vec<PartyId>,
    pub role: String,
}

impl Party {
    /// Party with one untyped ID.
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            ids: vec![PartyId {
                value: id.into(),
                party_type: None,
            }],
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyInfo {
    pub from: Party,
    pub to: Party,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub value: String,
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationInfo {
    pub agreement_ref: Option<String>,
    pub service: Service,
    pub action: String,
    pub conversation_id: String,
}

impl CollaborationInfo {
    /// Collaboration in a fresh conversation.
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            agreement_ref: None,
            service: Service {
                value: service.into(),
                service_type: None,
            },
            action: action.into(),
            conversation_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One `eb:PartInfo`. `href` is `None` for the SOAP body payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub href: Option<String>,
    pub properties: Vec<Property>,
}

impl PartInfo {
    /// Part info describing an attachment.
    ///
    /// `MimeType` is the uncompressed type; `CompressionType` is only
    /// present for compressed attachments.
    pub fn for_attachment(att: &Attachment) -> Self {
        let mut properties = Vec::new();
        if let Some(mime) = att.uncompressed_mime_type() {
            properties.push(Property::new(PROPERTY_MIME_TYPE, mime));
        }
        if let Some(mode) = att.compression_mode() {
            properties.push(Property::new(PROPERTY_COMPRESSION_TYPE, mode.mime_type()));
        }
        Self {
            href: Some(att.cid_reference()),
            properties,
        }
    }

    /// Part info for the SOAP body payload.
    pub fn for_body() -> Self {
        Self {
            href: None,
            properties: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub info: MessageInfo,
    pub party_info: PartyInfo,
    pub collaboration_info: CollaborationInfo,
    pub properties: Vec<Property>,
    /// XML fragment placed into the SOAP body.
    pub payload: Option<String>,
    pub part_infos: Vec<PartInfo>,
}

impl UserMessage {
    /// Build a user message. One part info is added for the body payload
    /// (if any) followed by one per attachment, in list order.
    pub fn create(
        info: MessageInfo,
        party_info: PartyInfo,
        collaboration_info: CollaborationInfo,
        properties: Vec<Property>,
        payload: Option<String>,
        attachments: &[Attachment],
    ) -> Self {
        let mut part_infos = Vec::with_capacity(attachments.len() + 1);
        if payload.is_some() {
            part_infos.push(PartInfo::for_body());
        }
        part_infos.extend(attachments.iter().map(PartInfo::for_attachment));

        Self {
            info,
            party_info,
            collaboration_info,
            properties,
            payload,
            part_infos,
        }
    }
}
