//! ebMS3 error signals.

use serde::{Deserialize, Serialize};

use super::MessageInfo;
use crate::error::{As4Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Failure,
}

impl Severity {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Content,
    #[serde(rename = "UnPackaging")]
    Unpackaging,
    Processing,
    Communication,
}

impl ErrorCategory {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Content => "Content",
            Self::Unpackaging => "UnPackaging",
            Self::Processing => "Processing",
            Self::Communication => "Communication",
        }
    }
}

/// Human readable error description with its language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub lang: String,
    pub value: String,
}

impl Description {
    pub fn new(lang: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            value: value.into(),
        }
    }

    /// English description.
    pub fn en(value: impl Into<String>) -> Self {
        Self::new("en", value)
    }
}

/// One `eb:Error` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbmsError {
    pub error_code: String,
    pub severity: Severity,
    pub category: Option<ErrorCategory>,
    pub ref_to_message_in_error: Option<String>,
    pub origin: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<Description>,
    pub error_detail: Option<String>,
}

/// Standard errors defined by ebMS3 Core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EbmsErrorKind {
    ValueNotRecognized,
    FeatureNotSupported,
    ValueInconsistent,
    Other,
    ConnectionFailure,
    EmptyMessagePartitionChannel,
    MimeInconsistency,
    FeatureNotSupportedInconsistency,
    InvalidHeader,
    ProcessingModeMismatch,
    ExternalPayloadError,
    FailedAuthentication,
    FailedDecryption,
    PolicyNoncompliance,
    MissingReceipt,
    InvalidReceipt,
    DecompressionFailure,
}

impl EbmsErrorKind {
    pub const ALL: &'static [EbmsErrorKind] = &[
        Self::ValueNotRecognized,
        Self::FeatureNotSupported,
        Self::ValueInconsistent,
        Self::Other,
        Self::ConnectionFailure,
        Self::EmptyMessagePartitionChannel,
        Self::MimeInconsistency,
        Self::FeatureNotSupportedInconsistency,
        Self::InvalidHeader,
        Self::ProcessingModeMismatch,
        Self::ExternalPayloadError,
        Self::FailedAuthentication,
        Self::FailedDecryption,
        Self::PolicyNoncompliance,
        Self::MissingReceipt,
        Self::InvalidReceipt,
        Self::DecompressionFailure,
    ];

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValueNotRecognized => "EBMS:0001",
            Self::FeatureNotSupported => "EBMS:0002",
            Self::ValueInconsistent => "EBMS:0003",
            Self::Other => "EBMS:0004",
            Self::ConnectionFailure => "EBMS:0005",
            Self::EmptyMessagePartitionChannel => "EBMS:0006",
            Self::MimeInconsistency => "EBMS:0007",
            Self::FeatureNotSupportedInconsistency => "EBMS:0008",
            Self::InvalidHeader => "EBMS:0009",
            Self::ProcessingModeMismatch => "EBMS:0010",
            Self::ExternalPayloadError => "EBMS:0011",
            Self::FailedAuthentication => "EBMS:0101",
            Self::FailedDecryption => "EBMS:0102",
            Self::PolicyNoncompliance => "EBMS:0103",
            Self::MissingReceipt => "EBMS:0301",
            Self::InvalidReceipt => "EBMS:0302",
            Self::DecompressionFailure => "EBMS:0303",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::FeatureNotSupported | Self::EmptyMessagePartitionChannel => Severity::Warning,
            _ => Severity::Failure,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValueNotRecognized
            | Self::FeatureNotSupported
            | Self::ValueInconsistent
            | Self::Other => ErrorCategory::Content,
            Self::ConnectionFailure | Self::EmptyMessagePartitionChannel => {
                ErrorCategory::Communication
            }
            Self::MimeInconsistency
            | Self::FeatureNotSupportedInconsistency
            | Self::InvalidHeader
            | Self::ProcessingModeMismatch
            | Self::ExternalPayloadError => ErrorCategory::Unpackaging,
            Self::FailedAuthentication | Self::FailedDecryption | Self::PolicyNoncompliance => {
                ErrorCategory::Processing
            }
            Self::MissingReceipt | Self::InvalidReceipt | Self::DecompressionFailure => {
                ErrorCategory::Communication
            }
        }
    }

    pub fn short_description(&self) -> &'static str {
        match self {
            Self::ValueNotRecognized => "ValueNotRecognized",
            Self::FeatureNotSupported | Self::FeatureNotSupportedInconsistency => {
                "FeatureNotSupported"
            }
            Self::ValueInconsistent => "ValueInconsistent",
            Self::Other => "Other",
            Self::ConnectionFailure => "ConnectionFailure",
            Self::EmptyMessagePartitionChannel => "EmptyMessagePartitionChannel",
            Self::MimeInconsistency => "MimeInconsistency",
            Self::InvalidHeader => "InvalidHeader",
            Self::ProcessingModeMismatch => "ProcessingModeMismatch",
            Self::ExternalPayloadError => "ExternalPayloadError",
            Self::FailedAuthentication => "FailedAuthentication",
            Self::FailedDecryption => "FailedDecryption",
            Self::PolicyNoncompliance => "PolicyNoncompliance",
            Self::MissingReceipt => "MissingReceipt",
            Self::InvalidReceipt => "InvalidReceipt",
            Self::DecompressionFailure => "DecompressionFailure",
        }
    }

    pub fn from_error_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.error_code() == code)
    }

    /// Error entry of this kind.
    pub fn to_error(
        &self,
        ref_to_message_in_error: Option<&str>,
        description: Option<Description>,
    ) -> EbmsError {
        EbmsError {
            error_code: self.error_code().to_string(),
            severity: self.severity(),
            category: Some(self.category()),
            ref_to_message_in_error: ref_to_message_in_error.map(String::from),
            origin: Some("ebMS".to_string()),
            short_description: Some(self.short_description().to_string()),
            description,
            error_detail: None,
        }
    }
}

/// Signal message carrying one or more errors.
///
/// Only built through [`ErrorMessage::create`], deserialization included,
/// so every entry has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ErrorMessageFields")]
pub struct ErrorMessage {
    info: MessageInfo,
    errors: Vec<EbmsError>,
}

#[derive(Deserialize)]
struct ErrorMessageFields {
    info: MessageInfo,
    errors: Vec<EbmsError>,
}

impl TryFrom<ErrorMessageFields> for ErrorMessage {
    type Error = As4Error;

    fn try_from(fields: ErrorMessageFields) -> Result<Self> {
        Self::create(fields.info, fields.errors)
    }
}

impl ErrorMessage {
    /// Build an error message.
    ///
    /// A description that is present must not be empty, as an empty
    /// `eb:Description` is invalid on the wire.
    pub fn create(info: MessageInfo, errors: Vec<EbmsError>) -> Result<Self> {
        errors.iter().try_for_each(validate)?;
        Ok(Self { info, errors })
    }

    pub fn info(&self) -> &MessageInfo {
        &self.info
    }

    pub fn errors(&self) -> &[EbmsError] {
        &self.errors
    }

    /// Append an entry, with the same checks as [`ErrorMessage::create`].
    pub fn push_error(&mut self, error: EbmsError) -> Result<()> {
        validate(&error)?;
        self.errors.push(error);
        Ok(())
    }
}

fn validate(error: &EbmsError) -> Result<()> {
    if error.description.as_ref().is_some_and(|d| d.value.is_empty()) {
        return Err(As4Error::InvalidMessage(format!(
            "error '{}' has an empty description",
            error.error_code
        )));
    }
    Ok(())
}
