//! PMode leg settings consumed by one exchange.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::crypto::{
    CryptAlgorithm, DigestAlgorithm, EncryptionParams, SignAlgorithm, SigningParams,
};
use crate::error::{As4Error, Result};
use crate::soap::SoapVersion;

/// Outcome of a change-reporting setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

impl Change {
    pub fn is_changed(self) -> bool {
        self == Self::Changed
    }
}

/// Transport parameters of a leg: where to send and which SOAP version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PModeLegProtocol {
    address: Option<String>,
    soap_version: SoapVersion,
}

impl PModeLegProtocol {
    pub fn new(address: Option<String>, soap_version: SoapVersion) -> Self {
        Self {
            address,
            soap_version,
        }
    }

    /// Protocol settings using the AS4 default SOAP version (1.2).
    pub fn create_for_default_soap_version(address: Option<String>) -> Self {
        Self::new(address, SoapVersion::AS4_DEFAULT)
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// URL scheme of the address (`http`, `https`, ...), if it parses as a URL.
    pub fn address_protocol(&self) -> Option<String> {
        self.address
            .as_deref()
            .and_then(|a| Url::parse(a).ok())
            .map(|u| u.scheme().to_string())
    }

    pub fn set_address(&mut self, address: Option<String>) -> Change {
        if self.address == address {
            return Change::Unchanged;
        }
        self.address = address;
        Change::Changed
    }

    pub fn soap_version(&self) -> SoapVersion {
        self.soap_version
    }

    pub fn set_soap_version(&mut self, soap_version: SoapVersion) -> Change {
        if self.soap_version == soap_version {
            return Change::Unchanged;
        }
        self.soap_version = soap_version;
        Change::Changed
    }
}

/// Security settings of a leg. Absent algorithms disable the step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PModeLegSecurity {
    pub signature_algorithm: Option<SignAlgorithm>,
    pub digest_algorithm: Option<DigestAlgorithm>,
    pub encryption_algorithm: Option<CryptAlgorithm>,
    /// Alias of the signing key.
    pub key_alias: Option<String>,
    /// Alias of the receiver certificate used for encryption.
    pub cert_alias: Option<String>,
    pub sign_body: bool,
}

impl PModeLegSecurity {
    /// Signing parameters, when a signature algorithm is configured.
    ///
    /// A signature algorithm without a key alias is an error. A missing digest
    /// algorithm follows the signature algorithm's strength.
    pub fn signing_params(&self) -> Result<Option<SigningParams>> {
        let Some(algorithm) = self.signature_algorithm else {
            return Ok(None);
        };
        let key_alias = self.key_alias.clone().ok_or_else(|| {
            As4Error::InvalidMessage(format!(
                "signature algorithm '{algorithm}' configured without a key alias"
            ))
        })?;
        Ok(Some(SigningParams {
            key_alias,
            cert_alias: self.cert_alias.clone(),
            signature_algorithm: algorithm,
            digest_algorithm: self
                .digest_algorithm
                .unwrap_or_else(|| algorithm.matching_digest()),
            sign_body: self.sign_body,
        }))
    }

    /// Encryption parameters, when an encryption algorithm is configured.
    ///
    /// An encryption algorithm without a certificate alias is an error.
    pub fn encryption_params(&self) -> Result<Option<EncryptionParams>> {
        let Some(algorithm) = self.encryption_algorithm else {
            return Ok(None);
        };
        let cert_alias = self.cert_alias.clone().ok_or_else(|| {
            As4Error::InvalidMessage(format!(
                "encryption algorithm '{algorithm}' configured without a certificate alias"
            ))
        })?;
        Ok(Some(EncryptionParams {
            cert_alias,
            algorithm,
            encrypt_body: true,
        }))
    }

    /// Whether the leg asks for signing or encryption.
    pub fn requires_toolkit(&self) -> Result<bool> {
        Ok(self.signing_params()?.is_some() || self.encryption_params()?.is_some())
    }
}

/// One leg of a PMode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PModeLeg {
    pub protocol: PModeLegProtocol,
    #[serde(default)]
    pub security: PModeLegSecurity,
}

impl PModeLeg {
    pub fn new(protocol: PModeLegProtocol, security: PModeLegSecurity) -> Self {
        Self { protocol, security }
    }
}
