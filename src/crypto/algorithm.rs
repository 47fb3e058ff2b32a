//! Catalogues of the XML-DSig / XML-Enc algorithms usable in a PMode leg.
//!
//! Every catalogue is a closed enum with a short configuration identifier
//! and the W3C URI written into the security header. Lookups come in a
//! strict flavour ([`FromStr`], failing with [`As4Error::UnknownAlgorithm`])
//! and in permissive flavours returning `Option` or falling back to a default.

use std::io::{self, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::As4Error;

/// Common lookup behaviour of the algorithm catalogues.
pub trait AlgorithmId: Copy + Sized + 'static {
    /// Name of the catalogue, used in error messages.
    const KIND: &'static str;
    /// Every member of the catalogue.
    const ALL: &'static [Self];

    /// Short identifier used in configuration files.
    fn id(&self) -> &'static str;

    /// Algorithm URI used on the wire.
    fn uri(&self) -> &'static str;

    fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.id() == id)
    }

    fn from_id_or_default(id: Option<&str>, default: Self) -> Self {
        id.and_then(Self::from_id).unwrap_or(default)
    }

    fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.uri() == uri)
    }

    /// Strict lookup by identifier.
    fn from_id_strict(id: &str) -> Result<Self, As4Error> {
        Self::from_id(id).ok_or_else(|| As4Error::UnknownAlgorithm {
            kind: Self::KIND,
            id: id.to_string(),
        })
    }
}

// ─── Signature ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignAlgorithm {
    #[serde(rename = "rsa-sha-256")]
    RsaSha256,
    #[serde(rename = "rsa-sha-384")]
    RsaSha384,
    #[serde(rename = "rsa-sha-512")]
    RsaSha512,
}

impl SignAlgorithm {
    pub const DEFAULT: SignAlgorithm = SignAlgorithm::RsaSha256;

    /// Digest algorithm with the same hash strength.
    pub fn matching_digest(&self) -> DigestAlgorithm {
        match self {
            Self::RsaSha256 => DigestAlgorithm::Sha256,
            Self::RsaSha384 => DigestAlgorithm::Sha384,
            Self::RsaSha512 => DigestAlgorithm::Sha512,
        }
    }
}

impl AlgorithmId for SignAlgorithm {
    const KIND: &'static str = "signature algorithm";
    const ALL: &'static [Self] = &[Self::RsaSha256, Self::RsaSha384, Self::RsaSha512];

    fn id(&self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha-256",
            Self::RsaSha384 => "rsa-sha-384",
            Self::RsaSha512 => "rsa-sha-512",
        }
    }

    fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }
}

// ─── Digest ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "sha-256")]
    Sha256,
    #[serde(rename = "sha-384")]
    Sha384,
    #[serde(rename = "sha-512")]
    Sha512,
}

impl DigestAlgorithm {
    pub const DEFAULT: DigestAlgorithm = DigestAlgorithm::Sha256;

    /// Hash everything readable from `input`.
    pub fn digest_reader(&self, input: impl Read) -> io::Result<Vec<u8>> {
        match self {
            Self::Sha256 => hash_stream::<Sha256>(input),
            Self::Sha384 => hash_stream::<Sha384>(input),
            Self::Sha512 => hash_stream::<Sha512>(input),
        }
    }

    pub fn digest_bytes(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

fn hash_stream<D: Digest>(mut input: impl Read) -> io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

impl AlgorithmId for DigestAlgorithm {
    const KIND: &'static str = "digest algorithm";
    const ALL: &'static [Self] = &[Self::Sha256, Self::Sha384, Self::Sha512];

    fn id(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha384 => "sha-384",
            Self::Sha512 => "sha-512",
        }
    }

    fn uri(&self) -> &'static str {
        match self {
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }
}

// ─── Encryption ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CryptAlgorithm {
    #[serde(rename = "aes-128-gcm")]
    Aes128Gcm,
    #[serde(rename = "aes-192-gcm")]
    Aes192Gcm,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "aes-128-cbc")]
    Aes128Cbc,
    #[serde(rename = "3des")]
    TripleDes,
}

impl CryptAlgorithm {
    /// AES-128-GCM, mandated by the AS4 profile.
    pub const DEFAULT: CryptAlgorithm = CryptAlgorithm::Aes128Gcm;
}

impl AlgorithmId for CryptAlgorithm {
    const KIND: &'static str = "encryption algorithm";
    const ALL: &'static [Self] = &[
        Self::Aes128Gcm,
        Self::Aes192Gcm,
        Self::Aes256Gcm,
        Self::Aes128Cbc,
        Self::TripleDes,
    ];

    fn id(&self) -> &'static str {
        match self {
            Self::Aes128Gcm => "aes-128-gcm",
            Self::Aes192Gcm => "aes-192-gcm",
            Self::Aes256Gcm => "aes-256-gcm",
            Self::Aes128Cbc => "aes-128-cbc",
            Self::TripleDes => "3des",
        }
    }

    fn uri(&self) -> &'static str {
        match self {
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes192Gcm => "http://www.w3.org/2009/xmlenc11#aes192-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::TripleDes => "http://www.w3.org/2001/04/xmlenc#tripledes-cbc",
        }
    }
}

macro_rules! impl_str_conversions {
    ($($ty:ty),+) => {$(
        impl FromStr for $ty {
            type Err = As4Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as AlgorithmId>::from_id_strict(s)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.id())
            }
        }
    )+};
}

impl_str_conversions!(SignAlgorithm, DigestAlgorithm, CryptAlgorithm);
