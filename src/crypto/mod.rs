//! WS-Security orchestration: algorithm catalogues, the toolkit boundary,
//! signing and encryption.
//!
//! Both operations are stateless. Every call carries its algorithms and key
//! aliases explicitly, usually taken from the PMode leg security settings.

pub mod algorithm;
pub mod encryptor;
pub mod signer;
pub mod toolkit;

pub use algorithm::{AlgorithmId, CryptAlgorithm, DigestAlgorithm, SignAlgorithm};
pub use encryptor::{encrypt_message, EncryptionParams};
pub use signer::{create_signed_message, SigningParams};
pub use toolkit::{AttachmentCallback, EncryptRequest, SignRequest, ToolkitError, WsSecurityToolkit};
