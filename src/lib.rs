//! `as4shell`: AS4/ebMS3 message assembly and security pipeline.
//!
//! This crate builds ebMS3 messages, signs and encrypts them through a
//! pluggable WS-Security toolkit, and packages them as SOAP-with-attachments
//! MIME. Attachment content is streamed and every temp file belongs to a
//! [`resource::ResourceManager`] scoped to one exchange.

pub mod attachment;
pub mod compression;
pub mod config;
pub mod crypto;
pub mod error;
pub mod messaging;
pub mod mime;
pub mod pipeline;
pub mod pmode;
pub mod resource;
pub mod soap;
