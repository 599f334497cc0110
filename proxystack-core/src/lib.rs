//! Core types and traits for ProxyStack
//!
//! This crate provides the types shared by the proxy middleware crates:
//! S3 error codes, request ids, credential mapping, metrics and the
//! capability registry.

pub mod account;
pub mod error;
pub mod info;
pub mod metrics;
pub mod request_id;
pub mod xml;

pub use account::{CredentialStore, S3Auth};
pub use error::{ErrorCode, S3Error};
pub use info::InfoRegistry;
pub use metrics::{AtomicCounter, Counter, MetricsRegistry};
pub use request_id::RequestId;
pub use xml::{render_document, XmlError, S3_XMLNS, XML_DECLARATION};
