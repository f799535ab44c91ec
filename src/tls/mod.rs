//! TLS configuration and certificate inspection
//!
//! # Module Organization
//!
//! - `config` - TLS configuration and modes
//! - `metadata` - Server certificate details
//! - `inspect` - Standalone handshake that reads the server certificate
//!
//! The probe session itself negotiates TLS through sqlx; `inspect` opens its
//! own short-lived connection and never authenticates.

pub mod config;
pub mod inspect;
pub mod metadata;

pub use config::{TlsConfig, TlsMode};
pub use inspect::{ensure_crypto_provider, inspect_certificate};
pub use metadata::CertificateInfo;
