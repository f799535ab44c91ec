//! Connectivity probe for TLS-secured `PostgreSQL` databases
//!
//! A probe resolves a [`ConnectionConfig`], opens one [`Session`], runs a fixed
//! sequence of verification queries and releases the session on every path.
//!
//! ```rust,ignore
//! use pgprobe::{ProbeOptions, config::{ENV_PREFIX, environment_from, resolve_config}, probe};
//!
//! let env = environment_from(std::env::vars(), ENV_PREFIX);
//! let config = resolve_config(&env);
//! let result = probe::run(&config, &ProbeOptions::default()).await?;
//! println!("{} over {:?}", result.server_version, result.tls_version);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod probe;
pub mod session;
pub mod tls;

pub use config::{ConnectionConfig, Password, resolve_config};
pub use error::{ProbeError, ProbeStep, SoftWarning};
pub use probe::{ProbeOptions, ProbeResult, ProbeState, SamplePolicy};
pub use session::Session;
