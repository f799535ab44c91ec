use serde::Serialize;
use std::{fmt, time::Duration};
use thiserror::Error;

/// Identifier of each step a probe performs, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStep {
    ServerVersion,
    SslStatus,
    SessionTls,
    SampleCount,
    ListTables,
    Certificate,
}

impl ProbeStep {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServerVersion => "server-version",
            Self::SslStatus => "ssl-status",
            Self::SessionTls => "session-tls",
            Self::SampleCount => "sample-count",
            Self::ListTables => "list-tables",
            Self::Certificate => "certificate",
        }
    }
}

impl fmt::Display for ProbeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    #[error("authentication rejected for user {user}: {message}")]
    Authentication { user: String, message: String },

    #[error("query step {step} failed: {source}")]
    Query {
        step: ProbeStep,
        #[source]
        source: sqlx::Error,
    },

    #[error("session already released")]
    SessionReleased,

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

impl ProbeError {
    /// The step that failed, for query errors.
    #[must_use]
    pub const fn step(&self) -> Option<ProbeStep> {
        match self {
            Self::Query { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Build a query error for `step`, used with `map_err`.
    pub fn query(step: ProbeStep) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { step, source }
    }
}

/// A non-fatal step failure folded into the probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftWarning {
    pub step: ProbeStep,
    pub message: String,
}

impl SoftWarning {
    pub fn new(step: ProbeStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for SoftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}
