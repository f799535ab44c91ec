//! Ordered verification queries and the probe state machine
//!
//! A probe runs `Created → Connecting → Connected → Querying → Completed | Failed`.
//! Steps run strictly in order: `server-version`, `ssl-status`, `session-tls`,
//! `sample-count`, `list-tables`. Every step except `sample-count` is fatal on
//! failure; `sample-count` follows the configured [`SamplePolicy`].

use crate::{
    config::ConnectionConfig,
    error::{ProbeError, ProbeStep, SoftWarning},
    session::Session,
    tls::{CertificateInfo, inspect_certificate},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use std::{fmt, time::Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_SAMPLE_TABLE: &str = "users";
pub const DEFAULT_SCHEMA: &str = "public";

/// How a failing `sample-count` step is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplePolicy {
    /// Record a warning and leave `row_count` empty
    #[default]
    Soft,
    /// Fail the probe
    Strict,
}

/// Knobs for the query sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Table counted by the `sample-count` step, optionally `schema.table`
    pub sample_table: String,
    /// Schema listed by the `list-tables` step
    pub schema: String,
    pub sample_policy: SamplePolicy,
    /// Read the server certificate over a separate handshake
    pub inspect_certificate: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            sample_table: DEFAULT_SAMPLE_TABLE.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            sample_policy: SamplePolicy::default(),
            inspect_certificate: true,
        }
    }
}

/// Outcome of a completed probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub connected: bool,
    pub checked_at: String,
    pub elapsed_ms: u64,
    pub backend_pid: i32,
    pub server_version: String,
    /// `SHOW ssl` on the server
    pub server_tls_enabled: bool,
    /// This session's `pg_stat_ssl` row
    pub tls_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cipher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    pub sample_table: String,
    pub sample_policy: SamplePolicy,
    pub row_count: Option<i64>,
    pub schema: String,
    pub table_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInfo>,
    pub warnings: Vec<SoftWarning>,
}

/// Probe lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeState {
    Created,
    Connecting,
    Connected,
    Querying,
    Completed,
    Failed,
}

impl ProbeState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Failed)
                | (Self::Connected, Self::Querying)
                | (Self::Querying, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Querying => "querying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one probe invocation
#[derive(Debug)]
pub struct ProbeRun {
    state: ProbeState,
}

impl Default for ProbeRun {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRun {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ProbeState::Created,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ProbeState {
        self.state
    }

    /// Move to `next`; returns false and keeps the current state if the
    /// transition is not allowed
    pub fn advance(&mut self, next: ProbeState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "invalid probe transition");
            return false;
        }
        debug!(from = %self.state, to = %next, "probe transition");
        self.state = next;
        true
    }
}

/// Connect, run every step, and release the session on every path
///
/// # Errors
///
/// Returns the connect error, or the first hard-failing step as
/// `ProbeError::Query`.
pub async fn run(
    config: &ConnectionConfig,
    options: &ProbeOptions,
) -> Result<ProbeResult, ProbeError> {
    let started = Instant::now();
    let mut run = ProbeRun::new();
    info!(uri = %config, "starting probe");

    run.advance(ProbeState::Connecting);
    let mut session = match Session::connect(config).await {
        Ok(session) => session,
        Err(err) => {
            run.advance(ProbeState::Failed);
            return Err(err);
        }
    };
    run.advance(ProbeState::Connected);

    run.advance(ProbeState::Querying);
    let mut outcome = probe(&mut session, options).await;
    if let Ok(result) = &mut outcome
        && options.inspect_certificate
        && config.tls().mode.is_enabled()
    {
        attach_certificate(result, config).await;
    }

    run.advance(if outcome.is_ok() {
        ProbeState::Completed
    } else {
        ProbeState::Failed
    });
    session.release().await;

    let mut result = outcome?;
    result.elapsed_ms = elapsed_ms(started);
    info!(
        elapsed_ms = result.elapsed_ms,
        warnings = result.warnings.len(),
        "probe completed"
    );
    Ok(result)
}

/// Run the verification steps against an open session
///
/// # Errors
///
/// Returns `ProbeError::Query` naming the first hard-failing step, or
/// `ProbeError::SessionReleased` if the session was already closed.
pub async fn probe(
    session: &mut Session,
    options: &ProbeOptions,
) -> Result<ProbeResult, ProbeError> {
    let started = Instant::now();
    let backend_pid = session.backend_pid();
    let conn = session.connection()?;
    let mut warnings = Vec::new();

    let server_version = server_version(conn).await?;
    debug!(step = %ProbeStep::ServerVersion, %server_version);

    let server_tls_enabled = ssl_status(conn).await?;
    debug!(step = %ProbeStep::SslStatus, server_tls_enabled);

    let session_tls = session_tls(conn, backend_pid).await?;
    debug!(step = %ProbeStep::SessionTls, tls_active = session_tls.active);

    let row_count = match count_rows(conn, &options.sample_table).await {
        Ok(count) => Some(count),
        Err(err) if options.sample_policy == SamplePolicy::Soft => {
            warn!(step = %ProbeStep::SampleCount, table = %options.sample_table, "{err}");
            warnings.push(SoftWarning::new(ProbeStep::SampleCount, err.to_string()));
            None
        }
        Err(err) => return Err(ProbeError::query(ProbeStep::SampleCount)(err)),
    };

    let table_names = list_tables(conn, &options.schema).await?;
    debug!(step = %ProbeStep::ListTables, tables = table_names.len());

    Ok(ProbeResult {
        connected: true,
        checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        elapsed_ms: elapsed_ms(started),
        backend_pid,
        server_version,
        server_tls_enabled,
        tls_active: session_tls.active,
        tls_version: session_tls.version,
        tls_cipher: session_tls.cipher,
        client_address: session_tls.client_address,
        server_address: session_tls.server_address,
        sample_table: options.sample_table.clone(),
        sample_policy: options.sample_policy,
        row_count,
        schema: options.schema.clone(),
        table_names,
        certificate: None,
        warnings,
    })
}

async fn attach_certificate(result: &mut ProbeResult, config: &ConnectionConfig) {
    match inspect_certificate(config.host(), config.port(), config.tls()).await {
        Ok(certificate) => {
            if let Some(warning) = certificate.as_ref().and_then(expiry_warning) {
                warn!(step = %ProbeStep::Certificate, "{}", warning.message);
                result.warnings.push(warning);
            }
            result.certificate = certificate;
        }
        Err(err) => {
            warn!(step = %ProbeStep::Certificate, "{err:#}");
            result
                .warnings
                .push(SoftWarning::new(ProbeStep::Certificate, format!("{err:#}")));
        }
    }
}

fn expiry_warning(certificate: &CertificateInfo) -> Option<SoftWarning> {
    certificate.is_expired().then(|| {
        SoftWarning::new(
            ProbeStep::Certificate,
            format!(
                "server certificate expired on {} ({} days ago)",
                certificate.not_after, -certificate.expiry_days
            ),
        )
    })
}

async fn server_version(conn: &mut PgConnection) -> Result<String, ProbeError> {
    sqlx::query_scalar("SELECT version()")
        .fetch_one(conn)
        .await
        .map_err(ProbeError::query(ProbeStep::ServerVersion))
}

async fn ssl_status(conn: &mut PgConnection) -> Result<bool, ProbeError> {
    let value: String = sqlx::query_scalar("SHOW ssl")
        .fetch_one(conn)
        .await
        .map_err(ProbeError::query(ProbeStep::SslStatus))?;
    Ok(parse_setting_bool(&value))
}

#[derive(Debug, Default, sqlx::FromRow)]
struct SessionTls {
    active: bool,
    version: Option<String>,
    cipher: Option<String>,
    client_address: Option<String>,
    server_address: Option<String>,
}

/// TLS details for this session's backend only, never another session's row
async fn session_tls(conn: &mut PgConnection, backend_pid: i32) -> Result<SessionTls, ProbeError> {
    let row: Option<SessionTls> = sqlx::query_as(
        "SELECT ssl AS active, version, cipher, \
         host(inet_client_addr()) AS client_address, \
         host(inet_server_addr()) AS server_address \
         FROM pg_stat_ssl WHERE pid = $1",
    )
    .bind(backend_pid)
    .fetch_optional(conn)
    .await
    .map_err(ProbeError::query(ProbeStep::SessionTls))?;

    Ok(row.unwrap_or_default())
}

async fn count_rows(conn: &mut PgConnection, table: &str) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_qualified(table));
    sqlx::query_scalar(&sql).fetch_one(conn).await
}

async fn list_tables(conn: &mut PgConnection, schema: &str) -> Result<Vec<String>, ProbeError> {
    sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = $1 ORDER BY table_name",
    )
    .bind(schema)
    .fetch_all(conn)
    .await
    .map_err(ProbeError::query(ProbeStep::ListTables))
}

/// Quote a possibly schema-qualified name, one identifier per dot
fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `PostgreSQL` boolean settings print as `on`/`off` (also accepts `true`, `yes`, `1`)
fn parse_setting_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "on" | "true" | "yes" | "1"
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
