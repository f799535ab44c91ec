use crate::{config::ConnectionConfig, error::ProbeError, tls::TlsMode};
use sqlx::{
    ConnectOptions, Connection, PgConnection,
    postgres::{PgConnectOptions, PgSslMode},
};
use std::time::Instant;
use tracing::{debug, warn};

// SQLSTATE codes for rejected credentials
const INVALID_PASSWORD: &str = "28P01";
const INVALID_AUTHORIZATION: &str = "28000";

const APPLICATION_NAME: &str = env!("CARGO_PKG_NAME");

/// One live connection, owned by a single probe
///
/// A session is never cloned or pooled. Call [`Session::release`] on every
/// exit path; dropping an unreleased session closes the socket without the
/// graceful terminate message.
#[derive(Debug)]
pub struct Session {
    conn: Option<PgConnection>,
    backend_pid: i32,
    encrypted: bool,
}

impl Session {
    /// Open a session using the configured TLS mode
    ///
    /// With any TLS-enabled mode the session's own `pg_stat_ssl` row must report
    /// an encrypted transport, otherwise the connection is closed and a TLS
    /// error returned.
    ///
    /// # Errors
    ///
    /// - `ProbeError::Tls` when TLS negotiation or certificate validation fails
    /// - `ProbeError::Authentication` when the server rejects the credentials
    /// - `ProbeError::Connection` for network, DNS and other handshake failures
    /// - `ProbeError::Config` when the client rejects the options
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ProbeError> {
        let options = connect_options(config);

        let timer = Instant::now();
        let mut conn = options
            .connect()
            .await
            .map_err(|err| classify_connect_error(err, config))?;

        let (backend_pid, encrypted): (i32, bool) = match sqlx::query_as(
            "SELECT pg_backend_pid(), \
             COALESCE((SELECT ssl FROM pg_stat_ssl WHERE pid = pg_backend_pid()), false)",
        )
        .fetch_one(&mut conn)
        .await
        {
            Ok(row) => row,
            Err(err) => {
                conn.close().await.ok();
                return Err(ProbeError::Connection(err));
            }
        };

        if config.tls().mode.is_enabled() && !encrypted {
            conn.close().await.ok();
            return Err(ProbeError::Tls(format!(
                "sslmode={} but backend {backend_pid} reports an unencrypted transport",
                config.tls().mode
            )));
        }

        debug!(
            backend_pid,
            encrypted,
            elapsed_ms = timer.elapsed().as_millis(),
            "session established"
        );

        Ok(Self {
            conn: Some(conn),
            backend_pid,
            encrypted,
        })
    }

    /// Server process id serving this session
    #[must_use]
    pub const fn backend_pid(&self) -> i32 {
        self.backend_pid
    }

    /// Whether the server reported this session's transport as encrypted
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// Borrow the underlying connection
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::SessionReleased` after [`Session::release`].
    pub fn connection(&mut self) -> Result<&mut PgConnection, ProbeError> {
        self.conn.as_mut().ok_or(ProbeError::SessionReleased)
    }

    /// Close the session; calling it again is a no-op
    pub async fn release(&mut self) {
        let Some(conn) = self.conn.take() else {
            debug!(backend_pid = self.backend_pid, "session already released");
            return;
        };

        match conn.close().await {
            Ok(()) => debug!(backend_pid = self.backend_pid, "session released"),
            Err(err) => warn!(
                backend_pid = self.backend_pid,
                "error while closing session: {err}"
            ),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_some() {
            debug!(
                backend_pid = self.backend_pid,
                "session dropped without release, closing socket"
            );
        }
    }
}

/// Map a `ConnectionConfig` to sqlx connect options
fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let tls = config.tls();

    let mut options = PgConnectOptions::new_without_pgpass()
        .host(config.host())
        .port(config.port())
        .username(config.user())
        .password(config.password().expose())
        .database(config.database())
        .application_name(APPLICATION_NAME);

    // Apply TLS configuration
    options = match tls.mode {
        TlsMode::Disable => options.ssl_mode(PgSslMode::Disable),
        TlsMode::Require => options.ssl_mode(PgSslMode::Require),
        TlsMode::VerifyCA => options.ssl_mode(PgSslMode::VerifyCa),
        TlsMode::VerifyFull => options.ssl_mode(PgSslMode::VerifyFull),
    };

    if let Some(ca_path) = &tls.ca {
        options = options.ssl_root_cert(ca_path);
    }

    // Apply client certificate if provided
    if let (Some(cert_path), Some(key_path)) = (&tls.cert, &tls.key) {
        options = options.ssl_client_cert(cert_path).ssl_client_key(key_path);
    }

    options.disable_statement_logging()
}

/// Sort a connect failure into the probe error taxonomy
fn classify_connect_error(err: sqlx::Error, config: &ConnectionConfig) -> ProbeError {
    match err {
        sqlx::Error::Tls(source) => ProbeError::Tls(source.to_string()),
        sqlx::Error::Io(io) if is_rustls_error(&io) => ProbeError::Tls(io.to_string()),
        sqlx::Error::Configuration(source) => ProbeError::Config(source.to_string()),
        sqlx::Error::Database(db)
            if matches!(
                db.code().as_deref(),
                Some(INVALID_PASSWORD | INVALID_AUTHORIZATION)
            ) =>
        {
            ProbeError::Authentication {
                user: config.user().to_string(),
                message: db.message().to_string(),
            }
        }
        other => ProbeError::Connection(other),
    }
}

// rustls reports handshake failures as io errors wrapping `rustls::Error`
fn is_rustls_error(io: &std::io::Error) -> bool {
    io.get_ref()
        .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some())
}
