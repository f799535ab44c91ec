//! Connection parameters for a probe
//!
//! Configuration is resolved from an explicit key/value mapping, never from the
//! process environment directly; `environment_from` is the single place where
//! process variables are turned into that mapping.

use crate::{
    error::ProbeError,
    tls::{TlsConfig, TlsMode},
};
use dsn::DSN;
use std::{collections::HashMap, fmt, hash::BuildHasher, path::PathBuf};
use tracing::warn;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "changeme123";
pub const DEFAULT_DATABASE: &str = "maindb";

/// Prefix of the process environment variables (`POSTGRES_HOST`, ...)
pub const ENV_PREFIX: &str = "POSTGRES_";

/// Replaces the password in every printed representation
pub const PASSWORD_MASK: &str = "****";

/// A password that never prints its value
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, only for handing to the database client
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password({PASSWORD_MASK})")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(PASSWORD_MASK)
    }
}

/// Resolved connection parameters, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    user: String,
    password: Password,
    database: String,
    tls: TlsConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: Password::new(DEFAULT_PASSWORD),
            database: DEFAULT_DATABASE.to_string(),
            tls: TlsConfig::default(),
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub const fn password(&self) -> &Password {
        &self.password
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub const fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    /// Return a copy using `tls` instead of the resolved TLS settings
    #[must_use]
    pub fn with_tls(self, tls: TlsConfig) -> Self {
        Self { tls, ..self }
    }

    /// Build a configuration from a parsed DSN
    ///
    /// Absent parts take the same defaults as [`resolve_config`]. TLS settings
    /// come from the DSN query parameters.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if the driver is not `postgres`/`postgresql`,
    /// or if the DSN names a unix socket instead of a host.
    pub fn from_dsn(dsn: &DSN) -> Result<Self, ProbeError> {
        if !matches!(dsn.driver.as_str(), "postgres" | "postgresql") {
            return Err(ProbeError::Config(format!(
                "unsupported driver: {}",
                dsn.driver
            )));
        }

        if dsn.host.is_none() && dsn.socket.is_some() {
            return Err(ProbeError::Config(
                "unix sockets are not supported, a TLS probe needs a host".to_string(),
            ));
        }

        let defaults = Self::default();
        Ok(Self {
            host: non_empty(dsn.host.as_deref()).map_or(defaults.host, String::from),
            port: dsn.port.unwrap_or(defaults.port),
            user: non_empty(dsn.username.as_deref()).map_or(defaults.user, String::from),
            password: dsn
                .password
                .as_deref()
                .map_or(defaults.password, Password::new),
            database: non_empty(dsn.database.as_deref()).map_or(defaults.database, String::from),
            tls: extract_tls_config(dsn),
        })
    }

    /// Connection URI with the password replaced by [`PASSWORD_MASK`]
    #[must_use]
    pub fn connection_uri(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        format!(
            "postgresql://{}:{PASSWORD_MASK}@{host}:{}/{}?sslmode={}",
            self.user, self.port, self.database, self.tls.mode
        )
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_uri())
    }
}

/// Resolve connection parameters from a key/value mapping
///
/// Recognized keys: `HOST`, `PORT`, `USER`, `PASSWORD`, `DATABASE`, `SSLMODE`,
/// `SSLROOTCERT`, `SSLCERT`, `SSLKEY`. Absent or blank keys take defaults; an
/// unparsable `PORT` or `SSLMODE` falls back to its default with a warning.
/// Present values are used verbatim, surrounding whitespace included.
#[must_use]
pub fn resolve_config<S: BuildHasher>(env: &HashMap<String, String, S>) -> ConnectionConfig {
    let defaults = ConnectionConfig::default();
    let get = |key: &str| non_empty(env.get(key).map(String::as_str));

    let port = get("PORT").map_or(defaults.port, |value| {
        value.trim().parse::<u16>().unwrap_or_else(|_| {
            warn!(value, "invalid PORT, using default {DEFAULT_PORT}");
            defaults.port
        })
    });

    let mode = get("SSLMODE").map_or_else(TlsMode::default, |value| {
        value.trim().parse::<TlsMode>().unwrap_or_else(|err| {
            warn!("{err}, using default {}", TlsMode::default());
            TlsMode::default()
        })
    });

    ConnectionConfig {
        host: get("HOST").map_or(defaults.host, String::from),
        port,
        user: get("USER").map_or(defaults.user, String::from),
        password: get("PASSWORD").map_or(defaults.password, Password::new),
        database: get("DATABASE").map_or(defaults.database, String::from),
        tls: TlsConfig {
            mode,
            ca: get("SSLROOTCERT").map(PathBuf::from),
            cert: get("SSLCERT").map(PathBuf::from),
            key: get("SSLKEY").map(PathBuf::from),
        },
    }
}

/// Build the mapping for [`resolve_config`] from process-style variables
///
/// Keeps variables starting with `prefix`, strips it, and maps `DB` to
/// `DATABASE` so `POSTGRES_DB` is understood.
pub fn environment_from<I>(vars: I, prefix: &str) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let key = key.strip_prefix(prefix)?;
            let key = if key == "DB" { "DATABASE" } else { key };
            Some((key.to_string(), value))
        })
        .collect()
}

/// Extract TLS configuration from DSN query parameters
///
/// Supports both `PostgreSQL`-style and `MySQL`-style parameter names:
/// - sslmode, ssl-mode: disable|require|verify-ca|verify-full
/// - sslrootcert, sslca, ssl-ca: Path to CA certificate
/// - sslcert, ssl-cert: Path to client certificate
/// - sslkey, ssl-key: Path to client private key
fn extract_tls_config(dsn: &DSN) -> TlsConfig {
    let params = &dsn.params;

    let mode = params
        .get("sslmode")
        .or_else(|| params.get("ssl-mode"))
        .map_or_else(TlsMode::default, |value| {
            value.parse::<TlsMode>().unwrap_or_else(|err| {
                warn!("{err}, using default {}", TlsMode::default());
                TlsMode::default()
            })
        });

    let ca = params
        .get("sslrootcert")
        .or_else(|| params.get("sslca"))
        .or_else(|| params.get("ssl-ca"))
        .map(PathBuf::from);

    let cert = params
        .get("sslcert")
        .or_else(|| params.get("ssl-cert"))
        .map(PathBuf::from);

    let key = params
        .get("sslkey")
        .or_else(|| params.get("ssl-key"))
        .map(PathBuf::from);

    TlsConfig {
        mode,
        ca,
        cert,
        key,
    }
}

/// Blank values count as absent; anything else is returned untouched
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
