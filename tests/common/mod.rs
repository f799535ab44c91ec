#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use pgprobe::{
    ConnectionConfig, ProbeOptions, ProbeResult,
    config::resolve_config,
    probe,
    tls::{TlsConfig, TlsMode},
};
use std::{collections::HashMap, env, path::PathBuf, process::Command};

/// Matches the docker-compose service used for local TLS testing
pub const POSTGRES_HOST: &str = "localhost";
pub const POSTGRES_PORT: &str = "5432";
pub const POSTGRES_USER: &str = "postgres";
pub const POSTGRES_PASSWORD: &str = "secret";
pub const POSTGRES_DB: &str = "testdb";

pub fn skip_if_no_postgres() -> bool {
    env::var("SKIP_POSTGRES_TESTS").is_ok()
}

/// Prefix-stripped environment for the test server, overridable with `TEST_POSTGRES_*`
pub fn test_env(ssl_mode: &str) -> HashMap<String, String> {
    let var = |key: &str, default: &str| {
        env::var(format!("TEST_POSTGRES_{key}")).unwrap_or_else(|_| default.to_string())
    };

    HashMap::from([
        ("HOST".to_string(), var("HOST", POSTGRES_HOST)),
        ("PORT".to_string(), var("PORT", POSTGRES_PORT)),
        ("USER".to_string(), var("USER", POSTGRES_USER)),
        ("PASSWORD".to_string(), var("PASSWORD", POSTGRES_PASSWORD)),
        ("DATABASE".to_string(), var("DB", POSTGRES_DB)),
        ("SSLMODE".to_string(), ssl_mode.to_string()),
    ])
}

pub fn test_config(mode: TlsMode) -> ConnectionConfig {
    resolve_config(&test_env(mode.as_str()))
}

pub fn test_config_with_ca(mode: TlsMode, ca: PathBuf) -> ConnectionConfig {
    let tls = TlsConfig {
        mode,
        ca: Some(ca),
        cert: None,
        key: None,
    };
    test_config(mode).with_tls(tls)
}

/// Get path to CA certificate
pub fn ca_cert_path() -> Option<PathBuf> {
    env::var("POSTGRES_CA_CERT")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            let path = PathBuf::from(".certs/postgres/ca.crt");
            if path.exists() { Some(path) } else { None }
        })
}

/// Run a full probe with a given sample table
pub async fn run_probe_with_table(
    config: &ConnectionConfig,
    table_name: &str,
) -> Result<ProbeResult, pgprobe::ProbeError> {
    let options = ProbeOptions {
        sample_table: table_name.to_string(),
        ..ProbeOptions::default()
    };
    probe::run(config, &options).await
}

pub fn pick_free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .expect("failed to bind random local port")
        .local_addr()
        .expect("failed to read local addr")
        .port()
}

pub fn pgprobe_binary_path() -> PathBuf {
    env::var_os("CARGO_BIN_EXE_pgprobe")
        .map_or_else(|| PathBuf::from("target/debug/pgprobe"), PathBuf::from)
}

/// Run the binary with a clean `POSTGRES_*` environment
pub fn run_binary(args: &[&str], envs: &[(&str, &str)]) -> std::process::Output {
    let mut cmd = Command::new(pgprobe_binary_path());
    for (key, _) in env::vars() {
        if key.starts_with("POSTGRES_") || key.starts_with("PGPROBE_") {
            cmd.env_remove(key);
        }
    }
    cmd.args(args).envs(envs.iter().copied());
    cmd.output().expect("failed to run pgprobe binary")
}

/// Generate a unique table name for a test
pub fn test_table_name(test_name: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let thread_id = std::thread::current().id();
    let mut hasher = DefaultHasher::new();
    test_name.hash(&mut hasher);
    format!("{thread_id:?}").hash(&mut hasher);

    format!("pgprobe_test_{:x}", hasher.finish())
}

/// Assert the fields every successful probe must carry
pub fn assert_connected(result: &ProbeResult) {
    assert!(result.connected);
    assert!(
        !result.server_version.is_empty(),
        "server version should not be empty"
    );
    assert!(result.backend_pid > 0, "backend pid should be positive");
}
