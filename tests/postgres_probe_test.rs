/// `PostgreSQL` probe integration tests
///
/// These tests require a `PostgreSQL` instance with TLS enabled, listening on
/// localhost:5432 with user `postgres`, password `secret` and database `testdb`.
///
/// Run tests:
///   cargo test --test `postgres_probe_test` -- --ignored --nocapture
///
/// Environment variables:
///   `TEST_POSTGRES_HOST`, `TEST_POSTGRES_PORT`, `TEST_POSTGRES_USER`,
///   `TEST_POSTGRES_PASSWORD`, `TEST_POSTGRES_DB` - Override the target
///   `POSTGRES_CA_CERT` - Path to CA certificate (default: `.certs/postgres/ca.crt`)
mod common;

use common::*;
use pgprobe::{
    ProbeError, ProbeOptions, ProbeStep, SamplePolicy, Session,
    config::resolve_config,
    probe,
    tls::TlsMode,
};

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_require_reports_encrypted_session() {
    if skip_if_no_postgres() {
        return;
    }

    let config = test_config(TlsMode::Require);
    let result = probe::run(&config, &ProbeOptions::default()).await;
    assert!(result.is_ok(), "probe failed: {result:?}");

    let result = result.unwrap();
    assert_connected(&result);
    assert!(result.server_version.starts_with("PostgreSQL"));
    assert!(result.server_tls_enabled, "server should report ssl = on");
    assert!(result.tls_active, "session should be encrypted");
    assert!(
        result.tls_version.as_deref().is_some_and(|v| v.starts_with("TLS")),
        "unexpected TLS version: {:?}",
        result.tls_version
    );
    assert!(result.tls_cipher.is_some());
    assert!(result.certificate.is_some(), "certificate should be inspected");
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_counts_existing_table() {
    if skip_if_no_postgres() {
        return;
    }

    let config = test_config(TlsMode::Require);
    let table_name = test_table_name("test_probe_counts_existing_table");

    let mut session = Session::connect(&config).await.unwrap();
    {
        let conn = session.connection().unwrap();
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table_name} (id SERIAL PRIMARY KEY, name TEXT)"
        ))
        .execute(&mut *conn)
        .await
        .unwrap();
        sqlx::query(&format!("TRUNCATE {table_name}"))
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query(&format!(
            "INSERT INTO {table_name} (name) VALUES ('alice'), ('bob')"
        ))
        .execute(&mut *conn)
        .await
        .unwrap();
    }
    session.release().await;

    let result = run_probe_with_table(&config, &table_name).await.unwrap();
    assert_eq!(result.row_count, Some(2));
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert!(result.table_names.contains(&table_name));

    let mut session = Session::connect(&config).await.unwrap();
    sqlx::query(&format!("DROP TABLE IF EXISTS {table_name}"))
        .execute(session.connection().unwrap())
        .await
        .unwrap();
    session.release().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_missing_table_is_soft_warning() {
    if skip_if_no_postgres() {
        return;
    }

    let config = test_config(TlsMode::Require);
    let result = run_probe_with_table(&config, "pgprobe_table_that_does_not_exist")
        .await
        .unwrap();

    assert_connected(&result);
    assert_eq!(result.row_count, None);
    assert_eq!(result.sample_policy, SamplePolicy::Soft);
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.step == ProbeStep::SampleCount),
        "expected a sample-count warning: {:?}",
        result.warnings
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_missing_table_strict_fails() {
    if skip_if_no_postgres() {
        return;
    }

    let config = test_config(TlsMode::Require);
    let options = ProbeOptions {
        sample_table: "pgprobe_table_that_does_not_exist".to_string(),
        sample_policy: SamplePolicy::Strict,
        ..ProbeOptions::default()
    };

    let err = probe::run(&config, &options).await.unwrap_err();
    assert_eq!(err.step(), Some(ProbeStep::SampleCount));
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_release_is_idempotent() {
    if skip_if_no_postgres() {
        return;
    }

    let config = test_config(TlsMode::Require);
    let mut session = Session::connect(&config).await.unwrap();
    assert!(session.is_encrypted());
    assert!(!session.is_released());

    session.release().await;
    assert!(session.is_released());
    session.release().await;
    assert!(session.is_released());

    let err = probe::probe(&mut session, &ProbeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::SessionReleased));
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_verify_full_with_ca() {
    if skip_if_no_postgres() {
        return;
    }

    let Some(ca) = ca_cert_path() else {
        eprintln!("CA certificate not found, skipping verify-full test");
        return;
    };

    let config = test_config_with_ca(TlsMode::VerifyFull, ca);
    let result = probe::run(&config, &ProbeOptions::default()).await;
    assert!(result.is_ok(), "verify-full failed: {result:?}");
    assert!(result.unwrap().tls_active);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_verify_ca_without_ca_fails_tls() {
    if skip_if_no_postgres() {
        return;
    }

    // a self-signed server certificate is not in the system roots
    let config = test_config(TlsMode::VerifyCA);
    let err = probe::run(&config, &ProbeOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ProbeError::Tls(_) | ProbeError::Connection(_)),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_wrong_password_is_authentication_error() {
    if skip_if_no_postgres() {
        return;
    }

    let mut env = test_env("require");
    env.insert("PASSWORD".to_string(), "definitely-wrong".to_string());
    let config = resolve_config(&env);

    let err = probe::run(&config, &ProbeOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ProbeError::Authentication { .. }),
        "unexpected error: {err:?}"
    );
    assert!(!err.to_string().contains("definitely-wrong"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL with TLS enabled"]
async fn test_probe_disable_reports_plaintext() {
    if skip_if_no_postgres() {
        return;
    }

    let config = test_config(TlsMode::Disable);
    let result = probe::run(&config, &ProbeOptions::default()).await.unwrap();
    assert_connected(&result);
    assert!(!result.tls_active);
    assert!(result.certificate.is_none());
}
