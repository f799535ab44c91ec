use super::{CertificateInfo, TlsConfig};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rustls::{
    ClientConfig, DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
};
use rustls_pemfile::{certs, private_key};
use std::{
    io::Cursor,
    net::IpAddr,
    path::Path,
    sync::{Arc, OnceLock},
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};

// PostgreSQL SSLRequest: length 8, code 1234 << 16 | 5679
const POSTGRES_SSL_REQUEST_CODE: i32 = 80_877_103;
const POSTGRES_SSL_REQUEST_LEN: i32 = 8;

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// Safe to call multiple times; installation happens once per process and an
/// already installed provider is kept.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}

/// Perform a lightweight TLS handshake (without certificate verification) to read
/// the server certificate: subject, issuer and expiry.
///
/// Returns `Ok(None)` when the server presents no certificate.
///
/// # Errors
///
/// Returns an error if the TCP connection, `SSLRequest` negotiation, TLS handshake,
/// or certificate parsing fails.
pub async fn inspect_certificate(
    host: &str,
    port: u16,
    tls: &TlsConfig,
) -> Result<Option<CertificateInfo>> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("failed to connect to {host}:{port} for certificate inspection"))?;

    send_ssl_request(&mut stream).await?;

    let connector = build_tls_connector(tls)
        .await
        .context("failed to build TLS connector for certificate inspection")?;
    let server_name = server_name_from_host(host)
        .with_context(|| format!("invalid server name for certificate inspection: {host}"))?;
    let mut tls_stream = connector
        .connect(server_name, stream)
        .await
        .context("failed to complete TLS handshake for certificate inspection")?;

    let info = certificate_from_tls_stream(&tls_stream)?;

    // best effort, the startup message was never sent
    tls_stream.shutdown().await.ok();

    Ok(info)
}

async fn send_ssl_request(stream: &mut TcpStream) -> Result<()> {
    let mut packet = Vec::with_capacity(8);
    packet.extend_from_slice(&POSTGRES_SSL_REQUEST_LEN.to_be_bytes());
    packet.extend_from_slice(&POSTGRES_SSL_REQUEST_CODE.to_be_bytes());

    stream
        .write_all(&packet)
        .await
        .context("failed to send PostgreSQL SSLRequest packet")?;

    let mut response = [0u8; 1];
    stream
        .read_exact(&mut response)
        .await
        .context("failed to read PostgreSQL SSLRequest response")?;

    check_ssl_response(response[0])
}

fn check_ssl_response(byte: u8) -> Result<()> {
    match byte {
        b'S' => Ok(()),
        b'N' => anyhow::bail!("PostgreSQL server does not accept TLS connections"),
        other => anyhow::bail!("unexpected SSLRequest response byte: 0x{other:02x}"),
    }
}

async fn build_tls_connector(tls: &TlsConfig) -> Result<TlsConnector> {
    ensure_crypto_provider();

    let builder = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier));

    let config = if let (Some(cert_path), Some(key_path)) = (&tls.cert, &tls.key) {
        let certs = load_cert_chain(cert_path.as_path()).await?;
        let key = load_private_key(key_path.as_path()).await?;
        builder.with_client_auth_cert(certs, key)?
    } else {
        builder.with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

async fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read certificate {}", path.display()))?;
    let mut reader = Cursor::new(data);
    let parsed = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid certificate PEM: {e}"))?;

    if parsed.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }

    Ok(parsed)
}

async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("failed to read private key {}", path.display()))?;

    let mut reader = Cursor::new(data);
    private_key(&mut reader)
        .map_err(|e| anyhow!("invalid private key PEM: {e}"))?
        .ok_or_else(|| anyhow!("no private key found in {}", path.display()))
}

fn server_name_from_host(host: &str) -> Result<ServerName<'static>> {
    host.parse::<IpAddr>().map_or_else(
        |_| {
            ServerName::try_from(host.to_string())
                .map_err(|_| anyhow!("invalid server name: {host}"))
        },
        |ip| Ok(ServerName::from(ip)),
    )
}

fn certificate_from_tls_stream(stream: &TlsStream<TcpStream>) -> Result<Option<CertificateInfo>> {
    let (_, connection) = stream.get_ref();
    let Some(cert) = connection.peer_certificates().and_then(<[_]>::first) else {
        return Ok(None);
    };

    parse_certificate(cert.as_ref(), Utc::now()).map(Some)
}

/// Parse a DER certificate, computing expiry relative to `now`
fn parse_certificate(cert_der: &[u8], now: DateTime<Utc>) -> Result<CertificateInfo> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| anyhow!("failed to parse certificate: {e}"))?;

    let raw = cert.validity().not_after.to_datetime();
    let not_after = DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
        .ok_or_else(|| anyhow!("invalid certificate expiry timestamp"))?;

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_after: not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
        expiry_days: (not_after - now).num_days(),
    })
}

/// Certificate verifier that accepts any certificate.
///
/// Only used by the inspection handshake, which never carries credentials or
/// queries. The probe session itself is verified by sqlx according to the
/// configured `TlsMode`.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
