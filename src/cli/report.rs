use crate::{config::ConnectionConfig, probe::ProbeResult};
use anyhow::Result;
use std::{
    fmt::{self, Write},
    str::FromStr,
};

/// How the probe result is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Render a completed probe
///
/// # Errors
///
/// Returns an error if serialization or formatting fails
pub fn render(
    result: &ProbeResult,
    config: &ConnectionConfig,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(result)?),
        OutputFormat::Text => {
            let mut out = String::new();
            write_text(&mut out, result, config)?;
            Ok(out)
        }
    }
}

fn write_text(out: &mut String, result: &ProbeResult, config: &ConnectionConfig) -> fmt::Result {
    writeln!(out, "target:         {config}")?;
    writeln!(out, "server version: {}", result.server_version)?;
    writeln!(
        out,
        "server ssl:     {}",
        if result.server_tls_enabled { "on" } else { "off" }
    )?;

    if result.tls_active {
        writeln!(
            out,
            "session tls:    {} ({})",
            result.tls_version.as_deref().unwrap_or("unknown version"),
            result.tls_cipher.as_deref().unwrap_or("unknown cipher")
        )?;
    } else {
        writeln!(out, "session tls:    not encrypted")?;
    }

    writeln!(
        out,
        "client address: {}",
        result.client_address.as_deref().unwrap_or("local socket")
    )?;
    writeln!(
        out,
        "server address: {}",
        result.server_address.as_deref().unwrap_or("local socket")
    )?;
    writeln!(out, "backend pid:    {}", result.backend_pid)?;

    match result.row_count {
        Some(count) => {
            writeln!(out, "rows in {}: {count}", result.sample_table)?;
        }
        None => {
            writeln!(out, "rows in {}: unavailable", result.sample_table)?;
        }
    }

    if result.table_names.is_empty() {
        writeln!(out, "tables in {}: none", result.schema)?;
    } else {
        writeln!(out, "tables in {}:", result.schema)?;
        for name in &result.table_names {
            writeln!(out, "  - {name}")?;
        }
    }

    if let Some(cert) = &result.certificate {
        writeln!(out, "certificate:    {}", cert.subject)?;
        writeln!(out, "  issuer:       {}", cert.issuer)?;
        writeln!(
            out,
            "  expires:      {} ({} days){}",
            cert.not_after,
            cert.expiry_days,
            if cert.is_self_signed() { ", self-signed" } else { "" }
        )?;
    }

    for warning in &result.warnings {
        writeln!(out, "warning: {warning}")?;
    }

    write!(out, "completed in {} ms", result.elapsed_ms)
}
