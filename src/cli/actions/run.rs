use super::Action;
use crate::{
    cli::report,
    error::ProbeError,
    probe::{self, ProbeResult},
};
use anyhow::Context;
use std::time::Duration;
use tokio::time::timeout;
use tracing::error;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Probe {
            config,
            options,
            format,
            timeout: deadline,
        } => {
            let result = with_deadline(deadline, probe::run(&config, &options)).await;

            match result {
                Ok(result) => {
                    println!("{}", report::render(&result, &config, format)?);
                    Ok(())
                }
                Err(err) => {
                    error!(uri = %config, "probe failed: {err}");
                    Err(err).with_context(|| format!("probe of {config} failed"))
                }
            }
        }
    }
}

/// Bound the whole probe; expiry drops the future and with it the session
async fn with_deadline<F>(deadline: Duration, probe: F) -> Result<ProbeResult, ProbeError>
where
    F: Future<Output = Result<ProbeResult, ProbeError>>,
{
    timeout(deadline, probe)
        .await
        .unwrap_or(Err(ProbeError::Timeout(deadline)))
}
