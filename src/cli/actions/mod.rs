mod run;

use crate::{cli::report::OutputFormat, config::ConnectionConfig, probe::ProbeOptions};
use std::time::Duration;

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    Probe {
        config: ConnectionConfig,
        options: ProbeOptions,
        format: OutputFormat,
        timeout: Duration,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the probe fails or times out
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
