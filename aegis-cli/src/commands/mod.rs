mod alerts;
mod playbooks;
mod runs;
mod simulate;
mod stats;

pub use alerts::{handle_alerts_command, AlertsCommand};
pub use playbooks::{handle_playbooks_command, PlaybooksCommand};
pub use runs::{handle_runs_command, RunsCommand};
pub use simulate::handle_simulate_command;
pub use stats::handle_stats_command;

use aegis_core::{AegisConfig, Database, Services};

/// Connect to Postgres from the environment and wire the service set.
pub(crate) async fn connect_services() -> anyhow::Result<Services> {
    let config = AegisConfig::load(None)?;
    let db = Database::connect_from_env().await?;
    Ok(Services::postgres(&db, &config))
}
