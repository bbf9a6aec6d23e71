use sniper_core::Market;

use crate::error::CliError;

use super::{print_json, Services};

/// One session for `market` right now, bypassing the scheduler.
pub async fn run(services: &Services, market: Market) -> Result<(), CliError> {
    let orchestrator = services.orchestrator(&[market])?;
    let report = orchestrator.run_session(market).await?;
    print_json(&report)
}
