use std::future::Future;
use std::io;
use std::time::Duration;

use tracing::{error, info};

use sniper_core::{Clock, Market, Orchestrator};

use crate::error::CliError;

use super::{check, Services};

const HEARTBEAT: Duration = Duration::from_secs(60);

/// Scheduler loop. Wakes once a minute, logs a heartbeat and lets the
/// orchestrator start a session whenever a configured market opens.
pub async fn run(services: &Services) -> Result<(), CliError> {
    let markets: Vec<Market> = services.config.markets.enabled().collect();
    if markets.is_empty() {
        return Err(CliError::Config(String::from("no market is enabled")));
    }

    let mut orchestrator = services.orchestrator(&markets)?;
    info!(markets = ?markets, "scheduler started");

    let interrupt = tokio::signal::ctrl_c();
    supervise(
        &mut orchestrator,
        services.clock.as_ref(),
        HEARTBEAT,
        interrupt,
    )
    .await
}

/// Drive the scheduler until `shutdown` resolves.
///
/// `shutdown` is raced against the whole loop, so an interrupt stops the
/// process even in the middle of a session.
async fn supervise<F>(
    orchestrator: &mut Orchestrator,
    clock: &dyn Clock,
    heartbeat: Duration,
    shutdown: F,
) -> Result<(), CliError>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        biased;
        signal = shutdown => {
            signal?;
            info!("interrupt received; scheduler stopping");
            Ok(())
        }
        outcome = schedule(orchestrator, clock, heartbeat) => outcome,
    }
}

async fn schedule(
    orchestrator: &mut Orchestrator,
    clock: &dyn Clock,
    heartbeat: Duration,
) -> Result<(), CliError> {
    for market in Market::ALL {
        if let Some(venue) = orchestrator.venue(market) {
            if let Err(error) = check::log_prices(venue).await {
                error!(%market, %error, "startup check failed; continuing to schedule");
            }
        }
    }

    loop {
        let session = orchestrator
            .context()
            .market_clock
            .session_at(clock.now_utc());
        info!(%session, "heartbeat");

        match orchestrator.tick().await {
            Ok(Some(report)) => info!(report = %serde_json::to_string(&report)?, "session report"),
            Ok(None) => {}
            Err(error) => error!(%error, "session aborted; waiting for the next window"),
        }

        clock.sleep(heartbeat).await;
    }
}
