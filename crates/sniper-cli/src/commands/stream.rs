use std::sync::Arc;

use tracing::{info, warn};

use sniper_core::broker::kis::rest_base_url;
use sniper_core::stream::{request_approval_key, subscription_key, ws_url};
use sniper_core::{Market, PriceFeed};

use crate::error::CliError;

use super::Services;

/// Subscribe to the universe and log every tick until Ctrl-C.
pub async fn run(services: &Services, market: Market) -> Result<(), CliError> {
    let environment = services.secrets.environment;
    let symbols = services.config.markets.get(market).symbols(market)?;
    let exchange = services.config.broker.us_exchange;
    let keys: Vec<String> = symbols
        .iter()
        .map(|symbol| subscription_key(symbol, exchange))
        .collect();

    let approval_key = request_approval_key(
        services.http.as_ref(),
        rest_base_url(environment),
        &services.secrets.credentials,
    )
    .await?;

    let feed = PriceFeed::new(
        ws_url(environment),
        approval_key,
        services.config.stream.layout(market).clone(),
        keys,
        Arc::clone(&services.clock),
    );
    let (mut ticks, handle) = feed.spawn(services.config.stream.buffer);
    info!(%market, subscriptions = symbols.len(), "streaming prices");

    loop {
        tokio::select! {
            tick = ticks.recv() => match tick {
                Some(tick) => info!(symbol = %tick.symbol, price = tick.price, "tick"),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupt received; closing feed");
                handle.abort();
                return Ok(());
            }
        }
    }

    match handle.await {
        Ok(outcome) => outcome.map_err(CliError::from),
        Err(error) => {
            warn!(%error, "feed task ended abnormally");
            Err(CliError::Command(format!("price feed task failed: {error}")))
        }
    }
}
