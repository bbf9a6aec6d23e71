use serde_json::{json, Value};
use tracing::{info, warn};

use sniper_core::{Market, Venue};

use crate::error::CliError;

use super::{number_or_na, print_json, Services};

pub async fn run(services: &Services, market: Market) -> Result<(), CliError> {
    let venue = services.venue(market)?;
    let prices = log_prices(&venue).await?;
    print_json(&json!({ "market": market, "prices": prices }))
}

/// Authenticate, then fetch and log the current price of every ticker.
///
/// Only an authentication failure is an error; a ticker without a price is
/// reported as `"N/A"`.
pub async fn log_prices(venue: &Venue) -> Result<Vec<Value>, CliError> {
    venue.broker.authenticate().await?;

    let mut prices = Vec::with_capacity(venue.universe.len());
    for symbol in &venue.universe {
        let price = match venue.broker.current_price(symbol).await {
            Ok(price) => {
                info!(symbol = %symbol, price, "current price");
                Some(price)
            }
            Err(error) if error.is_fatal() => return Err(error.into()),
            Err(error) => {
                warn!(symbol = %symbol, %error, "price unavailable");
                None
            }
        };
        prices.push(json!({ "symbol": symbol.as_str(), "price": number_or_na(price) }));
    }
    Ok(prices)
}
