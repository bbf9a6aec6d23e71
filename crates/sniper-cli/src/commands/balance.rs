use serde_json::{json, Value};
use tracing::warn;

use sniper_core::{BalanceSnapshot, BrokerError, BrokerErrorKind, ForeignBalance, Market};

use crate::error::CliError;

use super::{number_or_na, print_json, Services};

/// Foreign-currency deposit section of the balance output.
#[derive(Debug)]
enum ForeignSection {
    /// The market has no foreign deposit; the section is omitted.
    Unsupported,
    /// The lookup failed; rendered as `"N/A"`.
    Unavailable,
    Reported(ForeignBalance),
}

pub async fn run(services: &Services, market: Market) -> Result<(), CliError> {
    let broker = services.broker(market)?;
    let snapshot = broker.balance().await?;
    let foreign = foreign_section(broker.foreign_balance().await)?;

    print_json(&render(&snapshot, &foreign))
}

/// Only a fatal error fails the command; anything else degrades to `"N/A"`.
fn foreign_section(
    result: Result<ForeignBalance, BrokerError>,
) -> Result<ForeignSection, CliError> {
    match result {
        Ok(balance) => Ok(ForeignSection::Reported(balance)),
        Err(error) if error.kind() == BrokerErrorKind::Unsupported => {
            Ok(ForeignSection::Unsupported)
        }
        Err(error) if error.is_fatal() => Err(error.into()),
        Err(error) => {
            warn!(%error, "foreign deposit unavailable");
            Ok(ForeignSection::Unavailable)
        }
    }
}

fn render(snapshot: &BalanceSnapshot, foreign: &ForeignSection) -> Value {
    let positions: Vec<Value> = snapshot
        .positions
        .iter()
        .map(|position| {
            json!({
                "symbol": position.symbol,
                "name": position.name.as_deref().unwrap_or("N/A"),
                "quantity": position.quantity,
                "average_price": number_or_na(position.average_price),
                "current_price": number_or_na(position.current_price),
                "profit_pct": number_or_na(position.profit_pct),
            })
        })
        .collect();

    let mut rendered = json!({
        "market": snapshot.market,
        "cash": number_or_na(snapshot.cash),
        "total_evaluation": number_or_na(snapshot.total_evaluation),
        "positions": positions,
    });

    let section = match foreign {
        ForeignSection::Unsupported => return rendered,
        ForeignSection::Unavailable
        | ForeignSection::Reported(ForeignBalance::Unrecognized { .. }) => Value::from("N/A"),
        ForeignSection::Reported(ForeignBalance::Recognized {
            currency,
            deposit,
            withdrawable,
        }) => json!({
            "currency": currency,
            "deposit": deposit,
            "withdrawable": number_or_na(*withdrawable),
        }),
    };
    rendered["foreign_deposit"] = section;
    rendered
}

#[cfg(test)]
mod tests {
    use sniper_core::Position;

    use super::*;

    #[test]
    fn unreported_fields_render_as_na() {
        let snapshot = BalanceSnapshot {
            market: Market::Overseas,
            cash: None,
            total_evaluation: Some(530.0),
            positions: vec![Position {
                symbol: String::from("TQQQ"),
                name: None,
                quantity: 10.0,
                average_price: Some(50.0),
                current_price: Some(53.0),
                profit_pct: None,
            }],
        };
        let foreign = ForeignSection::Reported(ForeignBalance::Unrecognized { raw: json!({}) });

        let rendered = render(&snapshot, &foreign);

        assert_eq!(rendered["cash"], "N/A");
        assert_eq!(rendered["total_evaluation"], 530.0);
        assert_eq!(rendered["positions"][0]["name"], "N/A");
        assert_eq!(rendered["positions"][0]["profit_pct"], "N/A");
        assert_eq!(rendered["foreign_deposit"], "N/A");
    }

    #[test]
    fn domestic_balance_has_no_foreign_section() {
        let snapshot = BalanceSnapshot {
            market: Market::Domestic,
            cash: Some(1_000_000.0),
            total_evaluation: None,
            positions: Vec::new(),
        };

        let rendered = render(&snapshot, &ForeignSection::Unsupported);

        assert_eq!(rendered["market"], "domestic");
        assert!(rendered.get("foreign_deposit").is_none());
    }

    #[test]
    fn failed_foreign_lookup_renders_as_na() {
        let snapshot = BalanceSnapshot {
            market: Market::Overseas,
            cash: Some(1_200.0),
            total_evaluation: None,
            positions: Vec::new(),
        };

        let foreign = foreign_section(Err(BrokerError::transport("connection reset")))
            .expect("transport failure degrades");
        let rendered = render(&snapshot, &foreign);

        assert_eq!(rendered["cash"], 1_200.0);
        assert_eq!(rendered["foreign_deposit"], "N/A");

        let business = foreign_section(Err(BrokerError::business("OPSQ0002", "no data")))
            .expect("business failure degrades");
        assert!(matches!(business, ForeignSection::Unavailable));
    }

    #[test]
    fn auth_failure_on_foreign_lookup_is_fatal() {
        let outcome = foreign_section(Err(BrokerError::auth("token revoked")));

        assert!(matches!(outcome, Err(CliError::Broker(_))));
    }
}
