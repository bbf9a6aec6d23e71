//! Transaction-id lookup table.
//!
//! The venue identifies every operation by an opaque id that differs per
//! market and, for account operations, per environment (paper ids carry a
//! `V` prefix).

use crate::domain::{Environment, Market};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentPrice,
    Quote,
    DailyPrice,
    Buy,
    Sell,
    Balance,
    ForeignBalance,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentPrice => "current_price",
            Self::Quote => "quote",
            Self::DailyPrice => "daily_price",
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Balance => "balance",
            Self::ForeignBalance => "foreign_balance",
        }
    }
}

/// `None` when the operation does not exist for `market`.
pub const fn transaction_id(
    market: Market,
    environment: Environment,
    operation: Operation,
) -> Option<&'static str> {
    use Environment::{Live, Paper};
    use Market::{Domestic, Overseas};
    use Operation::*;

    let id = match (market, operation, environment) {
        (Overseas, CurrentPrice, _) => "HHDFS00000300",
        (Overseas, Quote, _) => "HHDFS76200200",
        (Overseas, DailyPrice, _) => "HHDFS76240000",
        (Overseas, Buy, Live) => "TTTT1002U",
        (Overseas, Buy, Paper) => "VTTT1002U",
        (Overseas, Sell, Live) => "TTTT1006U",
        (Overseas, Sell, Paper) => "VTTT1006U",
        (Overseas, Balance, Live) => "TTTS3012R",
        (Overseas, Balance, Paper) => "VTTS3012R",
        (Overseas, ForeignBalance, Live) => "CTRP6504R",
        (Overseas, ForeignBalance, Paper) => "VTRP6504R",

        (Domestic, CurrentPrice | Quote, _) => "FHKST01010100",
        (Domestic, DailyPrice, _) => "FHKST01010400",
        (Domestic, Buy, Live) => "TTTC0802U",
        (Domestic, Buy, Paper) => "VTTC0802U",
        (Domestic, Sell, Live) => "TTTC0801U",
        (Domestic, Sell, Paper) => "VTTC0801U",
        (Domestic, Balance, Live) => "TTTC8434R",
        (Domestic, Balance, Paper) => "VTTC8434R",
        (Domestic, ForeignBalance, _) => return None,
    };
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotations_share_one_id_across_environments() {
        for operation in [Operation::CurrentPrice, Operation::Quote, Operation::DailyPrice] {
            for market in Market::ALL {
                assert_eq!(
                    transaction_id(market, Environment::Live, operation),
                    transaction_id(market, Environment::Paper, operation),
                );
            }
        }
    }

    #[test]
    fn paper_account_ids_use_v_prefix() {
        for market in Market::ALL {
            for operation in [Operation::Buy, Operation::Sell, Operation::Balance] {
                let live = transaction_id(market, Environment::Live, operation).expect("live id");
                let paper = transaction_id(market, Environment::Paper, operation).expect("paper id");
                assert!(paper.starts_with('V'), "{paper}");
                assert_eq!(live[1..], paper[1..]);
            }
        }
    }

    #[test]
    fn domestic_market_has_no_foreign_balance() {
        assert_eq!(
            transaction_id(Market::Domestic, Environment::Live, Operation::ForeignBalance),
            None
        );
        assert_eq!(
            transaction_id(Market::Overseas, Environment::Paper, Operation::ForeignBalance),
            Some("VTRP6504R")
        );
    }
}
