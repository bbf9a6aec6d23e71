//! # Domain Models
//!
//! Canonical domain types shared by the broker client, the strategy engine,
//! and the session orchestrator.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Market`] | Overseas (US) or domestic session market |
//! | [`Environment`] | Paper or live trading account |
//! | [`Symbol`] | Market-scoped ticker symbol |
//! | [`Bar`] | Daily OHLC bar |
//! | [`Quote`] | Current price snapshot |
//! | [`OrderReceipt`] | Raw order result with business result code |
//! | [`BalanceSnapshot`] | Normalized cash and positions |
//! | [`ForeignBalance`] | USD deposit or an unrecognized raw payload |
//!
//! Constructors validate their invariants and return [`ValidationError`](crate::ValidationError).

mod market;
mod models;
mod symbol;

pub use market::{Environment, Market};
pub use models::{
    BalanceSnapshot, Bar, ForeignBalance, OrderReceipt, OrderSide, Position, Quote,
    SUCCESS_RESULT_CODE,
};
pub use symbol::Symbol;
