use std::time::Duration;

use crate::domain::Symbol;

/// Lifecycle of one watched ticker within a session.
///
/// `Monitoring -> Bought -> Sold`, or straight to `Sold`. Nothing returns to
/// `Monitoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchStatus {
    Monitoring,
    Bought,
    Sold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchTarget {
    symbol: Symbol,
    target_price: f64,
    status: WatchStatus,
    buy_count: u32,
    entry_price: Option<f64>,
    cooldown_until: Option<Duration>,
}

impl WatchTarget {
    pub fn new(symbol: Symbol, target_price: f64) -> Self {
        Self {
            symbol,
            target_price,
            status: WatchStatus::Monitoring,
            buy_count: 0,
            entry_price: None,
            cooldown_until: None,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub const fn target_price(&self) -> f64 {
        self.target_price
    }

    pub const fn status(&self) -> WatchStatus {
        self.status
    }

    pub const fn buy_count(&self) -> u32 {
        self.buy_count
    }

    /// Approximate fill price recorded when the buy was confirmed.
    pub const fn entry_price(&self) -> Option<f64> {
        self.entry_price
    }

    pub fn is_breakout(&self, price: f64) -> bool {
        self.status == WatchStatus::Monitoring && price >= self.target_price
    }

    /// Whether the ticker is still cooling down at monotonic time `now`.
    pub fn cooling_down(&self, now: Duration) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn start_cooldown(&mut self, until: Duration) {
        self.cooldown_until = Some(until);
    }

    /// Monitoring -> Bought. Returns false from any other state.
    pub fn mark_bought(&mut self, entry_price: f64) -> bool {
        if self.status != WatchStatus::Monitoring {
            return false;
        }
        self.status = WatchStatus::Bought;
        self.buy_count += 1;
        self.entry_price = Some(entry_price);
        self.cooldown_until = None;
        true
    }

    /// Any state -> Sold. Returns false if already sold.
    pub fn mark_sold(&mut self) -> bool {
        if self.status == WatchStatus::Sold {
            return false;
        }
        self.status = WatchStatus::Sold;
        true
    }

    /// Percentage change of `price` against the entry price.
    pub fn change_pct(&self, price: f64) -> Option<f64> {
        self.entry_price
            .filter(|entry| *entry > 0.0)
            .map(|entry| (price - entry) * 100.0 / entry)
    }
}

/// Tickers cleared by the trend filter, in universe order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watchlist {
    targets: Vec<WatchTarget>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target; a symbol already on the list is ignored.
    pub fn insert(&mut self, target: WatchTarget) -> bool {
        if self.get(target.symbol()).is_some() {
            return false;
        }
        self.targets.push(target);
        true
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&WatchTarget> {
        self.targets.iter().find(|target| target.symbol() == symbol)
    }

    pub fn get_mut(&mut self, symbol: &Symbol) -> Option<&mut WatchTarget> {
        self.targets
            .iter_mut()
            .find(|target| target.symbol() == symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchTarget> {
        self.targets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WatchTarget> {
        self.targets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn count(&self, status: WatchStatus) -> usize {
        self.targets
            .iter()
            .filter(|target| target.status() == status)
            .count()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.targets
            .iter()
            .map(|target| target.symbol().as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Market;

    fn target() -> WatchTarget {
        let symbol = Symbol::parse(Market::Overseas, "TQQQ").expect("symbol");
        WatchTarget::new(symbol, 53.0)
    }

    #[test]
    fn breakout_requires_monitoring_and_price_at_target() {
        let mut target = target();
        assert!(!target.is_breakout(52.99));
        assert!(target.is_breakout(53.0));

        assert!(target.mark_bought(53.0));
        assert!(!target.is_breakout(60.0));
    }

    #[test]
    fn status_never_returns_to_monitoring() {
        let mut target = target();

        assert!(target.mark_bought(53.0));
        assert!(!target.mark_bought(54.0));
        assert_eq!(target.buy_count(), 1);

        assert!(target.mark_sold());
        assert!(!target.mark_sold());
        assert!(!target.mark_bought(50.0));
        assert_eq!(target.status(), WatchStatus::Sold);
    }

    #[test]
    fn cooldown_expires_at_deadline() {
        let mut target = target();
        target.start_cooldown(Duration::from_secs(10));

        assert!(target.cooling_down(Duration::from_secs(9)));
        assert!(!target.cooling_down(Duration::from_secs(10)));
    }

    #[test]
    fn change_pct_uses_entry_price() {
        let mut target = target();
        assert_eq!(target.change_pct(50.0), None);

        target.mark_bought(50.0);
        assert_eq!(target.change_pct(48.5), Some(-3.0));
    }

    #[test]
    fn watchlist_rejects_duplicate_symbols() {
        let mut watchlist = Watchlist::new();
        assert!(watchlist.insert(target()));
        assert!(!watchlist.insert(target()));
        assert_eq!(watchlist.len(), 1);
        assert_eq!(watchlist.symbols(), vec!["TQQQ"]);
    }
}
