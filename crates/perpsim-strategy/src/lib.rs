//! perpsim-strategy
//!
//! The strategy contract (§6.2): the `Strategy` capability trait, the
//! read-only `Context` a strategy observes the world through, the `Action`
//! a strategy hook returns, and a `StrategyHost` that runs a *collection* of
//! strategies side by side rather than capping itself at exactly one.

use std::collections::HashMap;

use perpsim_types::{Account, Order, OrderId, OrderType, Position, Side, TimeInForce};
use rust_decimal::Decimal;

/// A strategy-originated request to place a new order. Deliberately its own
/// type rather than a re-export of `perpsim-match`'s admission-pipeline
/// request — strategies describe *intent*, the matching engine owns the
/// admission vocabulary (reject reasons, order ids), and `perpsim-engine`
/// is the only place that needs to know how to translate between them.
#[derive(Clone, Debug)]
pub struct OrderIntent {
    pub client_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub qty: Decimal,
    pub reduce_only: bool,
    pub post_only: bool,
    pub time_in_force: TimeInForce,
}

/// One thing a strategy wants done this tick.
#[derive(Clone, Debug)]
pub enum OrderAction {
    Place(OrderIntent),
    Cancel(OrderId),
    Modify {
        order_id: OrderId,
        new_price: Option<Decimal>,
        new_qty: Option<Decimal>,
    },
}

/// The set of order actions returned from a single strategy hook
/// invocation. Empty by default (`Action::none()`) — most hook calls don't
/// want to act.
#[derive(Clone, Debug, Default)]
pub struct Action {
    pub orders: Vec<OrderAction>,
}

impl Action {
    pub fn none() -> Self {
        Action::default()
    }

    pub fn place(intent: OrderIntent) -> Self {
        Action { orders: vec![OrderAction::Place(intent)] }
    }

    pub fn cancel(order_id: OrderId) -> Self {
        Action { orders: vec![OrderAction::Cancel(order_id)] }
    }
}

/// Severity for `Context::log`, forwarded to `tracing` at the matching
/// level. This is the "injected logger handle" this crate uses in place of
/// a global logging singleton: strategies never touch `tracing` directly,
/// they only ever call `ctx.log(...)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A read-only snapshot of one symbol's top-of-book state, handed to
/// strategies via `Context::book`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct BookSnapshot {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid_price: Option<Decimal>,
}

/// Everything a strategy can observe this tick (§6.2). Constructed fresh by
/// the engine before each dispatch — strategies must not cache it across
/// calls, since every field is a snapshot as of `current_time`.
pub struct Context<'a> {
    pub current_time: i64,
    pub account: &'a Account,
    pub positions: &'a [Position],
    pub active_orders: &'a [Order],
    books: &'a HashMap<String, BookSnapshot>,
    strategy_name: &'a str,
}

impl<'a> Context<'a> {
    pub fn new(
        current_time: i64,
        account: &'a Account,
        positions: &'a [Position],
        active_orders: &'a [Order],
        books: &'a HashMap<String, BookSnapshot>,
        strategy_name: &'a str,
    ) -> Self {
        Context {
            current_time,
            account,
            positions,
            active_orders,
            books,
            strategy_name,
        }
    }

    pub fn book(&self, symbol: &str) -> BookSnapshot {
        self.books.get(symbol).copied().unwrap_or_default()
    }

    pub fn best_bid(&self, symbol: &str) -> Option<Decimal> {
        self.book(symbol).best_bid
    }

    pub fn best_ask(&self, symbol: &str) -> Option<Decimal> {
        self.book(symbol).best_ask
    }

    pub fn mid_price(&self, symbol: &str) -> Option<Decimal> {
        self.book(symbol).mid_price
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(strategy = self.strategy_name, time = self.current_time, "{message}"),
            LogLevel::Info => tracing::info!(strategy = self.strategy_name, time = self.current_time, "{message}"),
            LogLevel::Warn => tracing::warn!(strategy = self.strategy_name, time = self.current_time, "{message}"),
            LogLevel::Error => tracing::error!(strategy = self.strategy_name, time = self.current_time, "{message}"),
        }
    }
}

/// An order fill delivered to a strategy after the fact, via
/// `Strategy::on_order_filled`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OrderFillInfo {
    pub order_id: OrderId,
    pub price: Decimal,
    pub qty: Decimal,
    pub fee: Decimal,
    pub is_maker: bool,
}

/// A forced liquidation delivered to a strategy, via
/// `Strategy::on_liquidation`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiquidationInfo {
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub loss: Decimal,
}

/// A strategy fault raised from a hook. Carries a message only — Rust has
/// no portable way to catch an arbitrary panic across this trait boundary,
/// so a strategy that wants isolation semantics (§7 "Strategy fault") must
/// express failure as an `Err` return rather than a panic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyError(pub String);

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StrategyError {}

/// The strategy capability contract (§6.2). Every hook has a default no-op
/// implementation so a strategy only needs to override the callbacks it
/// cares about, across the full market-data taxonomy (trades, depth,
/// funding, mark price) plus the execution feedback hooks (order fills,
/// liquidations).
pub trait Strategy {
    fn name(&self) -> &str;

    fn initialize(&mut self, _ctx: &Context) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_trade(&mut self, _ctx: &Context, _symbol: &str, _price: Decimal, _qty: Decimal, _taker_side: Side) -> Result<Action, StrategyError> {
        Ok(Action::none())
    }

    fn on_depth(&mut self, _ctx: &Context, _symbol: &str) -> Result<Action, StrategyError> {
        Ok(Action::none())
    }

    fn on_funding(&mut self, _ctx: &Context, _symbol: &str, _funding_rate: Decimal, _mark_price: Decimal) -> Result<Action, StrategyError> {
        Ok(Action::none())
    }

    fn on_mark_price(&mut self, _ctx: &Context, _symbol: &str, _mark_price: Decimal) -> Result<Action, StrategyError> {
        Ok(Action::none())
    }

    fn on_order_filled(&mut self, _ctx: &Context, _fill: &OrderFillInfo) -> Result<Action, StrategyError> {
        Ok(Action::none())
    }

    fn on_liquidation(&mut self, _ctx: &Context, _event: &LiquidationInfo) -> Result<Action, StrategyError> {
        Ok(Action::none())
    }

    fn cleanup(&mut self, _ctx: &Context) -> Result<(), StrategyError> {
        Ok(())
    }
}

/// Runs a collection of strategies side by side, dispatching every event to
/// every strategy that hasn't faulted. When `isolate_faults` is set, a
/// strategy whose hook returns `Err` is disabled for the remainder of the
/// run instead of aborting the whole backtest (§7); when unset, the first
/// fault is propagated to the caller immediately.
pub struct StrategyHost {
    strategies: Vec<Box<dyn Strategy>>,
    disabled: Vec<bool>,
    isolate_faults: bool,
}

impl StrategyHost {
    pub fn new(isolate_faults: bool) -> Self {
        StrategyHost {
            strategies: Vec::new(),
            disabled: Vec::new(),
            isolate_faults,
        }
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
        self.disabled.push(false);
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_disabled(&self, index: usize) -> bool {
        self.disabled[index]
    }

    fn run_all<F>(&mut self, ctx: &Context, mut hook: F) -> Result<Vec<Action>, StrategyError>
    where
        F: FnMut(&mut dyn Strategy, &Context) -> Result<Action, StrategyError>,
    {
        let mut actions = Vec::new();
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            if self.disabled[index] {
                continue;
            }
            match hook(strategy.as_mut(), ctx) {
                Ok(action) => actions.push(action),
                Err(err) => {
                    if self.isolate_faults {
                        self.disabled[index] = true;
                    } else {
                        return Err(err);
                    }
                }
            }
        }
        Ok(actions)
    }

    /// Dispatches a hook to exactly one strategy by index — used for
    /// order-fill notifications, which only make sense to the strategy
    /// that placed the order. A no-op (`Action::none()`) if that strategy
    /// has already been disabled by an earlier fault.
    pub fn dispatch_to<F>(&mut self, index: usize, ctx: &Context, hook: F) -> Result<Action, StrategyError>
    where
        F: FnOnce(&mut dyn Strategy, &Context) -> Result<Action, StrategyError>,
    {
        if self.disabled[index] {
            return Ok(Action::none());
        }
        match hook(self.strategies[index].as_mut(), ctx) {
            Ok(action) => Ok(action),
            Err(err) => {
                if self.isolate_faults {
                    self.disabled[index] = true;
                    Ok(Action::none())
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn initialize_all(&mut self, ctx: &Context) -> Result<(), StrategyError> {
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            if self.disabled[index] {
                continue;
            }
            if let Err(err) = strategy.initialize(ctx) {
                if self.isolate_faults {
                    self.disabled[index] = true;
                } else {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Broadcasts a trade print to every enabled strategy. Kept as the one
    /// symmetric `dispatch_*` entry point (used by the engine's unit tests
    /// below); the engine itself dispatches every hook per-index via
    /// `dispatch_to` so it can attribute each resulting order to its owning
    /// strategy, which a batched broadcast can't express.
    pub fn dispatch_trade(&mut self, ctx: &Context, symbol: &str, price: Decimal, qty: Decimal, taker_side: Side) -> Result<Vec<Action>, StrategyError> {
        self.run_all(ctx, |s, c| s.on_trade(c, symbol, price, qty, taker_side))
    }

    pub fn cleanup_all(&mut self, ctx: &Context) -> Result<(), StrategyError> {
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            if self.disabled[index] {
                continue;
            }
            if let Err(err) = strategy.cleanup(ctx) {
                if self.isolate_faults {
                    self.disabled[index] = true;
                } else {
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyStrategy {
        name: String,
        fail_on_trade: bool,
    }

    impl Strategy for FlakyStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_trade(&mut self, _ctx: &Context, _symbol: &str, _price: Decimal, _qty: Decimal, _taker_side: Side) -> Result<Action, StrategyError> {
            if self.fail_on_trade {
                Err(StrategyError("boom".into()))
            } else {
                Ok(Action::none())
            }
        }
    }

    fn empty_context<'a>(account: &'a Account, books: &'a HashMap<String, BookSnapshot>) -> Context<'a> {
        Context::new(0, account, &[], &[], books, "host")
    }

    #[test]
    fn isolated_fault_disables_only_the_faulting_strategy() {
        let mut host = StrategyHost::new(true);
        host.register(Box::new(FlakyStrategy { name: "ok".into(), fail_on_trade: false }));
        host.register(Box::new(FlakyStrategy { name: "bad".into(), fail_on_trade: true }));

        let account = Account::new(Decimal::new(1000, 0), Decimal::new(10, 0), Decimal::new(50, 0));
        let books = HashMap::new();
        let ctx = empty_context(&account, &books);

        let actions = host
            .dispatch_trade(&ctx, "BTC-PERP", Decimal::new(100, 0), Decimal::new(1, 0), Side::Buy)
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert!(!host.is_disabled(0));
        assert!(host.is_disabled(1));

        // Subsequent dispatch only runs the still-enabled strategy.
        let actions = host
            .dispatch_trade(&ctx, "BTC-PERP", Decimal::new(100, 0), Decimal::new(1, 0), Side::Buy)
            .unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn non_isolated_fault_propagates_to_caller() {
        let mut host = StrategyHost::new(false);
        host.register(Box::new(FlakyStrategy { name: "bad".into(), fail_on_trade: true }));

        let account = Account::new(Decimal::new(1000, 0), Decimal::new(10, 0), Decimal::new(50, 0));
        let books = HashMap::new();
        let ctx = empty_context(&account, &books);

        let err = host.dispatch_trade(&ctx, "BTC-PERP", Decimal::new(100, 0), Decimal::new(1, 0), Side::Buy);
        assert!(err.is_err());
    }
}
