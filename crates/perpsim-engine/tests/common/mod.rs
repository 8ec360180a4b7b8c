//! Shared scaffolding for the scenario tests (one behavior per file, per
//! `mqk-backtest/tests/scenario_*.rs`). Each scenario drives a tiny,
//! purpose-built `Strategy` rather than a shared do-everything fixture, so a
//! reader only has to look at the single file to see exactly what it's
//! proving.

use perpsim_strategy::{Action, Context, OrderIntent, Strategy, StrategyError};
use perpsim_types::Side;
use rust_decimal::Decimal;

/// Places exactly one order intent the first time any market-data hook
/// fires, then stays quiet. Good enough for any scenario whose only
/// requirement is "get one order into the book and then watch what
/// happens."
pub struct OneShotStrategy {
    name: String,
    intent: Option<OrderIntent>,
}

impl OneShotStrategy {
    pub fn new(name: &str, intent: OrderIntent) -> Self {
        OneShotStrategy { name: name.to_string(), intent: Some(intent) }
    }

    fn fire(&mut self) -> Action {
        match self.intent.take() {
            Some(intent) => Action::place(intent),
            None => Action::none(),
        }
    }
}

impl Strategy for OneShotStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_depth(&mut self, _ctx: &Context, _symbol: &str) -> Result<Action, StrategyError> {
        Ok(self.fire())
    }

    fn on_trade(&mut self, _ctx: &Context, _symbol: &str, _price: Decimal, _qty: Decimal, _taker_side: Side) -> Result<Action, StrategyError> {
        Ok(self.fire())
    }

    fn on_mark_price(&mut self, _ctx: &Context, _symbol: &str, _mark_price: Decimal) -> Result<Action, StrategyError> {
        Ok(self.fire())
    }
}
