//! Two resting limit orders at the same price fill in the order they were
//! submitted (price-time priority, §4.C) when a trade print only has enough
//! size to clear part of the level.

use perpsim_config::EngineConfig;
use perpsim_engine::{BacktestEngine, VecDataSource};
use perpsim_strategy::{Action, Context, OrderAction, OrderIntent, Strategy, StrategyError};
use perpsim_types::{Event, EventKind, OrderStatus, OrderType, PriceLevel, Side, TimeInForce};
use rust_decimal::Decimal;

fn d(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

/// Rests two buy limits at the same price in one tick, in submission order.
struct TwoRestingOrders {
    fired: bool,
}

impl Strategy for TwoRestingOrders {
    fn name(&self) -> &str {
        "two-resting-orders"
    }

    fn on_depth(&mut self, _ctx: &Context, symbol: &str) -> Result<Action, StrategyError> {
        if self.fired {
            return Ok(Action::none());
        }
        self.fired = true;
        let first = OrderIntent {
            client_id: Some("first".to_string()),
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Some(d(99)),
            qty: d(2),
            reduce_only: false,
            post_only: false,
            time_in_force: TimeInForce::Gtc,
        };
        let second = OrderIntent { client_id: Some("second".to_string()), qty: d(3), ..first.clone() };
        Ok(Action { orders: vec![OrderAction::Place(first), OrderAction::Place(second)] })
    }
}

#[test]
fn earlier_order_at_same_price_fills_before_later_one() {
    let config = EngineConfig::test_defaults();
    let mut engine = BacktestEngine::new(config).unwrap();
    engine.register_strategy(Box::new(TwoRestingOrders { fired: false }));

    let events = vec![
        Event::new(
            0,
            "binance",
            "BTC-PERP",
            EventKind::Depth {
                bids: vec![PriceLevel { price: d(97), size: d(5) }],
                asks: vec![PriceLevel { price: d(103), size: d(5) }],
                is_snapshot: true,
            },
        ),
        // A trade print at 99 only carries enough size to clear the first
        // order in full and partially fill the second.
        Event::new(10, "binance", "BTC-PERP", EventKind::Trade { price: d(99), qty: d(4), taker_side: Side::Sell }),
    ];

    let mut source = VecDataSource::new(events);
    let _ = engine.run(&mut source, None).unwrap();

    let open = engine.open_orders_snapshot();
    assert_eq!(open.len(), 1);
    let remaining = &open[0];
    assert_eq!(remaining.client_id.as_deref(), Some("second"));
    assert_eq!(remaining.status, OrderStatus::PartiallyFilled);
    assert_eq!(remaining.filled_qty, d(2));
    assert_eq!(remaining.remaining_qty(), d(1));
}
