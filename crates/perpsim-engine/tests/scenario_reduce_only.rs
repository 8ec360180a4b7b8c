//! A `reduceOnly` order sized past the existing position is clipped to the
//! position's size and fills in full, rather than being rejected or opening
//! exposure on the other side (§4.C seed scenario 5).

use perpsim_config::EngineConfig;
use perpsim_engine::{BacktestEngine, VecDataSource};
use perpsim_strategy::{Action, Context, OrderFillInfo, OrderIntent, Strategy, StrategyError};
use perpsim_types::{Event, EventKind, OrderStatus, OrderType, PriceLevel, RejectReason, Side, TimeInForce};
use rust_decimal::Decimal;

fn d(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

/// Opens a 1-unit short on the first depth update, then — once that fill is
/// confirmed — tries to reduce-only-buy 2 units, double what the position
/// holds.
struct ReduceOnlyProbe {
    opened: bool,
    tried_reduce: bool,
}

impl Strategy for ReduceOnlyProbe {
    fn name(&self) -> &str {
        "reduce-only-probe"
    }

    fn on_depth(&mut self, _ctx: &Context, symbol: &str) -> Result<Action, StrategyError> {
        if self.opened {
            return Ok(Action::none());
        }
        self.opened = true;
        Ok(Action::place(OrderIntent {
            client_id: None,
            symbol: symbol.to_string(),
            side: Side::Sell,
            order_type: OrderType::Market,
            price: None,
            qty: d(1),
            reduce_only: false,
            post_only: false,
            time_in_force: TimeInForce::Gtc,
        }))
    }

    fn on_order_filled(&mut self, _ctx: &Context, fill: &OrderFillInfo) -> Result<Action, StrategyError> {
        if self.tried_reduce {
            return Ok(Action::none());
        }
        self.tried_reduce = true;
        let _ = fill;
        Ok(Action::place(OrderIntent {
            client_id: None,
            symbol: "BTC-PERP".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: None,
            qty: d(2),
            reduce_only: true,
            post_only: false,
            time_in_force: TimeInForce::Gtc,
        }))
    }
}

#[test]
fn reduce_only_order_exceeding_position_size_clips_and_fully_fills() {
    let config = EngineConfig::test_defaults();
    let mut engine = BacktestEngine::new(config).unwrap();
    engine.register_strategy(Box::new(ReduceOnlyProbe { opened: false, tried_reduce: false }));

    let events = vec![Event::new(
        0,
        "binance",
        "BTC-PERP",
        EventKind::Depth {
            bids: vec![PriceLevel { price: d(99), size: d(5) }],
            asks: vec![PriceLevel { price: d(101), size: d(5) }],
            is_snapshot: true,
        },
    )];

    let mut source = VecDataSource::new(events);
    let _ = engine.run(&mut source, None).unwrap();

    assert!(engine.rejected_orders().is_empty());

    let open = engine.open_orders_snapshot();
    let reduce_order = open.iter().find(|o| o.side == Side::Buy);
    assert!(reduce_order.is_none(), "the clipped reduce-only buy should be fully filled, not resting");

    let positions = engine.positions();
    assert_eq!(positions.len(), 1);
    assert!(positions[0].is_flat(), "closing the 1-unit short in full should leave the position flat");
}

#[test]
fn reduce_only_buy_against_a_flat_position_is_rejected() {
    let config = EngineConfig::test_defaults();
    let mut engine = BacktestEngine::new(config).unwrap();

    let events = vec![Event::new(
        0,
        "binance",
        "BTC-PERP",
        EventKind::Depth {
            bids: vec![PriceLevel { price: d(99), size: d(5) }],
            asks: vec![PriceLevel { price: d(101), size: d(5) }],
            is_snapshot: true,
        },
    )];

    struct FlatReduceProbe {
        fired: bool,
    }
    impl Strategy for FlatReduceProbe {
        fn name(&self) -> &str {
            "flat-reduce-probe"
        }
        fn on_depth(&mut self, _ctx: &Context, symbol: &str) -> Result<Action, StrategyError> {
            if self.fired {
                return Ok(Action::none());
            }
            self.fired = true;
            Ok(Action::place(OrderIntent {
                client_id: None,
                symbol: symbol.to_string(),
                side: Side::Buy,
                order_type: OrderType::Market,
                price: None,
                qty: d(1),
                reduce_only: true,
                post_only: false,
                time_in_force: TimeInForce::Gtc,
            }))
        }
    }

    engine.register_strategy(Box::new(FlatReduceProbe { fired: false }));
    let mut source = VecDataSource::new(events);
    let _ = engine.run(&mut source, None).unwrap();

    assert_eq!(engine.rejected_orders().len(), 1);
    assert_eq!(engine.rejected_orders()[0].reject_reason, Some(RejectReason::ReduceOnlyViolates));
    assert_eq!(engine.rejected_orders()[0].status, OrderStatus::Rejected);
}
