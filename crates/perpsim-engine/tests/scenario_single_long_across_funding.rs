//! A single long position opened via a market order, then carried across a
//! funding settlement. Checks that funding is signed the way §4.D
//! documents: a long pays when the funding rate is positive.

mod common;

use common::OneShotStrategy;
use perpsim_config::EngineConfig;
use perpsim_engine::{BacktestEngine, VecDataSource};
use perpsim_strategy::OrderIntent;
use perpsim_types::{Event, EventKind, OrderType, PriceLevel, Side, TimeInForce};
use rust_decimal::Decimal;

fn d(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

#[test]
fn long_position_pays_funding_on_positive_rate() {
    let config = EngineConfig::test_defaults();
    let mut engine = BacktestEngine::new(config).unwrap();
    engine.register_strategy(Box::new(OneShotStrategy::new(
        "single-long",
        OrderIntent {
            client_id: None,
            symbol: "BTC-PERP".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: None,
            qty: d(1),
            reduce_only: false,
            post_only: false,
            time_in_force: TimeInForce::Gtc,
        },
    )));

    let events = vec![
        Event::new(
            0,
            "binance",
            "BTC-PERP",
            EventKind::Depth {
                bids: vec![PriceLevel { price: d(99), size: d(5) }],
                asks: vec![PriceLevel { price: d(101), size: d(5) }],
                is_snapshot: true,
            },
        ),
        Event::new(
            10,
            "binance",
            "BTC-PERP",
            EventKind::Funding { funding_rate: Decimal::new(1, 3), mark_price: d(101) },
        ),
    ];

    let mut source = VecDataSource::new(events);
    let result = engine.run(&mut source, None).unwrap();

    assert!(engine.rejected_orders().is_empty());
    assert_eq!(result.final_account.total_funding, Decimal::new(101, 3));
    assert_eq!(result.final_account.balance, Decimal::new(10_000, 0) - Decimal::new(101, 3));
}
