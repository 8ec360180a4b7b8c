use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{OrderId, Side};

/// A single level of an order book side: a price and the aggregate resting
/// size at that price. Zero size means the level has been removed (used in
/// delta updates, §4.B).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// The payload carried by an [`Event`]. Every variant corresponds to one of
/// the market-data/engine events named in §3 and §4.A.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Trade {
        price: Decimal,
        qty: Decimal,
        taker_side: Side,
    },
    /// A book update. `is_snapshot` distinguishes a full replace from an
    /// incremental delta; see `perpsim-book` for the crossed-snapshot rule.
    Depth {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        is_snapshot: bool,
    },
    Funding {
        funding_rate: Decimal,
        mark_price: Decimal,
    },
    MarkPrice {
        mark_price: Decimal,
    },
    /// Emitted by the matching engine itself when a resting or taker order
    /// fills, then re-queued at `currentTime` per the causality rule (§4.E).
    OrderFilled {
        order_id: OrderId,
        fill_price: Decimal,
        fill_qty: Decimal,
        fee: Decimal,
        is_maker: bool,
    },
    /// Emitted by the account manager on a forced liquidation (§4.D).
    Liquidation {
        symbol: String,
        side: Side,
        qty: Decimal,
        price: Decimal,
        loss: Decimal,
    },
}

/// A scheduled unit of work on the event queue, ordered by `(timestamp,
/// sequence)` (§4.A). `sequence` is assigned by the queue at push time, not
/// by the producer — callers never need to coordinate sequence numbers
/// across data sources, strategies, or the matching engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: i64,
    pub exchange: String,
    pub symbol: String,
    pub sequence: u64,
    pub kind: EventKind,
}

impl Event {
    /// Builds an event with `sequence` left at zero; the queue overwrites it
    /// on push. Constructing an `Event` outside of a `DataSource` or the
    /// matching engine should always go through this constructor rather than
    /// a struct literal, so the zero-sequence convention stays visible.
    pub fn new(timestamp: i64, exchange: impl Into<String>, symbol: impl Into<String>, kind: EventKind) -> Self {
        Event {
            timestamp,
            exchange: exchange.into(),
            symbol: symbol.into(),
            sequence: 0,
            kind,
        }
    }
}
