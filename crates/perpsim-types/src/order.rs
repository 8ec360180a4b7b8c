use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A strictly-increasing identifier assigned to every order admitted by the
/// matching engine. Never reused, even across cancel/resubmit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// BUY or SELL.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side a resting order must be on to be the counterparty of a
    /// taker order on `self`.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buy, -1 for sell. Used to sign PnL and funding formulas.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Order type. `postOnly` and `reduceOnly` are modeled as flags on `Order`
/// rather than as extra variants here — spec.md lists both a `postOnly`
/// order-type token and a standalone `reduceOnly` boolean field on the same
/// struct; folding `postOnly` into a flag on `Limit` (and allowing it to
/// compose with `reduceOnly` on any type) removes that redundancy without
/// changing any documented behavior. See DESIGN.md, "Order.type vs. flags".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    TakeProfit,
}

/// Order time-in-force.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-till-canceled: rests on the book until filled or canceled.
    Gtc,
    /// Immediate-or-cancel: fills whatever is marketable now, cancels the rest.
    Ioc,
    /// Fill-or-kill: fills in full immediately, or not at all.
    Fok,
}

/// Order lifecycle state. See §4.C state machine: `filled`, `canceled`, and
/// `rejected` are terminal; no transition may re-enter a non-terminal state
/// from a terminal one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

/// Why an order was rejected or a resting order was forcibly canceled.
/// Surfaced via `Order::reject_reason`; never raised as a Rust `Err` from
/// `submit_order` (§7: recoverable rejections are data, not control flow).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InsufficientMargin,
    PostOnlyWouldCross,
    ReduceOnlyViolates,
    LeverageExceeds,
    InvalidSymbol,
    InvalidQty,
    InvalidPrice,
    SelfMatchCanceled,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::InsufficientMargin => "insufficientMargin",
            RejectReason::PostOnlyWouldCross => "postOnlyWouldCross",
            RejectReason::ReduceOnlyViolates => "reduceOnlyViolates",
            RejectReason::LeverageExceeds => "leverageExceeds",
            RejectReason::InvalidSymbol => "invalidSymbol",
            RejectReason::InvalidQty => "invalidQty",
            RejectReason::InvalidPrice => "invalidPrice",
            RejectReason::SelfMatchCanceled => "selfMatchCanceled",
        };
        write!(f, "{s}")
    }
}

/// An order, as tracked by the matching engine.
///
/// Mutated only by the matching engine (§3, Lifecycles). Strategies must not
/// retain references across callbacks — they observe orders only through
/// `Context::active_orders`, which hands back fresh snapshots every tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: Option<String>,
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Required for `Limit`/`Stop`/`TakeProfit`; `None` for `Market`.
    pub price: Option<Decimal>,
    pub qty: Decimal,
    pub filled_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub reduce_only: bool,
    pub post_only: bool,
    pub time_in_force: TimeInForce,
    pub reject_reason: Option<RejectReason>,
}

impl Order {
    pub fn remaining_qty(&self) -> Decimal {
        (self.qty - self.filled_qty).max(Decimal::ZERO)
    }

    pub fn is_buy(&self) -> bool {
        matches!(self.side, Side::Buy)
    }
}
