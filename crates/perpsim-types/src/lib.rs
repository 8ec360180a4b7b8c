//! perpsim-types
//!
//! Shared data model for the backtest core: events, orders, positions,
//! accounts, and the derived result types (equity points, closed trades).
//!
//! # Decimal precision
//!
//! All monetary quantities (price, qty, pnl, fees, margin) use
//! [`rust_decimal::Decimal`], a base-10 fixed-point type with up to 28
//! significant digits and an explicit per-value scale. That comfortably
//! covers the "fixed scale >= 18 fractional digits" requirement this system
//! places on money math, and — unlike `f32`/`f64` — never introduces binary
//! rounding drift into PnL or funding accrual. No value in the hot path is
//! ever converted to a binary float; floats appear only in the statistics
//! layer (`perpsim-engine::stats`), which is explicitly allowed to use them.

mod account;
mod event;
mod order;
mod position;
mod result;

pub use account::Account;
pub use event::{Event, EventKind, PriceLevel};
pub use order::{Order, OrderId, OrderStatus, OrderType, RejectReason, Side, TimeInForce};
pub use position::{MarginMode, Position, PositionSide};
pub use result::{ClosedTrade, EquityPoint};
