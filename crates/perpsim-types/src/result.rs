use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::Side;

/// One sample of the equity curve (§6.4). Recorded at every tick boundary
/// the engine defines one, not only at bar close — mark-price updates,
/// fills, funding settlements, and liquidations all produce a point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: Decimal,
    pub balance: Decimal,
    pub unrealized_pnl: Decimal,
    pub used_margin: Decimal,
    /// `(peak_equity - equity) / peak_equity` as of this point, where
    /// `peak_equity` is the running maximum equity seen so far this run.
    pub drawdown: Decimal,
    /// `(equity - initial_balance) / initial_balance` as of this point.
    pub cumulative_return: Decimal,
}

/// A position fully or partially closed, recorded for trade-level
/// statistics (§6.4: win rate, average win/loss, profit factor, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: u64,
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub qty: Decimal,
    pub entry_time: i64,
    pub exit_time: i64,
    pub gross_pnl: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
    pub is_maker: bool,
    pub holding_period_ms: i64,
}
