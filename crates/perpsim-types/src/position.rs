use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a position. `Flat` is the canonical representation of "no
/// position" — `qty`, `entry_price`, and `liquidation_price` are all zero
/// iff `side == Flat`, and conversely (see [`Position::flatten`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

/// Cross-margin or isolated-margin accounting for a position. Only cross is
/// exercised by the account manager's liquidation math in §4.D; isolated is
/// carried here so `perpsim-account` has a place to grow into it without a
/// breaking change, per §9's call to keep the margin model "open for
/// isolated margin" later.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// A single open position on one `(exchange, symbol)`. One `Position` per
/// symbol per account — spec.md's per-symbol position model, not a
/// multi-lot/FIFO ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub exchange: String,
    pub symbol: String,
    pub side: PositionSide,
    pub qty: Decimal,
    /// Size-weighted average entry price across all increases since the
    /// position was last flat.
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub leverage: Decimal,
    pub margin_mode: MarginMode,
    pub isolated_margin: Decimal,
    /// Zero when `side == Flat`. Recomputed on every increase/decrease and
    /// on every mark-price update (§4.D).
    pub liquidation_price: Decimal,
    pub funding_paid: Decimal,
    pub updated_at: i64,
}

impl Position {
    /// A flat (no-op) position for `(exchange, symbol)`, opened lazily the
    /// first time an account looks one up.
    pub fn flat(exchange: impl Into<String>, symbol: impl Into<String>, leverage: Decimal, margin_mode: MarginMode, updated_at: i64) -> Self {
        Position {
            exchange: exchange.into(),
            symbol: symbol.into(),
            side: PositionSide::Flat,
            qty: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            leverage,
            margin_mode,
            isolated_margin: Decimal::ZERO,
            liquidation_price: Decimal::ZERO,
            funding_paid: Decimal::ZERO,
            updated_at,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.side, PositionSide::Flat)
    }

    /// Resets a position to flat, zeroing every derived field. Called after
    /// a full close or a forced liquidation; never leaves `qty == 0` with a
    /// stale non-flat `side` or a non-zero `entry_price`/`liquidation_price`.
    pub fn flatten(&mut self, at: i64) {
        self.side = PositionSide::Flat;
        self.qty = Decimal::ZERO;
        self.entry_price = Decimal::ZERO;
        self.unrealized_pnl = Decimal::ZERO;
        self.isolated_margin = Decimal::ZERO;
        self.liquidation_price = Decimal::ZERO;
        self.updated_at = at;
    }

    /// Signed quantity: positive for long, negative for short, zero for flat.
    pub fn signed_qty(&self) -> Decimal {
        match self.side {
            PositionSide::Long => self.qty,
            PositionSide::Short => -self.qty,
            PositionSide::Flat => Decimal::ZERO,
        }
    }
}
