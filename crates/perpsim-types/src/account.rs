use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cross-margin account state (§4.D). One `Account` per backtest run; all
/// open positions share this single margin pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Cash balance: deposits plus realized PnL, fees, and funding, net of
    /// withdrawals (none modeled — §1 excludes deposit/withdrawal flows).
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub used_margin: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub total_funding: Decimal,
    /// `balance + total_unrealized_pnl`.
    pub equity: Decimal,
    /// `used_margin / equity`, or zero when `equity <= 0` or there is no
    /// used margin; compared against `maintenanceMarginRate` for liquidation.
    pub margin_ratio: Decimal,
    pub default_leverage: Decimal,
    pub max_leverage: Decimal,
}

impl Account {
    pub fn new(initial_balance: Decimal, default_leverage: Decimal, max_leverage: Decimal) -> Self {
        Account {
            balance: initial_balance,
            available_balance: initial_balance,
            used_margin: Decimal::ZERO,
            total_unrealized_pnl: Decimal::ZERO,
            total_realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            total_funding: Decimal::ZERO,
            equity: initial_balance,
            margin_ratio: Decimal::ZERO,
            default_leverage,
            max_leverage,
        }
    }

    /// Recomputes `equity`, `available_balance`, and `margin_ratio` from the
    /// account's own balance/margin/PnL fields. Pure — callers own updating
    /// `used_margin`/`total_unrealized_pnl` from position state first, then
    /// call this to bring the derived fields back into agreement, the same
    /// split a ledger keeps between mutation and its own
    /// `recompute_from_ledger` pass.
    ///
    /// `available_balance` is derived from `balance`, not `equity`: unrealized
    /// PnL isn't spendable as fresh margin until it's realized.
    pub fn recompute(&mut self) {
        self.equity = self.balance + self.total_unrealized_pnl;
        self.available_balance = (self.balance - self.used_margin).max(Decimal::ZERO);
        self.margin_ratio = if self.equity > Decimal::ZERO && self.used_margin > Decimal::ZERO {
            self.used_margin / self.equity
        } else {
            Decimal::ZERO
        };
    }
}
