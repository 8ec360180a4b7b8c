//! perpsim-account
//!
//! The account and margin manager (§4.D): cross-margin equity tracking,
//! position increase/decrease/flip with size-weighted average entry price,
//! mark-price-driven unrealized PnL and liquidation-price recomputation,
//! funding settlement, and forced liquidation.
//!
//! Every public mutator ends by calling [`AccountManager::recompute`],
//! which derives `used_margin`, `total_unrealized_pnl`, `equity`, and
//! `margin_ratio` from scratch over every open position rather than
//! threading incremental deltas through each call site, the same
//! correctness-over-micro-optimization tradeoff `recompute_from_ledger`
//! makes over a ledger.

use std::collections::HashMap;

use perpsim_types::{Account, ClosedTrade, MarginMode, Position, PositionSide, Side};
use rust_decimal::Decimal;

/// A position key: `(exchange, symbol)`.
type PositionKey = (String, String);

/// The result of applying a fill to a position: realized PnL recognized by
/// this fill (zero if the fill was purely an increase), and a
/// [`ClosedTrade`] record if the fill closed all or part of an existing
/// position.
#[derive(Clone, Debug)]
pub struct FillApplication {
    pub realized_pnl: Decimal,
    pub closed_trade: Option<ClosedTrade>,
}

/// The outcome of a forced liquidation (§4.D): the position is fully
/// closed at `price`, a liquidation fee is charged, and the loss is
/// reported so the engine can emit a `Liquidation` event.
#[derive(Clone, Debug)]
pub struct LiquidationOutcome {
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    /// `initialMargin + fee` (§4.D): the whole margin backing the position
    /// is forfeited, not just the mark-to-market loss at `price`. Always
    /// non-negative — a liquidation is a forfeiture of posted margin, not
    /// a mark-to-market close, so there's no "profitable liquidation"
    /// case the way there is for `FillApplication::realized_pnl`.
    pub loss: Decimal,
    pub closed_trade: ClosedTrade,
}

/// Cross-margin account state plus the open positions it funds. One
/// `AccountManager` per backtest run.
#[derive(Debug)]
pub struct AccountManager {
    account: Account,
    positions: HashMap<PositionKey, Position>,
    maintenance_margin_rate: Decimal,
    /// Fraction of notional, not basis points — e.g. `0.005` for 0.5%.
    liquidation_fee_rate: Decimal,
    next_trade_id: u64,
}

impl AccountManager {
    pub fn new(
        initial_balance: Decimal,
        default_leverage: Decimal,
        max_leverage: Decimal,
        maintenance_margin_rate: Decimal,
        liquidation_fee_rate: Decimal,
    ) -> Self {
        AccountManager {
            account: Account::new(initial_balance, default_leverage, max_leverage),
            positions: HashMap::new(),
            maintenance_margin_rate,
            liquidation_fee_rate,
            next_trade_id: 0,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn position(&self, exchange: &str, symbol: &str) -> Option<&Position> {
        self.positions.get(&(exchange.to_string(), symbol.to_string()))
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    fn position_mut_or_flat(&mut self, exchange: &str, symbol: &str, leverage: Decimal, now: i64) -> &mut Position {
        self.positions
            .entry((exchange.to_string(), symbol.to_string()))
            .or_insert_with(|| Position::flat(exchange, symbol, leverage, MarginMode::Cross, now))
    }

    /// Previews whether an order of `side`/`price`/`qty` at `leverage` can
    /// be afforded given currently `available_balance` — the margin-preview
    /// check `perpsim-match`'s admission pipeline calls before admitting an
    /// order. Reducing an existing position never requires incremental
    /// margin, so only the increasing portion of a potential flip is
    /// checked.
    pub fn has_sufficient_margin(&self, exchange: &str, symbol: &str, side: Side, price: Decimal, qty: Decimal) -> bool {
        let existing = self.position(exchange, symbol);
        let (existing_signed, leverage) = existing
            .map(|p| (p.signed_qty(), p.leverage))
            .unwrap_or((Decimal::ZERO, self.account.default_leverage));

        let fill_signed = qty * Decimal::from(side.sign());
        let is_increase = existing_signed.is_zero() || existing_signed.signum() == fill_signed.signum();
        let increasing_qty = if is_increase {
            qty
        } else {
            (fill_signed.abs() - existing_signed.abs()).max(Decimal::ZERO)
        };
        if increasing_qty.is_zero() {
            return true;
        }
        let required_margin = increasing_qty * price / leverage.max(Decimal::ONE);
        required_margin <= self.account.available_balance
    }

    /// Applies a fill at `price`/`qty` on `side` to the position for
    /// `(exchange, symbol)`, handling increase, reduce, and flip (§4.D).
    /// `fee` is deducted from the account balance. `leverage` supplies the
    /// position's leverage the first time it is opened from flat; it is
    /// ignored on subsequent fills (leverage is fixed for the life of a
    /// position in this model, per §9's simplification of margin mode
    /// changes being out of scope).
    pub fn apply_fill(
        &mut self,
        exchange: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        qty: Decimal,
        fee: Decimal,
        leverage: Decimal,
        is_maker: bool,
        now: i64,
    ) -> FillApplication {
        let position = self.position_mut_or_flat(exchange, symbol, leverage, now);
        let existing_signed = position.signed_qty();
        let fill_signed = qty * Decimal::from(side.sign());
        let same_direction = existing_signed.is_zero() || existing_signed.signum() == fill_signed.signum();

        let mut realized_pnl = Decimal::ZERO;
        let mut closed_trade = None;

        if same_direction {
            let new_qty = position.qty + qty;
            let prior_notional = position.entry_price * position.qty;
            position.entry_price = (prior_notional + price * qty) / new_qty;
            position.qty = new_qty;
            position.side = if fill_signed > Decimal::ZERO { PositionSide::Long } else { PositionSide::Short };
        } else {
            let existing_side = position.side;
            let existing_qty = position.qty;
            let close_qty = qty.min(existing_qty);
            let direction_sign = Decimal::from(match existing_side {
                PositionSide::Long => 1,
                PositionSide::Short => -1,
                PositionSide::Flat => 0,
            });
            let trade_pnl = close_qty * (price - position.entry_price) * direction_sign;
            realized_pnl += trade_pnl;

            self.next_trade_id += 1;
            closed_trade = Some(ClosedTrade {
                id: self.next_trade_id,
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                side: existing_side_to_order_side(existing_side),
                entry_price: position.entry_price,
                exit_price: price,
                qty: close_qty,
                entry_time: position.updated_at,
                exit_time: now,
                gross_pnl: trade_pnl,
                fees: fee,
                net_pnl: trade_pnl - fee,
                is_maker,
                holding_period_ms: now - position.updated_at,
            });

            let remaining_existing = existing_qty - close_qty;
            let remaining_fill = qty - close_qty;

            if remaining_fill > Decimal::ZERO {
                // Flip: fully closed the old side and opened the opposite
                // side with whatever quantity the fill still carries.
                position.side = if fill_signed > Decimal::ZERO { PositionSide::Long } else { PositionSide::Short };
                position.qty = remaining_fill;
                position.entry_price = price;
                position.updated_at = now;
            } else if remaining_existing.is_zero() {
                position.flatten(now);
            } else {
                position.qty = remaining_existing;
            }
        }

        self.account.balance += realized_pnl - fee;
        self.account.total_realized_pnl += realized_pnl;
        self.account.total_fees += fee;
        position.realized_pnl += realized_pnl;
        position.updated_at = now;

        self.recompute(now);
        FillApplication { realized_pnl, closed_trade }
    }

    /// Updates the mark price for `(exchange, symbol)`: recomputes that
    /// position's unrealized PnL and liquidation price, then recomputes
    /// account-level aggregates.
    pub fn update_mark_price(&mut self, exchange: &str, symbol: &str, mark_price: Decimal, now: i64) {
        if let Some(position) = self.positions.get_mut(&(exchange.to_string(), symbol.to_string())) {
            if !position.is_flat() {
                let direction_sign = Decimal::from(match position.side {
                    PositionSide::Long => 1,
                    PositionSide::Short => -1,
                    PositionSide::Flat => 0,
                });
                position.unrealized_pnl = position.qty * (mark_price - position.entry_price) * direction_sign;
                position.liquidation_price = liquidation_price(position, self.maintenance_margin_rate);
                position.updated_at = now;
            }
        }
        self.recompute(now);
    }

    /// Settles funding for `(exchange, symbol)` at `funding_rate` against
    /// `mark_price` (§4.D). Longs pay when `funding_rate` is positive;
    /// shorts pay when negative. Returns the signed amount paid by the
    /// account (positive = paid out, negative = received).
    pub fn settle_funding(&mut self, exchange: &str, symbol: &str, funding_rate: Decimal, mark_price: Decimal, now: i64) -> Decimal {
        let Some(position) = self.positions.get_mut(&(exchange.to_string(), symbol.to_string())) else {
            return Decimal::ZERO;
        };
        if position.is_flat() {
            return Decimal::ZERO;
        }
        let direction_sign = Decimal::from(match position.side {
            PositionSide::Long => 1,
            PositionSide::Short => -1,
            PositionSide::Flat => 0,
        });
        let payment = position.qty * mark_price * funding_rate * direction_sign;
        position.funding_paid += payment;
        position.updated_at = now;

        self.account.balance -= payment;
        self.account.total_funding += payment;
        self.recompute(now);
        payment
    }

    /// True if `(exchange, symbol)`'s current mark-derived liquidation
    /// price has been breached and the position must be force-closed.
    pub fn should_liquidate(&self, exchange: &str, symbol: &str, mark_price: Decimal) -> bool {
        match self.position(exchange, symbol) {
            Some(position) if !position.is_flat() => match position.side {
                PositionSide::Long => mark_price <= position.liquidation_price,
                PositionSide::Short => mark_price >= position.liquidation_price,
                PositionSide::Flat => false,
            },
            _ => false,
        }
    }

    /// Forcibly closes `(exchange, symbol)` in full at `price`, charging a
    /// liquidation fee, and returns the outcome so the caller can emit a
    /// `Liquidation` event. No-op (`None`) if the position is already flat.
    ///
    /// Unlike a normal close, this does not realize price-based PnL up to
    /// `price`: per §4.D the whole initial margin backing the position is
    /// wiped, and the liquidation fee is charged on top of that, regardless
    /// of exactly how far past `liquidationPrice` the triggering mark print
    /// landed.
    pub fn force_liquidate(&mut self, exchange: &str, symbol: &str, price: Decimal, now: i64) -> Option<LiquidationOutcome> {
        let key = (exchange.to_string(), symbol.to_string());
        let position = self.positions.get_mut(&key)?;
        if position.is_flat() {
            return None;
        }
        let side = existing_side_to_order_side(position.side);
        let qty = position.qty;
        let entry_price = position.entry_price;
        let leverage = position.leverage;
        let entry_time = position.updated_at;
        let initial_margin = qty * entry_price / leverage.max(Decimal::ONE);
        // Fee is charged on the position's notional, i.e. entry-price based
        // (the same notional used_margin is derived from), not the
        // liquidation execution price.
        let fee = qty * entry_price * self.liquidation_fee_rate;
        let loss = initial_margin + fee;

        self.next_trade_id += 1;
        let closed_trade = ClosedTrade {
            id: self.next_trade_id,
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            exit_price: price,
            qty,
            entry_time,
            exit_time: now,
            gross_pnl: -initial_margin,
            fees: fee,
            net_pnl: -loss,
            is_maker: false,
            holding_period_ms: now - entry_time,
        };

        position.flatten(now);
        self.account.balance -= loss;
        self.account.total_realized_pnl -= initial_margin;
        self.account.total_fees += fee;
        self.recompute(now);

        Some(LiquidationOutcome { exchange: exchange.to_string(), symbol: symbol.to_string(), side, qty, price, fee, loss, closed_trade })
    }

    /// Recomputes `used_margin` and `total_unrealized_pnl` over every open
    /// position, then derives `equity`/`available_balance`/`margin_ratio`
    /// via [`Account::recompute`].
    fn recompute(&mut self, _now: i64) {
        let mut used_margin = Decimal::ZERO;
        let mut total_unrealized = Decimal::ZERO;
        for position in self.positions.values() {
            if position.is_flat() {
                continue;
            }
            used_margin += position.qty * position.entry_price / position.leverage.max(Decimal::ONE);
            total_unrealized += position.unrealized_pnl;
        }
        self.account.used_margin = used_margin;
        self.account.total_unrealized_pnl = total_unrealized;
        self.account.recompute();
    }
}

fn existing_side_to_order_side(side: PositionSide) -> Side {
    match side {
        PositionSide::Long | PositionSide::Flat => Side::Buy,
        PositionSide::Short => Side::Sell,
    }
}

/// `entry * (1 - 1/leverage + maintenanceMarginRate)` for a long position,
/// `entry * (1 + 1/leverage - maintenanceMarginRate)` for a short — the
/// price at which maintenance margin exactly covers the loss, per §4.D.
fn liquidation_price(position: &Position, maintenance_margin_rate: Decimal) -> Decimal {
    let inverse_leverage = Decimal::ONE / position.leverage.max(Decimal::ONE);
    match position.side {
        PositionSide::Long => position.entry_price * (Decimal::ONE - inverse_leverage + maintenance_margin_rate),
        PositionSide::Short => position.entry_price * (Decimal::ONE + inverse_leverage - maintenance_margin_rate),
        PositionSide::Flat => Decimal::ZERO,
    }
}
