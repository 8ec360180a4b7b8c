//! perpsim-book
//!
//! Per-`(exchange, symbol)` order book state and the two fill-simulation
//! models used to price market-taking orders against it (§4.B). The book
//! itself only ever holds *observed* market depth — resting orders placed by
//! strategies live in `perpsim-match`, not here.

use std::collections::BTreeMap;

use perpsim_types::PriceLevel;
use rust_decimal::Decimal;

/// Errors returned by book operations. Hand-written enum with manual
/// `Display`/`Error` impls rather than pulling in `thiserror` for a
/// pure-computation crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    /// A depth update named a negative price or size.
    NegativeLevel { price: Decimal, size: Decimal },
}

impl std::fmt::Display for BookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookError::NegativeLevel { price, size } => {
                write!(f, "negative price or size in depth update: price={price}, size={size}")
            }
        }
    }
}

impl std::error::Error for BookError {}

/// How a market-taking fill is priced against the book.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlippageModel {
    /// Walks the book level by level, consuming resting liquidity until the
    /// requested quantity is filled or the book is exhausted. This is the
    /// default model (§4.B). If the book runs dry before the order is fully
    /// filled, the remainder is priced at the last consumed level's price
    /// (or, if no level was consumed at all, the opposite side's best price)
    /// moved further away by `max_slippage_bps` — the order still fills in
    /// full, just at a worse average price, rather than reporting a partial
    /// fill.
    BookWalk { max_slippage_bps: Decimal },
    /// Prices the entire fill at the best opposite-side price plus/minus a
    /// fixed basis-point offset, ignoring depth beyond the top of book.
    /// Always fills in full provided a best price exists.
    Fixed { bps: Decimal },
}

impl SlippageModel {
    /// The engine-wide default: book-walking with a 50bps exhaustion
    /// penalty, matching the conservative defaults used elsewhere in
    /// `perpsim-config`.
    pub fn book_walk_default() -> Self {
        SlippageModel::BookWalk { max_slippage_bps: Decimal::new(50, 0) }
    }
}

impl Default for SlippageModel {
    fn default() -> Self {
        SlippageModel::book_walk_default()
    }
}

/// The result of simulating a market-taking fill against the book.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FillSimulation {
    /// Volume-weighted average fill price. Zero if `filled_qty` is zero.
    pub avg_price: Decimal,
    pub filled_qty: Decimal,
    /// True if `filled_qty == requested qty`; false if the book (or, under
    /// `Fixed`, the absence of a best price) could not supply the rest.
    pub fully_filled: bool,
}

/// Observed market depth for one `(exchange, symbol)`. Bids keyed
/// descending by price (best bid first), asks ascending (best ask first) —
/// both stored in a `BTreeMap` for deterministic, allocation-light
/// best-price lookups and range iteration.
#[derive(Clone, Debug)]
pub struct OrderBook {
    pub exchange: String,
    pub symbol: String,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update: i64,
}

impl OrderBook {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        OrderBook {
            exchange: exchange.into(),
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update: 0,
        }
    }

    /// Applies a depth update. `is_snapshot` replaces the named side(s)
    /// entirely; a delta only touches the levels it lists, removing a level
    /// when its size is zero.
    ///
    /// A snapshot is accepted as authoritative even if it leaves the book
    /// crossed (`best_bid >= best_ask`) — the source data is trusted over
    /// any internal consistency check, on the theory that a venue's own
    /// snapshot is ground truth even during a fast-moving cross, and the
    /// next update will resolve it. Callers that want to detect a crossed
    /// book can compare `best_bid`/`best_ask` after calling this.
    pub fn apply_bid_levels(&mut self, levels: &[PriceLevel], is_snapshot: bool, timestamp: i64) -> Result<(), BookError> {
        Self::apply_levels(&mut self.bids, levels, is_snapshot)?;
        self.last_update = timestamp;
        Ok(())
    }

    pub fn apply_ask_levels(&mut self, levels: &[PriceLevel], is_snapshot: bool, timestamp: i64) -> Result<(), BookError> {
        Self::apply_levels(&mut self.asks, levels, is_snapshot)?;
        self.last_update = timestamp;
        Ok(())
    }

    fn apply_levels(side: &mut BTreeMap<Decimal, Decimal>, levels: &[PriceLevel], is_snapshot: bool) -> Result<(), BookError> {
        for level in levels {
            if level.price < Decimal::ZERO || level.size < Decimal::ZERO {
                return Err(BookError::NegativeLevel {
                    price: level.price,
                    size: level.size,
                });
            }
        }
        if is_snapshot {
            side.clear();
        }
        for level in levels {
            if level.size.is_zero() {
                side.remove(&level.price);
            } else {
                side.insert(level.price, level.size);
            }
        }
        Ok(())
    }

    /// Applies a full two-sided snapshot or delta in one call — the shape
    /// `EventKind::Depth` arrives in.
    pub fn update(&mut self, bids: &[PriceLevel], asks: &[PriceLevel], is_snapshot: bool, timestamp: i64) -> Result<(), BookError> {
        self.apply_bid_levels(bids, is_snapshot, timestamp)?;
        self.apply_ask_levels(asks, is_snapshot, timestamp)?;
        Ok(())
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    /// Levels on the near side of a taker order with the given side: a buy
    /// walks the asks ascending (cheapest first), a sell walks the bids
    /// descending (highest bid first).
    fn walk_side(&self, taker_side: perpsim_types::Side) -> Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> {
        match taker_side {
            perpsim_types::Side::Buy => Box::new(self.asks.iter()),
            perpsim_types::Side::Sell => Box::new(self.bids.iter().rev()),
        }
    }

    /// Prices a market-taking fill of `qty` on `taker_side` using `model`.
    pub fn simulate_fill(&self, taker_side: perpsim_types::Side, qty: Decimal, model: &SlippageModel) -> FillSimulation {
        self.simulate_fill_capped(taker_side, qty, None, model)
    }

    /// Like [`simulate_fill`](Self::simulate_fill), but under `BookWalk` a
    /// `limit_price` stops the walk once a level would cross it — a buy
    /// never pays more than `limit_price`, a sell never receives less. Used
    /// to price the marketable portion of a limit order without letting it
    /// fill through its own limit. `Fixed` ignores the cap: it always prices
    /// off best-bid/ask plus a flat offset, by construction never walking
    /// multiple levels.
    pub fn simulate_fill_capped(
        &self,
        taker_side: perpsim_types::Side,
        qty: Decimal,
        limit_price: Option<Decimal>,
        model: &SlippageModel,
    ) -> FillSimulation {
        match model {
            SlippageModel::BookWalk { max_slippage_bps } => {
                self.simulate_book_walk(taker_side, qty, limit_price, *max_slippage_bps)
            }
            SlippageModel::Fixed { bps } => self.simulate_fixed(taker_side, qty, *bps),
        }
    }

    /// Walks `taker_side`'s opposite book, capping at `limit_price` if given.
    /// A limit order that's capped simply reports whatever the walk could
    /// reach as a partial fill — the cap is this account's own boundary, not
    /// the market's, so there's no penalty to apply past it. An uncapped walk
    /// (a true market order, `limit_price: None`) that exhausts the book
    /// instead prices the shortfall at `last_price ± max_slippage_bps` (or,
    /// if zero levels existed at all, at the opposite side's best price with
    /// the same offset) and reports a full fill — per §4.B and the
    /// empty-book boundary behavior.
    fn simulate_book_walk(
        &self,
        taker_side: perpsim_types::Side,
        qty: Decimal,
        limit_price: Option<Decimal>,
        max_slippage_bps: Decimal,
    ) -> FillSimulation {
        let mut remaining = qty;
        let mut notional = Decimal::ZERO;
        let mut filled = Decimal::ZERO;
        let mut last_price: Option<Decimal> = None;
        let mut capped = false;

        for (price, size) in self.walk_side(taker_side) {
            if remaining <= Decimal::ZERO {
                break;
            }
            if let Some(limit) = limit_price {
                let crosses = match taker_side {
                    perpsim_types::Side::Buy => *price > limit,
                    perpsim_types::Side::Sell => *price < limit,
                };
                if crosses {
                    capped = true;
                    break;
                }
            }
            let take = remaining.min(*size);
            notional += take * price;
            filled += take;
            remaining -= take;
            last_price = Some(*price);
        }

        if remaining > Decimal::ZERO && limit_price.is_none() {
            let reference = last_price.or_else(|| match taker_side {
                perpsim_types::Side::Buy => self.best_bid(),
                perpsim_types::Side::Sell => self.best_ask(),
            });
            if let Some(reference) = reference {
                let offset = reference * max_slippage_bps / Decimal::from(10_000);
                let penalty_price = match taker_side {
                    perpsim_types::Side::Buy => reference + offset,
                    perpsim_types::Side::Sell => reference - offset,
                };
                notional += remaining * penalty_price;
                filled += remaining;
                remaining = Decimal::ZERO;
            }
        }

        let avg_price = if filled > Decimal::ZERO {
            notional / filled
        } else {
            Decimal::ZERO
        };

        FillSimulation {
            avg_price,
            filled_qty: filled,
            fully_filled: !capped && remaining <= Decimal::ZERO,
        }
    }

    fn simulate_fixed(&self, taker_side: perpsim_types::Side, qty: Decimal, bps: Decimal) -> FillSimulation {
        let best = match taker_side {
            perpsim_types::Side::Buy => self.best_ask(),
            perpsim_types::Side::Sell => self.best_bid(),
        };
        let Some(best) = best else {
            return FillSimulation {
                avg_price: Decimal::ZERO,
                filled_qty: Decimal::ZERO,
                fully_filled: false,
            };
        };

        let offset = best * bps / Decimal::from(10_000);
        let avg_price = match taker_side {
            perpsim_types::Side::Buy => best + offset,
            perpsim_types::Side::Sell => best - offset,
        };

        FillSimulation {
            avg_price,
            filled_qty: qty,
            fully_filled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsim_types::Side;

    fn level(price: i64, size: i64) -> PriceLevel {
        PriceLevel {
            price: Decimal::new(price, 0),
            size: Decimal::new(size, 0),
        }
    }

    fn sample_book() -> OrderBook {
        let mut book = OrderBook::new("binance", "BTC-PERP");
        book.update(
            &[level(99, 1), level(98, 2)],
            &[level(101, 1), level(102, 2)],
            true,
            1_000,
        )
        .unwrap();
        book
    }

    #[test]
    fn best_bid_and_ask_pick_innermost_levels() {
        let book = sample_book();
        assert_eq!(book.best_bid(), Some(Decimal::new(99, 0)));
        assert_eq!(book.best_ask(), Some(Decimal::new(101, 0)));
        assert_eq!(book.mid_price(), Some(Decimal::new(100, 0)));
    }

    #[test]
    fn delta_removes_level_on_zero_size() {
        let mut book = sample_book();
        book.update(&[], &[level(101, 0)], false, 1_001).unwrap();
        assert_eq!(book.best_ask(), Some(Decimal::new(102, 0)));
    }

    #[test]
    fn book_walk_consumes_multiple_levels_and_fills_in_full() {
        let book = sample_book();
        let model = SlippageModel::BookWalk { max_slippage_bps: Decimal::new(50, 0) };
        let fill = book.simulate_fill(Side::Buy, Decimal::new(2, 0), &model);
        // 1 @ 101 + 1 @ 102 -> avg 101.5, fully filled, no need to reach past the book.
        assert_eq!(fill.filled_qty, Decimal::new(2, 0));
        assert!(fill.fully_filled);
        assert_eq!(fill.avg_price, Decimal::new(1015, 1));
    }

    #[test]
    fn book_walk_prices_the_shortfall_at_a_penalty_when_book_exhausted() {
        let book = sample_book();
        let model = SlippageModel::BookWalk { max_slippage_bps: Decimal::new(100, 0) };
        // asks hold 3 total (1 @ 101, 2 @ 102); 7 more units must be priced
        // at the penalty: 102 * 1.01 = 103.02.
        let fill = book.simulate_fill(Side::Buy, Decimal::new(10, 0), &model);
        assert_eq!(fill.filled_qty, Decimal::new(10, 0));
        assert!(fill.fully_filled);
        let expected_notional =
            Decimal::new(101, 0) * Decimal::ONE + Decimal::new(102, 0) * Decimal::new(2, 0) + Decimal::new(10302, 2) * Decimal::new(7, 0);
        assert_eq!(fill.avg_price, expected_notional / Decimal::new(10, 0));
    }

    #[test]
    fn book_walk_against_a_fully_empty_side_prices_off_the_opposite_best() {
        let mut book = OrderBook::new("binance", "BTC-PERP");
        book.update(&[level(99, 5)], &[], true, 1).unwrap();
        let model = SlippageModel::BookWalk { max_slippage_bps: Decimal::new(100, 0) };
        let fill = book.simulate_fill(Side::Buy, Decimal::new(1, 0), &model);
        // no asks at all: price off the best bid plus the penalty.
        assert_eq!(fill.avg_price, Decimal::new(99, 0) * Decimal::new(10100, 4));
        assert!(fill.fully_filled);
    }

    #[test]
    fn book_walk_capped_by_a_limit_price_reports_a_genuine_partial_fill() {
        let book = sample_book();
        let model = SlippageModel::BookWalk { max_slippage_bps: Decimal::new(100, 0) };
        // limit at 101 stops after the first level; the cap is this order's
        // own boundary, so the remainder is a partial fill, not a penalty.
        let fill = book.simulate_fill_capped(Side::Buy, Decimal::new(5, 0), Some(Decimal::new(101, 0)), &model);
        assert_eq!(fill.filled_qty, Decimal::new(1, 0));
        assert!(!fill.fully_filled);
    }

    #[test]
    fn fixed_slippage_prices_off_best_with_offset() {
        let book = sample_book();
        let fill = book.simulate_fill(Side::Buy, Decimal::new(5, 0), &SlippageModel::Fixed { bps: Decimal::new(100, 0) });
        // best ask 101 * (1 + 100bps) = 101 * 1.01 = 102.01
        assert_eq!(fill.avg_price, Decimal::new(10201, 2));
        assert!(fill.fully_filled);
    }

    #[test]
    fn snapshot_is_accepted_even_if_crossed() {
        let mut book = OrderBook::new("binance", "BTC-PERP");
        book.update(&[level(105, 1)], &[level(100, 1)], true, 1).unwrap();
        assert_eq!(book.best_bid(), Some(Decimal::new(105, 0)));
        assert_eq!(book.best_ask(), Some(Decimal::new(100, 0)));
    }

    #[test]
    fn negative_level_is_rejected() {
        let mut book = OrderBook::new("binance", "BTC-PERP");
        let err = book.update(&[level(-1, 1)], &[], true, 1).unwrap_err();
        assert!(matches!(err, BookError::NegativeLevel { .. }));
    }
}
