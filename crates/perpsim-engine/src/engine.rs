//! The backtest driver (§4.E): owns the event queue, the per-symbol order
//! books and matching engines, the account manager, and the strategy host,
//! and drives them all through one event at a time in strict
//! `(timestamp, sequence)` order until the queue is empty or the
//! configured `end_time` is reached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use perpsim_account::AccountManager;
use perpsim_book::OrderBook;
use perpsim_config::EngineConfig;
use perpsim_match::{MarginCheck, MatchingEngine, NewOrderRequest};
use perpsim_queue::EventQueue;
use perpsim_strategy::{
    Action, BookSnapshot, Context, LiquidationInfo, OrderAction, OrderFillInfo, Strategy, StrategyError, StrategyHost,
};
use perpsim_types::{ClosedTrade, Event, EventKind, EquityPoint, Order, OrderStatus, Side};
use rust_decimal::Decimal;

use crate::data_source::DataSource;
use crate::stats::{compute_stats, BacktestStats};

/// Symbol key shared across the per-symbol maps this engine keeps.
type SymbolKey = (String, String);

/// Fatal errors that abort a run outright, as opposed to per-order
/// rejections (recoverable, carried on `Order::reject_reason`) or isolated
/// strategy faults (recoverable, per `EngineConfig::isolate_strategy_faults`).
#[derive(Debug)]
pub enum BacktestError {
    InvalidConfig(perpsim_config::ConfigError),
    DataSource(anyhow::Error),
    StrategyFault(StrategyError),
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BacktestError::InvalidConfig(e) => write!(f, "invalid configuration: {e}"),
            BacktestError::DataSource(e) => write!(f, "data source error: {e}"),
            BacktestError::StrategyFault(e) => write!(f, "unrecovered strategy fault: {e}"),
        }
    }
}

impl std::error::Error for BacktestError {}

/// Progress reported to an optional caller-supplied callback as the run
/// proceeds — the closest equivalent to `mqk-backtest`'s per-bar reporting,
/// generalized to per-event since this engine has no fixed bar cadence.
/// Fired every `EngineConfig::progress_interval` events (§4.E).
#[derive(Copy, Clone, Debug)]
pub struct ProgressReport {
    pub current_time: i64,
    pub events_processed: u64,
    /// Events still queued as of this report, or `None` if the total event
    /// count wasn't known up front (it always is here — the queue is seeded
    /// before the loop starts — but the field stays optional so a future
    /// streaming `DataSource` isn't blocked on knowing its own length).
    pub remaining: Option<u64>,
    pub percent: Option<f64>,
    pub events_per_second: f64,
    pub equity: Decimal,
    /// Estimated wall-clock time remaining, extrapolated from the
    /// observed `events_per_second` and `remaining`.
    pub eta: Option<std::time::Duration>,
}

/// A cooperative cancellation handle for a running backtest (§4.E `stop`).
/// Cloning shares the same underlying flag — any clone can request a stop,
/// and the engine checks it once per processed event.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        StopToken(Arc::new(AtomicBool::new(false)))
    }

    /// Requests that the run stop at the next opportunity. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a run produced (§6.4: `config, stats, equityCurve[], trades[],
/// finalPositions[], finalAccount`).
#[derive(Clone, Debug)]
pub struct BacktestResult {
    pub config: EngineConfig,
    pub final_account: perpsim_types::Account,
    pub final_positions: Vec<perpsim_types::Position>,
    pub equity_curve: Vec<EquityPoint>,
    pub closed_trades: Vec<ClosedTrade>,
    pub stats: BacktestStats,
    pub events_processed: u64,
    pub halted: bool,
    pub halt_reason: Option<String>,
}

struct AccountMarginAdapter<'a> {
    account: &'a AccountManager,
    exchange: &'a str,
    symbol: &'a str,
}

impl MarginCheck for AccountMarginAdapter<'_> {
    fn has_sufficient_margin(&self, side: Side, price: Decimal, qty: Decimal) -> bool {
        self.account.has_sufficient_margin(self.exchange, self.symbol, side, price, qty)
    }
}

/// The backtest driver.
pub struct BacktestEngine {
    config: EngineConfig,
    queue: EventQueue,
    books: HashMap<SymbolKey, OrderBook>,
    matchers: HashMap<SymbolKey, MatchingEngine>,
    account: AccountManager,
    strategy_host: StrategyHost,
    mark_prices: HashMap<SymbolKey, Decimal>,
    order_owner: HashMap<perpsim_types::OrderId, usize>,
    equity_curve: Vec<EquityPoint>,
    closed_trades: Vec<ClosedTrade>,
    peak_equity: Decimal,
    events_processed: u64,
    liquidation_count: u64,
    current_time: i64,
    halted: bool,
    halt_reason: Option<String>,
    stop_flag: StopToken,
    /// Orders rejected by the admission pipeline. Strategies have no
    /// built-in hook for learning about their own rejections (§6.2 has no
    /// `onOrderRejected` callback — a rejection is the absence of an
    /// `OrderFilled`/resting order, not an event of its own), so this log
    /// exists for callers (and tests) that need to inspect rejections
    /// directly rather than infer them from what didn't happen.
    rejected_orders: Vec<Order>,
}

impl BacktestEngine {
    pub fn new(config: EngineConfig) -> Result<Self, BacktestError> {
        config.validate().map_err(BacktestError::InvalidConfig)?;

        let mut books = HashMap::new();
        let mut matchers = HashMap::new();
        let fees = perpsim_match::FeeSchedule {
            maker_bps: config.maker_fee_bps,
            taker_bps: config.taker_fee_bps,
        };
        for (exchange, symbol) in &config.symbols {
            books.insert((exchange.clone(), symbol.clone()), OrderBook::new(exchange.clone(), symbol.clone()));
            matchers.insert((exchange.clone(), symbol.clone()), MatchingEngine::new(exchange.clone(), symbol.clone(), fees));
        }

        let account = AccountManager::new(
            config.initial_balance,
            config.default_leverage,
            config.max_leverage,
            config.maintenance_margin_rate,
            config.liquidation_fee_rate,
        );
        let strategy_host = StrategyHost::new(config.isolate_strategy_faults);

        let queue = EventQueue::with_capacity(config.event_buffer_size);

        Ok(BacktestEngine {
            peak_equity: config.initial_balance,
            config,
            queue,
            books,
            matchers,
            account,
            strategy_host,
            mark_prices: HashMap::new(),
            order_owner: HashMap::new(),
            equity_curve: Vec::new(),
            closed_trades: Vec::new(),
            events_processed: 0,
            liquidation_count: 0,
            current_time: 0,
            halted: false,
            halt_reason: None,
            stop_flag: StopToken::new(),
            rejected_orders: Vec::new(),
        })
    }

    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategy_host.register(strategy);
    }

    /// A cloneable handle that can request this run stop cooperatively at
    /// the next processed event, from another thread or a signal handler.
    pub fn stop_token(&self) -> StopToken {
        self.stop_flag.clone()
    }

    /// Orders rejected by the admission pipeline over the life of this run.
    pub fn rejected_orders(&self) -> &[Order] {
        &self.rejected_orders
    }

    /// Every non-terminal order currently resting across all configured
    /// symbols — the same snapshot strategies see via `Context::active_orders`.
    pub fn open_orders_snapshot(&self) -> Vec<Order> {
        self.active_orders()
    }

    /// Every open position, across all configured symbols.
    pub fn positions(&self) -> Vec<perpsim_types::Position> {
        self.positions_snapshot()
    }

    fn book_snapshots(&self) -> HashMap<String, BookSnapshot> {
        self.books
            .iter()
            .map(|((_, symbol), book)| {
                (
                    symbol.clone(),
                    BookSnapshot {
                        best_bid: book.best_bid(),
                        best_ask: book.best_ask(),
                        mid_price: book.mid_price(),
                    },
                )
            })
            .collect()
    }

    fn active_orders(&self) -> Vec<Order> {
        self.matchers.values().flat_map(|m| m.open_orders().cloned()).collect()
    }

    fn positions_snapshot(&self) -> Vec<perpsim_types::Position> {
        self.account.positions().cloned().collect()
    }

    /// Last mark price observed for `(exchange, symbol)`, if any.
    pub fn mark_price(&self, exchange: &str, symbol: &str) -> Option<Decimal> {
        self.mark_prices.get(&(exchange.to_string(), symbol.to_string())).copied()
    }

    fn record_equity_point(&mut self, timestamp: i64) {
        let account = self.account.account();
        if account.equity > self.peak_equity {
            self.peak_equity = account.equity;
        }
        let drawdown = if self.peak_equity > Decimal::ZERO {
            ((self.peak_equity - account.equity) / self.peak_equity).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        let cumulative_return = if self.config.initial_balance > Decimal::ZERO {
            (account.equity - self.config.initial_balance) / self.config.initial_balance
        } else {
            Decimal::ZERO
        };
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity: account.equity,
            balance: account.balance,
            unrealized_pnl: account.total_unrealized_pnl,
            used_margin: account.used_margin,
            drawdown,
            cumulative_return,
        });
    }

    /// Runs the admission pipeline for one strategy-originated order
    /// request, records ownership for later fill notifications, applies any
    /// immediate fills to the account, and re-queues an `OrderFilled` event
    /// per fill at `now` (the causality rule, §4.E) instead of notifying
    /// the strategy inline — so a strategy always learns about its own
    /// fills through the same event-dispatch path as everything else.
    fn place_order(&mut self, owner: usize, intent: perpsim_strategy::OrderIntent, now: i64) {
        let key = (self.config_exchange_for(&intent.symbol), intent.symbol.clone());
        let Some(matcher) = self.matchers.get_mut(&key) else {
            return;
        };
        let Some(book) = self.books.get(&key) else {
            return;
        };
        let position_qty_signed = self.account.position(&key.0, &key.1).map(|p| p.signed_qty()).unwrap_or(Decimal::ZERO);
        let leverage = self
            .account
            .position(&key.0, &key.1)
            .map(|p| p.leverage)
            .unwrap_or(self.config.default_leverage);
        let within_leverage = leverage <= self.config.max_leverage;

        let margin = AccountMarginAdapter { account: &self.account, exchange: &key.0, symbol: &key.1 };
        let req = NewOrderRequest {
            client_id: intent.client_id,
            exchange: key.0.clone(),
            symbol: key.1.clone(),
            side: intent.side,
            order_type: intent.order_type,
            price: intent.price,
            qty: intent.qty,
            reduce_only: intent.reduce_only,
            post_only: intent.post_only,
            time_in_force: intent.time_in_force,
        };
        let outcome = matcher.submit_order(req, now, position_qty_signed, book, &self.config.slippage_model, &margin, within_leverage);
        self.order_owner.insert(outcome.order.id, owner);
        if outcome.order.status == OrderStatus::Rejected {
            self.rejected_orders.push(outcome.order.clone());
        }

        for fill in outcome.fills {
            let application = self.account.apply_fill(
                &key.0,
                &key.1,
                intent.side,
                fill.price,
                fill.qty,
                fill.fee,
                leverage,
                fill.is_maker,
                now,
            );
            if let Some(trade) = application.closed_trade {
                self.closed_trades.push(trade);
            }
            let event = Event::new(
                now,
                key.0.clone(),
                key.1.clone(),
                EventKind::OrderFilled {
                    order_id: fill.order_id,
                    fill_price: fill.price,
                    fill_qty: fill.qty,
                    fee: fill.fee,
                    is_maker: fill.is_maker,
                },
            );
            self.queue.push(event);
        }
    }

    fn config_exchange_for(&self, symbol: &str) -> String {
        self.config
            .symbols
            .iter()
            .find(|(_, s)| s == symbol)
            .map(|(e, _)| e.clone())
            .unwrap_or_default()
    }

    /// Applies every `OrderAction` a strategy hook returned.
    fn apply_actions(&mut self, owner: usize, actions: Vec<Action>, now: i64) {
        for action in actions {
            for order_action in action.orders {
                match order_action {
                    OrderAction::Place(intent) => self.place_order(owner, intent, now),
                    OrderAction::Cancel(order_id) => {
                        for matcher in self.matchers.values_mut() {
                            if matcher.order(order_id).is_some() {
                                let _ = matcher.cancel_order(order_id, now);
                                break;
                            }
                        }
                    }
                    OrderAction::Modify { order_id, new_price, new_qty } => {
                        let key = self.matchers.iter().find_map(|(k, m)| m.order(order_id).map(|_| k.clone()));
                        let Some(key) = key else { continue };
                        let position_qty_signed = self.account.position(&key.0, &key.1).map(|p| p.signed_qty()).unwrap_or(Decimal::ZERO);
                        let leverage = self.account.position(&key.0, &key.1).map(|p| p.leverage).unwrap_or(self.config.default_leverage);
                        let margin = AccountMarginAdapter { account: &self.account, exchange: &key.0, symbol: &key.1 };
                        let (book, matcher) = (self.books.get(&key), self.matchers.get_mut(&key));
                        if let (Some(book), Some(matcher)) = (book, matcher) {
                            if let Ok(outcome) =
                                matcher.modify_order(order_id, new_price, new_qty, now, position_qty_signed, book, &self.config.slippage_model, &margin)
                            {
                                self.order_owner.insert(outcome.order.id, owner);
                                for fill in outcome.fills {
                                    let application = self
                                        .account
                                        .apply_fill(&key.0, &key.1, outcome.order.side, fill.price, fill.qty, fill.fee, leverage, fill.is_maker, now);
                                    if let Some(trade) = application.closed_trade {
                                        self.closed_trades.push(trade);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Processes one event (§4.E). Returns the strategy actions generated
    /// by dispatching it, so the caller can apply them uniformly.
    fn process_event(&mut self, event: Event) -> Result<(), BacktestError> {
        let key = (event.exchange.clone(), event.symbol.clone());
        let now = event.timestamp;

        match event.kind {
            EventKind::Trade { price, qty, taker_side } => {
                if let Some(matcher) = self.matchers.get_mut(&key) {
                    let fills = matcher.match_trade(price, qty, now);
                    for fill in fills {
                        let side = matcher.order(fill.order_id).map(|o| o.side).unwrap_or(taker_side);
                        let leverage = self.account.position(&key.0, &key.1).map(|p| p.leverage).unwrap_or(self.config.default_leverage);
                        let application = self.account.apply_fill(&key.0, &key.1, side, fill.price, fill.qty, fill.fee, leverage, true, now);
                        if let Some(trade) = application.closed_trade {
                            self.closed_trades.push(trade);
                        }
                        self.queue.push(Event::new(
                            now,
                            key.0.clone(),
                            key.1.clone(),
                            EventKind::OrderFilled {
                                order_id: fill.order_id,
                                fill_price: fill.price,
                                fill_qty: fill.qty,
                                fee: fill.fee,
                                is_maker: true,
                            },
                        ));
                    }
                }

                // §4.D: a Trade print updates the mark the same as an
                // explicit MarkPrice event, so unrealized PnL and the
                // liquidation check stay current between MarkPrice ticks.
                self.account.update_mark_price(&key.0, &key.1, price, now);
                if self.config.liquidation_enabled && self.account.should_liquidate(&key.0, &key.1, price) {
                    if let Some(outcome) = self.account.force_liquidate(&key.0, &key.1, price, now) {
                        self.liquidation_count += 1;
                        self.closed_trades.push(outcome.closed_trade.clone());
                        self.queue.push(Event::new(
                            now,
                            key.0.clone(),
                            key.1.clone(),
                            EventKind::Liquidation {
                                symbol: outcome.symbol.clone(),
                                side: outcome.side,
                                qty: outcome.qty,
                                price: outcome.price,
                                loss: outcome.loss,
                            },
                        ));
                    }
                }

                let books = self.book_snapshots();
                let orders = self.active_orders();
                let positions = self.positions_snapshot();
                let account = self.account.account().clone();
                for index in 0..self.strategy_host.strategy_count() {
                    let ctx = Context::new(now, &account, &positions, &orders, &books, "strategy");
                    let actions = self
                        .strategy_host
                        .dispatch_to(index, &ctx, |s, c| s.on_trade(c, &key.1, price, qty, taker_side))
                        .map_err(BacktestError::StrategyFault)?;
                    self.apply_actions(index, vec![actions], now);
                }
                self.record_equity_point(now);
            }
            EventKind::Depth { bids, asks, is_snapshot } => {
                if let Some(book) = self.books.get_mut(&key) {
                    if let Err(err) = book.update(&bids, &asks, is_snapshot, now) {
                        tracing::warn!(exchange = %key.0, symbol = %key.1, %err, "dropping corrupt depth update");
                    }
                }

                // §4.C / §9 open question (i): a snapshot that crosses one
                // of our own resting limits fills it at its own limit price,
                // the same as a Trade print would, rather than waiting for
                // an unrelated trade to walk through it.
                if let (Some(book), Some(matcher)) = (self.books.get(&key), self.matchers.get_mut(&key)) {
                    let best_bid = book.best_bid();
                    let best_ask = book.best_ask();
                    let fills = matcher.match_depth(best_bid, best_ask, now);
                    for fill in fills {
                        let side = matcher.order(fill.order_id).map(|o| o.side).unwrap_or(Side::Buy);
                        let leverage = self.account.position(&key.0, &key.1).map(|p| p.leverage).unwrap_or(self.config.default_leverage);
                        let application = self.account.apply_fill(&key.0, &key.1, side, fill.price, fill.qty, fill.fee, leverage, true, now);
                        if let Some(trade) = application.closed_trade {
                            self.closed_trades.push(trade);
                        }
                        self.queue.push(Event::new(
                            now,
                            key.0.clone(),
                            key.1.clone(),
                            EventKind::OrderFilled {
                                order_id: fill.order_id,
                                fill_price: fill.price,
                                fill_qty: fill.qty,
                                fee: fill.fee,
                                is_maker: true,
                            },
                        ));
                    }
                }

                let books = self.book_snapshots();
                let orders = self.active_orders();
                let positions = self.positions_snapshot();
                let account = self.account.account().clone();
                for index in 0..self.strategy_host.strategy_count() {
                    let ctx = Context::new(now, &account, &positions, &orders, &books, "strategy");
                    let action = self
                        .strategy_host
                        .dispatch_to(index, &ctx, |s, c| s.on_depth(c, &key.1))
                        .map_err(BacktestError::StrategyFault)?;
                    self.apply_actions(index, vec![action], now);
                }
            }
            EventKind::Funding { funding_rate, mark_price } => {
                if self.config.funding_enabled {
                    self.account.settle_funding(&key.0, &key.1, funding_rate, mark_price, now);
                }
                let books = self.book_snapshots();
                let orders = self.active_orders();
                let positions = self.positions_snapshot();
                let account = self.account.account().clone();
                for index in 0..self.strategy_host.strategy_count() {
                    let ctx = Context::new(now, &account, &positions, &orders, &books, "strategy");
                    let action = self
                        .strategy_host
                        .dispatch_to(index, &ctx, |s, c| s.on_funding(c, &key.1, funding_rate, mark_price))
                        .map_err(BacktestError::StrategyFault)?;
                    self.apply_actions(index, vec![action], now);
                }
                self.record_equity_point(now);
            }
            EventKind::MarkPrice { mark_price } => {
                self.mark_prices.insert(key.clone(), mark_price);
                self.account.update_mark_price(&key.0, &key.1, mark_price, now);

                if self.config.liquidation_enabled && self.account.should_liquidate(&key.0, &key.1, mark_price) {
                    if let Some(outcome) = self.account.force_liquidate(&key.0, &key.1, mark_price, now) {
                        self.liquidation_count += 1;
                        self.closed_trades.push(outcome.closed_trade.clone());
                        self.queue.push(Event::new(
                            now,
                            key.0.clone(),
                            key.1.clone(),
                            EventKind::Liquidation {
                                symbol: outcome.symbol.clone(),
                                side: outcome.side,
                                qty: outcome.qty,
                                price: outcome.price,
                                loss: outcome.loss,
                            },
                        ));
                    }
                }

                let books = self.book_snapshots();
                let orders = self.active_orders();
                let positions = self.positions_snapshot();
                let account = self.account.account().clone();
                for index in 0..self.strategy_host.strategy_count() {
                    let ctx = Context::new(now, &account, &positions, &orders, &books, "strategy");
                    let action = self
                        .strategy_host
                        .dispatch_to(index, &ctx, |s, c| s.on_mark_price(c, &key.1, mark_price))
                        .map_err(BacktestError::StrategyFault)?;
                    self.apply_actions(index, vec![action], now);
                }
                self.record_equity_point(now);
            }
            EventKind::OrderFilled { order_id, fill_price, fill_qty, fee, is_maker } => {
                // A fill has already been applied to the account by whichever
                // call site produced this event (§4.E step 4); record the
                // resulting equity immediately (§3 EquityPoint invariant
                // (iii)) before notifying the owning strategy.
                self.record_equity_point(now);
                if let Some(&owner) = self.order_owner.get(&order_id) {
                    let books = self.book_snapshots();
                    let orders = self.active_orders();
                    let positions = self.positions_snapshot();
                    let account = self.account.account().clone();
                    let ctx = Context::new(now, &account, &positions, &orders, &books, "strategy");
                    let fill_info = OrderFillInfo { order_id, price: fill_price, qty: fill_qty, fee, is_maker };
                    let action = self
                        .strategy_host
                        .dispatch_to(owner, &ctx, |s, c| s.on_order_filled(c, &fill_info))
                        .map_err(BacktestError::StrategyFault)?;
                    self.apply_actions(owner, vec![action], now);
                }
            }
            EventKind::Liquidation { symbol, side, qty, price, loss } => {
                let books = self.book_snapshots();
                let orders = self.active_orders();
                let positions = self.positions_snapshot();
                let account = self.account.account().clone();
                let info = LiquidationInfo { symbol: symbol.clone(), side, qty, price, loss };
                for index in 0..self.strategy_host.strategy_count() {
                    let ctx = Context::new(now, &account, &positions, &orders, &books, "strategy");
                    let action = self
                        .strategy_host
                        .dispatch_to(index, &ctx, |s, c| s.on_liquidation(c, &info))
                        .map_err(BacktestError::StrategyFault)?;
                    self.apply_actions(index, vec![action], now);
                }
                self.record_equity_point(now);
            }
        }

        self.events_processed += 1;
        self.current_time = now;
        Ok(())
    }

    /// Runs the backtest to completion: loads every event from `source`,
    /// initializes the strategy host, then processes events in strict
    /// queue order until the queue is empty, `end_time` is passed, or
    /// `stop_token()` is tripped. `on_progress`, if supplied, is called every
    /// `EngineConfig::progress_interval` events.
    pub fn run(&mut self, source: &mut dyn DataSource, mut on_progress: Option<&mut dyn FnMut(ProgressReport)>) -> Result<BacktestResult, BacktestError> {
        let started_at = Instant::now();
        let events = source.load().map_err(BacktestError::DataSource)?;
        for event in events {
            if event.timestamp < self.config.start_time || event.timestamp > self.config.end_time {
                tracing::warn!(timestamp = event.timestamp, "dropping event outside configured run window");
                continue;
            }
            if !self.config.symbols.iter().any(|(e, s)| *e == event.exchange && *s == event.symbol) {
                tracing::warn!(exchange = %event.exchange, symbol = %event.symbol, "dropping event for unconfigured symbol");
                continue;
            }
            self.queue.push(event);
        }
        let total_events = self.queue.size() as u64;

        {
            let books = self.book_snapshots();
            let orders = self.active_orders();
            let positions = self.positions_snapshot();
            let account = self.account.account().clone();
            let ctx = Context::new(self.config.start_time, &account, &positions, &orders, &books, "strategy");
            self.strategy_host.initialize_all(&ctx).map_err(BacktestError::StrategyFault)?;
        }

        self.record_equity_point(self.config.start_time);

        while let Some(event) = self.queue.pop() {
            if event.timestamp > self.config.end_time {
                break;
            }
            self.process_event(event)?;

            let interval = self.config.progress_interval.max(1);
            if let Some(cb) = on_progress.as_deref_mut() {
                if self.events_processed % interval == 0 {
                    let elapsed = started_at.elapsed();
                    let events_per_second = if elapsed.as_secs_f64() > 0.0 {
                        self.events_processed as f64 / elapsed.as_secs_f64()
                    } else {
                        0.0
                    };
                    let remaining = total_events.saturating_sub(self.events_processed);
                    let percent = if total_events > 0 {
                        Some(self.events_processed as f64 / total_events as f64 * 100.0)
                    } else {
                        None
                    };
                    let eta = if events_per_second > 0.0 {
                        Some(std::time::Duration::from_secs_f64(remaining as f64 / events_per_second))
                    } else {
                        None
                    };
                    cb(ProgressReport {
                        current_time: self.current_time,
                        events_processed: self.events_processed,
                        remaining: Some(remaining),
                        percent,
                        events_per_second,
                        equity: self.account.account().equity,
                        eta,
                    });
                }
            }

            if self.stop_flag.is_stopped() {
                self.halted = true;
                self.halt_reason = Some("stop requested via StopToken".to_string());
            }
            if self.halted {
                break;
            }
        }

        {
            let books = self.book_snapshots();
            let orders = self.active_orders();
            let positions = self.positions_snapshot();
            let account = self.account.account().clone();
            let ctx = Context::new(self.config.end_time, &account, &positions, &orders, &books, "strategy");
            self.strategy_host.cleanup_all(&ctx).map_err(BacktestError::StrategyFault)?;
        }

        let elapsed = started_at.elapsed();
        let mut stats = compute_stats(&self.equity_curve, &self.closed_trades, self.config.initial_balance, self.liquidation_count);
        stats.total_funding = rust_decimal::prelude::ToPrimitive::to_f64(&self.account.account().total_funding).unwrap_or(0.0);
        stats.events_processed = self.events_processed;
        stats.processing_time_ms = elapsed.as_secs_f64() * 1000.0;
        stats.events_per_second = if elapsed.as_secs_f64() > 0.0 {
            self.events_processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Ok(BacktestResult {
            config: self.config.clone(),
            final_account: self.account.account().clone(),
            final_positions: self.positions_snapshot(),
            equity_curve: self.equity_curve.clone(),
            closed_trades: self.closed_trades.clone(),
            stats,
            events_processed: self.events_processed,
            halted: self.halted,
            halt_reason: self.halt_reason.clone(),
        })
    }
}
