//! Derived run statistics (§6.4). This is the one place in the workspace
//! binary floats are allowed: ratios like Sharpe and win rate are reporting
//! artifacts, not inputs to further money math, so the precision loss
//! `f64` introduces here never feeds back into the simulation.

use perpsim_types::{ClosedTrade, EquityPoint};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Minutes per year, used to annualize volatility/Sharpe/Sortino/the
/// annualized-return figure. The data feeding this engine isn't
/// guaranteed to be sampled once a minute, but annualizing off a fixed
/// constant regardless of actual cadence keeps comparisons across runs
/// apples-to-apples. `observed_sample_period_minutes` below records the
/// *actual* average spacing of equity points so a caller who cares can
/// sanity-check how far that assumption is from reality.
const MINUTES_PER_YEAR: f64 = 525_600.0;

/// Summary statistics computed once a run finishes (§6.4).
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct BacktestStats {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Sum of winning trade PnL divided by the absolute sum of losing trade
    /// PnL. `f64::INFINITY` if there were no losses and at least one win.
    pub profit_factor: f64,
    pub total_return_pct: f64,
    /// Annualized return, compounded from the per-equity-point return
    /// series over `MINUTES_PER_YEAR` / `observed_sample_period_minutes`
    /// periods. Zero if there are fewer than two equity points.
    pub annualized_return_pct: f64,
    pub max_drawdown_pct: f64,
    /// Wall-clock span (in the simulation's own timestamp units) between
    /// the peak preceding the worst drawdown and the point the drawdown
    /// reached its maximum. Zero if the run never drew down.
    pub max_drawdown_duration: i64,
    /// Annualized standard deviation of per-equity-point returns.
    pub volatility_pct: f64,
    pub sharpe_ratio: f64,
    /// Like `sharpe_ratio`, but the denominator only considers periods with
    /// a negative return. `f64::INFINITY` if there were returns but none
    /// negative; zero if there are fewer than two equity points.
    pub sortino_ratio: f64,
    /// `annualized_return_pct / max_drawdown_pct`. `f64::INFINITY` if the
    /// run never drew down.
    pub calmar_ratio: f64,
    pub avg_holding_period_ms: f64,
    pub max_consecutive_wins: u64,
    pub max_consecutive_losses: u64,
    pub total_fees: f64,
    pub total_funding: f64,
    pub liquidation_count: u64,
    pub events_processed: u64,
    pub processing_time_ms: f64,
    pub events_per_second: f64,
    /// The actual average time between recorded equity points, in minutes,
    /// for comparison against the fixed `MINUTES_PER_YEAR`-based
    /// annualization this engine uses (§9 open question ii).
    pub observed_sample_period_minutes: f64,
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Population standard deviation — we have the whole series, not a sample.
fn population_stdev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// Computes [`BacktestStats`] from a run's equity curve and closed-trade
/// log. `liquidation_count` is passed in rather than derived, since a
/// liquidation is recorded as a `ClosedTrade` like any other close and
/// there is nothing in that record distinguishing it from a voluntary one.
/// `events_processed`/`processing_time_ms`/`events_per_second` are not
/// known here and are left at zero — the driver patches them in after this
/// returns, the same way it already patches in `total_funding`.
pub fn compute_stats(
    equity_curve: &[EquityPoint],
    closed_trades: &[ClosedTrade],
    initial_balance: Decimal,
    liquidation_count: u64,
) -> BacktestStats {
    let mut winning_trades = 0u64;
    let mut losing_trades = 0u64;
    let mut gross_win = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;
    let mut total_holding_ms = 0i64;

    let mut max_consecutive_wins = 0u64;
    let mut max_consecutive_losses = 0u64;
    let mut current_win_streak = 0u64;
    let mut current_loss_streak = 0u64;

    for trade in closed_trades {
        total_fees += trade.fees;
        total_holding_ms += trade.holding_period_ms;
        if trade.net_pnl > Decimal::ZERO {
            winning_trades += 1;
            gross_win += trade.net_pnl;
            current_win_streak += 1;
            current_loss_streak = 0;
            max_consecutive_wins = max_consecutive_wins.max(current_win_streak);
        } else if trade.net_pnl < Decimal::ZERO {
            losing_trades += 1;
            gross_loss += -trade.net_pnl;
            current_loss_streak += 1;
            current_win_streak = 0;
            max_consecutive_losses = max_consecutive_losses.max(current_loss_streak);
        } else {
            current_win_streak = 0;
            current_loss_streak = 0;
        }
    }

    let total_trades = closed_trades.len() as u64;
    let win_rate = if total_trades > 0 { winning_trades as f64 / total_trades as f64 } else { 0.0 };
    let avg_win = if winning_trades > 0 { to_f64(gross_win) / winning_trades as f64 } else { 0.0 };
    let avg_loss = if losing_trades > 0 { to_f64(gross_loss) / losing_trades as f64 } else { 0.0 };
    let avg_holding_period_ms = if total_trades > 0 { total_holding_ms as f64 / total_trades as f64 } else { 0.0 };
    let profit_factor = if gross_loss > Decimal::ZERO {
        to_f64(gross_win) / to_f64(gross_loss)
    } else if gross_win > Decimal::ZERO {
        f64::INFINITY
    } else {
        0.0
    };

    let final_equity = equity_curve.last().map(|p| p.equity).unwrap_or(initial_balance);
    let total_return_pct = if initial_balance > Decimal::ZERO {
        to_f64((final_equity - initial_balance) / initial_balance) * 100.0
    } else {
        0.0
    };

    let max_drawdown_pct = equity_curve
        .iter()
        .map(|p| to_f64(p.drawdown) * 100.0)
        .fold(0.0_f64, f64::max);

    // Period-over-period returns on the equity-point series, plus the
    // average spacing between points (for the cadence we actually observed,
    // as opposed to the fixed per-minute assumption used to annualize).
    let mut returns = Vec::with_capacity(equity_curve.len().saturating_sub(1));
    let mut gap_ms_total: i64 = 0;
    let mut peak = equity_curve.first().map(|p| p.equity).unwrap_or(initial_balance);
    let mut peak_timestamp = equity_curve.first().map(|p| p.timestamp).unwrap_or(0);
    let mut max_drawdown_duration = 0i64;
    let mut worst_drawdown = Decimal::ZERO;

    for window in equity_curve.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        if prev.equity > Decimal::ZERO {
            returns.push(to_f64((curr.equity - prev.equity) / prev.equity));
        }
        gap_ms_total += curr.timestamp - prev.timestamp;
    }
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            peak_timestamp = point.timestamp;
        }
        let drawdown = if peak > Decimal::ZERO { (peak - point.equity) / peak } else { Decimal::ZERO };
        if drawdown > worst_drawdown {
            worst_drawdown = drawdown;
            max_drawdown_duration = point.timestamp - peak_timestamp;
        }
    }

    let periods = returns.len();
    let observed_sample_period_minutes = if periods > 0 {
        (gap_ms_total as f64 / periods as f64) / 60_000.0
    } else {
        0.0
    };

    let annualization_factor = MINUTES_PER_YEAR.sqrt();
    let mean_return = mean(&returns);
    let return_stdev = population_stdev(&returns);
    let volatility_pct = return_stdev * annualization_factor * 100.0;
    let sharpe_ratio = if return_stdev > 0.0 { mean_return / return_stdev * annualization_factor } else { 0.0 };

    let negative_returns: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_stdev = population_stdev(&negative_returns);
    let sortino_ratio = if downside_stdev > 0.0 {
        mean_return / downside_stdev * annualization_factor
    } else if periods > 0 {
        f64::INFINITY
    } else {
        0.0
    };

    let annualized_return_pct = if periods > 0 {
        let periods_per_year = MINUTES_PER_YEAR / observed_sample_period_minutes.max(f64::MIN_POSITIVE);
        let base = 1.0 + mean_return;
        if base > 0.0 {
            (base.powf(periods_per_year) - 1.0) * 100.0
        } else {
            -100.0
        }
    } else {
        0.0
    };

    let calmar_ratio = if max_drawdown_pct > 0.0 {
        annualized_return_pct / max_drawdown_pct
    } else if annualized_return_pct != 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    BacktestStats {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        avg_win,
        avg_loss,
        profit_factor,
        total_return_pct,
        annualized_return_pct,
        max_drawdown_pct,
        max_drawdown_duration,
        volatility_pct,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        avg_holding_period_ms,
        max_consecutive_wins,
        max_consecutive_losses,
        total_fees: to_f64(total_fees),
        total_funding: 0.0,
        liquidation_count,
        events_processed: 0,
        processing_time_ms: 0.0,
        events_per_second: 0.0,
        observed_sample_period_minutes,
    }
}
