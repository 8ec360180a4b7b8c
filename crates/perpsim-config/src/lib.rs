//! perpsim-config
//!
//! Backtest configuration (§6.3) and its fatal-configuration validation
//! (§7). `EngineConfig` is a plain struct populated by the caller — no
//! config-file parsing lives here, the same separation kept elsewhere
//! between a plain config struct and the external YAML/CLI layers that
//! populate one.

use perpsim_book::SlippageModel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A fatal misconfiguration detected before a run starts (§7). Unlike order
/// rejections (which are recoverable, per-order data), these abort the run
/// entirely — there is no sensible backtest to run with, say, a negative
/// initial balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EndBeforeStart { start_time: i64, end_time: i64 },
    NonPositiveInitialBalance(Decimal),
    NonPositiveLeverage(Decimal),
    DefaultLeverageExceedsMax { default_leverage: Decimal, max_leverage: Decimal },
    NegativeFeeBps(Decimal),
    NegativeMaintenanceMarginRate(Decimal),
    NoSymbols,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EndBeforeStart { start_time, end_time } => {
                write!(f, "endTime ({end_time}) must not be before startTime ({start_time})")
            }
            ConfigError::NonPositiveInitialBalance(v) => write!(f, "initialBalance must be positive, got {v}"),
            ConfigError::NonPositiveLeverage(v) => write!(f, "leverage must be positive, got {v}"),
            ConfigError::DefaultLeverageExceedsMax { default_leverage, max_leverage } => {
                write!(f, "defaultLeverage ({default_leverage}) exceeds maxLeverage ({max_leverage})")
            }
            ConfigError::NegativeFeeBps(v) => write!(f, "fee bps must not be negative, got {v}"),
            ConfigError::NegativeMaintenanceMarginRate(v) => write!(f, "maintenanceMarginRate must not be negative, got {v}"),
            ConfigError::NoSymbols => write!(f, "at least one (exchange, symbol) pair must be configured"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Full engine configuration (§6.3). Every field here is read by
/// `perpsim-engine`'s driver loop; nothing here is optional at the type
/// level because a backtest that's missing one of these has no sensible
/// default behavior to fall back to silently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub start_time: i64,
    pub end_time: i64,
    pub initial_balance: Decimal,
    pub default_leverage: Decimal,
    pub max_leverage: Decimal,
    pub maintenance_margin_rate: Decimal,
    /// Fraction of notional charged on forced liquidation (e.g. `0.005` for
    /// 0.5%) — a rate, not a basis-point integer like `maker_fee_bps`/
    /// `taker_fee_bps` below, since liquidation fee schedules are
    /// conventionally quoted that way by the venues this engine models.
    pub liquidation_fee_rate: Decimal,
    pub maker_fee_bps: Decimal,
    pub taker_fee_bps: Decimal,
    #[serde(skip)]
    pub slippage_model: SlippageModel,
    pub funding_enabled: bool,
    pub liquidation_enabled: bool,
    /// Symbols (and their exchange) this run trades. Every event whose
    /// `(exchange, symbol)` isn't in this list is ignored by the driver.
    pub symbols: Vec<(String, String)>,
    /// When true, a strategy hook that returns `Err` disables that
    /// strategy for the rest of the run instead of aborting the whole
    /// backtest (§7 "Strategy fault").
    pub isolate_strategy_faults: bool,
    /// How many events the `EventQueue` is pre-sized to hold (§6.3
    /// `eventBufferSize`) — a capacity hint, not a hard cap; the queue still
    /// grows past it if the run needs more.
    pub event_buffer_size: usize,
    /// How many processed events elapse between `on_progress` callback
    /// invocations during `BacktestEngine::run` (§6.3 `progressInterval`).
    /// `1` reports after every event.
    pub progress_interval: u64,
}

impl EngineConfig {
    /// Permissive defaults for unit/integration tests: no fees, no
    /// slippage, liquidation and funding on (so scenario tests can still
    /// exercise them deliberately), a single BTC-PERP symbol. Mirrors
    /// `BacktestConfig::test_defaults()`'s "fast, deterministic, minimal
    /// friction" posture.
    pub fn test_defaults() -> Self {
        EngineConfig {
            start_time: 0,
            end_time: i64::MAX,
            initial_balance: Decimal::new(10_000, 0),
            default_leverage: Decimal::new(10, 0),
            max_leverage: Decimal::new(50, 0),
            maintenance_margin_rate: Decimal::new(5, 3),
            liquidation_fee_rate: Decimal::ZERO,
            maker_fee_bps: Decimal::ZERO,
            taker_fee_bps: Decimal::ZERO,
            slippage_model: SlippageModel::book_walk_default(),
            funding_enabled: true,
            liquidation_enabled: true,
            symbols: vec![("binance".to_string(), "BTC-PERP".to_string())],
            isolate_strategy_faults: false,
            event_buffer_size: 4096,
            progress_interval: 1,
        }
    }

    /// Fail-closed defaults for anything resembling a production run:
    /// non-zero maker/taker fees and a liquidation fee, strategy-fault
    /// isolation on (one bad strategy shouldn't sink a multi-strategy
    /// run), matching `BacktestConfig::conservative_defaults()`'s stance
    /// that a caller who doesn't override every knob should land on the
    /// side that under-states backtested performance, not over-states it.
    pub fn conservative_defaults() -> Self {
        EngineConfig {
            start_time: 0,
            end_time: i64::MAX,
            initial_balance: Decimal::new(10_000, 0),
            default_leverage: Decimal::new(5, 0),
            max_leverage: Decimal::new(20, 0),
            maintenance_margin_rate: Decimal::new(5, 3),
            liquidation_fee_rate: Decimal::new(5, 3),
            maker_fee_bps: Decimal::new(2, 0),
            taker_fee_bps: Decimal::new(5, 0),
            slippage_model: SlippageModel::book_walk_default(),
            funding_enabled: true,
            liquidation_enabled: true,
            symbols: vec![("binance".to_string(), "BTC-PERP".to_string())],
            isolate_strategy_faults: true,
            event_buffer_size: 16_384,
            progress_interval: 1_000,
        }
    }

    /// Validates every fatal-configuration rule in §7. Returns the first
    /// violation found; callers that want every violation at once should
    /// call this repeatedly after fixing each one, matching how
    /// `mqk-backtest`'s own config validation surfaces one `BacktestError`
    /// at a time rather than accumulating a list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_time < self.start_time {
            return Err(ConfigError::EndBeforeStart { start_time: self.start_time, end_time: self.end_time });
        }
        if self.initial_balance <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveInitialBalance(self.initial_balance));
        }
        if self.default_leverage <= Decimal::ZERO || self.max_leverage <= Decimal::ZERO {
            let bad = if self.default_leverage <= Decimal::ZERO { self.default_leverage } else { self.max_leverage };
            return Err(ConfigError::NonPositiveLeverage(bad));
        }
        if self.default_leverage > self.max_leverage {
            return Err(ConfigError::DefaultLeverageExceedsMax {
                default_leverage: self.default_leverage,
                max_leverage: self.max_leverage,
            });
        }
        if self.maker_fee_bps < Decimal::ZERO {
            return Err(ConfigError::NegativeFeeBps(self.maker_fee_bps));
        }
        if self.taker_fee_bps < Decimal::ZERO {
            return Err(ConfigError::NegativeFeeBps(self.taker_fee_bps));
        }
        if self.liquidation_fee_rate < Decimal::ZERO {
            return Err(ConfigError::NegativeFeeBps(self.liquidation_fee_rate));
        }
        if self.maintenance_margin_rate < Decimal::ZERO {
            return Err(ConfigError::NegativeMaintenanceMarginRate(self.maintenance_margin_rate));
        }
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_validation() {
        assert!(EngineConfig::test_defaults().validate().is_ok());
    }

    #[test]
    fn conservative_defaults_pass_validation() {
        assert!(EngineConfig::conservative_defaults().validate().is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut cfg = EngineConfig::test_defaults();
        cfg.start_time = 100;
        cfg.end_time = 50;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EndBeforeStart { start_time: 100, end_time: 50 })
        );
    }

    #[test]
    fn non_positive_initial_balance_is_rejected() {
        let mut cfg = EngineConfig::test_defaults();
        cfg.initial_balance = Decimal::ZERO;
        assert!(matches!(cfg.validate(), Err(ConfigError::NonPositiveInitialBalance(_))));
    }

    #[test]
    fn default_leverage_above_max_is_rejected() {
        let mut cfg = EngineConfig::test_defaults();
        cfg.default_leverage = Decimal::new(100, 0);
        assert!(matches!(cfg.validate(), Err(ConfigError::DefaultLeverageExceedsMax { .. })));
    }

    #[test]
    fn empty_symbol_list_is_rejected() {
        let mut cfg = EngineConfig::test_defaults();
        cfg.symbols.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoSymbols));
    }
}
