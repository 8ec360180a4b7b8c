//! perpsim-engine
//!
//! The backtest driver: wires the event queue, order books, matching
//! engines, account manager, and strategy host together and runs them
//! through a `DataSource`'s events in strict `(timestamp, sequence)` order.

mod data_source;
mod engine;
mod stats;

pub use data_source::{DataSource, VecDataSource};
pub use engine::{BacktestEngine, BacktestError, BacktestResult, ProgressReport};
pub use stats::BacktestStats;
