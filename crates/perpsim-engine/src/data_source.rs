//! The `DataSource` contract (§6.1): the external-collaborator boundary
//! between historical-data ingestion (out of scope for this core, per §1)
//! and the backtest driver. Ingestion itself — reading columnar files,
//! talking to a vendor API — lives outside this workspace; what the core
//! needs is *a* concrete, trivially-constructible implementation to be
//! testable end to end, the same role `mqk-backtest::loader`'s CSV reader
//! plays even though ingestion there is also conceptually pluggable.

use perpsim_types::Event;

/// Supplies the complete set of events a backtest run will process. The
/// engine doesn't care about source ordering — every event is pushed
/// through `perpsim-queue`, which is what actually establishes the
/// canonical `(timestamp, sequence)` order — so a `DataSource` is free to
/// hand events back in whatever order is convenient for it to produce.
pub trait DataSource {
    /// Returns every event this source has to offer. Called exactly once,
    /// at the start of a run, before the strategy host is initialized.
    fn load(&mut self) -> Result<Vec<Event>, anyhow::Error>;
}

/// An in-memory `DataSource` backed by a `Vec<Event>`, for tests and for
/// callers who have already materialized their market-data events in
/// memory and just want to hand them to the engine directly.
#[derive(Debug, Default)]
pub struct VecDataSource {
    events: Vec<Event>,
}

impl VecDataSource {
    pub fn new(events: Vec<Event>) -> Self {
        VecDataSource { events }
    }
}

impl DataSource for VecDataSource {
    fn load(&mut self) -> Result<Vec<Event>, anyhow::Error> {
        Ok(std::mem::take(&mut self.events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsim_types::EventKind;
    use rust_decimal::Decimal;

    #[test]
    fn vec_data_source_yields_its_events_once() {
        let event = Event::new(
            1,
            "binance",
            "BTC-PERP",
            EventKind::MarkPrice { mark_price: Decimal::new(100, 0) },
        );
        let mut source = VecDataSource::new(vec![event]);
        assert_eq!(source.load().unwrap().len(), 1);
        assert_eq!(source.load().unwrap().len(), 0);
    }
}
