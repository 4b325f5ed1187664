// Window aggregation: one player's stats over one half-open date range.

use tracing::debug;

use crate::error::StoreError;
use crate::model::{DateRange, PlayerId, RawGameRecord};
use crate::stats::{CountingKeySet, StatMap};
use crate::store::RecordStore;

/// Sum the counting stats of every record dated inside `window`, then derive
/// rates.
///
/// Records outside the window are skipped, so the result does not depend on
/// how carefully the caller filtered. Only keys in `keys` are summed; fielded
/// rates on the records are never read. The output holds every counting key
/// seen at least once plus all rate keys. With no matching records it holds
/// no counting keys and every rate at zero.
pub fn aggregate_window(
    records: &[RawGameRecord],
    window: &DateRange,
    keys: &CountingKeySet,
) -> StatMap {
    let mut totals = StatMap::default();
    for record in records.iter().filter(|r| window.contains(r.game_date)) {
        totals.merge_line(&record.stats, keys);
    }
    totals.derive_rates();
    totals
}

/// Store-backed aggregation for a single player.
pub struct WindowAggregator<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    keys: &'a CountingKeySet,
}

impl<'a, S: RecordStore + ?Sized> WindowAggregator<'a, S> {
    pub fn new(store: &'a S, keys: &'a CountingKeySet) -> Self {
        Self { store, keys }
    }

    /// Aggregate `player` over `window`; for a stint that is
    /// `RosterStint::window`.
    ///
    /// A store failure is returned as is: no partial totals are produced.
    pub fn compute(&self, player: &PlayerId, window: DateRange) -> Result<StatMap, StoreError> {
        if window.is_empty() {
            debug!(player = %player, start = %window.start, end = %window.end, "empty window");
            return Ok(StatMap::empty());
        }

        let records = self.store.find(player, None, Some(window))?;
        debug!(
            player = %player,
            start = %window.start,
            end = %window.end,
            records = records.len(),
            "aggregating window"
        );
        Ok(aggregate_window(&records, &window, self.keys))
    }
}
