// Team rollups: per-stint window stats merged into one team total.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::model::{RosterStint, StintId};
use crate::stats::{CountingKeySet, StatMap};
use crate::store::RecordStore;
use crate::window::WindowAggregator;

/// Sum the counting totals of several stat maps and derive rates once from
/// the combined totals. Input rates are ignored, never averaged.
pub fn combine<'a>(maps: impl IntoIterator<Item = &'a StatMap>, keys: &CountingKeySet) -> StatMap {
    let mut total = StatMap::default();
    for map in maps {
        total.merge_counting(map, keys);
    }
    total.derive_rates();
    total
}

/// The outcome of one team recompute: fresh stats for every counted stint
/// plus the team total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRollup {
    pub stints: Vec<(StintId, StatMap)>,
    pub total: StatMap,
}

pub struct RosterRollup<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: RecordStore + ?Sized> RosterRollup<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Recompute every active stint in `stints` and the team total.
    ///
    /// Stints in bench or injured-list slots are skipped entirely. The first
    /// store failure aborts the whole rollup.
    pub fn compute(&self, stints: &[RosterStint], today: NaiveDate) -> Result<TeamRollup, StoreError> {
        let aggregator = WindowAggregator::new(self.store, &self.config.counting_keys);

        let mut per_stint = Vec::with_capacity(stints.len());
        for stint in stints {
            if !self.config.is_active_position(&stint.position) {
                debug!(stint = stint.id, position = %stint.position, "skipping inactive stint");
                continue;
            }
            let stats = aggregator.compute(&stint.player, stint.window(today))?;
            per_stint.push((stint.id, stats));
        }

        let total = combine(per_stint.iter().map(|(_, s)| s), &self.config.counting_keys);
        Ok(TeamRollup {
            stints: per_stint,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GameId, PlayerId, RawGameRecord, Role};
    use crate::stats::{CountingKey, RateKey, StatLine};
    use crate::store::MemoryStore;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn stat_map(h: f64, ab: f64) -> StatMap {
        let mut map = StatMap::default();
        map.counting.insert(CountingKey::Hits, h);
        map.counting.insert(CountingKey::AtBats, ab);
        map.derive_rates();
        map
    }

    fn stint(id: StintId, player: &str, position: &str, start: NaiveDate, end: Option<NaiveDate>) -> RosterStint {
        RosterStint {
            id,
            team: 1,
            player: PlayerId::new(player),
            position: position.into(),
            start_date: start,
            end_date: end,
            stats: StatMap::default(),
        }
    }

    fn game(player: &str, game: &str, d: NaiveDate, ab: f64, h: f64) -> RawGameRecord {
        RawGameRecord {
            game: GameId::new(game),
            game_date: d,
            player: PlayerId::new(player),
            role: Role::Batter,
            position_text: "CF".into(),
            stats: StatLine::new()
                .with(CountingKey::AtBats, ab)
                .with(CountingKey::Hits, h),
        }
    }

    #[test]
    fn team_average_comes_from_combined_totals() {
        let a = stat_map(2.0, 8.0);
        let b = stat_map(1.0, 2.0);
        let total = combine([&a, &b], &CountingKeySet::default());

        assert_eq!(total.get(CountingKey::Hits), 3.0);
        assert_eq!(total.get(CountingKey::AtBats), 10.0);
        assert!(approx_eq(total.rate(RateKey::BattingAverage), 0.3, 1e-12));
        // Averaging the per-stint averages would give 0.375.
        let naive = (a.rate(RateKey::BattingAverage) + b.rate(RateKey::BattingAverage)) / 2.0;
        assert!(!approx_eq(total.rate(RateKey::BattingAverage), naive, 1e-6));
    }

    #[test]
    fn combine_of_nothing_is_empty() {
        assert_eq!(combine(Vec::<&StatMap>::new(), &CountingKeySet::default()), StatMap::empty());
    }

    #[test]
    fn rollup_skips_bench_and_injured_stints() {
        let store = MemoryStore::new();
        store.upsert_record(game("a", "g1", date(4, 2), 4.0, 2.0));
        store.upsert_record(game("b", "g1", date(4, 2), 4.0, 4.0));
        store.upsert_record(game("c", "g1", date(4, 2), 4.0, 4.0));

        let stints = vec![
            stint(1, "a", "CF", date(4, 1), None),
            stint(2, "b", "BN", date(4, 1), None),
            stint(3, "c", "IL", date(4, 1), None),
        ];
        let config = EngineConfig::default();
        let rollup = RosterRollup::new(&store, &config)
            .compute(&stints, date(5, 1))
            .unwrap();

        assert_eq!(rollup.stints.len(), 1);
        assert_eq!(rollup.stints[0].0, 1);
        assert_eq!(rollup.total.get(CountingKey::Hits), 2.0);
        assert!(approx_eq(rollup.total.rate(RateKey::BattingAverage), 0.5, 1e-12));
    }

    #[test]
    fn successive_stints_of_one_player_split_by_window() {
        let store = MemoryStore::new();
        store.upsert_record(game("a", "g1", date(4, 10), 4.0, 1.0));
        store.upsert_record(game("a", "g2", date(5, 1), 4.0, 3.0));
        store.upsert_record(game("a", "g3", date(5, 20), 4.0, 0.0));

        // Traded away on May 1, back on May 15.
        let stints = vec![
            stint(1, "a", "CF", date(4, 1), Some(date(5, 1))),
            stint(2, "a", "CF", date(5, 15), None),
        ];
        let config = EngineConfig::default();
        let rollup = RosterRollup::new(&store, &config)
            .compute(&stints, date(6, 1))
            .unwrap();

        assert_eq!(rollup.stints[0].1.get(CountingKey::Hits), 1.0);
        assert_eq!(rollup.stints[1].1.get(CountingKey::Hits), 0.0);
        assert_eq!(rollup.total.get(CountingKey::AtBats), 8.0);
        assert!(approx_eq(rollup.total.rate(RateKey::BattingAverage), 1.0 / 8.0, 1e-12));
    }
}
