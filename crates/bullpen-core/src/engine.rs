// Recompute operations over a store, serialized per entity.
//
// Lock order is team -> stint. A stint recompute only ever takes its own
// stint lock and a player's eligibility takes only the player lock, so no
// cycle can form. Every recompute reads raw records while holding its lock,
// so when two callers race on one entity the one that writes last has also
// read last.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::eligibility::EligibilityClassifier;
use crate::error::EngineError;
use crate::model::{previous_season, EligibilitySet, PlayerId, StintId, TeamId};
use crate::rollup::RosterRollup;
use crate::stats::StatMap;
use crate::store::{LeagueStore, RecordStore};
use crate::window::WindowAggregator;

/// Source of "today" for open-ended stints and the default season.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| Utc::now().date_naive())
}

// ---------------------------------------------------------------------------
// Per-entity locks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityKey {
    Stint(StintId),
    Team(TeamId),
    Player(PlayerId),
}

/// Lazily created mutex per entity. Entries are never removed; the map is
/// bounded by the number of entities in the league.
#[derive(Default)]
struct EntityLocks {
    locks: Mutex<HashMap<EntityKey, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    fn handle(&self, key: EntityKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }
}

/// The guarded data is `()`, so a poisoned lock carries no broken state.
fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of an eligibility recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EligibilityUpdate {
    /// The stored set was replaced by this one.
    Replaced { season: i32, positions: EligibilitySet },
    /// The player had no games in `season`; the stored set was kept.
    Unchanged { season: i32 },
}

/// Counts from a full refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub teams_updated: usize,
    pub teams_failed: usize,
    /// Bench and injured-list stints, recomputed outside the team rollup.
    pub inactive_stints_updated: usize,
    pub inactive_stints_failed: usize,
    pub players_updated: usize,
    pub players_unchanged: usize,
    pub players_failed: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<S> {
    store: S,
    config: EngineConfig,
    clock: Clock,
    locks: EntityLocks,
}

impl<S: RecordStore + LeagueStore> Engine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            clock: system_clock(),
            locks: EntityLocks::default(),
        }
    }

    /// Replace the clock, e.g. with a fixed date in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Recompute and store one stint's stats over its window.
    pub fn recompute_stint(&self, id: StintId) -> Result<StatMap, EngineError> {
        let handle = self.locks.handle(EntityKey::Stint(id));
        let _guard = acquire(&handle);

        let stint = self.store.stint(id)?;
        let stats = WindowAggregator::new(&self.store, &self.config.counting_keys)
            .compute(&stint.player, stint.window(self.today()))?;
        self.store.save_stint_stats(id, &stats)?;

        info!(stint = id, player = %stint.player, "recomputed stint stats");
        Ok(stats)
    }

    /// Recompute every active stint of a team, then the team total, and
    /// store them together.
    pub fn recompute_team(&self, id: TeamId) -> Result<StatMap, EngineError> {
        let handle = self.locks.handle(EntityKey::Team(id));
        let _team_guard = acquire(&handle);

        let mut stints = self.store.team_stints(id)?;
        stints.sort_by_key(|s| s.id);

        let stint_handles: Vec<Arc<Mutex<()>>> = stints
            .iter()
            .map(|s| self.locks.handle(EntityKey::Stint(s.id)))
            .collect();
        let _stint_guards: Vec<MutexGuard<'_, ()>> =
            stint_handles.iter().map(|h| acquire(h)).collect();

        let rollup = RosterRollup::new(&self.store, &self.config).compute(&stints, self.today())?;
        self.store
            .save_team_rollup(id, &rollup.stints, &rollup.total)?;

        info!(
            team = id,
            stints = rollup.stints.len(),
            skipped = stints.len() - rollup.stints.len(),
            "recomputed team stats"
        );
        Ok(rollup.total)
    }

    /// Recompute a player's eligibility from one season of records. The
    /// season defaults to the calendar year before today.
    pub fn recompute_eligibility(
        &self,
        player: &PlayerId,
        season: Option<i32>,
    ) -> Result<EligibilityUpdate, EngineError> {
        let season = season.unwrap_or_else(|| previous_season(self.today()));

        let handle = self.locks.handle(EntityKey::Player(player.clone()));
        let _guard = acquire(&handle);

        let current = self.store.player(player)?;
        let classifier = EligibilityClassifier::new(&self.store, &self.config.eligibility);
        let Some(positions) = classifier.compute(&current, season)? else {
            info!(player = %player, season, "no games in season; eligibility unchanged");
            return Ok(EligibilityUpdate::Unchanged { season });
        };

        self.store.save_eligibility(player, &positions)?;
        info!(
            player = %player,
            season,
            positions = ?positions.as_slice(),
            "recomputed eligibility"
        );
        Ok(EligibilityUpdate::Replaced { season, positions })
    }

    /// Recompute a team, then each of its inactive stints on its own, since
    /// the team rollup skips them. Failures are logged and counted.
    pub fn refresh_team(&self, id: TeamId) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        if let Err(e) = self.recompute_team(id) {
            warn!(team = id, error = %e, "team recompute failed");
            summary.teams_failed += 1;
            return summary;
        }
        summary.teams_updated += 1;

        let stints = match self.store.team_stints(id) {
            Ok(stints) => stints,
            Err(e) => {
                warn!(team = id, error = %e, "listing inactive stints failed");
                summary.inactive_stints_failed += 1;
                return summary;
            }
        };
        for stint in stints
            .iter()
            .filter(|s| !self.config.is_active_position(&s.position))
        {
            match self.recompute_stint(stint.id) {
                Ok(_) => summary.inactive_stints_updated += 1,
                Err(e) => {
                    warn!(stint = stint.id, error = %e, "inactive stint recompute failed");
                    summary.inactive_stints_failed += 1;
                }
            }
        }
        summary
    }

    /// Recompute one player's eligibility for the default season. Failures
    /// are logged and counted.
    pub fn refresh_player(&self, player: &PlayerId) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        match self.recompute_eligibility(player, None) {
            Ok(EligibilityUpdate::Replaced { .. }) => summary.players_updated += 1,
            Ok(EligibilityUpdate::Unchanged { .. }) => summary.players_unchanged += 1,
            Err(e) => {
                warn!(player = %player, error = %e, "eligibility recompute failed");
                summary.players_failed += 1;
            }
        }
        summary
    }

    /// Refresh every team, then every player's eligibility for the default
    /// season. Only failing to list teams or players aborts the pass.
    pub fn refresh_all(&self) -> Result<RefreshSummary, EngineError> {
        let mut summary = RefreshSummary::default();
        for team in self.store.team_ids()? {
            summary.absorb(&self.refresh_team(team));
        }
        for player in self.store.player_ids()? {
            summary.absorb(&self.refresh_player(&player));
        }

        info!(?summary, "refresh complete");
        Ok(summary)
    }
}

impl RefreshSummary {
    /// Fold another summary's counts into this one.
    pub fn absorb(&mut self, other: &RefreshSummary) {
        self.teams_updated += other.teams_updated;
        self.teams_failed += other.teams_failed;
        self.inactive_stints_updated += other.inactive_stints_updated;
        self.inactive_stints_failed += other.inactive_stints_failed;
        self.players_updated += other.players_updated;
        self.players_unchanged += other.players_unchanged;
        self.players_failed += other.players_failed;
    }
}
