// In-memory store, used by tests and by callers that already hold a snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::model::{
    DateRange, EligibilitySet, FantasyTeam, GameId, Player, PlayerId, RawGameRecord, Role,
    RosterStint, StintId, TeamId,
};
use crate::stats::StatMap;

use super::{LeagueStore, RecordStore};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<(GameId, PlayerId, Role), RawGameRecord>,
    players: BTreeMap<PlayerId, Player>,
    teams: BTreeMap<TeamId, FantasyTeam>,
    stints: BTreeMap<StintId, RosterStint>,
}

/// A store backed by ordered maps behind one `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if the lock is poisoned (a writer panicked mid-update).
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("memory store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("memory store lock poisoned")
    }

    /// Insert a record, replacing any earlier one for the same
    /// `(game, player, role)`.
    pub fn upsert_record(&self, record: RawGameRecord) {
        let key = (record.game.clone(), record.player.clone(), record.role);
        self.write().records.insert(key, record);
    }

    pub fn upsert_player(&self, player: Player) {
        self.write().players.insert(player.id.clone(), player);
    }

    pub fn upsert_team(&self, team: FantasyTeam) {
        self.write().teams.insert(team.id, team);
    }

    pub fn upsert_stint(&self, stint: RosterStint) {
        self.write().stints.insert(stint.id, stint);
    }

    pub fn record_count(&self) -> usize {
        self.read().records.len()
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl RecordStore for MemoryStore {
    fn find(
        &self,
        player: &PlayerId,
        role: Option<Role>,
        range: Option<DateRange>,
    ) -> Result<Vec<RawGameRecord>, StoreError> {
        let inner = self.read();
        let mut records: Vec<RawGameRecord> = inner
            .records
            .values()
            .filter(|r| &r.player == player)
            .filter(|r| role.map_or(true, |role| r.role == role))
            .filter(|r| range.map_or(true, |range| range.contains(r.game_date)))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.game_date.cmp(&b.game_date).then_with(|| a.game.cmp(&b.game)));
        Ok(records)
    }

    fn find_distinct_games(
        &self,
        player: &PlayerId,
        range: DateRange,
    ) -> Result<BTreeSet<GameId>, StoreError> {
        let inner = self.read();
        Ok(inner
            .records
            .values()
            .filter(|r| &r.player == player && range.contains(r.game_date))
            .map(|r| r.game.clone())
            .collect())
    }
}

impl LeagueStore for MemoryStore {
    fn player(&self, id: &PlayerId) -> Result<Player, StoreError> {
        self.read()
            .players
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("player", id))
    }

    fn player_ids(&self) -> Result<Vec<PlayerId>, StoreError> {
        Ok(self.read().players.keys().cloned().collect())
    }

    fn team(&self, id: TeamId) -> Result<FantasyTeam, StoreError> {
        self.read()
            .teams
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("team", id))
    }

    fn team_ids(&self) -> Result<Vec<TeamId>, StoreError> {
        Ok(self.read().teams.keys().copied().collect())
    }

    fn stint(&self, id: StintId) -> Result<RosterStint, StoreError> {
        self.read()
            .stints
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("stint", id))
    }

    fn team_stints(&self, team: TeamId) -> Result<Vec<RosterStint>, StoreError> {
        let inner = self.read();
        if !inner.teams.contains_key(&team) {
            return Err(not_found("team", team));
        }
        Ok(inner
            .stints
            .values()
            .filter(|s| s.team == team)
            .cloned()
            .collect())
    }

    fn save_stint_stats(&self, id: StintId, stats: &StatMap) -> Result<(), StoreError> {
        let mut inner = self.write();
        let stint = inner.stints.get_mut(&id).ok_or_else(|| not_found("stint", id))?;
        stint.stats = stats.clone();
        Ok(())
    }

    fn save_team_rollup(
        &self,
        team: TeamId,
        stint_stats: &[(StintId, StatMap)],
        total: &StatMap,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        // Validate everything before touching anything.
        if !inner.teams.contains_key(&team) {
            return Err(not_found("team", team));
        }
        if let Some((missing, _)) = stint_stats.iter().find(|(id, _)| !inner.stints.contains_key(id)) {
            return Err(not_found("stint", missing));
        }

        for (id, stats) in stint_stats {
            if let Some(stint) = inner.stints.get_mut(id) {
                stint.stats = stats.clone();
            }
        }
        if let Some(t) = inner.teams.get_mut(&team) {
            t.total_stats = total.clone();
        }
        Ok(())
    }

    fn save_eligibility(&self, player: &PlayerId, set: &EligibilitySet) -> Result<(), StoreError> {
        let mut inner = self.write();
        let p = inner
            .players
            .get_mut(player)
            .ok_or_else(|| not_found("player", player))?;
        p.eligible_positions = set.clone();
        Ok(())
    }
}
