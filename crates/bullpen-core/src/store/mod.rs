// Storage seams: where raw records come from and where derived fields go.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::model::{
    DateRange, EligibilitySet, FantasyTeam, GameId, Player, PlayerId, RawGameRecord, Role,
    RosterStint, StintId, TeamId,
};
use crate::stats::StatMap;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Read access to raw per-game records.
pub trait RecordStore: Send + Sync {
    /// Every record for `player`, optionally narrowed to one role and to a
    /// half-open date range.
    fn find(
        &self,
        player: &PlayerId,
        role: Option<Role>,
        range: Option<DateRange>,
    ) -> Result<Vec<RawGameRecord>, StoreError>;

    /// Distinct games `player` appeared in (any role) within `range`.
    fn find_distinct_games(
        &self,
        player: &PlayerId,
        range: DateRange,
    ) -> Result<BTreeSet<GameId>, StoreError>;
}

/// League entities plus the writes of derived fields.
///
/// Every write replaces the stored value in full and is atomic: a reader sees
/// either the old value or the new one.
pub trait LeagueStore: Send + Sync {
    fn player(&self, id: &PlayerId) -> Result<Player, StoreError>;

    fn player_ids(&self) -> Result<Vec<PlayerId>, StoreError>;

    fn team(&self, id: TeamId) -> Result<FantasyTeam, StoreError>;

    fn team_ids(&self) -> Result<Vec<TeamId>, StoreError>;

    fn stint(&self, id: StintId) -> Result<RosterStint, StoreError>;

    /// All stints ever assigned to `team`, current and historical.
    fn team_stints(&self, team: TeamId) -> Result<Vec<RosterStint>, StoreError>;

    fn save_stint_stats(&self, id: StintId, stats: &StatMap) -> Result<(), StoreError>;

    /// Store every stint's stats and the team total in one atomic write.
    fn save_team_rollup(
        &self,
        team: TeamId,
        stint_stats: &[(StintId, StatMap)],
        total: &StatMap,
    ) -> Result<(), StoreError>;

    fn save_eligibility(&self, player: &PlayerId, set: &EligibilitySet) -> Result<(), StoreError>;
}
