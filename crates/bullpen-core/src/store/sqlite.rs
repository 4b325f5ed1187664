// SQLite persistence for raw game records, league entities and derived fields.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::model::{
    DateRange, EligibilitySet, FantasyTeam, GameId, Player, PlayerId, RawGameRecord, Role,
    RosterStint, StintId, TeamId,
};
use crate::stats::{StatLine, StatMap};

use super::{LeagueStore, RecordStore};

/// SQLite-backed store. One connection guarded by a mutex; every multi-row
/// write runs in a transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id                 TEXT PRIMARY KEY,
                name               TEXT NOT NULL,
                position           TEXT,
                eligible_positions TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS game_stats (
                game_id       TEXT NOT NULL,
                game_date     TEXT NOT NULL,
                player_id     TEXT NOT NULL,
                role          TEXT NOT NULL CHECK (role IN ('batter', 'pitcher')),
                position_text TEXT NOT NULL DEFAULT '',
                stats         TEXT NOT NULL,
                PRIMARY KEY (game_id, player_id, role)
            );

            CREATE INDEX IF NOT EXISTS idx_game_stats_player_date
                ON game_stats(player_id, game_date);

            CREATE TABLE IF NOT EXISTS fantasy_teams (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL,
                total_stats TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS roster_stints (
                id         INTEGER PRIMARY KEY,
                team_id    INTEGER NOT NULL REFERENCES fantasy_teams(id),
                player_id  TEXT NOT NULL REFERENCES players(id),
                position   TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date   TEXT,
                stats      TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_roster_stints_team ON roster_stints(team_id);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Insert or replace raw game records in a single transaction. A record
    /// with an existing `(game, player, role)` overwrites the stored one.
    pub fn upsert_records(&self, records: &[RawGameRecord]) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO game_stats (game_id, game_date, player_id, role, position_text, stats)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(game_id, player_id, role) DO UPDATE SET
                    game_date     = excluded.game_date,
                    position_text = excluded.position_text,
                    stats         = excluded.stats",
            )?;
            for record in records {
                let stats = to_json(&record.stats, "game stats")?;
                stmt.execute(params![
                    record.game.as_str(),
                    record.game_date,
                    record.player.as_str(),
                    record.role.as_str(),
                    record.position_text,
                    stats,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Insert a player or update name and declared position. A stored
    /// eligibility set is kept.
    pub fn upsert_player(&self, player: &Player) -> Result<(), StoreError> {
        let eligible = to_json(&player.eligible_positions, "eligible positions")?;
        self.conn().execute(
            "INSERT INTO players (id, name, position, eligible_positions)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name     = excluded.name,
                position = excluded.position",
            params![player.id.as_str(), player.name, player.position, eligible],
        )?;
        Ok(())
    }

    /// Insert a team or rename it. A stored total is kept.
    pub fn upsert_team(&self, team: &FantasyTeam) -> Result<(), StoreError> {
        let total = to_json(&team.total_stats, "team stats")?;
        self.conn().execute(
            "INSERT INTO fantasy_teams (id, name, total_stats) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![team.id, team.name, total],
        )?;
        Ok(())
    }

    /// Insert a stint or update its assignment fields. Stored stats are kept
    /// until the next recompute.
    pub fn upsert_stint(&self, stint: &RosterStint) -> Result<(), StoreError> {
        let stats = to_json(&stint.stats, "stint stats")?;
        self.conn().execute(
            "INSERT INTO roster_stints (id, team_id, player_id, position, start_date, end_date, stats)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                team_id    = excluded.team_id,
                player_id  = excluded.player_id,
                position   = excluded.position,
                start_date = excluded.start_date,
                end_date   = excluded.end_date",
            params![
                stint.id,
                stint.team,
                stint.player.as_str(),
                stint.position,
                stint.start_date,
                stint.end_date,
                stats,
            ],
        )?;
        Ok(())
    }

    /// Number of raw game records stored.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM game_stats", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn to_json<T: serde::Serialize>(value: &T, what: &'static str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Corrupt { what, source })
}

fn from_json<T: serde::de::DeserializeOwned>(
    text: &str,
    what: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|source| StoreError::Corrupt { what, source })
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// Columns of a `game_stats` row before the JSON and role are decoded.
type GameStatsRow = (String, NaiveDate, String, String, String, String);

fn decode_record(row: GameStatsRow) -> Result<RawGameRecord, StoreError> {
    let (game, game_date, player, role, position_text, stats) = row;
    let role = Role::from_str_role(&role).ok_or_else(|| StoreError::InvalidValue {
        what: "role",
        value: role.clone(),
    })?;
    Ok(RawGameRecord {
        game: GameId(game),
        game_date,
        player: PlayerId(player),
        role,
        position_text,
        stats: from_json::<StatLine>(&stats, "game stats")?,
    })
}

type StintRow = (i64, i64, String, String, NaiveDate, Option<NaiveDate>, String);

const STINT_COLUMNS: &str =
    "id, team_id, player_id, position, start_date, end_date, stats";

fn read_stint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StintRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_stint(row: StintRow) -> Result<RosterStint, StoreError> {
    let (id, team, player, position, start_date, end_date, stats) = row;
    Ok(RosterStint {
        id,
        team,
        player: PlayerId(player),
        position,
        start_date,
        end_date,
        stats: from_json(&stats, "stint stats")?,
    })
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl RecordStore for SqliteStore {
    fn find(
        &self,
        player: &PlayerId,
        role: Option<Role>,
        range: Option<DateRange>,
    ) -> Result<Vec<RawGameRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT game_id, game_date, player_id, role, position_text, stats
             FROM game_stats
             WHERE player_id = ?1
               AND (?2 IS NULL OR role = ?2)
               AND (?3 IS NULL OR game_date >= ?3)
               AND (?4 IS NULL OR game_date < ?4)
             ORDER BY game_date, game_id",
        )?;

        let rows = stmt
            .query_map(
                params![
                    player.as_str(),
                    role.map(|r| r.as_str()),
                    range.map(|r| r.start),
                    range.map(|r| r.end),
                ],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )?
            .collect::<Result<Vec<GameStatsRow>, _>>()?;

        debug!(player = %player, rows = rows.len(), "loaded game stats");
        rows.into_iter().map(decode_record).collect()
    }

    fn find_distinct_games(
        &self,
        player: &PlayerId,
        range: DateRange,
    ) -> Result<BTreeSet<GameId>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT game_id FROM game_stats
             WHERE player_id = ?1 AND game_date >= ?2 AND game_date < ?3",
        )?;
        let games = stmt
            .query_map(params![player.as_str(), range.start, range.end], |row| {
                row.get::<_, String>(0)
            })?
            .map(|r| r.map(GameId))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(games)
    }
}

impl LeagueStore for SqliteStore {
    fn player(&self, id: &PlayerId) -> Result<Player, StoreError> {
        let row: Option<(String, String, Option<String>, String)> = self
            .conn()
            .query_row(
                "SELECT id, name, position, eligible_positions FROM players WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (pid, name, position, eligible) = row.ok_or_else(|| not_found("player", id))?;
        Ok(Player {
            id: PlayerId(pid),
            name,
            position,
            eligible_positions: from_json(&eligible, "eligible positions")?,
        })
    }

    fn player_ids(&self) -> Result<Vec<PlayerId>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM players ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(PlayerId))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn team(&self, id: TeamId) -> Result<FantasyTeam, StoreError> {
        let row: Option<(i64, String, String)> = self
            .conn()
            .query_row(
                "SELECT id, name, total_stats FROM fantasy_teams WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (tid, name, total) = row.ok_or_else(|| not_found("team", id))?;
        Ok(FantasyTeam {
            id: tid,
            name,
            total_stats: from_json(&total, "team stats")?,
        })
    }

    fn team_ids(&self) -> Result<Vec<TeamId>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM fantasy_teams ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn stint(&self, id: StintId) -> Result<RosterStint, StoreError> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {STINT_COLUMNS} FROM roster_stints WHERE id = ?1"),
                params![id],
                read_stint_row,
            )
            .optional()?;
        decode_stint(row.ok_or_else(|| not_found("stint", id))?)
    }

    fn team_stints(&self, team: TeamId) -> Result<Vec<RosterStint>, StoreError> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM fantasy_teams WHERE id = ?1)",
            params![team],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(not_found("team", team));
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {STINT_COLUMNS} FROM roster_stints WHERE team_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![team], read_stint_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_stint).collect()
    }

    fn save_stint_stats(&self, id: StintId, stats: &StatMap) -> Result<(), StoreError> {
        let json = to_json(stats, "stint stats")?;
        let updated = self.conn().execute(
            "UPDATE roster_stints SET stats = ?1 WHERE id = ?2",
            params![json, id],
        )?;
        if updated == 0 {
            return Err(not_found("stint", id));
        }
        Ok(())
    }

    fn save_team_rollup(
        &self,
        team: TeamId,
        stint_stats: &[(StintId, StatMap)],
        total: &StatMap,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        // Dropping the transaction without commit rolls everything back.
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE roster_stints SET stats = ?1 WHERE id = ?2")?;
            for (id, stats) in stint_stats {
                if stmt.execute(params![to_json(stats, "stint stats")?, id])? == 0 {
                    return Err(not_found("stint", id));
                }
            }
        }
        let updated = tx.execute(
            "UPDATE fantasy_teams SET total_stats = ?1 WHERE id = ?2",
            params![to_json(total, "team stats")?, team],
        )?;
        if updated == 0 {
            return Err(not_found("team", team));
        }
        tx.commit()?;
        Ok(())
    }

    fn save_eligibility(&self, player: &PlayerId, set: &EligibilitySet) -> Result<(), StoreError> {
        let json = to_json(set, "eligible positions")?;
        let updated = self.conn().execute(
            "UPDATE players SET eligible_positions = ?1 WHERE id = ?2",
            params![json, player.as_str()],
        )?;
        if updated == 0 {
            return Err(not_found("player", player));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{CountingKey, RateKey};

    fn test_store() -> SqliteStore {
        SqliteStore::open(":memory:").expect("in-memory database should open")
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn record(game: &str, d: NaiveDate, role: Role, hits: f64) -> RawGameRecord {
        let mut stats = StatLine::new().with(CountingKey::Hits, hits);
        stats.set_code("AVG", 0.5).unwrap();
        RawGameRecord {
            game: GameId::new(game),
            game_date: d,
            player: PlayerId::new("a1"),
            role,
            position_text: "RF (LF)".into(),
            stats,
        }
    }

    fn seed_league(store: &SqliteStore) {
        store
            .upsert_player(&Player {
                id: PlayerId::new("a1"),
                name: "Chen".into(),
                position: Some("RF".into()),
                eligible_positions: EligibilitySet::new(),
            })
            .unwrap();
        store
            .upsert_team(&FantasyTeam {
                id: 1,
                name: "Dragons".into(),
                total_stats: StatMap::default(),
            })
            .unwrap();
        store
            .upsert_stint(&RosterStint {
                id: 10,
                team: 1,
                player: PlayerId::new("a1"),
                position: "RF".into(),
                start_date: date(4, 1),
                end_date: None,
                stats: StatMap::default(),
            })
            .unwrap();
    }

    #[test]
    fn open_creates_tables() {
        let store = test_store();
        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        for expected in ["fantasy_teams", "game_stats", "players", "roster_stints"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[test]
    fn records_round_trip_with_fielded_rates() {
        let store = test_store();
        let rec = record("g1", date(4, 2), Role::Batter, 2.0);
        store.upsert_records(&[rec.clone()]).unwrap();

        let found = store.find(&PlayerId::new("a1"), None, None).unwrap();
        assert_eq!(found, vec![rec]);
        assert_eq!(found[0].stats.fielded_rates.get(&RateKey::BattingAverage), Some(&0.5));
    }

    #[test]
    fn upsert_replaces_same_triple() {
        let store = test_store();
        store
            .upsert_records(&[record("g1", date(4, 2), Role::Batter, 1.0)])
            .unwrap();
        store
            .upsert_records(&[record("g1", date(4, 2), Role::Batter, 4.0)])
            .unwrap();
        assert_eq!(store.record_count().unwrap(), 1);

        let found = store.find(&PlayerId::new("a1"), Some(Role::Batter), None).unwrap();
        assert_eq!(found[0].stats.get(CountingKey::Hits), 4.0);
    }

    #[test]
    fn find_honours_role_and_half_open_range() {
        let store = test_store();
        store
            .upsert_records(&[
                record("g1", date(4, 1), Role::Batter, 1.0),
                record("g1", date(4, 1), Role::Pitcher, 0.0),
                record("g2", date(4, 5), Role::Batter, 1.0),
                record("g3", date(4, 9), Role::Batter, 1.0),
            ])
            .unwrap();

        let range = DateRange::new(date(4, 1), date(4, 9));
        let batting = store
            .find(&PlayerId::new("a1"), Some(Role::Batter), Some(range))
            .unwrap();
        let games: Vec<&str> = batting.iter().map(|r| r.game.as_str()).collect();
        assert_eq!(games, vec!["g1", "g2"]);

        let all = store.find(&PlayerId::new("a1"), None, Some(range)).unwrap();
        assert_eq!(all.len(), 3);

        let distinct = store.find_distinct_games(&PlayerId::new("a1"), range).unwrap();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn league_entities_round_trip() {
        let store = test_store();
        seed_league(&store);

        let player = store.player(&PlayerId::new("a1")).unwrap();
        assert_eq!(player.position.as_deref(), Some("RF"));
        assert_eq!(store.player_ids().unwrap(), vec![PlayerId::new("a1")]);

        let stints = store.team_stints(1).unwrap();
        assert_eq!(stints.len(), 1);
        assert_eq!(stints[0].end_date, None);
        assert_eq!(store.stint(10).unwrap(), stints[0]);
        assert_eq!(store.team_ids().unwrap(), vec![1]);
    }

    #[test]
    fn save_team_rollup_writes_stints_and_total() {
        let store = test_store();
        seed_league(&store);

        let mut stint_stats = StatMap::default();
        stint_stats.counting.insert(CountingKey::Hits, 3.0);
        stint_stats.derive_rates();
        let total = stint_stats.clone();

        store
            .save_team_rollup(1, &[(10, stint_stats.clone())], &total)
            .unwrap();
        assert_eq!(store.stint(10).unwrap().stats, stint_stats);
        assert_eq!(store.team(1).unwrap().total_stats, total);
    }

    #[test]
    fn failed_rollup_leaves_previous_values() {
        let store = test_store();
        seed_league(&store);

        let mut stats = StatMap::default();
        stats.counting.insert(CountingKey::Hits, 1.0);
        let err = store
            .save_team_rollup(1, &[(10, stats.clone()), (99, stats.clone())], &stats)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "stint", .. }));

        assert_eq!(store.stint(10).unwrap().stats, StatMap::default());
        assert_eq!(store.team(1).unwrap().total_stats, StatMap::default());
    }

    #[test]
    fn upserting_player_keeps_eligibility() {
        let store = test_store();
        seed_league(&store);
        let set: EligibilitySet = ["RF", "OF", "UTIL"].into_iter().collect();
        store.save_eligibility(&PlayerId::new("a1"), &set).unwrap();

        store
            .upsert_player(&Player {
                id: PlayerId::new("a1"),
                name: "Chen Jie".into(),
                position: Some("LF".into()),
                eligible_positions: EligibilitySet::new(),
            })
            .unwrap();

        let player = store.player(&PlayerId::new("a1")).unwrap();
        assert_eq!(player.name, "Chen Jie");
        assert_eq!(player.eligible_positions, set);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let store = test_store();
        assert!(matches!(store.team(5), Err(StoreError::NotFound { entity: "team", .. })));
        assert!(matches!(store.team_stints(5), Err(StoreError::NotFound { entity: "team", .. })));
        assert!(matches!(
            store.save_stint_stats(5, &StatMap::default()),
            Err(StoreError::NotFound { entity: "stint", .. })
        ));
    }

    #[test]
    fn foreign_keys_enforced() {
        let store = test_store();
        let result = store.upsert_stint(&RosterStint {
            id: 1,
            team: 42,
            player: PlayerId::new("ghost"),
            position: "C".into(),
            start_date: date(4, 1),
            end_date: None,
            stats: StatMap::default(),
        });
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
