// Importers: box-score CSV into raw game records, league TOML into teams,
// players and roster stints.
//
// Box-score CSV has five fixed columns followed by any number of stat-code
// columns:
//
//   game_id,game_date,player_id,role,position,AB,H,BB,...
//
// Empty stat cells are absent values. Rate columns (AVG, ERA, WHIP) are kept
// as fielded rates and never summed. Columns that are not stat codes are
// ignored with a warning.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::model::{
    EligibilitySet, FantasyTeam, GameId, Player, PlayerId, RawGameRecord, Role, RosterStint,
    StintId, TeamId,
};
use crate::position::normalize_profile_position;
use crate::stats::{StatKey, StatLine, StatMap};
use crate::store::SqliteStore;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("TOML error in {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },

    #[error("{path}: {row}: {message}")]
    InvalidRow {
        path: String,
        row: String,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

const FIXED_COLUMNS: [&str; 5] = ["game_id", "game_date", "player_id", "role", "position"];

// ---------------------------------------------------------------------------
// Box scores
// ---------------------------------------------------------------------------

/// Where each column of a box-score file goes.
struct BoxScoreLayout {
    game_id: usize,
    game_date: usize,
    player_id: usize,
    role: usize,
    position: usize,
    stats: Vec<(usize, String)>,
}

impl BoxScoreLayout {
    fn from_headers(headers: &csv::StringRecord, path: &str) -> Result<Self, ImportError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| ImportError::InvalidRow {
                    path: path.to_string(),
                    row: "header".into(),
                    message: format!("missing required column '{name}'"),
                })
        };

        let game_id = find("game_id")?;
        let game_date = find("game_date")?;
        let player_id = find("player_id")?;
        let role = find("role")?;
        let position = find("position")?;

        let mut stats = Vec::new();
        let mut seen = HashSet::new();
        for (idx, header) in headers.iter().enumerate() {
            let header = header.trim();
            if FIXED_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(header)) {
                continue;
            }
            match StatKey::from_code(header) {
                Some(key) if seen.insert(key) => stats.push((idx, key.code().to_string())),
                Some(_) => warn!(path, column = header, "duplicate stat column ignored"),
                None => warn!(path, column = header, "unknown column ignored"),
            }
        }

        Ok(Self {
            game_id,
            game_date,
            player_id,
            role,
            position,
            stats,
        })
    }

    fn record(&self, row: &csv::StringRecord, line: u64, path: &str) -> Result<RawGameRecord, ImportError> {
        let invalid = |message: String| ImportError::InvalidRow {
            path: path.to_string(),
            row: format!("line {line}"),
            message,
        };
        let field = |idx: usize| row.get(idx).unwrap_or("").trim();

        let game = field(self.game_id);
        if game.is_empty() {
            return Err(invalid("empty game_id".into()));
        }
        let player = field(self.player_id);
        if player.is_empty() {
            return Err(invalid("empty player_id".into()));
        }
        let date_text = field(self.game_date);
        let game_date: NaiveDate = date_text
            .parse()
            .map_err(|e| invalid(format!("bad game_date '{date_text}': {e}")))?;
        let role_text = field(self.role);
        let role = Role::from_str_role(role_text)
            .ok_or_else(|| invalid(format!("unknown role '{role_text}'")))?;

        let mut stats = StatLine::new();
        for (idx, code) in &self.stats {
            let cell = field(*idx);
            if cell.is_empty() {
                continue;
            }
            let value: f64 = cell
                .parse()
                .map_err(|_| invalid(format!("{code} is not a number: '{cell}'")))?;
            if !value.is_finite() {
                return Err(invalid(format!("{code} is not finite")));
            }
            stats
                .set_code(code, value)
                .map_err(|e| invalid(e.to_string()))?;
        }

        Ok(RawGameRecord {
            game: GameId::new(game),
            game_date,
            player: PlayerId::new(player),
            role,
            position_text: field(self.position).to_string(),
            stats,
        })
    }
}

/// Parse box-score lines from any reader. `path` labels errors. The first
/// invalid row aborts the whole import so a file is taken all or nothing.
pub fn load_box_scores_from_reader<R: Read>(rdr: R, path: &str) -> Result<Vec<RawGameRecord>, ImportError> {
    let csv_err = |source| ImportError::Csv {
        path: path.to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let layout = BoxScoreLayout::from_headers(reader.headers().map_err(csv_err)?, path)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(csv_err)?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let line = row.position().map_or(0, |p| p.line());
        records.push(layout.record(&row, line, path)?);
    }
    Ok(records)
}

/// Load box-score lines from a CSV file.
pub fn load_box_scores(path: &Path) -> Result<Vec<RawGameRecord>, ImportError> {
    let label = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: label.clone(),
        source: e,
    })?;
    load_box_scores_from_reader(file, &label)
}

/// Load a box-score file into `store`. Returns the number of lines written.
pub fn import_box_scores(path: &Path, store: &SqliteStore) -> Result<usize, ImportError> {
    let records = load_box_scores(path)?;
    let written = store.upsert_records(&records)?;
    info!(path = %path.display(), records = written, "imported box scores");
    Ok(written)
}

// ---------------------------------------------------------------------------
// League file
// ---------------------------------------------------------------------------

/// League definition file.
///
/// ```toml
/// [[teams]]
/// id = 1
/// name = "Lions"
///
/// [[players]]
/// id = "A001"
/// name = "Wang Po-Jung"
/// position = "Shortstop"
///
/// [[stints]]
/// id = 10
/// team = 1
/// player = "A001"
/// position = "SS"
/// start_date = 2024-03-30
/// ```
///
/// Dates may be TOML date literals or quoted `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeagueFile {
    pub teams: Vec<TeamEntry>,
    pub players: Vec<PlayerEntry>,
    pub stints: Vec<StintEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StintEntry {
    pub id: StintId,
    pub team: TeamId,
    pub player: String,
    pub position: String,
    pub start_date: toml::Value,
    #[serde(default)]
    pub end_date: Option<toml::Value>,
}

/// Counts from applying a league file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LeagueImportSummary {
    pub teams: usize,
    pub players: usize,
    pub stints: usize,
}

fn toml_date(value: &toml::Value) -> Option<NaiveDate> {
    match value {
        toml::Value::String(s) => s.trim().parse().ok(),
        toml::Value::Datetime(dt) => {
            let date = dt.date?;
            if dt.time.is_some() {
                return None;
            }
            NaiveDate::from_ymd_opt(i32::from(date.year), u32::from(date.month), u32::from(date.day))
        }
        _ => None,
    }
}

impl LeagueFile {
    pub fn parse(text: &str, path: &str) -> Result<Self, ImportError> {
        toml::from_str(text).map_err(|source| ImportError::Toml {
            path: path.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let label = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| ImportError::Io {
            path: label.clone(),
            source: e,
        })?;
        Self::parse(&text, &label)
    }

    pub fn to_teams(&self) -> Vec<FantasyTeam> {
        self.teams
            .iter()
            .map(|t| FantasyTeam {
                id: t.id,
                name: t.name.trim().to_string(),
                total_stats: StatMap::default(),
            })
            .collect()
    }

    /// Players with profile-style positions ("Shortstop") mapped to codes.
    pub fn to_players(&self) -> Vec<Player> {
        self.players
            .iter()
            .map(|p| Player {
                id: PlayerId::new(p.id.trim()),
                name: p.name.trim().to_string(),
                position: p
                    .position
                    .as_deref()
                    .map(normalize_profile_position)
                    .filter(|pos| !pos.is_empty()),
                eligible_positions: EligibilitySet::new(),
            })
            .collect()
    }

    pub fn to_stints(&self, path: &str) -> Result<Vec<RosterStint>, ImportError> {
        self.stints
            .iter()
            .map(|s| {
                let invalid = |message: String| ImportError::InvalidRow {
                    path: path.to_string(),
                    row: format!("stint {}", s.id),
                    message,
                };
                let start_date = toml_date(&s.start_date)
                    .ok_or_else(|| invalid(format!("bad start_date {}", s.start_date)))?;
                let end_date = match &s.end_date {
                    Some(v) => Some(toml_date(v).ok_or_else(|| invalid(format!("bad end_date {v}")))?),
                    None => None,
                };
                Ok(RosterStint {
                    id: s.id,
                    team: s.team,
                    player: PlayerId::new(s.player.trim()),
                    position: s.position.trim().to_uppercase(),
                    start_date,
                    end_date,
                    stats: StatMap::default(),
                })
            })
            .collect()
    }

    /// Write every entry to `store`: teams first, then players, then stints.
    /// Stored derived fields (totals, stint stats, eligibility) are kept.
    pub fn apply(&self, store: &SqliteStore, path: &str) -> Result<LeagueImportSummary, ImportError> {
        let stints = self.to_stints(path)?;
        let teams = self.to_teams();
        let players = self.to_players();

        for team in &teams {
            store.upsert_team(team)?;
        }
        for player in &players {
            store.upsert_player(player)?;
        }
        for stint in &stints {
            store.upsert_stint(stint)?;
        }

        let summary = LeagueImportSummary {
            teams: teams.len(),
            players: players.len(),
            stints: stints.len(),
        };
        info!(path, ?summary, "imported league file");
        Ok(summary)
    }
}

/// Load a league file into `store`.
pub fn import_league(path: &Path, store: &SqliteStore) -> Result<LeagueImportSummary, ImportError> {
    let league = LeagueFile::load(path)?;
    league.apply(store, &path.display().to_string())
}
