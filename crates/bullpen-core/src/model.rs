// Domain records: raw game lines, roster stints, fantasy teams, players.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::stats::{StatLine, StatMap};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A player's league account code (stable across teams and seasons).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        GameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type TeamId = i64;
pub type StintId = i64;

// ---------------------------------------------------------------------------
// Date windows
// ---------------------------------------------------------------------------

/// A half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The calendar year `year`: Jan 1 through Dec 31 inclusive.
    ///
    /// Returns `None` only for years outside chrono's supported range.
    pub fn season(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Whether the range holds no dates at all (`end <= start`).
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// The season whose stats drive eligibility by default: the calendar year
/// before `today`.
pub fn previous_season(today: NaiveDate) -> i32 {
    today.year() - 1
}

// ---------------------------------------------------------------------------
// Raw game records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Batter,
    Pitcher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Batter => "batter",
            Role::Pitcher => "pitcher",
        }
    }

    pub fn from_str_role(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "batter" => Some(Role::Batter),
            "pitcher" => Some(Role::Pitcher),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player's box-score line for one game in one role.
///
/// `(game, player, role)` is the identity: storing a record with the same
/// triple replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGameRecord {
    pub game: GameId,
    pub game_date: NaiveDate,
    pub player: PlayerId,
    pub role: Role,
    /// Unstandardized position annotation, e.g. `"RF (LF)"` or `"SP"`.
    pub position_text: String,
    pub stats: StatLine,
}

// ---------------------------------------------------------------------------
// League entities
// ---------------------------------------------------------------------------

/// A player as the league knows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Declared primary position; always kept in the eligibility set.
    pub position: Option<String>,
    pub eligible_positions: EligibilitySet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FantasyTeam {
    pub id: TeamId,
    pub name: String,
    pub total_stats: StatMap,
}

/// A player's assignment to a fantasy team over `[start_date, end_date)`.
///
/// Stints of one player are assumed not to overlap; nothing here checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterStint {
    pub id: StintId,
    pub team: TeamId,
    pub player: PlayerId,
    /// Declared roster slot, e.g. `"SS"`, `"BN"`, `"IL"`.
    pub position: String,
    pub start_date: NaiveDate,
    /// Exclusive. `None` while the stint is still active.
    pub end_date: Option<NaiveDate>,
    pub stats: StatMap,
}

impl RosterStint {
    /// The stint's window, with an open end resolved to `today` (exclusive).
    pub fn window(&self, today: NaiveDate) -> DateRange {
        DateRange::new(self.start_date, self.end_date.unwrap_or(today))
    }
}

// ---------------------------------------------------------------------------
// Eligibility set
// ---------------------------------------------------------------------------

/// A duplicate-free set of position codes, kept in insertion order so that
/// recomputation produces byte-identical output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EligibilitySet(Vec<String>);

impl EligibilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `code` unless already present. Returns whether it was added.
    pub fn insert(&mut self, code: impl Into<String>) -> bool {
        let code = code.into();
        if self.0.contains(&code) {
            return false;
        }
        self.0.push(code);
        true
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for EligibilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EligibilitySet::new();
        for code in iter {
            set.insert(code);
        }
        set
    }
}
