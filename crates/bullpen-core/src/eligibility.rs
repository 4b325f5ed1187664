// Season position eligibility from prior-season appearance counts.

use std::collections::HashMap;

use tracing::debug;

use crate::config::EligibilityThresholds;
use crate::error::StoreError;
use crate::model::{DateRange, EligibilitySet, Player, RawGameRecord, Role};
use crate::position::{parse_position_text, FantasyPosition, STANDARD_POSITIONS};
use crate::store::RecordStore;

// ---------------------------------------------------------------------------
// Appearance counting
// ---------------------------------------------------------------------------

/// Appearance tallies for one player over one season.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Appearances {
    /// Occurrences of each parsed position code, any role.
    pub by_position: HashMap<String, u32>,
    pub starts: u32,
    pub relief_appearances: u32,
}

impl Appearances {
    pub fn at(&self, code: &str) -> u32 {
        self.by_position.get(code).copied().unwrap_or(0)
    }
}

/// Whether a pitching line's position text marks a start.
///
/// This is a substring heuristic over free text: `"SP"` and `"Starter"` match,
/// but so would any annotation that merely contains `sp`.
pub fn is_start(position_text: &str, indicators: &[String]) -> bool {
    let text = position_text.to_lowercase();
    indicators
        .iter()
        .map(|needle| needle.trim().to_lowercase())
        .any(|needle| !needle.is_empty() && text.contains(&needle))
}

/// Tally position codes, starts and relief appearances over `records`.
pub fn count_appearances(records: &[RawGameRecord], start_indicators: &[String]) -> Appearances {
    let mut tally = Appearances::default();
    for record in records {
        if record.role == Role::Pitcher {
            if is_start(&record.position_text, start_indicators) {
                tally.starts += 1;
            } else {
                tally.relief_appearances += 1;
            }
        }
        for code in parse_position_text(&record.position_text) {
            *tally.by_position.entry(code).or_insert(0) += 1;
        }
    }
    tally
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Whether `count` games at a position out of `total_games` qualify.
pub fn meets_games_threshold(count: u32, total_games: u32, thresholds: &EligibilityThresholds) -> bool {
    if count >= thresholds.min_games {
        return true;
    }
    total_games > 0
        && count >= thresholds.min_share_games
        && f64::from(count) / f64::from(total_games) >= thresholds.min_share
}

/// Build the eligibility set from a season's tallies.
///
/// Returns `None` when the player has no games, meaning "leave the stored
/// set alone" rather than "clear it".
pub fn classify(
    appearances: &Appearances,
    total_games: u32,
    current_position: Option<&str>,
    thresholds: &EligibilityThresholds,
) -> Option<EligibilitySet> {
    if total_games == 0 {
        return None;
    }

    let mut eligible = EligibilitySet::new();

    for pos in STANDARD_POSITIONS {
        if meets_games_threshold(appearances.at(pos.code()), total_games, thresholds) {
            eligible.insert(pos.code());
        }
    }

    if appearances.starts >= thresholds.min_starts {
        eligible.insert(FantasyPosition::StartingPitcher.code());
        eligible.insert(FantasyPosition::Pitcher.code());
    }
    if appearances.relief_appearances >= thresholds.min_relief_appearances {
        eligible.insert(FantasyPosition::ReliefPitcher.code());
        eligible.insert(FantasyPosition::Pitcher.code());
    }

    let has = |p: FantasyPosition| eligible.contains(p.code());
    use FantasyPosition::*;
    let composites = [
        (CornerInfield, has(FirstBase) || has(ThirdBase)),
        (MiddleInfield, has(SecondBase) || has(ShortStop)),
        (Infield, [FirstBase, SecondBase, ThirdBase, ShortStop].into_iter().any(has)),
        (Outfield, [LeftField, CenterField, RightField].into_iter().any(has)),
    ];
    for (pos, qualifies) in composites {
        if qualifies {
            eligible.insert(pos.code());
        }
    }

    eligible.insert(Utility.code());

    if let Some(current) = current_position.map(str::trim).filter(|p| !p.is_empty()) {
        // Known codes in canonical spelling ("UT" is UTIL); anything else as is.
        match FantasyPosition::from_code(current) {
            Some(pos) => eligible.insert(pos.code()),
            None => eligible.insert(current),
        };
    }

    Some(eligible)
}

/// Classify one season of records. `total_games` is the count of distinct
/// games in the season.
pub fn classify_season(
    records: &[RawGameRecord],
    total_games: u32,
    current_position: Option<&str>,
    thresholds: &EligibilityThresholds,
) -> Option<EligibilitySet> {
    if records.is_empty() {
        return None;
    }
    let appearances = count_appearances(records, &thresholds.start_indicators);
    classify(&appearances, total_games, current_position, thresholds)
}

// ---------------------------------------------------------------------------
// Store-backed classifier
// ---------------------------------------------------------------------------

pub struct EligibilityClassifier<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    thresholds: &'a EligibilityThresholds,
}

impl<'a, S: RecordStore + ?Sized> EligibilityClassifier<'a, S> {
    pub fn new(store: &'a S, thresholds: &'a EligibilityThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Compute `player`'s eligibility from their records dated within the
    /// calendar year `season`. `Ok(None)` means no games that season.
    pub fn compute(&self, player: &Player, season: i32) -> Result<Option<EligibilitySet>, StoreError> {
        let Some(range) = DateRange::season(season) else {
            return Ok(None);
        };

        // Games before lines, then the union of both: a line stored between
        // the two reads still counts toward the total, and a game stored
        // after the lines were read cannot inflate it.
        let mut games = self.store.find_distinct_games(&player.id, range)?;
        let records = self.store.find(&player.id, None, Some(range))?;
        games.extend(records.iter().map(|r| r.game.clone()));
        let total_games = games.len();
        debug!(
            player = %player.id,
            season,
            records = records.len(),
            total_games,
            "classifying eligibility"
        );

        let total_games = u32::try_from(total_games).unwrap_or(u32::MAX);
        Ok(classify_season(
            &records,
            total_games,
            player.position.as_deref(),
            self.thresholds,
        ))
    }
}
