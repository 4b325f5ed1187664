// Typed stat maps: counting keys, derived rate keys, merge and rate derivation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Stat keys
// ---------------------------------------------------------------------------

/// A statistic that is summed directly across raw game records.
///
/// Batting and pitching keys share one namespace: a two-way player's hits
/// allowed and hits collected both land in `H`, as the box-score feed
/// records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CountingKey {
    AtBats,
    Runs,
    Hits,
    RunsBattedIn,
    Doubles,
    Triples,
    HomeRuns,
    GroundedIntoDoublePlay,
    Walks,
    IntentionalWalks,
    HitByPitch,
    Strikeouts,
    SacrificeBunts,
    SacrificeFlies,
    StolenBases,
    CaughtStealing,
    Errors,
    InningsPitched,
    BattersFaced,
    NumberOfPitches,
    Strikes,
    WildPitches,
    Balks,
    EarnedRuns,
}

impl CountingKey {
    /// Every counting key, in box-score column order.
    pub const ALL: [CountingKey; 24] = [
        CountingKey::AtBats,
        CountingKey::Runs,
        CountingKey::Hits,
        CountingKey::RunsBattedIn,
        CountingKey::Doubles,
        CountingKey::Triples,
        CountingKey::HomeRuns,
        CountingKey::GroundedIntoDoublePlay,
        CountingKey::Walks,
        CountingKey::IntentionalWalks,
        CountingKey::HitByPitch,
        CountingKey::Strikeouts,
        CountingKey::SacrificeBunts,
        CountingKey::SacrificeFlies,
        CountingKey::StolenBases,
        CountingKey::CaughtStealing,
        CountingKey::Errors,
        CountingKey::InningsPitched,
        CountingKey::BattersFaced,
        CountingKey::NumberOfPitches,
        CountingKey::Strikes,
        CountingKey::WildPitches,
        CountingKey::Balks,
        CountingKey::EarnedRuns,
    ];

    /// Parse a box-score stat code (`"AB"`, `"2B"`, `"IP"`, ...).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "AB" => Some(CountingKey::AtBats),
            "R" => Some(CountingKey::Runs),
            "H" => Some(CountingKey::Hits),
            "RBI" => Some(CountingKey::RunsBattedIn),
            "2B" => Some(CountingKey::Doubles),
            "3B" => Some(CountingKey::Triples),
            "HR" => Some(CountingKey::HomeRuns),
            "GIDP" => Some(CountingKey::GroundedIntoDoublePlay),
            "BB" => Some(CountingKey::Walks),
            "IBB" => Some(CountingKey::IntentionalWalks),
            "HBP" => Some(CountingKey::HitByPitch),
            "SO" => Some(CountingKey::Strikeouts),
            "SAC" => Some(CountingKey::SacrificeBunts),
            "SF" => Some(CountingKey::SacrificeFlies),
            "SB" => Some(CountingKey::StolenBases),
            "CS" => Some(CountingKey::CaughtStealing),
            "E" => Some(CountingKey::Errors),
            "IP" => Some(CountingKey::InningsPitched),
            "BF" => Some(CountingKey::BattersFaced),
            "NP" => Some(CountingKey::NumberOfPitches),
            "S" => Some(CountingKey::Strikes),
            "WP" => Some(CountingKey::WildPitches),
            "BK" => Some(CountingKey::Balks),
            "ER" => Some(CountingKey::EarnedRuns),
            _ => None,
        }
    }

    /// The box-score stat code for this key.
    pub fn code(&self) -> &'static str {
        match self {
            CountingKey::AtBats => "AB",
            CountingKey::Runs => "R",
            CountingKey::Hits => "H",
            CountingKey::RunsBattedIn => "RBI",
            CountingKey::Doubles => "2B",
            CountingKey::Triples => "3B",
            CountingKey::HomeRuns => "HR",
            CountingKey::GroundedIntoDoublePlay => "GIDP",
            CountingKey::Walks => "BB",
            CountingKey::IntentionalWalks => "IBB",
            CountingKey::HitByPitch => "HBP",
            CountingKey::Strikeouts => "SO",
            CountingKey::SacrificeBunts => "SAC",
            CountingKey::SacrificeFlies => "SF",
            CountingKey::StolenBases => "SB",
            CountingKey::CaughtStealing => "CS",
            CountingKey::Errors => "E",
            CountingKey::InningsPitched => "IP",
            CountingKey::BattersFaced => "BF",
            CountingKey::NumberOfPitches => "NP",
            CountingKey::Strikes => "S",
            CountingKey::WildPitches => "WP",
            CountingKey::Balks => "BK",
            CountingKey::EarnedRuns => "ER",
        }
    }
}

impl fmt::Display for CountingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A statistic that is always recomputed from counting totals, never summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RateKey {
    BattingAverage,
    EarnedRunAverage,
    Whip,
}

impl RateKey {
    pub const ALL: [RateKey; 3] = [
        RateKey::BattingAverage,
        RateKey::EarnedRunAverage,
        RateKey::Whip,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "AVG" => Some(RateKey::BattingAverage),
            "ERA" => Some(RateKey::EarnedRunAverage),
            "WHIP" => Some(RateKey::Whip),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RateKey::BattingAverage => "AVG",
            RateKey::EarnedRunAverage => "ERA",
            RateKey::Whip => "WHIP",
        }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Either kind of stat key. Used where a raw stat code has to be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKey {
    Counting(CountingKey),
    Rate(RateKey),
}

impl StatKey {
    /// Classify a stat code. Returns `None` for codes the engine does not track.
    pub fn from_code(code: &str) -> Option<Self> {
        CountingKey::from_code(code)
            .map(StatKey::Counting)
            .or_else(|| RateKey::from_code(code).map(StatKey::Rate))
    }

    pub fn code(&self) -> &'static str {
        match self {
            StatKey::Counting(k) => k.code(),
            StatKey::Rate(k) => k.code(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown stat code `{0}`")]
pub struct UnknownStatCode(pub String);

// ---------------------------------------------------------------------------
// Rate derivation table
// ---------------------------------------------------------------------------

/// One row of the rate derivation table:
/// `rate = scale * sum(numerators) / denominator`, or `zero_default` when the
/// denominator total is not positive.
#[derive(Debug, Clone, Copy)]
pub struct RateFormula {
    pub rate: RateKey,
    pub numerators: &'static [CountingKey],
    pub scale: f64,
    pub denominator: CountingKey,
    pub zero_default: f64,
}

/// Value reported for a rate stat whose denominator is zero ("no stats yet").
pub const RATE_ZERO_DEFAULT: f64 = 0.0;

/// Innings in a regulation game, the ERA scale factor.
pub const INNINGS_PER_GAME: f64 = 9.0;

pub const RATE_FORMULAS: [RateFormula; 3] = [
    RateFormula {
        rate: RateKey::BattingAverage,
        numerators: &[CountingKey::Hits],
        scale: 1.0,
        denominator: CountingKey::AtBats,
        zero_default: RATE_ZERO_DEFAULT,
    },
    RateFormula {
        rate: RateKey::EarnedRunAverage,
        numerators: &[CountingKey::EarnedRuns],
        scale: INNINGS_PER_GAME,
        denominator: CountingKey::InningsPitched,
        zero_default: RATE_ZERO_DEFAULT,
    },
    RateFormula {
        rate: RateKey::Whip,
        numerators: &[CountingKey::Hits, CountingKey::Walks],
        scale: 1.0,
        denominator: CountingKey::InningsPitched,
        zero_default: RATE_ZERO_DEFAULT,
    },
];

impl RateFormula {
    /// Evaluate this formula against a set of counting totals.
    pub fn evaluate(&self, totals: &BTreeMap<CountingKey, f64>) -> f64 {
        let get = |k: &CountingKey| totals.get(k).copied().unwrap_or(0.0);
        let denominator = get(&self.denominator);
        if denominator <= 0.0 {
            return self.zero_default;
        }
        let numerator: f64 = self.numerators.iter().map(get).sum();
        self.scale * numerator / denominator
    }
}

// ---------------------------------------------------------------------------
// Counting key sets
// ---------------------------------------------------------------------------

/// The set of counting keys an aggregation sums. Keys outside the set are
/// ignored even when a record carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountingKeySet {
    keys: Vec<CountingKey>,
}

impl CountingKeySet {
    pub fn new(keys: impl IntoIterator<Item = CountingKey>) -> Self {
        let mut keys: Vec<CountingKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        Self { keys }
    }

    /// Parse a list of stat codes. Rate codes and unknown codes are rejected.
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Result<Self, UnknownStatCode> {
        let keys = codes
            .iter()
            .map(|c| {
                CountingKey::from_code(c.as_ref())
                    .ok_or_else(|| UnknownStatCode(c.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(keys))
    }

    pub fn contains(&self, key: CountingKey) -> bool {
        self.keys.binary_search(&key).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = CountingKey> + '_ {
        self.keys.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for CountingKeySet {
    fn default() -> Self {
        Self::new(CountingKey::ALL)
    }
}

// ---------------------------------------------------------------------------
// Stat line (one raw box-score line)
// ---------------------------------------------------------------------------

/// The stats of one raw box-score line.
///
/// Counting values and fielded rates are kept apart at the type level, so
/// aggregation never has to guess whether a value is summable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<String, f64>", try_from = "BTreeMap<String, f64>")]
pub struct StatLine {
    pub counting: BTreeMap<CountingKey, f64>,
    pub fielded_rates: BTreeMap<RateKey, f64>,
}

impl StatLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly for fixtures.
    pub fn with(mut self, key: CountingKey, value: f64) -> Self {
        self.counting.insert(key, value);
        self
    }

    /// Set a value by stat code. Returns the classified key.
    pub fn set_code(&mut self, code: &str, value: f64) -> Result<StatKey, UnknownStatCode> {
        let key = StatKey::from_code(code).ok_or_else(|| UnknownStatCode(code.to_string()))?;
        match key {
            StatKey::Counting(k) => {
                self.counting.insert(k, value);
            }
            StatKey::Rate(k) => {
                self.fielded_rates.insert(k, value);
            }
        }
        Ok(key)
    }

    pub fn get(&self, key: CountingKey) -> f64 {
        self.counting.get(&key).copied().unwrap_or(0.0)
    }
}

impl From<StatLine> for BTreeMap<String, f64> {
    fn from(line: StatLine) -> Self {
        line.counting
            .iter()
            .map(|(k, v)| (k.code().to_string(), *v))
            .chain(line.fielded_rates.iter().map(|(k, v)| (k.code().to_string(), *v)))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, f64>> for StatLine {
    type Error = UnknownStatCode;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let mut line = StatLine::new();
        for (code, value) in raw {
            line.set_code(&code, value)?;
        }
        Ok(line)
    }
}

// ---------------------------------------------------------------------------
// Stat map (derived per stint / per team)
// ---------------------------------------------------------------------------

/// Derived statistics for a stint or a team: counting totals plus rates
/// recomputed from those totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<String, f64>", try_from = "BTreeMap<String, f64>")]
pub struct StatMap {
    pub counting: BTreeMap<CountingKey, f64>,
    pub rates: BTreeMap<RateKey, f64>,
}

impl StatMap {
    /// An empty map: no counting totals, all rates at their zero default.
    pub fn empty() -> Self {
        let mut map = Self::default();
        map.derive_rates();
        map
    }

    /// Counting total for `key`, 0 when never seen.
    pub fn get(&self, key: CountingKey) -> f64 {
        self.counting.get(&key).copied().unwrap_or(0.0)
    }

    /// Rate value for `key`, 0 when not yet derived.
    pub fn rate(&self, key: RateKey) -> f64 {
        self.rates.get(&key).copied().unwrap_or(RATE_ZERO_DEFAULT)
    }

    /// Add every key of `keys` present in `line` to the running totals.
    /// Fielded rates on the line are never touched.
    pub fn merge_line(&mut self, line: &StatLine, keys: &CountingKeySet) {
        merge(&mut self.counting, &line.counting, keys);
    }

    /// Add another map's counting totals (never its rates) to this one.
    pub fn merge_counting(&mut self, other: &StatMap, keys: &CountingKeySet) {
        merge(&mut self.counting, &other.counting, keys);
    }

    /// Recompute every rate key from the current counting totals.
    pub fn derive_rates(&mut self) {
        self.rates = derive_rates(&self.counting);
    }
}

/// Sum `record` into `base` for every key of `keys` that `record` carries.
pub fn merge(
    base: &mut BTreeMap<CountingKey, f64>,
    record: &BTreeMap<CountingKey, f64>,
    keys: &CountingKeySet,
) {
    for (key, value) in record {
        if keys.contains(*key) {
            *base.entry(*key).or_insert(0.0) += value;
        }
    }
}

/// Compute every rate in [`RATE_FORMULAS`] from counting totals.
pub fn derive_rates(totals: &BTreeMap<CountingKey, f64>) -> BTreeMap<RateKey, f64> {
    RATE_FORMULAS
        .iter()
        .map(|formula| (formula.rate, formula.evaluate(totals)))
        .collect()
}

impl From<StatMap> for BTreeMap<String, f64> {
    fn from(map: StatMap) -> Self {
        map.counting
            .iter()
            .map(|(k, v)| (k.code().to_string(), *v))
            .chain(map.rates.iter().map(|(k, v)| (k.code().to_string(), *v)))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, f64>> for StatMap {
    type Error = UnknownStatCode;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let mut map = StatMap::default();
        for (code, value) in raw {
            match StatKey::from_code(&code) {
                Some(StatKey::Counting(k)) => {
                    map.counting.insert(k, value);
                }
                Some(StatKey::Rate(k)) => {
                    map.rates.insert(k, value);
                }
                None => return Err(UnknownStatCode(code)),
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn totals(pairs: &[(CountingKey, f64)]) -> BTreeMap<CountingKey, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn every_code_round_trips_through_its_key() {
        for key in CountingKey::ALL {
            assert_eq!(CountingKey::from_code(key.code()), Some(key));
        }
        for key in RateKey::ALL {
            assert_eq!(RateKey::from_code(key.code()), Some(key));
        }
    }

    #[test]
    fn stat_key_classifies_counting_and_rate_codes() {
        assert_eq!(StatKey::from_code("ab"), Some(StatKey::Counting(CountingKey::AtBats)));
        assert_eq!(StatKey::from_code("ERA"), Some(StatKey::Rate(RateKey::EarnedRunAverage)));
        assert_eq!(StatKey::from_code("OPS"), None);
    }

    #[test]
    fn derive_rates_computes_avg_era_whip() {
        let t = totals(&[
            (CountingKey::Hits, 9.0),
            (CountingKey::AtBats, 30.0),
            (CountingKey::EarnedRuns, 4.0),
            (CountingKey::InningsPitched, 12.0),
            (CountingKey::Walks, 3.0),
        ]);
        let rates = derive_rates(&t);
        assert!(approx_eq(rates[&RateKey::BattingAverage], 0.3, 1e-12));
        assert!(approx_eq(rates[&RateKey::EarnedRunAverage], 3.0, 1e-12));
        assert!(approx_eq(rates[&RateKey::Whip], 1.0, 1e-12));
    }

    #[test]
    fn zero_denominators_yield_zero_rates() {
        let t = totals(&[(CountingKey::Hits, 3.0), (CountingKey::EarnedRuns, 2.0)]);
        let rates = derive_rates(&t);
        assert_eq!(rates[&RateKey::BattingAverage], 0.0);
        assert_eq!(rates[&RateKey::EarnedRunAverage], 0.0);
        assert_eq!(rates[&RateKey::Whip], 0.0);
    }

    #[test]
    fn fractional_innings_are_honoured() {
        // 5 2/3 innings, 2 earned runs
        let t = totals(&[
            (CountingKey::InningsPitched, 17.0 / 3.0),
            (CountingKey::EarnedRuns, 2.0),
        ]);
        let rates = derive_rates(&t);
        assert!(approx_eq(rates[&RateKey::EarnedRunAverage], 18.0 * 3.0 / 17.0, 1e-12));
    }

    #[test]
    fn merge_sums_only_selected_keys() {
        let keys = CountingKeySet::new([CountingKey::Hits, CountingKey::AtBats]);
        let mut base = totals(&[(CountingKey::Hits, 1.0)]);
        let record = totals(&[
            (CountingKey::Hits, 2.0),
            (CountingKey::AtBats, 4.0),
            (CountingKey::HomeRuns, 1.0),
        ]);
        merge(&mut base, &record, &keys);
        assert_eq!(base.get(&CountingKey::Hits), Some(&3.0));
        assert_eq!(base.get(&CountingKey::AtBats), Some(&4.0));
        assert!(!base.contains_key(&CountingKey::HomeRuns));
    }

    #[test]
    fn merge_line_ignores_fielded_rates() {
        let mut line = StatLine::new().with(CountingKey::Hits, 1.0).with(CountingKey::AtBats, 3.0);
        line.set_code("AVG", 0.333).unwrap();

        let mut map = StatMap::default();
        map.merge_line(&line, &CountingKeySet::default());
        map.merge_line(&line, &CountingKeySet::default());
        map.derive_rates();

        assert_eq!(map.get(CountingKey::Hits), 2.0);
        assert!(approx_eq(map.rate(RateKey::BattingAverage), 2.0 / 6.0, 1e-12));
    }

    #[test]
    fn empty_map_has_all_rates_at_zero() {
        let map = StatMap::empty();
        assert!(map.counting.is_empty());
        for key in RateKey::ALL {
            assert_eq!(map.rates.get(&key), Some(&0.0));
        }
    }

    #[test]
    fn counting_key_set_rejects_rate_codes() {
        assert_eq!(
            CountingKeySet::from_codes(&["AB", "AVG"]),
            Err(UnknownStatCode("AVG".into()))
        );
        let set = CountingKeySet::from_codes(&["H", "AB", "H"]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(CountingKey::Hits));
    }

    #[test]
    fn stat_map_serializes_as_flat_code_object() {
        let mut map = StatMap::default();
        map.counting.insert(CountingKey::Doubles, 2.0);
        map.derive_rates();
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["2B"], 2.0);
        assert_eq!(json["AVG"], 0.0);

        let back: StatMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn stat_line_rejects_unknown_codes_on_deserialize() {
        let result: Result<StatLine, _> = serde_json::from_str(r#"{"AB": 4, "XYZ": 1}"#);
        assert!(result.is_err());
    }
}
