// Configuration loading and validation (config/engine.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::stats::CountingKeySet;

/// Bundled defaults, written to `config/engine.toml` when it is missing.
pub const DEFAULT_ENGINE_TOML: &str = include_str!("../defaults/engine.toml");

// ---------------------------------------------------------------------------
// Named defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_DB_PATH: &str = "bullpen.db";
pub const DEFAULT_LOG_FILTER: &str = "bullpen=info,bullpen_core=info,warn";
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Games at a position that alone make a player eligible there.
pub const DEFAULT_MIN_GAMES: u32 = 20;
/// Minimum games at a position for the share-of-games rule to apply.
pub const DEFAULT_MIN_SHARE_GAMES: u32 = 5;
/// Share of total games at a position that grants eligibility.
pub const DEFAULT_MIN_SHARE: f64 = 0.25;
pub const DEFAULT_MIN_STARTS: u32 = 5;
pub const DEFAULT_MIN_RELIEF_APPEARANCES: u32 = 8;
/// Substrings of a pitching line's position text that mark a start.
pub const DEFAULT_START_INDICATORS: [&str; 2] = ["start", "sp"];
/// Roster slots whose stints do not count toward team totals.
pub const DEFAULT_INACTIVE_POSITIONS: [&str; 4] = ["BN", "BE", "IL", "DL"];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to write default config: {message}")]
    DefaultsWriteError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: default_log_directory(),
        }
    }
}

/// Everything the aggregation and eligibility rules read.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub counting_keys: CountingKeySet,
    pub eligibility: EligibilityThresholds,
    /// Upper-cased roster slot codes excluded from team rollups.
    pub inactive_positions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            counting_keys: CountingKeySet::default(),
            eligibility: EligibilityThresholds::default(),
            inactive_positions: DEFAULT_INACTIVE_POSITIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Whether a stint declared at `position` counts toward team totals.
    pub fn is_active_position(&self, position: &str) -> bool {
        let code = position.trim().to_uppercase();
        !self.inactive_positions.iter().any(|p| *p == code)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EligibilityThresholds {
    #[serde(default = "default_min_games")]
    pub min_games: u32,
    #[serde(default = "default_min_share_games")]
    pub min_share_games: u32,
    #[serde(default = "default_min_share")]
    pub min_share: f64,
    #[serde(default = "default_min_starts")]
    pub min_starts: u32,
    #[serde(default = "default_min_relief_appearances")]
    pub min_relief_appearances: u32,
    #[serde(default = "default_start_indicators")]
    pub start_indicators: Vec<String>,
}

impl Default for EligibilityThresholds {
    fn default() -> Self {
        Self {
            min_games: DEFAULT_MIN_GAMES,
            min_share_games: DEFAULT_MIN_SHARE_GAMES,
            min_share: DEFAULT_MIN_SHARE,
            min_starts: DEFAULT_MIN_STARTS,
            min_relief_appearances: DEFAULT_MIN_RELIEF_APPEARANCES,
            start_indicators: default_start_indicators(),
        }
    }
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for engine.toml. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct EngineFile {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    stats: StatsSection,
    #[serde(default)]
    eligibility: EligibilityThresholds,
    #[serde(default)]
    roster: RosterSection,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    #[serde(default = "default_db_path")]
    path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StatsSection {
    #[serde(default = "default_counting_codes")]
    counting_keys: Vec<String>,
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            counting_keys: default_counting_codes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RosterSection {
    #[serde(default = "default_inactive_positions")]
    inactive_positions: Vec<String>,
}

impl Default for RosterSection {
    fn default() -> Self {
        Self {
            inactive_positions: default_inactive_positions(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_log_directory() -> String {
    DEFAULT_LOG_DIRECTORY.to_string()
}

fn default_counting_codes() -> Vec<String> {
    CountingKeySet::default()
        .iter()
        .map(|k| k.code().to_string())
        .collect()
}

fn default_min_games() -> u32 {
    DEFAULT_MIN_GAMES
}

fn default_min_share_games() -> u32 {
    DEFAULT_MIN_SHARE_GAMES
}

fn default_min_share() -> f64 {
    DEFAULT_MIN_SHARE
}

fn default_min_starts() -> u32 {
    DEFAULT_MIN_STARTS
}

fn default_min_relief_appearances() -> u32 {
    DEFAULT_MIN_RELIEF_APPEARANCES
}

fn default_start_indicators() -> Vec<String> {
    DEFAULT_START_INDICATORS.iter().map(|s| s.to_string()).collect()
}

fn default_inactive_positions() -> Vec<String> {
    DEFAULT_INACTIVE_POSITIONS.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Parse and validate engine configuration from TOML text. `path` is only
/// used in error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: EngineFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let counting_keys = CountingKeySet::from_codes(&file.stats.counting_keys).map_err(|e| {
        ConfigError::ValidationError {
            field: "stats.counting_keys".into(),
            message: format!("{e}; only counting stat codes are allowed"),
        }
    })?;

    let config = Config {
        db_path: file.database.path,
        logging: file.logging,
        engine: EngineConfig {
            counting_keys,
            eligibility: EligibilityThresholds {
                start_indicators: file
                    .eligibility
                    .start_indicators
                    .iter()
                    .map(|s| s.trim().to_lowercase())
                    .collect(),
                ..file.eligibility
            },
            inactive_positions: file
                .roster
                .inactive_positions
                .iter()
                .map(|s| s.trim().to_uppercase())
                .collect(),
        },
    };

    validate(&config)?;
    Ok(config)
}

/// Load `config/engine.toml` relative to `base_dir` without creating it.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("engine.toml");
    let text = std::fs::read_to_string(&path)
        .map_err(|_| ConfigError::FileNotFound { path: path.clone() })?;
    parse_config(&text, &path)
}

/// Write the bundled defaults to `config/engine.toml` under `base_dir` if the
/// file does not exist yet. Returns the path when a file was written.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsWriteError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let target = config_dir.join("engine.toml");
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            std::io::Write::write_all(&mut dest, DEFAULT_ENGINE_TOML.as_bytes()).map_err(|e| {
                ConfigError::DefaultsWriteError {
                    message: format!("failed to write {}: {e}", target.display()),
                }
            })?;
            Ok(Some(target))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(ConfigError::DefaultsWriteError {
            message: format!("failed to create {}: {e}", target.display()),
        }),
    }
}

/// Convenience wrapper: loads config relative to the current working
/// directory, creating it from defaults first when missing.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.engine.counting_keys.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "stats.counting_keys".into(),
            message: "must list at least one stat code".into(),
        });
    }

    let e = &config.engine.eligibility;
    let count_fields: &[(&str, u32)] = &[
        ("eligibility.min_games", e.min_games),
        ("eligibility.min_share_games", e.min_share_games),
        ("eligibility.min_starts", e.min_starts),
        ("eligibility.min_relief_appearances", e.min_relief_appearances),
    ];
    for (name, val) in count_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if !(e.min_share > 0.0 && e.min_share <= 1.0) {
        return Err(ConfigError::ValidationError {
            field: "eligibility.min_share".into(),
            message: format!("must be in (0.0, 1.0], got {}", e.min_share),
        });
    }

    if e.start_indicators.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::ValidationError {
            field: "eligibility.start_indicators".into(),
            message: "entries must not be blank".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CountingKey;
    use std::fs;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        parse_config(text, Path::new("engine.toml"))
    }

    #[test]
    fn bundled_defaults_match_named_constants() {
        let config = parse(DEFAULT_ENGINE_TOML).expect("defaults should be valid");
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.engine.eligibility.min_games, 20);
        assert_eq!(config.engine.eligibility.min_relief_appearances, 8);
    }

    #[test]
    fn overrides_are_applied_and_normalized() {
        let config = parse(
            r#"
            [stats]
            counting_keys = ["ab", "H"]

            [eligibility]
            min_games = 10
            start_indicators = [" Start "]

            [roster]
            inactive_positions = ["bn"]
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.counting_keys.len(), 2);
        assert!(config.engine.counting_keys.contains(CountingKey::AtBats));
        assert_eq!(config.engine.eligibility.min_games, 10);
        assert_eq!(config.engine.eligibility.min_share_games, DEFAULT_MIN_SHARE_GAMES);
        assert_eq!(config.engine.eligibility.start_indicators, vec!["start"]);
        assert!(!config.engine.is_active_position("BN"));
        assert!(config.engine.is_active_position("IL"));
    }

    #[test]
    fn rate_codes_are_rejected_as_counting_keys() {
        let err = parse("[stats]\ncounting_keys = [\"AB\", \"AVG\"]").unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "stats.counting_keys"),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_share_is_rejected() {
        let err = parse("[eligibility]\nmin_share = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "eligibility.min_share"));
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        let err = parse("[eligibility]\nmin_starts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "eligibility.min_starts"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = parse("[eligibility\nmin_games = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn inactive_positions_match_case_insensitively() {
        let engine = EngineConfig::default();
        assert!(!engine.is_active_position("il"));
        assert!(!engine.is_active_position(" BN "));
        assert!(engine.is_active_position("SS"));
    }

    #[test]
    fn ensure_config_file_writes_once() {
        let tmp = std::env::temp_dir().join("bullpen_config_test_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let written = ensure_config_file(&tmp).unwrap();
        assert_eq!(written, Some(tmp.join("config").join("engine.toml")));

        // A user edit survives the second call.
        fs::write(tmp.join("config/engine.toml"), "[database]\npath = \"custom.db\"\n").unwrap();
        assert_eq!(ensure_config_file(&tmp).unwrap(), None);

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.db_path, "custom.db");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_config_from_missing_dir_is_file_not_found() {
        let tmp = std::env::temp_dir().join("bullpen_config_test_missing");
        let _ = fs::remove_dir_all(&tmp);
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
