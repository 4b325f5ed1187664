// bullpen command-line driver.
//
// Startup sequence:
// 1. Parse arguments
// 2. Load config (created from defaults on first run)
// 3. Initialize tracing (log to file, stdout is reserved for JSON output)
// 4. Open database
// 5. Run the command and print its result as pretty JSON

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bullpen_core::config::{self, LoggingConfig};
use bullpen_core::engine::{Engine, RefreshSummary};
use bullpen_core::import;
use bullpen_core::model::{PlayerId, StintId, TeamId};
use bullpen_core::store::{LeagueStore, SqliteStore};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "bullpen")]
#[command(about = "Fantasy-baseball stat aggregation and position eligibility")]
#[command(version)]
struct Cli {
    /// Database file (overrides `database.path` in config/engine.toml)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Treat this date (YYYY-MM-DD) as today
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import box-score lines from a CSV file
    ImportGames { path: PathBuf },

    /// Import teams, players and roster stints from a TOML file
    ImportLeague { path: PathBuf },

    /// Recompute one roster stint's stats
    Stint { id: StintId },

    /// Recompute a team's stint stats and total
    Team { id: TeamId },

    /// Recompute a player's position eligibility
    Eligibility {
        player: String,
        /// Season to classify from (defaults to last calendar year)
        #[arg(long)]
        season: Option<i32>,
    },

    /// Recompute every team, then every player's eligibility
    Refresh {
        /// Recomputes run concurrently
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config().context("failed to load configuration")?;
    init_tracing(&config.logging)?;
    info!("bullpen starting: {:?}", cli.command);

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    let store = SqliteStore::open(&db_path).context("failed to open database")?;
    info!("Database opened at {}", db_path);

    let mut engine = Engine::new(store, config.engine);
    if let Some(today) = cli.today {
        engine = engine.with_clock(move || today);
    }

    let output = run(cli.command, Arc::new(engine)).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Execute one command and return the JSON to print.
async fn run(command: Command, engine: Arc<Engine<SqliteStore>>) -> anyhow::Result<Value> {
    let output = match command {
        Command::ImportGames { path } => {
            let label = path.display().to_string();
            let records = blocking(&engine, move |e| import::import_box_scores(&path, e.store()))
                .await?
                .with_context(|| format!("failed to import {label}"))?;
            json!({ "records": records })
        }
        Command::ImportLeague { path } => {
            let label = path.display().to_string();
            let summary = blocking(&engine, move |e| import::import_league(&path, e.store()))
                .await?
                .with_context(|| format!("failed to import {label}"))?;
            serde_json::to_value(summary)?
        }
        Command::Stint { id } => {
            let stats = blocking(&engine, move |e| e.recompute_stint(id))
                .await?
                .with_context(|| format!("failed to recompute stint {id}"))?;
            json!({ "stint": id, "stats": stats })
        }
        Command::Team { id } => {
            let total = blocking(&engine, move |e| e.recompute_team(id))
                .await?
                .with_context(|| format!("failed to recompute team {id}"))?;
            json!({ "team": id, "total": total })
        }
        Command::Eligibility { player, season } => {
            let id = PlayerId::new(player);
            let update = {
                let id = id.clone();
                blocking(&engine, move |e| e.recompute_eligibility(&id, season)).await?
            }
            .with_context(|| format!("failed to recompute eligibility for {id}"))?;
            let mut value = serde_json::to_value(update)?;
            value["player"] = json!(id);
            value
        }
        Command::Refresh { jobs } => serde_json::to_value(refresh(engine, jobs).await?)?,
    };
    Ok(output)
}

/// Run a synchronous engine call on the blocking pool.
async fn blocking<T, F>(engine: &Arc<Engine<SqliteStore>>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Engine<SqliteStore>) -> T + Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .context("engine task panicked")
}

/// Recompute all teams, then all players, with at most `jobs` recomputes in
/// flight. Same counts as `Engine::refresh_all`.
async fn refresh(engine: Arc<Engine<SqliteStore>>, jobs: usize) -> anyhow::Result<RefreshSummary> {
    if jobs <= 1 {
        return blocking(&engine, |e| e.refresh_all())
            .await?
            .context("refresh failed");
    }

    let (teams, players) = blocking(&engine, |e| {
        let teams = e.store().team_ids().context("failed to list teams")?;
        let players = e.store().player_ids().context("failed to list players")?;
        anyhow::Ok((teams, players))
    })
    .await??;
    let permits = Arc::new(Semaphore::new(jobs));
    let mut summary = RefreshSummary::default();

    // Teams first, then players, as in the serial pass.
    let mut tasks = JoinSet::new();
    for team in teams {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let engine = Arc::clone(&engine);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            engine.refresh_team(team)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        summary.absorb(&joined.context("team task panicked")?);
    }

    for player in players {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let engine = Arc::clone(&engine);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            engine.refresh_player(&player)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        summary.absorb(&joined.context("eligibility task panicked")?);
    }

    info!(?summary, jobs, "refresh complete");
    Ok(summary)
}

/// Initialize tracing to log to a file under the configured directory.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join(&logging.directory);
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("bullpen.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullpen_core::config::EngineConfig;
    use bullpen_core::stats::CountingKey;
    use bullpen_core::import::{load_box_scores_from_reader, LeagueFile};

    const LEAGUE: &str = r#"
[[teams]]
id = 1
name = "Lions"

[[teams]]
id = 2
name = "Monkeys"

[[players]]
id = "A001"
name = "Wang"
position = "Shortstop"

[[players]]
id = "B002"
name = "Chen"
position = "Catcher"

[[players]]
id = "C003"
name = "Lin"

[[stints]]
id = 1
team = 1
player = "A001"
position = "SS"
start_date = 2024-04-01

[[stints]]
id = 2
team = 2
player = "B002"
position = "C"
start_date = 2024-04-01

[[stints]]
id = 3
team = 2
player = "C003"
position = "BN"
start_date = 2024-04-01
"#;

    const GAMES: &str = "\
game_id,game_date,player_id,role,position,AB,H,HR
G1,2024-04-02,A001,batter,SS,4,2,1
G1,2024-04-02,B002,batter,C,3,1,0
G2,2024-04-03,A001,batter,SS,5,1,0
G2,2024-04-03,C003,batter,LF,4,4,2
";

    fn engine() -> Arc<Engine<SqliteStore>> {
        let store = SqliteStore::open(":memory:").unwrap();
        LeagueFile::parse(LEAGUE, "league.toml")
            .unwrap()
            .apply(&store, "league.toml")
            .unwrap();
        let records = load_box_scores_from_reader(GAMES.as_bytes(), "games.csv").unwrap();
        store.upsert_records(&records).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        Arc::new(Engine::new(store, EngineConfig::default()).with_clock(move || today))
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["bullpen", "stint", "7"]).unwrap();
        assert!(matches!(cli.command, Command::Stint { id: 7 }));

        let cli = Cli::try_parse_from(["bullpen", "eligibility", "A001", "--season", "2023"]).unwrap();
        match cli.command {
            Command::Eligibility { player, season } => {
                assert_eq!(player, "A001");
                assert_eq!(season, Some(2023));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["bullpen", "refresh"]).unwrap();
        assert!(matches!(cli.command, Command::Refresh { jobs: 4 }));
    }

    #[test]
    fn global_options_follow_subcommand() {
        let cli = Cli::try_parse_from(["bullpen", "team", "2", "--today", "2024-06-01", "--db", "x.db"]).unwrap();
        assert_eq!(cli.today, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(cli.db.as_deref(), Some("x.db"));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["bullpen", "stint", "seven"]).is_err());
        assert!(Cli::try_parse_from(["bullpen", "team", "1", "--today", "June"]).is_err());
        assert!(Cli::try_parse_from(["bullpen"]).is_err());
    }

    #[tokio::test]
    async fn team_command_prints_total() {
        let output = run(Command::Team { id: 2 }, engine()).await.unwrap();
        assert_eq!(output["team"], json!(2));
        // The bench stint does not count.
        assert_eq!(output["total"]["H"], json!(1.0));
        assert_eq!(output["total"]["AB"], json!(3.0));
    }

    #[tokio::test]
    async fn eligibility_command_reports_season() {
        let output = run(
            Command::Eligibility {
                player: "B002".into(),
                season: None,
            },
            engine(),
        )
        .await
        .unwrap();
        assert_eq!(output["status"], json!("replaced"));
        assert_eq!(output["season"], json!(2024));
        assert_eq!(output["player"], json!("B002"));
        assert_eq!(output["positions"], json!(["UTIL", "C"]));
    }

    #[tokio::test]
    async fn missing_stint_is_an_error() {
        let err = run(Command::Stint { id: 99 }, engine()).await.unwrap_err();
        assert!(format!("{err:#}").contains("stint 99"));
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../bullpen-core/tests/fixtures")
            .join(name)
    }

    #[tokio::test]
    async fn import_games_command_writes_through_engine_store() {
        let engine = engine();
        let output = run(
            Command::ImportGames {
                path: fixture("box_scores.csv"),
            },
            Arc::clone(&engine),
        )
        .await
        .unwrap();
        assert_eq!(output["records"], json!(8));

        // A001's four fixture games join the two already stored.
        let output = run(Command::Team { id: 1 }, engine).await.unwrap();
        assert_eq!(output["total"]["AB"], json!(25.0));
    }

    #[tokio::test]
    async fn import_failure_names_the_file() {
        let err = run(
            Command::ImportLeague {
                path: fixture("missing.toml"),
            },
            engine(),
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[tokio::test]
    async fn parallel_refresh_matches_serial() {
        let parallel = engine();
        let serial = engine();

        let a = refresh(Arc::clone(&parallel), 3).await.unwrap();
        let b = refresh(Arc::clone(&serial), 1).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.teams_updated, 2);
        assert_eq!(a.players_updated, 3);
        assert_eq!(a.inactive_stints_updated, 1);
        // The bench stint is refreshed outside the team total.
        for engine in [&parallel, &serial] {
            let bench = engine.store().stint(3).unwrap().stats;
            assert_eq!(bench.get(CountingKey::Hits), 4.0);
        }

        for team in [1, 2] {
            assert_eq!(
                parallel.store().team(team).unwrap().total_stats,
                serial.store().team(team).unwrap().total_stats
            );
        }
        assert_eq!(
            parallel.store().player(&PlayerId::new("A001")).unwrap().eligible_positions,
            serial.store().player(&PlayerId::new("A001")).unwrap().eligible_positions
        );
    }
}
