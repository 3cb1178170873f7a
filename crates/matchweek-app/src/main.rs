// Matchweek entry point.
//
// Startup sequence:
// 1. Load config (copying defaults on first run)
// 2. Initialize tracing (log to file, stdout is the JSON channel)
// 3. Build the roster from config, the optional CSV and the defaults
// 4. Spawn the league service
// 5. Read commands from stdin until quit, EOF or Ctrl+C

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use matchweek_app::config::{self, Config, LoadedConfig};
use matchweek_app::protocol::{self, Command};
use matchweek_app::service::{self, ServiceSettings};
use matchweek_core::{PredictionEngine, Roster};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let LoadedConfig {
        config,
        base_dir: cwd,
        seeded,
    } = config::load_config().context("failed to load configuration")?;

    init_tracing(&config, &cwd)?;
    info!(
        "Matchweek starting: league={}, {} configured teams",
        config.league.name,
        config.league.teams.len()
    );
    for path in &seeded {
        info!("Seeded {} from defaults", path.display());
    }

    let roster = build_roster(&config, &cwd).context("failed to build roster")?;
    info!("Roster ready with {} teams", roster.len());

    let settings = ServiceSettings {
        model: config.model,
        engine: PredictionEngine::new(config.prediction.trials, config.prediction.workers),
        prediction_timeout: Duration::from_secs(config.prediction.timeout_secs),
        seed: config.league.seed,
    };
    let (handle, service_task) = service::spawn(roster, settings);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let quit = matches!(trimmed.parse::<Command>(), Ok(Command::Quit));
                let response = protocol::handle_line(&handle, trimmed).await;
                stdout.write_all(response.to_json_line().as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                if quit {
                    info!("Quit command received");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), service_task).await;

    info!("Matchweek shut down cleanly");
    Ok(())
}

/// Static teams from league.toml, then the optional CSV. An empty result is
/// seeded with the default clubs.
fn build_roster(config: &Config, base_dir: &Path) -> anyhow::Result<Roster> {
    let mut roster = Roster::new();
    for entry in &config.league.teams {
        roster
            .add(&entry.name, entry.power)
            .with_context(|| format!("invalid team '{}' in league.toml", entry.name))?;
    }

    if let Some(csv) = config.league.roster_csv.as_deref() {
        let path = base_dir.join(csv);
        let added = roster
            .import_csv_file(&path)
            .with_context(|| format!("failed to import roster from {}", path.display()))?;
        if added == 0 {
            warn!("Roster CSV {} contained no usable rows", path.display());
        }
    }

    if roster.is_empty() {
        roster.seed_defaults();
    }
    Ok(roster)
}

/// Initialize tracing to log to a file (stdout carries the JSON responses).
fn init_tracing(config: &Config, base_dir: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = config.log_dir(base_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_file = std::fs::File::create(log_dir.join("matchweek.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
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
