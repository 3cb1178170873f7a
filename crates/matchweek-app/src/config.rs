// Configuration loading and parsing (league.toml, simulation.toml).

use std::path::{Path, PathBuf};

use matchweek_core::simulator::MatchModel;
use matchweek_core::team;
use serde::Deserialize;
use thiserror::Error;

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

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub model: MatchModel,
    pub prediction: PredictionConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    /// Seed for the match rng. Absent means seed from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Optional `name,power` CSV imported after the static teams.
    #[serde(default)]
    pub roster_csv: Option<String>,
    #[serde(default)]
    pub teams: Vec<TeamEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub name: String,
    pub power: u32,
}

// ---------------------------------------------------------------------------
// simulation.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct SimulationFile {
    match_model: MatchModel,
    prediction: PredictionConfig,
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
    pub trials: u32,
    /// Worker threads for trials; 0 uses rayon's default.
    #[serde(default)]
    pub workers: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Log directory, relative to the working directory. When absent the
    /// platform data directory is used.
    #[serde(default)]
    pub directory: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// `config/simulation.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    let simulation_path = config_dir.join("simulation.toml");
    let simulation_text = read_file(&simulation_path)?;
    let simulation_file: SimulationFile =
        toml::from_str(&simulation_text).map_err(|e| ConfigError::ParseError {
            path: simulation_path.clone(),
            source: e,
        })?;

    let config = Config {
        league: league_file.league,
        model: simulation_file.match_model,
        prediction: simulation_file.prediction,
        logging: simulation_file.logging,
    };

    validate(&config)?;

    Ok(config)
}

/// Outcome of [`load_config`]: the validated config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// Directory the `config/` and `defaults/` paths were resolved against.
    pub base_dir: PathBuf,
    /// Files seeded from `defaults/` on this run, in name order.
    pub seeded: Vec<PathBuf>,
}

/// Seed `config/` from `defaults/` without touching files the user already
/// has. Returns the files written, sorted by name. `.example` files are
/// templates for the user and never seeded.
///
/// A base directory with neither `defaults/` nor `config/` is an error; one
/// with only `config/` is left as is.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither defaults/ nor config/ directory found in {}; \
                 run from the crate root or ensure defaults/ is present",
                base_dir.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create {}: {e}", config_dir.display()),
    })?;

    let mut seeded = Vec::new();
    for source in default_files(&defaults_dir)? {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);
        if seed_file(&source, &target)? {
            seeded.push(target);
        }
    }
    Ok(seeded)
}

/// Seedable files under `defaults/`, sorted so seeding order is stable.
fn default_files(defaults_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read {}: {e}", defaults_dir.display()),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ConfigError::DefaultsCopyError {
                message: format!("failed to read defaults entry: {e}"),
            })?
            .path();
        let is_template = path.extension().is_some_and(|ext| ext == "example");
        if path.is_file() && !is_template {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Copy `source` to `target` unless `target` exists. `create_new` makes the
/// existence check and the create a single step.
fn seed_file(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let copy_err = |what: &str, path: &Path, e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to {what} {}: {e}", path.display()),
    };

    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(copy_err("create", target, e)),
    };
    let content = std::fs::read(source).map_err(|e| copy_err("read", source, e))?;
    std::io::Write::write_all(&mut dest, &content).map_err(|e| copy_err("write", target, e))?;
    Ok(true)
}

/// Seed missing config files, then load and validate, all relative to the
/// current working directory.
///
/// Tracing is not up yet when this runs (its filter comes from the config),
/// so the seeded files are returned for the caller to log.
pub fn load_config() -> Result<LoadedConfig, ConfigError> {
    let base_dir = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    let seeded = ensure_config_files(&base_dir)?;
    let config = load_config_from(&base_dir)?;
    Ok(LoadedConfig {
        config,
        base_dir,
        seeded,
    })
}

impl Config {
    /// Resolve the log directory against `base_dir`.
    pub fn log_dir(&self, base_dir: &Path) -> PathBuf {
        match self.logging.directory.as_deref() {
            Some(dir) if !dir.trim().is_empty() => base_dir.join(dir),
            _ => directories::ProjectDirs::from("", "", "matchweek")
                .map(|dirs| dirs.data_local_dir().join("logs"))
                .unwrap_or_else(|| base_dir.join("logs")),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.league.name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.name".into(),
            message: "must not be empty".into(),
        });
    }

    let mut seen: Vec<String> = Vec::new();
    for (i, entry) in config.league.teams.iter().enumerate() {
        let name = team::validate_team(&entry.name, entry.power).map_err(|e| {
            ConfigError::ValidationError {
                field: format!("league.teams[{i}]"),
                message: e.to_string(),
            }
        })?;
        if seen.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            return Err(ConfigError::ValidationError {
                field: format!("league.teams[{i}].name"),
                message: format!("duplicate team name '{name}'"),
            });
        }
        seen.push(name);
    }

    let model = &config.model;
    if !(1.0..=2.0).contains(&model.home_advantage) {
        return Err(ConfigError::ValidationError {
            field: "match_model.home_advantage".into(),
            message: format!(
                "must be between 1.0 and 2.0 inclusive, got {}",
                model.home_advantage
            ),
        });
    }
    if model.base_expected_goals <= 0.0 || !model.base_expected_goals.is_finite() {
        return Err(ConfigError::ValidationError {
            field: "match_model.base_expected_goals".into(),
            message: format!("must be > 0, got {}", model.base_expected_goals),
        });
    }
    if model.max_goals == 0 {
        return Err(ConfigError::ValidationError {
            field: "match_model.max_goals".into(),
            message: "must be > 0".into(),
        });
    }

    let prediction = &config.prediction;
    let positive: &[(&str, u64)] = &[
        ("prediction.trials", prediction.trials as u64),
        ("prediction.timeout_secs", prediction.timeout_secs),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
