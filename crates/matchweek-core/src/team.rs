// Team records and the in-memory roster store.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LeagueError, LeagueResult};

pub type TeamId = u32;

/// Lowest and highest accepted power rating.
pub const MIN_POWER: u32 = 1;
pub const MAX_POWER: u32 = 100;

/// A league participant. Read-only to the simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Strength rating in `MIN_POWER..=MAX_POWER`.
    pub power: u32,
}

/// The four clubs an empty league is seeded with.
pub fn default_teams() -> Vec<(&'static str, u32)> {
    vec![
        ("Chelsea", 85),
        ("Arsenal", 80),
        ("Manchester City", 90),
        ("Liverpool", 82),
    ]
}

/// Check a prospective team's name and power, returning the trimmed name.
pub fn validate_team(name: &str, power: u32) -> LeagueResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LeagueError::InvalidTeam {
            field: "name".into(),
            message: "team name is required".into(),
        });
    }
    if !(MIN_POWER..=MAX_POWER).contains(&power) {
        return Err(LeagueError::InvalidTeam {
            field: "power".into(),
            message: format!("must be between {MIN_POWER} and {MAX_POWER}, got {power}"),
        });
    }
    Ok(name.to_string())
}

// ---------------------------------------------------------------------------
// RosterStore
// ---------------------------------------------------------------------------

/// Lookup and iteration contract the engine consumes. Where the teams live is
/// up to the implementor.
pub trait RosterStore {
    /// All teams, ordered by id.
    fn teams(&self) -> Vec<Team>;

    fn team(&self, id: TeamId) -> Option<&Team>;
}

/// Roster held in memory. Ids are assigned sequentially from 1 and are never
/// reused after a removal.
#[derive(Debug, Clone)]
pub struct Roster {
    teams: Vec<Team>,
    next_id: TeamId,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Roster {
            teams: Vec::new(),
            next_id: 1,
        }
    }

    /// A roster holding [`default_teams`].
    pub fn with_default_teams() -> Self {
        let mut roster = Roster::new();
        roster.seed_defaults();
        roster
    }

    /// Fill an empty roster with [`default_teams`]. Returns how many teams
    /// were added (zero when the roster already had teams).
    pub fn seed_defaults(&mut self) -> usize {
        if !self.teams.is_empty() {
            return 0;
        }
        for (name, power) in default_teams() {
            let id = self.next_id;
            self.next_id += 1;
            self.teams.push(Team {
                id,
                name: name.to_string(),
                power,
            });
        }
        info!("Seeded roster with {} default teams", self.teams.len());
        self.teams.len()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Add a team after validating it. Names are unique ignoring ASCII case.
    pub fn add(&mut self, name: &str, power: u32) -> LeagueResult<Team> {
        let name = validate_team(name, power)?;
        if self
            .teams
            .iter()
            .any(|t| t.name.eq_ignore_ascii_case(&name))
        {
            return Err(LeagueError::DuplicateTeamName { name });
        }

        let team = Team {
            id: self.next_id,
            name,
            power,
        };
        self.next_id += 1;
        self.teams.push(team.clone());
        Ok(team)
    }

    pub fn remove(&mut self, id: TeamId) -> LeagueResult<Team> {
        let idx = self
            .teams
            .iter()
            .position(|t| t.id == id)
            .ok_or(LeagueError::UnknownTeam { id })?;
        Ok(self.teams.remove(idx))
    }

    /// Import `name,power` rows. Rows that fail to deserialize are skipped
    /// with a warning; a row that fails validation aborts the import and
    /// leaves the roster untouched.
    pub fn import_csv<R: Read>(&mut self, rdr: R) -> Result<usize, RosterImportError> {
        let mut staged = self.clone();
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
        let mut added = 0;

        for result in reader.deserialize::<RawTeamRow>() {
            match result {
                Ok(raw) => {
                    staged.add(&raw.name, raw.power)?;
                    added += 1;
                }
                Err(e) => {
                    warn!("skipping malformed roster row: {}", e);
                }
            }
        }

        *self = staged;
        Ok(added)
    }

    pub fn import_csv_file(&mut self, path: &Path) -> Result<usize, RosterImportError> {
        let file = std::fs::File::open(path).map_err(|e| RosterImportError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let added = self.import_csv(file)?;
        info!("Imported {} teams from {}", added, path.display());
        Ok(added)
    }
}

impl RosterStore for Roster {
    fn teams(&self) -> Vec<Team> {
        let mut teams = self.teams.clone();
        teams.sort_by_key(|t| t.id);
        teams
    }

    fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }
}

// ---------------------------------------------------------------------------
// CSV import
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RosterImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Team(#[from] LeagueError),
}

#[derive(Debug, Deserialize)]
struct RawTeamRow {
    #[serde(alias = "Name", alias = "team")]
    name: String,
    #[serde(alias = "Power", alias = "rating")]
    power: u32,
}
