// League error taxonomy shared by every engine component.

use thiserror::Error;

use crate::fixture::FixtureId;
use crate::team::TeamId;

/// Every recoverable failure the engine can report.
///
/// None of these leave state partially mutated: an operation that returns an
/// error has not changed the roster, the schedule or the league state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeagueError {
    #[error("need at least 2 teams to generate fixtures, found {found}")]
    InsufficientTeams { found: usize },

    #[error("fixtures have already been generated for this season")]
    AlreadyScheduled,

    #[error("fixtures not generated yet")]
    NotScheduled,

    #[error("season already completed after {total_weeks} weeks")]
    SeasonComplete { total_weeks: u32 },

    #[error("no fixture with id {id}")]
    UnknownFixture { id: FixtureId },

    #[error("score {score} is out of range, at most {max} goals per side")]
    ScoreOutOfRange { score: u32, max: u32 },

    #[error("no team with id {id}")]
    UnknownTeam { id: TeamId },

    #[error("a team named '{name}' already exists")]
    DuplicateTeamName { name: String },

    #[error("invalid team `{field}`: {message}")]
    InvalidTeam { field: String, message: String },

    #[error("roster cannot change while a schedule exists; reset the season first")]
    RosterLocked,

    #[error("prediction needs at least one trial")]
    InvalidTrialCount,

    #[error("operation cancelled")]
    Cancelled,
}

pub type LeagueResult<T> = Result<T, LeagueError>;
