// Round-robin league engine: scheduling, match simulation, standings and
// Monte Carlo title predictions.

pub mod cancel;
pub mod error;
pub mod fixture;
pub mod prediction;
pub mod schedule;
pub mod season;
pub mod simulator;
pub mod standings;
pub mod team;

pub use cancel::CancelToken;
pub use error::{LeagueError, LeagueResult};
pub use fixture::{Fixture, FixtureId, Outcome};
pub use prediction::{Prediction, PredictionEngine};
pub use season::{LeagueState, MAX_OVERRIDE_GOALS, SeasonController, SeasonPhase, WeekResults};
pub use simulator::MatchModel;
pub use standings::Standing;
pub use team::{Roster, RosterImportError, RosterStore, Team, TeamId};
