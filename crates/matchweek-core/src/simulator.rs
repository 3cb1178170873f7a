// Match outcome model: power-weighted Poisson goals with a home advantage.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::team::Team;

pub const DEFAULT_HOME_ADVANTAGE: f64 = 1.1;
pub const DEFAULT_BASE_EXPECTED_GOALS: f64 = 1.5;
pub const DEFAULT_MAX_GOALS: u32 = 7;

/// Parameters of the scoring model.
///
/// Both sides share a combined expected-goals budget of
/// `2 * base_expected_goals`, split in proportion to power, with the home
/// side's power multiplied by `home_advantage` first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchModel {
    pub home_advantage: f64,
    pub base_expected_goals: f64,
    /// Upper bound on goals for one side in one match.
    pub max_goals: u32,
}

impl Default for MatchModel {
    fn default() -> Self {
        MatchModel {
            home_advantage: DEFAULT_HOME_ADVANTAGE,
            base_expected_goals: DEFAULT_BASE_EXPECTED_GOALS,
            max_goals: DEFAULT_MAX_GOALS,
        }
    }
}

impl MatchModel {
    /// Expected goals `(home, away)` for a pairing of powers.
    pub fn expected_goals(&self, home_power: u32, away_power: u32) -> (f64, f64) {
        let home = home_power as f64 * self.home_advantage;
        let away = away_power as f64;
        let total = home + away;
        if total <= 0.0 {
            return (0.0, 0.0);
        }
        let budget = 2.0 * self.base_expected_goals;
        (budget * home / total, budget * away / total)
    }

    /// Simulate one match. The home goal count is drawn before the away one,
    /// so the result depends only on the two powers and the rng state.
    pub fn simulate<R: Rng + ?Sized>(&self, home: &Team, away: &Team, rng: &mut R) -> (u32, u32) {
        let (home_xg, away_xg) = self.expected_goals(home.power, away.power);
        let home_goals = sample_poisson(home_xg, self.max_goals, rng);
        let away_goals = sample_poisson(away_xg, self.max_goals, rng);
        debug!(
            "{} {}-{} {} (xG {:.2}/{:.2})",
            home.name, home_goals, away_goals, away.name, home_xg, away_xg
        );
        (home_goals, away_goals)
    }
}

/// Draw from Poisson(`lambda`) with Knuth's multiplication method, capped at
/// `cap`. Non-positive rates always yield 0 and consume no randomness.
pub fn sample_poisson<R: Rng + ?Sized>(lambda: f64, cap: u32, rng: &mut R) -> u32 {
    if lambda <= 0.0 || !lambda.is_finite() {
        return 0;
    }
    let limit = (-lambda).exp();
    let mut k: u32 = 0;
    let mut p = 1.0;
    loop {
        p *= rng.gen::<f64>();
        if p <= limit || k >= cap {
            break;
        }
        k += 1;
    }
    k.min(cap)
}
