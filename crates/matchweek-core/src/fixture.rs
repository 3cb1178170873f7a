// Fixture representation: one scheduled match between two teams in a week.

use serde::{Deserialize, Serialize};

use crate::team::TeamId;

pub type FixtureId = u32;

/// A scheduled match. Week and sides are fixed at generation; only the score
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: FixtureId,
    /// 1-indexed matchweek.
    pub week: u32,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

/// Result of a played fixture from the home side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub fn from_score(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Less => Outcome::AwayWin,
        }
    }
}

impl Fixture {
    pub fn new(id: FixtureId, week: u32, home_team: TeamId, away_team: TeamId) -> Self {
        Fixture {
            id,
            week,
            home_team,
            away_team,
            home_score: None,
            away_score: None,
        }
    }

    /// Played means both scores are present.
    pub fn played(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }

    pub fn score(&self) -> Option<(u32, u32)> {
        Some((self.home_score?, self.away_score?))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.score().map(|(h, a)| Outcome::from_score(h, a))
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn set_score(&mut self, home: u32, away: u32) {
        self.home_score = Some(home);
        self.away_score = Some(away);
    }
}
