// Season lifecycle: NotStarted -> FixturesGenerated -> InProgress -> Completed.
//
// The controller owns the fixture list and the league state. Every transition
// validates first and mutates last, so a failed call leaves nothing changed.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{LeagueError, LeagueResult};
use crate::fixture::{Fixture, FixtureId};
use crate::prediction::{Prediction, PredictionEngine};
use crate::schedule;
use crate::simulator::MatchModel;
use crate::standings::{self, Standing};
use crate::team::{Team, TeamId};

/// Progress counters for the current season.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueState {
    pub fixtures_created: bool,
    /// Last week played, 0 before kickoff.
    pub current_week: u32,
    pub total_weeks: u32,
    /// True once any week has been played.
    pub started: bool,
    pub completed: bool,
}

/// The lifecycle stage derived from [`LeagueState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "week", rename_all = "camelCase")]
pub enum SeasonPhase {
    NotStarted,
    FixturesGenerated,
    InProgress(u32),
    Completed,
}

impl LeagueState {
    pub fn phase(&self) -> SeasonPhase {
        if !self.fixtures_created {
            SeasonPhase::NotStarted
        } else if self.completed {
            SeasonPhase::Completed
        } else if self.current_week == 0 {
            SeasonPhase::FixturesGenerated
        } else {
            SeasonPhase::InProgress(self.current_week)
        }
    }
}

/// Highest score a manual override may set for either side.
pub const MAX_OVERRIDE_GOALS: u32 = 99;

/// Results grouped by week.
pub type WeekResults = BTreeMap<u32, Vec<Fixture>>;

#[derive(Debug, Clone, Default)]
pub struct SeasonController {
    model: MatchModel,
    /// Roster as it was when the schedule was generated.
    teams: Vec<Team>,
    fixtures: Vec<Fixture>,
    state: LeagueState,
}

impl SeasonController {
    pub fn new(model: MatchModel) -> Self {
        SeasonController {
            model,
            ..Default::default()
        }
    }

    pub fn model(&self) -> &MatchModel {
        &self.model
    }

    pub fn state(&self) -> LeagueState {
        self.state
    }

    pub fn is_scheduled(&self) -> bool {
        self.state.fixtures_created
    }

    /// Teams taking part in the scheduled season. Empty before generation.
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    /// Fixtures in `week`. Weeks outside the season give an empty list.
    pub fn fixtures_for_week(&self, week: u32) -> Vec<Fixture> {
        self.fixtures
            .iter()
            .filter(|f| f.week == week)
            .cloned()
            .collect()
    }

    pub fn fixtures_by_week(&self) -> WeekResults {
        let mut weeks = WeekResults::new();
        for f in &self.fixtures {
            weeks.entry(f.week).or_default().push(f.clone());
        }
        weeks
    }

    /// Fixtures of the most recently played week.
    pub fn current_week_results(&self) -> Vec<Fixture> {
        if self.state.current_week == 0 {
            return Vec::new();
        }
        self.fixtures_for_week(self.state.current_week)
    }

    pub fn fixture(&self, id: FixtureId) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.id == id)
    }

    /// Split fixtures into `(played, remaining)`.
    pub fn split_fixtures(&self) -> (Vec<Fixture>, Vec<Fixture>) {
        self.fixtures.iter().cloned().partition(|f| f.played())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Schedule a double round-robin for `teams`.
    pub fn generate_fixtures(&mut self, teams: &[Team]) -> LeagueResult<&[Fixture]> {
        if self.state.fixtures_created {
            return Err(LeagueError::AlreadyScheduled);
        }
        let fixtures = schedule::generate(teams)?;

        self.teams = teams.to_vec();
        self.fixtures = fixtures;
        self.state = LeagueState {
            fixtures_created: true,
            current_week: 0,
            total_weeks: schedule::total_weeks(teams.len()),
            started: false,
            completed: false,
        };
        info!(
            "Generated {} fixtures for {} teams over {} weeks",
            self.fixtures.len(),
            self.teams.len(),
            self.state.total_weeks
        );
        Ok(&self.fixtures)
    }

    /// Simulate every unplayed fixture of the next week and advance.
    ///
    /// Returns that week's fixtures, including any whose result was set by
    /// [`override_result`](Self::override_result) beforehand.
    pub fn play_week<R: Rng + ?Sized>(&mut self, rng: &mut R) -> LeagueResult<Vec<Fixture>> {
        self.check_playable()?;
        let week = self.state.current_week + 1;

        let mut results = Vec::new();
        for (idx, f) in self.fixtures.iter().enumerate() {
            if f.week != week || f.played() {
                continue;
            }
            let home = self.team(f.home_team)?;
            let away = self.team(f.away_team)?;
            results.push((idx, self.model.simulate(home, away, rng)));
        }

        for (idx, (h, a)) in results {
            self.fixtures[idx].set_score(h, a);
        }
        self.state.current_week = week;
        self.state.started = true;
        self.state.completed = week == self.state.total_weeks;

        info!(
            "Played week {}/{}{}",
            week,
            self.state.total_weeks,
            if self.state.completed { ", season complete" } else { "" }
        );
        Ok(self.fixtures_for_week(week))
    }

    /// Play weeks until the season completes or `cancel` fires. Cancellation
    /// is only observed between weeks; weeks already played stay played.
    pub fn play_all<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        cancel: Option<&CancelToken>,
    ) -> LeagueResult<WeekResults> {
        self.check_playable()?;

        let mut played = WeekResults::new();
        while !self.state.completed {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                info!("play-all stopped after week {}", self.state.current_week);
                break;
            }
            let week = self.state.current_week + 1;
            let fixtures = self.play_week(rng)?;
            played.insert(week, fixtures);
        }
        Ok(played)
    }

    /// Drop the schedule and every result. Always succeeds.
    pub fn reset(&mut self) {
        self.teams.clear();
        self.fixtures.clear();
        self.state = LeagueState::default();
        info!("Season reset");
    }

    /// Set a fixture's score by hand, played or not. The week counter does
    /// not move. Scores above [`MAX_OVERRIDE_GOALS`] are rejected.
    pub fn override_result(
        &mut self,
        id: FixtureId,
        home_score: u32,
        away_score: u32,
    ) -> LeagueResult<Fixture> {
        if let Some(score) = [home_score, away_score]
            .into_iter()
            .find(|&s| s > MAX_OVERRIDE_GOALS)
        {
            return Err(LeagueError::ScoreOutOfRange {
                score,
                max: MAX_OVERRIDE_GOALS,
            });
        }
        let fixture = self
            .fixtures
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(LeagueError::UnknownFixture { id })?;
        debug!(
            "Override fixture {}: {:?} -> {}-{}",
            id,
            fixture.score(),
            home_score,
            away_score
        );
        fixture.set_score(home_score, away_score);
        Ok(fixture.clone())
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    pub fn standings(&self) -> LeagueResult<Vec<Standing>> {
        standings::compute(&self.teams, &self.fixtures)
    }

    pub fn predict<R: Rng + ?Sized>(
        &self,
        engine: &PredictionEngine,
        rng: &mut R,
        cancel: Option<&CancelToken>,
    ) -> LeagueResult<Vec<Prediction>> {
        let (played, remaining) = self.split_fixtures();
        engine.predict(&self.teams, &played, &remaining, &self.model, rng, cancel)
    }

    fn check_playable(&self) -> LeagueResult<()> {
        if !self.state.fixtures_created {
            return Err(LeagueError::NotScheduled);
        }
        if self.state.completed {
            return Err(LeagueError::SeasonComplete {
                total_weeks: self.state.total_weeks,
            });
        }
        Ok(())
    }

    fn team(&self, id: TeamId) -> LeagueResult<&Team> {
        self.teams
            .iter()
            .find(|t| t.id == id)
            .ok_or(LeagueError::UnknownTeam { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::Outcome;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn equal_teams(n: u32) -> Vec<Team> {
        (1..=n)
            .map(|id| Team {
                id,
                name: format!("Club {id}"),
                power: 70,
            })
            .collect()
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(2024)
    }

    #[test]
    fn fresh_controller_is_not_started() {
        let season = SeasonController::default();
        assert_eq!(season.state().phase(), SeasonPhase::NotStarted);
        assert!(season.fixtures().is_empty());
        assert!(season.current_week_results().is_empty());
    }

    #[test]
    fn play_before_generation_fails() {
        let mut season = SeasonController::default();
        assert_eq!(
            season.play_week(&mut rng()).unwrap_err(),
            LeagueError::NotScheduled
        );
        assert_eq!(
            season.play_all(&mut rng(), None).unwrap_err(),
            LeagueError::NotScheduled
        );
    }

    #[test]
    fn generate_twice_fails_and_keeps_schedule() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        let before = season.fixtures().to_vec();
        assert_eq!(
            season.generate_fixtures(&equal_teams(6)).unwrap_err(),
            LeagueError::AlreadyScheduled
        );
        assert_eq!(season.fixtures(), before.as_slice());
    }

    #[test]
    fn failed_generation_leaves_state_untouched() {
        let mut season = SeasonController::default();
        assert_eq!(
            season.generate_fixtures(&equal_teams(1)).unwrap_err(),
            LeagueError::InsufficientTeams { found: 1 }
        );
        assert_eq!(season.state(), LeagueState::default());
        assert!(season.teams().is_empty());
    }

    #[test]
    fn four_team_season_runs_to_completion() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        assert_eq!(season.state().phase(), SeasonPhase::FixturesGenerated);
        assert_eq!(season.state().total_weeks, 6);

        let weeks = season.play_all(&mut rng(), None).unwrap();
        assert_eq!(weeks.len(), 6);

        let state = season.state();
        assert_eq!(state.current_week, 6);
        assert!(state.completed);
        assert!(state.started);
        assert_eq!(state.phase(), SeasonPhase::Completed);

        let table = season.standings().unwrap();
        assert_eq!(table.len(), 4);
        let draws = season
            .fixtures()
            .iter()
            .filter(|f| f.outcome() == Some(Outcome::Draw))
            .count() as u32;
        let decisive = 12 - draws;
        let points: u32 = table.iter().map(|s| s.points).sum();
        assert_eq!(points, 3 * decisive + 2 * draws);
    }

    #[test]
    fn play_week_after_completion_keeps_week() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(2)).unwrap();
        season.play_all(&mut rng(), None).unwrap();
        assert_eq!(
            season.play_week(&mut rng()).unwrap_err(),
            LeagueError::SeasonComplete { total_weeks: 2 }
        );
        assert_eq!(season.state().current_week, 2);
        assert!(matches!(
            season.play_all(&mut rng(), None).unwrap_err(),
            LeagueError::SeasonComplete { .. }
        ));
    }

    #[test]
    fn play_week_plays_exactly_one_week() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        let played = season.play_week(&mut rng()).unwrap();
        assert_eq!(played.len(), 2);
        assert!(played.iter().all(|f| f.week == 1 && f.played()));
        assert_eq!(season.state().phase(), SeasonPhase::InProgress(1));
        assert!(season
            .fixtures()
            .iter()
            .filter(|f| f.week > 1)
            .all(|f| !f.played()));
        assert_eq!(season.current_week_results(), played);
    }

    #[test]
    fn same_seed_reproduces_season() {
        let run = || {
            let mut season = SeasonController::default();
            season.generate_fixtures(&equal_teams(6)).unwrap();
            season.play_all(&mut rng(), None).unwrap();
            season.fixtures().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn override_keeps_week_and_survives_play() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        let target = season.fixtures_for_week(2)[0].id;

        let updated = season.override_result(target, 9, 0).unwrap();
        assert_eq!(updated.score(), Some((9, 0)));
        assert_eq!(season.state().current_week, 0);

        season.play_week(&mut rng()).unwrap();
        season.play_week(&mut rng()).unwrap();
        assert_eq!(season.fixture(target).unwrap().score(), Some((9, 0)));
    }

    #[test]
    fn override_replaces_played_score() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        let played = season.play_week(&mut rng()).unwrap();
        let id = played[0].id;
        season.override_result(id, 0, 4).unwrap();
        assert_eq!(season.fixture(id).unwrap().score(), Some((0, 4)));
        assert_eq!(season.state().current_week, 1);
    }

    #[test]
    fn override_unknown_fixture_fails() {
        let mut season = SeasonController::default();
        assert_eq!(
            season.override_result(1, 1, 1).unwrap_err(),
            LeagueError::UnknownFixture { id: 1 }
        );
        season.generate_fixtures(&equal_teams(4)).unwrap();
        assert_eq!(
            season.override_result(999, 1, 1).unwrap_err(),
            LeagueError::UnknownFixture { id: 999 }
        );
    }

    #[test]
    fn override_rejects_huge_scores_without_mutating() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        let fixtures = season.fixtures_for_week(1);
        let (first, second) = (fixtures[0].id, fixtures[1].id);

        assert_eq!(
            season.override_result(first, u32::MAX, 0).unwrap_err(),
            LeagueError::ScoreOutOfRange {
                score: u32::MAX,
                max: MAX_OVERRIDE_GOALS
            }
        );
        assert_eq!(
            season
                .override_result(second, 1, MAX_OVERRIDE_GOALS + 1)
                .unwrap_err(),
            LeagueError::ScoreOutOfRange {
                score: MAX_OVERRIDE_GOALS + 1,
                max: MAX_OVERRIDE_GOALS
            }
        );
        assert!(season.fixtures().iter().all(|f| !f.played()));

        // The bound itself is accepted, repeatedly, and the table still adds up.
        for f in season.fixtures().to_vec() {
            season
                .override_result(f.id, MAX_OVERRIDE_GOALS, MAX_OVERRIDE_GOALS)
                .unwrap();
        }
        let table = season.standings().unwrap();
        assert!(table
            .iter()
            .all(|s| s.goals_for == 6 * MAX_OVERRIDE_GOALS && s.drawn == 6));
    }

    #[test]
    fn reset_is_idempotent_and_allows_regeneration() {
        let mut season = SeasonController::default();
        season.reset();
        season.generate_fixtures(&equal_teams(5)).unwrap();
        season.play_week(&mut rng()).unwrap();
        season.reset();
        season.reset();
        assert_eq!(season.state(), LeagueState::default());
        assert!(season.fixtures().is_empty());

        let teams = equal_teams(5);
        season.generate_fixtures(&teams).unwrap();
        schedule::verify(&teams, season.fixtures()).unwrap();
        assert_eq!(season.state().total_weeks, 10);
    }

    #[test]
    fn cancelled_play_all_stops_between_weeks() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let played = season.play_all(&mut rng(), Some(&token)).unwrap();
        assert!(played.is_empty());
        assert_eq!(season.state().current_week, 0);
    }

    #[test]
    fn fixtures_for_week_out_of_range_is_empty() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        assert!(season.fixtures_for_week(0).is_empty());
        assert!(season.fixtures_for_week(7).is_empty());
        assert_eq!(season.fixtures_by_week().len(), 6);
    }

    #[test]
    fn odd_roster_plays_full_season() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(3)).unwrap();
        let weeks = season.play_all(&mut rng(), None).unwrap();
        assert_eq!(weeks.len(), 6);
        assert!(weeks.values().all(|fixtures| fixtures.len() == 1));
        let table = season.standings().unwrap();
        assert!(table.iter().all(|s| s.played == 4));
    }

    #[test]
    fn predictions_after_completion_favor_champion() {
        let mut season = SeasonController::default();
        season.generate_fixtures(&equal_teams(4)).unwrap();
        season.play_all(&mut rng(), None).unwrap();
        let champion = season.standings().unwrap()[0].team_id;
        let predictions = season
            .predict(&PredictionEngine::new(50, 0), &mut rng(), None)
            .unwrap();
        assert_eq!(predictions[0].team_id, champion);
        assert_eq!(predictions[0].percentage, 100.0);
    }
}
