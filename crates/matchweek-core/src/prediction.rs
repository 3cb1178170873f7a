// Monte Carlo title odds.
//
// Each trial forks the current table, simulates every remaining fixture in
// week order and credits the trial to whoever ranks first. Trials run on a
// rayon pool; every trial owns a ChaCha20 stream keyed by its index, so the
// outcome does not depend on how trials are spread over threads.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{LeagueError, LeagueResult};
use crate::fixture::Fixture;
use crate::simulator::MatchModel;
use crate::standings::Table;
use crate::team::{Team, TeamId};

pub const DEFAULT_TRIALS: u32 = 5000;

/// Estimated probability that a team finishes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub team_id: TeamId,
    pub team_name: String,
    /// 0.0..=100.0
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionEngine {
    pub trials: u32,
    /// Worker threads; 0 uses rayon's global pool.
    pub workers: usize,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        PredictionEngine {
            trials: DEFAULT_TRIALS,
            workers: 0,
        }
    }
}

impl PredictionEngine {
    pub fn new(trials: u32, workers: usize) -> Self {
        PredictionEngine { trials, workers }
    }

    /// Predict with a base seed drawn from `rng`.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        teams: &[Team],
        played: &[Fixture],
        remaining: &[Fixture],
        model: &MatchModel,
        rng: &mut R,
        cancel: Option<&CancelToken>,
    ) -> LeagueResult<Vec<Prediction>> {
        let seed = rng.next_u64();
        self.predict_seeded(teams, played, remaining, model, seed, cancel)
    }

    /// Predict from an explicit base seed. The same inputs and seed always
    /// give the same percentages, whatever the worker count.
    ///
    /// Results are ordered by percentage, highest first, then by the current
    /// table. Fails with `InvalidTrialCount` for zero trials and `Cancelled`
    /// if `cancel` fires before every trial has run.
    pub fn predict_seeded(
        &self,
        teams: &[Team],
        played: &[Fixture],
        remaining: &[Fixture],
        model: &MatchModel,
        seed: u64,
        cancel: Option<&CancelToken>,
    ) -> LeagueResult<Vec<Prediction>> {
        if self.trials == 0 {
            return Err(LeagueError::InvalidTrialCount);
        }
        if teams.is_empty() {
            return Ok(Vec::new());
        }

        let mut base = Table::new(teams);
        for fixture in played {
            base.apply_fixture(fixture)?;
        }

        let mut pending: Vec<&Fixture> = remaining.iter().filter(|f| !f.played()).collect();
        pending.sort_by_key(|f| (f.week, f.id));
        let mut pairings = Vec::with_capacity(pending.len());
        for f in &pending {
            let home = lookup(teams, f.home_team)?;
            let away = lookup(teams, f.away_team)?;
            pairings.push((home, away));
        }

        let counts = if pairings.is_empty() {
            // Nothing left to play: the current leader takes every trial.
            let mut counts = vec![0u64; base.len()];
            if let Some(slot) = base.leader_slot() {
                counts[slot] = self.trials as u64;
            }
            counts
        } else {
            self.run_trials(&base, &pairings, model, seed, cancel)?
        };

        let total = self.trials as f64;
        let ranked = base.ranked();
        let table_pos = |id: TeamId| {
            ranked
                .iter()
                .position(|s| s.team_id == id)
                .unwrap_or(usize::MAX)
        };

        let mut predictions: Vec<Prediction> = base
            .teams()
            .iter()
            .zip(counts)
            .map(|(team, wins)| Prediction {
                team_id: team.id,
                team_name: team.name.clone(),
                percentage: wins as f64 * 100.0 / total,
            })
            .collect();
        predictions.sort_by(|a, b| {
            b.percentage
                .total_cmp(&a.percentage)
                .then_with(|| table_pos(a.team_id).cmp(&table_pos(b.team_id)))
        });

        info!(
            "Ran {} trials over {} remaining fixtures",
            self.trials,
            pending.len()
        );
        Ok(predictions)
    }

    fn run_trials(
        &self,
        base: &Table,
        pairings: &[(&Team, &Team)],
        model: &MatchModel,
        seed: u64,
        cancel: Option<&CancelToken>,
    ) -> LeagueResult<Vec<u64>> {
        let slots = base.len();
        let run = || {
            (0..self.trials)
                .into_par_iter()
                .try_fold(
                    || vec![0u64; slots],
                    |mut counts, trial| {
                        if cancel.is_some_and(|c| c.is_cancelled()) {
                            return Err(LeagueError::Cancelled);
                        }
                        let leader = run_trial(base, pairings, model, seed, trial)?;
                        counts[leader] += 1;
                        Ok(counts)
                    },
                )
                .try_reduce(
                    || vec![0u64; slots],
                    |mut acc, counts| {
                        for (a, c) in acc.iter_mut().zip(counts) {
                            *a += c;
                        }
                        Ok(acc)
                    },
                )
        };

        if self.workers == 0 {
            return run();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!("could not build prediction pool, using global pool: {}", e);
                run()
            }
        }
    }
}

/// Play out one trial and return the table slot of the winner.
fn run_trial(
    base: &Table,
    pairings: &[(&Team, &Team)],
    model: &MatchModel,
    seed: u64,
    trial: u32,
) -> LeagueResult<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(trial as u64);

    let mut table = base.clone();
    for (home, away) in pairings {
        let (h, a) = model.simulate(home, away, &mut rng);
        table.apply(home.id, away.id, h, a)?;
    }
    let slot = table.leader_slot().ok_or(LeagueError::InsufficientTeams { found: 0 })?;
    debug!("trial {} won by {}", trial, table.teams()[slot].name);
    Ok(slot)
}

fn lookup(teams: &[Team], id: TeamId) -> LeagueResult<&Team> {
    teams
        .iter()
        .find(|t| t.id == id)
        .ok_or(LeagueError::UnknownTeam { id })
}
