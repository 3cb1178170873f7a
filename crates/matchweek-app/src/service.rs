// League service: a single task that owns the roster, the season and the
// match rng.
//
// Mutations arrive as commands over an mpsc channel and are applied one at a
// time. After each successful mutation the task publishes an immutable
// snapshot on a watch channel; readers clone the current Arc and never see a
// half-played week. Predictions run off the actor on a blocking thread so a
// long Monte Carlo run does not hold up mutations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use matchweek_core::standings;
use matchweek_core::{
    schedule, CancelToken, Fixture, FixtureId, LeagueError, LeagueState, MatchModel, Prediction,
    PredictionEngine, Roster, RosterStore, SeasonController, Standing, Team, TeamId, WeekResults,
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    League(#[from] LeagueError),

    #[error("league service is not running")]
    Closed,

    #[error("prediction timed out after {secs}s")]
    TimedOut { secs: u64 },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Everything a reader needs, captured between two mutations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueSnapshot {
    /// Bumped on every published change.
    pub version: u64,
    pub taken_at: DateTime<Utc>,
    pub teams: Vec<Team>,
    pub state: LeagueState,
    pub fixtures: Vec<Fixture>,
    pub standings: Vec<Standing>,
}

impl LeagueSnapshot {
    pub fn fixtures_for_week(&self, week: u32) -> Vec<Fixture> {
        self.fixtures
            .iter()
            .filter(|f| f.week == week)
            .cloned()
            .collect()
    }

    pub fn fixtures_by_week(&self) -> WeekResults {
        let mut weeks: WeekResults = BTreeMap::new();
        for f in &self.fixtures {
            weeks.entry(f.week).or_default().push(f.clone());
        }
        weeks
    }

    pub fn current_week_results(&self) -> Vec<Fixture> {
        match self.state.current_week {
            0 => Vec::new(),
            week => self.fixtures_for_week(week),
        }
    }
}

/// The combined view: state, table, latest results, calendar and odds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    pub league_state: LeagueState,
    pub standings: Vec<Standing>,
    pub current_week_results: Vec<Fixture>,
    pub all_matches: WeekResults,
    pub predictions: Vec<Prediction>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, LeagueError>>;

/// Mutations handled by the service task.
#[derive(Debug)]
pub enum LeagueCommand {
    AddTeam {
        name: String,
        power: u32,
        reply: Reply<Team>,
    },
    RemoveTeam {
        id: TeamId,
        reply: Reply<Team>,
    },
    GenerateFixtures {
        reply: Reply<Vec<Fixture>>,
    },
    PlayWeek {
        reply: Reply<Vec<Fixture>>,
    },
    PlayAll {
        cancel: Option<CancelToken>,
        reply: Reply<WeekResults>,
    },
    OverrideResult {
        id: FixtureId,
        home_score: u32,
        away_score: u32,
        reply: Reply<Fixture>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Startup parameters for [`spawn`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub model: MatchModel,
    pub engine: PredictionEngine,
    pub prediction_timeout: Duration,
    /// Fixed rng seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            model: MatchModel::default(),
            engine: PredictionEngine::default(),
            prediction_timeout: Duration::from_secs(10),
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct LeagueActor {
    roster: Roster,
    season: SeasonController,
    rng: ChaCha20Rng,
    version: u64,
    snapshot_tx: watch::Sender<Arc<LeagueSnapshot>>,
}

impl LeagueActor {
    fn build_snapshot(&self) -> LeagueSnapshot {
        let teams = self.roster.teams();
        let fixtures = self.season.fixtures().to_vec();
        let standings = standings::compute(&teams, &fixtures).unwrap_or_else(|e| {
            warn!("Could not compute standings: {}", e);
            Vec::new()
        });
        LeagueSnapshot {
            version: self.version,
            taken_at: Utc::now(),
            teams,
            state: self.season.state(),
            fixtures,
            standings,
        }
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = Arc::new(self.build_snapshot());
        debug!("Publishing snapshot v{}", snapshot.version);
        self.snapshot_tx.send_replace(snapshot);
    }

    fn check_roster_unlocked(&self) -> Result<(), LeagueError> {
        if self.season.is_scheduled() {
            return Err(LeagueError::RosterLocked);
        }
        Ok(())
    }

    /// Apply one command. Returns false when the loop should stop.
    fn handle(&mut self, cmd: LeagueCommand) -> bool {
        match cmd {
            LeagueCommand::AddTeam { name, power, reply } => {
                let result = self
                    .check_roster_unlocked()
                    .and_then(|_| self.roster.add(&name, power));
                if let Ok(team) = &result {
                    info!("Added team {} ({}) with power {}", team.name, team.id, team.power);
                    self.publish();
                }
                let _ = reply.send(result);
            }
            LeagueCommand::RemoveTeam { id, reply } => {
                let result = self
                    .check_roster_unlocked()
                    .and_then(|_| self.roster.remove(id));
                if let Ok(team) = &result {
                    info!("Removed team {} ({})", team.name, team.id);
                    self.publish();
                }
                let _ = reply.send(result);
            }
            LeagueCommand::GenerateFixtures { reply } => {
                let teams = self.roster.teams();
                let result = self
                    .season
                    .generate_fixtures(&teams)
                    .map(|fixtures| fixtures.to_vec());
                if result.is_ok() {
                    self.publish();
                }
                let _ = reply.send(result);
            }
            LeagueCommand::PlayWeek { reply } => {
                let result = self.season.play_week(&mut self.rng);
                if result.is_ok() {
                    self.publish();
                }
                let _ = reply.send(result);
            }
            LeagueCommand::PlayAll { cancel, reply } => {
                let result = self.season.play_all(&mut self.rng, cancel.as_ref());
                if result.is_ok() {
                    self.publish();
                }
                let _ = reply.send(result);
            }
            LeagueCommand::OverrideResult {
                id,
                home_score,
                away_score,
                reply,
            } => {
                let result = self.season.override_result(id, home_score, away_score);
                if result.is_ok() {
                    info!("Fixture {} set to {}-{}", id, home_score, away_score);
                    self.publish();
                }
                let _ = reply.send(result);
            }
            LeagueCommand::Reset { reply } => {
                self.season.reset();
                self.publish();
                let _ = reply.send(());
            }
            LeagueCommand::Shutdown => return false,
        }
        true
    }
}

async fn run(mut actor: LeagueActor, mut cmd_rx: mpsc::Receiver<LeagueCommand>) {
    info!("League service started");
    while let Some(cmd) = cmd_rx.recv().await {
        if !actor.handle(cmd) {
            info!("Shutdown command received");
            break;
        }
    }
    info!("League service stopped");
}

/// Start the service task with `roster` as the initial team list.
pub fn spawn(roster: Roster, settings: ServiceSettings) -> (LeagueHandle, JoinHandle<()>) {
    let rng = match settings.seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    };
    // Prediction seeds come from a separate stream so asking for odds never
    // shifts the match results.
    let mut seeds = rng.clone();
    seeds.set_stream(1);

    let season = SeasonController::new(settings.model);
    let mut actor = LeagueActor {
        roster,
        season,
        rng,
        version: 0,
        snapshot_tx: watch::channel(Arc::new(LeagueSnapshot {
            version: 0,
            taken_at: Utc::now(),
            teams: Vec::new(),
            state: LeagueState::default(),
            fixtures: Vec::new(),
            standings: Vec::new(),
        }))
        .0,
    };
    let snapshot_rx = actor.snapshot_tx.subscribe();
    actor.publish();

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let task = tokio::spawn(run(actor, cmd_rx));

    let handle = LeagueHandle {
        cmd_tx,
        snapshot_rx,
        model: settings.model,
        engine: settings.engine,
        prediction_timeout: settings.prediction_timeout,
        seeds: Arc::new(Mutex::new(seeds)),
    };
    (handle, task)
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable client for the service. Reads come from the latest snapshot;
/// mutations are queued to the service task.
#[derive(Debug, Clone)]
pub struct LeagueHandle {
    cmd_tx: mpsc::Sender<LeagueCommand>,
    snapshot_rx: watch::Receiver<Arc<LeagueSnapshot>>,
    model: MatchModel,
    engine: PredictionEngine,
    prediction_timeout: Duration,
    seeds: Arc<Mutex<ChaCha20Rng>>,
}

impl LeagueHandle {
    pub fn snapshot(&self) -> Arc<LeagueSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> ServiceResult<Arc<LeagueSnapshot>> {
        self.snapshot_rx
            .changed()
            .await
            .map_err(|_| ServiceError::Closed)?;
        Ok(self.snapshot_rx.borrow_and_update().clone())
    }

    pub fn teams(&self) -> Vec<Team> {
        self.snapshot().teams.clone()
    }

    /// All fixtures, or one week's when `week` is given.
    pub fn fixtures(&self, week: Option<u32>) -> Vec<Fixture> {
        let snapshot = self.snapshot();
        match week {
            Some(w) => snapshot.fixtures_for_week(w),
            None => snapshot.fixtures.clone(),
        }
    }

    pub fn state(&self) -> LeagueState {
        self.snapshot().state
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.snapshot().standings.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> LeagueCommand,
    ) -> ServiceResult<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| ServiceError::Closed)?;
        let result = rx.await.map_err(|_| ServiceError::Closed)?;
        Ok(result?)
    }

    pub async fn add_team(&self, name: &str, power: u32) -> ServiceResult<Team> {
        let name = name.to_string();
        self.request(|reply| LeagueCommand::AddTeam { name, power, reply })
            .await
    }

    pub async fn remove_team(&self, id: TeamId) -> ServiceResult<Team> {
        self.request(|reply| LeagueCommand::RemoveTeam { id, reply })
            .await
    }

    pub async fn generate_fixtures(&self) -> ServiceResult<Vec<Fixture>> {
        self.request(|reply| LeagueCommand::GenerateFixtures { reply })
            .await
    }

    pub async fn play_week(&self) -> ServiceResult<Vec<Fixture>> {
        self.request(|reply| LeagueCommand::PlayWeek { reply }).await
    }

    pub async fn play_all(&self) -> ServiceResult<WeekResults> {
        self.play_all_until(None).await
    }

    /// Play the remaining weeks, stopping between weeks once `cancel` fires.
    pub async fn play_all_until(&self, cancel: Option<CancelToken>) -> ServiceResult<WeekResults> {
        self.request(|reply| LeagueCommand::PlayAll { cancel, reply })
            .await
    }

    pub async fn override_result(
        &self,
        id: FixtureId,
        home_score: u32,
        away_score: u32,
    ) -> ServiceResult<Fixture> {
        self.request(|reply| LeagueCommand::OverrideResult {
            id,
            home_score,
            away_score,
            reply,
        })
        .await
    }

    pub async fn reset(&self) -> ServiceResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(LeagueCommand::Reset { reply: tx })
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(LeagueCommand::Shutdown).await;
    }

    /// Title odds for the current snapshot.
    ///
    /// Before a schedule exists the odds are computed over a provisional
    /// calendar for the current roster, which is not stored. Trials that have
    /// not started when the timeout expires are cancelled.
    pub async fn predictions(&self) -> ServiceResult<Vec<Prediction>> {
        let snapshot = self.snapshot();
        self.predict_for(&snapshot).await
    }

    async fn predict_for(&self, snapshot: &LeagueSnapshot) -> ServiceResult<Vec<Prediction>> {
        let teams = if snapshot.state.fixtures_created {
            team_subset(&snapshot.teams, &snapshot.fixtures)
        } else {
            snapshot.teams.clone()
        };
        let fixtures = if snapshot.state.fixtures_created || teams.len() < 2 {
            snapshot.fixtures.clone()
        } else {
            schedule::generate(&teams)?
        };
        let (played, remaining): (Vec<Fixture>, Vec<Fixture>) =
            fixtures.into_iter().partition(|f| f.played());

        let seed = self.next_seed();
        let engine = self.engine;
        let model = self.model;
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let job = tokio::task::spawn_blocking(move || {
            engine.predict_seeded(&teams, &played, &remaining, &model, seed, Some(&worker_cancel))
        });

        match tokio::time::timeout(self.prediction_timeout, job).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(e)) => {
                warn!("Prediction worker failed: {}", e);
                Err(ServiceError::Closed)
            }
            Err(_) => {
                cancel.cancel();
                warn!(
                    "Prediction timed out after {:?}, cancelling remaining trials",
                    self.prediction_timeout
                );
                Err(ServiceError::TimedOut {
                    secs: self.prediction_timeout.as_secs(),
                })
            }
        }
    }

    /// State, table, latest results, calendar and odds from one snapshot.
    pub async fn full_state(&self) -> ServiceResult<FullState> {
        let snapshot = self.snapshot();
        let predictions = self.predict_for(&snapshot).await?;
        Ok(FullState {
            league_state: snapshot.state,
            standings: snapshot.standings.clone(),
            current_week_results: snapshot.current_week_results(),
            all_matches: snapshot.fixtures_by_week(),
            predictions,
        })
    }

    fn next_seed(&self) -> u64 {
        match self.seeds.lock() {
            Ok(mut rng) => rng.next_u64(),
            Err(poisoned) => poisoned.into_inner().next_u64(),
        }
    }
}

/// Teams that appear in the schedule. The roster is locked while a schedule
/// exists, so this is the whole roster in practice.
fn team_subset(teams: &[Team], fixtures: &[Fixture]) -> Vec<Team> {
    teams
        .iter()
        .filter(|t| fixtures.iter().any(|f| f.involves(t.id)))
        .cloned()
        .collect()
}
