// League table aggregation and ranking.
//
// The table is a pure fold over played fixtures. Ranking is a strict total
// order: points, goal difference, goals scored, then team name, so the
// display and the prediction engine always agree on who is first.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LeagueError, LeagueResult};
use crate::fixture::Fixture;
use crate::team::{Team, TeamId};

pub const POINTS_FOR_WIN: u32 = 3;
pub const POINTS_FOR_DRAW: u32 = 1;

/// One ranked row of the league table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// 1-based table position.
    pub position: u32,
    pub team_id: TeamId,
    pub team_name: String,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
}

/// Running totals for one team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Record {
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
}

impl Record {
    pub fn goal_difference(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }

    // Counters saturate so a corrupt score can skew the table but never panic.
    fn credit(&mut self, scored: u32, conceded: u32) {
        self.played = self.played.saturating_add(1);
        self.goals_for = self.goals_for.saturating_add(scored);
        self.goals_against = self.goals_against.saturating_add(conceded);
        match scored.cmp(&conceded) {
            Ordering::Greater => {
                self.won = self.won.saturating_add(1);
                self.points = self.points.saturating_add(POINTS_FOR_WIN);
            }
            Ordering::Equal => {
                self.drawn = self.drawn.saturating_add(1);
                self.points = self.points.saturating_add(POINTS_FOR_DRAW);
            }
            Ordering::Less => self.lost = self.lost.saturating_add(1),
        }
    }
}

/// Ranking comparator: `Less` means `a` sits above `b`.
pub fn rank_order(a: &Record, a_name: &str, b: &Record, b_name: &str) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goal_difference().cmp(&a.goal_difference()))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
        .then_with(|| a_name.cmp(b_name))
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TableIndex {
    teams: Vec<Team>,
    slot: HashMap<TeamId, usize>,
}

/// Accumulator over a fixed set of teams.
///
/// Team metadata is shared between clones, so cloning a table only copies the
/// per-team counters. The prediction engine relies on that to fork one table
/// per trial.
#[derive(Debug, Clone)]
pub struct Table {
    index: Arc<TableIndex>,
    records: Vec<Record>,
}

impl Table {
    pub fn new(teams: &[Team]) -> Self {
        let teams = teams.to_vec();
        let slot = teams.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
        let records = vec![Record::default(); teams.len()];
        Table {
            index: Arc::new(TableIndex { teams, slot }),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, team: TeamId) -> Option<&Record> {
        self.index.slot.get(&team).map(|&i| &self.records[i])
    }

    fn slot(&self, team: TeamId) -> LeagueResult<usize> {
        self.index
            .slot
            .get(&team)
            .copied()
            .ok_or(LeagueError::UnknownTeam { id: team })
    }

    /// Credit a result to both sides.
    pub fn apply(
        &mut self,
        home: TeamId,
        away: TeamId,
        home_goals: u32,
        away_goals: u32,
    ) -> LeagueResult<()> {
        let h = self.slot(home)?;
        let a = self.slot(away)?;
        self.records[h].credit(home_goals, away_goals);
        self.records[a].credit(away_goals, home_goals);
        Ok(())
    }

    /// Fold a fixture into the table. Unplayed fixtures are ignored.
    pub fn apply_fixture(&mut self, fixture: &Fixture) -> LeagueResult<()> {
        match fixture.score() {
            Some((h, a)) => self.apply(fixture.home_team, fixture.away_team, h, a),
            None => Ok(()),
        }
    }

    /// Id of the team ranked first, without sorting the whole table.
    pub fn leader(&self) -> Option<TeamId> {
        self.leader_slot().map(|i| self.index.teams[i].id)
    }

    pub(crate) fn leader_slot(&self) -> Option<usize> {
        let teams = &self.index.teams;
        (0..self.records.len()).min_by(|&i, &j| {
            rank_order(
                &self.records[i],
                &teams[i].name,
                &self.records[j],
                &teams[j].name,
            )
            .then_with(|| teams[i].id.cmp(&teams[j].id))
        })
    }

    /// The full table in rank order.
    pub fn ranked(&self) -> Vec<Standing> {
        let teams = &self.index.teams;
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.sort_by(|&i, &j| {
            rank_order(
                &self.records[i],
                &teams[i].name,
                &self.records[j],
                &teams[j].name,
            )
            .then_with(|| teams[i].id.cmp(&teams[j].id))
        });

        order
            .into_iter()
            .enumerate()
            .map(|(pos, i)| {
                let r = &self.records[i];
                Standing {
                    position: pos as u32 + 1,
                    team_id: teams[i].id,
                    team_name: teams[i].name.clone(),
                    played: r.played,
                    won: r.won,
                    drawn: r.drawn,
                    lost: r.lost,
                    goals_for: r.goals_for,
                    goals_against: r.goals_against,
                    goal_difference: r.goal_difference(),
                    points: r.points,
                }
            })
            .collect()
    }

    pub(crate) fn teams(&self) -> &[Team] {
        &self.index.teams
    }
}

/// Build the ranked table for `teams` from every played fixture.
///
/// Every team gets a row, including teams that have not played. Fails with
/// `UnknownTeam` when a played fixture names a team outside `teams`.
pub fn compute(teams: &[Team], fixtures: &[Fixture]) -> LeagueResult<Vec<Standing>> {
    let mut table = Table::new(teams);
    for fixture in fixtures {
        table.apply_fixture(fixture)?;
    }
    Ok(table.ranked())
}
