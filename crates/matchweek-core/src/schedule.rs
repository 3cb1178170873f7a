// Double round-robin fixture generation (circle method).
//
// One team stays fixed while the others rotate around it, producing n-1
// rounds of n/2 pairings. Odd rosters get a virtual bye slot whose pairings
// are dropped. The second leg mirrors the first with home and away swapped.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::error::{LeagueError, LeagueResult};
use crate::fixture::{Fixture, FixtureId};
use crate::team::{Team, TeamId};

/// Number of weeks in a double round-robin for `team_count` teams. Odd counts
/// are padded with a bye slot, so 5 teams play over 10 weeks.
pub fn total_weeks(team_count: usize) -> u32 {
    if team_count < 2 {
        return 0;
    }
    let padded = team_count + team_count % 2;
    2 * (padded as u32 - 1)
}

/// Generate the full calendar for `teams` in the given order.
///
/// Fixture ids start at 1 and follow week order. Fails with
/// `InsufficientTeams` for fewer than two teams and `DuplicateTeamName` when
/// two teams share a name, since the table tie-break needs distinct names.
pub fn generate(teams: &[Team]) -> LeagueResult<Vec<Fixture>> {
    if teams.len() < 2 {
        return Err(LeagueError::InsufficientTeams { found: teams.len() });
    }
    let mut names = HashSet::new();
    for team in teams {
        if !names.insert(team.name.to_ascii_lowercase()) {
            return Err(LeagueError::DuplicateTeamName {
                name: team.name.clone(),
            });
        }
    }

    let first_leg = single_round_robin(teams);
    let rounds = total_weeks(teams.len()) / 2;

    let mut fixtures = Vec::with_capacity(first_leg.len() * 2);
    let mut next_id: FixtureId = 1;
    for &(week, home, away) in &first_leg {
        fixtures.push(Fixture::new(next_id, week, home, away));
        next_id += 1;
    }
    for &(week, home, away) in &first_leg {
        fixtures.push(Fixture::new(next_id, week + rounds, away, home));
        next_id += 1;
    }

    debug!(
        "Generated {} fixtures over {} weeks for {} teams",
        fixtures.len(),
        rounds * 2,
        teams.len()
    );
    debug_assert!(verify(teams, &fixtures).is_ok());

    Ok(fixtures)
}

/// First leg as `(week, home, away)` triples.
fn single_round_robin(teams: &[Team]) -> Vec<(u32, TeamId, TeamId)> {
    let mut slots: Vec<Option<TeamId>> = teams.iter().map(|t| Some(t.id)).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    let mut pairings = Vec::with_capacity(n / 2 * (n - 1));

    for round in 0..n - 1 {
        let week = round as u32 + 1;

        for i in 0..n / 2 {
            let (Some(a), Some(b)) = (slots[i], slots[n - 1 - i]) else {
                continue; // bye
            };
            // Flip every pairing on odd rounds.
            if round % 2 == 0 {
                pairings.push((week, a, b));
            } else {
                pairings.push((week, b, a));
            }
        }

        // Keep slot 0 fixed, rotate the rest one step clockwise.
        slots[1..].rotate_right(1);
    }

    pairings
}

// ---------------------------------------------------------------------------
// Structural checks
// ---------------------------------------------------------------------------

/// A broken double round-robin invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleViolation {
    #[error("team {team} has {home} home and {away} away fixtures, expected {expected} each")]
    Unbalanced {
        team: TeamId,
        home: usize,
        away: usize,
        expected: usize,
    },

    #[error("team {team} plays more than once in week {week}")]
    DoubleBooked { team: TeamId, week: u32 },

    #[error("pair {a}-{b} does not meet exactly once each way")]
    PairMismatch { a: TeamId, b: TeamId },

    #[error("weeks are not contiguous from 1 to {expected}")]
    WeekGap { expected: u32 },

    #[error("fixture {id} references a team outside the roster")]
    ForeignTeam { id: FixtureId },
}

/// Check every structural invariant of a generated schedule.
pub fn verify(teams: &[Team], fixtures: &[Fixture]) -> Result<(), ScheduleViolation> {
    let ids: HashSet<TeamId> = teams.iter().map(|t| t.id).collect();
    let expected = teams.len().saturating_sub(1);

    let mut home_counts: HashMap<TeamId, usize> = HashMap::new();
    let mut away_counts: HashMap<TeamId, usize> = HashMap::new();
    let mut booked: HashSet<(TeamId, u32)> = HashSet::new();
    let mut directed: HashMap<(TeamId, TeamId), usize> = HashMap::new();
    let mut weeks: HashSet<u32> = HashSet::new();

    for f in fixtures {
        if !ids.contains(&f.home_team) || !ids.contains(&f.away_team) || f.home_team == f.away_team
        {
            return Err(ScheduleViolation::ForeignTeam { id: f.id });
        }
        *home_counts.entry(f.home_team).or_default() += 1;
        *away_counts.entry(f.away_team).or_default() += 1;
        for team in [f.home_team, f.away_team] {
            if !booked.insert((team, f.week)) {
                return Err(ScheduleViolation::DoubleBooked { team, week: f.week });
            }
        }
        *directed.entry((f.home_team, f.away_team)).or_default() += 1;
        weeks.insert(f.week);
    }

    for team in teams {
        let home = home_counts.get(&team.id).copied().unwrap_or(0);
        let away = away_counts.get(&team.id).copied().unwrap_or(0);
        if home != expected || away != expected {
            return Err(ScheduleViolation::Unbalanced {
                team: team.id,
                home,
                away,
                expected,
            });
        }
    }

    for (i, a) in teams.iter().enumerate() {
        for b in &teams[i + 1..] {
            let ab = directed.get(&(a.id, b.id)).copied().unwrap_or(0);
            let ba = directed.get(&(b.id, a.id)).copied().unwrap_or(0);
            if ab != 1 || ba != 1 {
                return Err(ScheduleViolation::PairMismatch { a: a.id, b: b.id });
            }
        }
    }

    let last = total_weeks(teams.len());
    if weeks.len() as u32 != last || (1..=last).any(|w| !weeks.contains(&w)) {
        return Err(ScheduleViolation::WeekGap { expected: last });
    }

    Ok(())
}
