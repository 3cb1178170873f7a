// Line-oriented console protocol: one command per input line, one JSON
// envelope per output line.

use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::service::{LeagueHandle, ServiceResult};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Teams,
    AddTeam { name: String, power: u32 },
    RemoveTeam { id: u32 },
    Fixtures { week: Option<u32> },
    Generate,
    State,
    PlayWeek,
    PlayAll,
    SetResult { id: u32, home: u32, away: u32 },
    Reset,
    Standings,
    Predictions,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseCommandError {
    pub message: String,
}

impl ParseCommandError {
    fn new(message: impl Into<String>) -> Self {
        ParseCommandError {
            message: message.into(),
        }
    }
}

pub const HELP: &[&str] = &[
    "teams                         list teams",
    "add-team <power> <name...>    add a team (power 1-100)",
    "remove-team <id>              remove a team",
    "fixtures [week]               list fixtures, optionally for one week",
    "generate                      generate the double round-robin schedule",
    "state                         league state, table, results and odds",
    "play-week                     play the next week",
    "play-all                      play every remaining week",
    "set-result <id> <home> <away> set a fixture's score",
    "reset                         clear the schedule and all results",
    "standings                     league table",
    "predictions                   title odds",
    "help                          this list",
    "quit                          exit",
];

fn parse_number(field: &str, raw: Option<&str>) -> Result<u32, ParseCommandError> {
    let raw = raw.ok_or_else(|| ParseCommandError::new(format!("missing {field}")))?;
    raw.parse::<u32>().map_err(|_| {
        ParseCommandError::new(format!("{field} must be a non-negative integer, got '{raw}'"))
    })
}

fn no_more(mut rest: std::str::SplitWhitespace<'_>) -> Result<(), ParseCommandError> {
    match rest.next() {
        Some(extra) => Err(ParseCommandError::new(format!(
            "unexpected argument '{extra}'"
        ))),
        None => Ok(()),
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err(ParseCommandError::new("empty command"));
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "teams" => Command::Teams,
            "add-team" => {
                let power = parse_number("power", parts.next())?;
                let name = parts.by_ref().collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    return Err(ParseCommandError::new("missing team name"));
                }
                return Ok(Command::AddTeam { name, power });
            }
            "remove-team" => Command::RemoveTeam {
                id: parse_number("team id", parts.next())?,
            },
            "fixtures" => Command::Fixtures {
                week: match parts.next() {
                    Some(w) => Some(parse_number("week", Some(w))?),
                    None => None,
                },
            },
            "generate" => Command::Generate,
            "state" => Command::State,
            "play-week" => Command::PlayWeek,
            "play-all" => Command::PlayAll,
            "set-result" => Command::SetResult {
                id: parse_number("fixture id", parts.next())?,
                home: parse_number("home score", parts.next())?,
                away: parse_number("away score", parts.next())?,
            },
            "reset" => Command::Reset,
            "standings" => Command::Standings,
            "predictions" => Command::Predictions,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => {
                return Err(ParseCommandError::new(format!(
                    "unknown command '{other}', try 'help'"
                )))
            }
        };
        no_more(parts)?;
        Ok(cmd)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SuccessEnvelope<'a> {
    success: bool,
    data: &'a Value,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: bool,
    message: &'a str,
}

/// Outcome of one command, rendered as a single JSON line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Error(String),
}

impl Response {
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Response::Success(value),
            Err(e) => Response::Error(format!("failed to encode response: {e}")),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn to_json_line(&self) -> String {
        let encoded = match self {
            Response::Success(data) => serde_json::to_string(&SuccessEnvelope {
                success: true,
                data,
            }),
            Response::Error(message) => serde_json::to_string(&ErrorEnvelope {
                error: true,
                message,
            }),
        };
        encoded.unwrap_or_else(|e| json!({ "error": true, "message": e.to_string() }).to_string())
    }
}

impl From<ParseCommandError> for Response {
    fn from(e: ParseCommandError) -> Self {
        Response::Error(e.message)
    }
}

fn respond<T: Serialize>(result: ServiceResult<T>) -> Response {
    match result {
        Ok(data) => Response::ok(&data),
        Err(e) => {
            warn!("Command failed: {}", e);
            Response::Error(e.to_string())
        }
    }
}

/// Run `cmd` against the service. `Quit` is answered here but stopping the
/// input loop is the caller's job.
pub async fn execute(handle: &LeagueHandle, cmd: Command) -> Response {
    info!("Executing {:?}", cmd);
    match cmd {
        Command::Teams => Response::ok(&handle.teams()),
        Command::AddTeam { name, power } => respond(handle.add_team(&name, power).await),
        Command::RemoveTeam { id } => respond(handle.remove_team(id).await),
        Command::Fixtures { week } => Response::ok(&handle.fixtures(week)),
        Command::Generate => respond(handle.generate_fixtures().await),
        Command::State => respond(handle.full_state().await),
        Command::PlayWeek => respond(handle.play_week().await),
        Command::PlayAll => respond(handle.play_all().await),
        Command::SetResult { id, home, away } => {
            respond(handle.override_result(id, home, away).await)
        }
        Command::Reset => match handle.reset().await {
            Ok(()) => Response::ok(&handle.state()),
            Err(e) => Response::Error(e.to_string()),
        },
        Command::Standings => Response::ok(&handle.standings()),
        Command::Predictions => respond(handle.predictions().await),
        Command::Help => Response::ok(&HELP),
        Command::Quit => Response::ok(&"bye"),
    }
}

/// Parse and run one input line.
pub async fn handle_line(handle: &LeagueHandle, line: &str) -> Response {
    match line.parse::<Command>() {
        Ok(cmd) => execute(handle, cmd).await,
        Err(e) => {
            warn!("Rejected input {:?}: {}", line, e);
            e.into()
        }
    }
}
