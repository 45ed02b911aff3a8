use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_QUERY_PORT: u16 = 25566;
pub const DEFAULT_SERVER_PORT: u16 = 25565;
pub const DEFAULT_MAX_PLAYERS: u32 = 32;
pub const RANKS_PREFIX: &str = "QUERY_RANKS:";

/// A recognised request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Query,
    QueryJson,
    QueryRanks { player: String },
}

impl Request {
    /// Maps a request line (terminator already stripped) to a request.
    ///
    /// `QUERY` and `QUERY_JSON` match case-insensitively, the ranks prefix is
    /// case-sensitive. Anything else, including an empty line, is `None`.
    pub fn parse(line: &str) -> Option<Request> {
        if line.eq_ignore_ascii_case("QUERY") {
            Some(Request::Query)
        } else if line.eq_ignore_ascii_case("QUERY_JSON") {
            Some(Request::QueryJson)
        } else {
            line.strip_prefix(RANKS_PREFIX)
                .map(|player| Request::QueryRanks {
                    player: player.to_string(),
                })
        }
    }

    /// The newline-terminated line a client sends for this request.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Query => f.write_str("QUERY"),
            Request::QueryJson => f.write_str("QUERY_JSON"),
            Request::QueryRanks { player } => write!(f, "{}{}", RANKS_PREFIX, player),
        }
    }
}

/// Point-in-time read of the host server, taken once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
    pub server_port: u16,
    pub max_players: u32,
    pub online_players: Vec<String>,
}

impl ServerSnapshot {
    pub fn new(server_port: u16, max_players: u32, online_players: Vec<String>) -> Self {
        Self {
            server_port,
            max_players,
            online_players,
        }
    }

    pub fn player_count(&self) -> usize {
        self.online_players.len()
    }
}

/// Permission groups of one player. Unknown players map to the default
/// (empty) snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSnapshot {
    pub primary_group: String,
    pub all_groups: Vec<String>,
}

impl PermissionSnapshot {
    pub fn new(primary_group: impl Into<String>, all_groups: Vec<String>) -> Self {
        Self {
            primary_group: primary_group.into(),
            all_groups,
        }
    }

    /// All groups except the primary one, in lookup order.
    pub fn others(&self) -> Vec<String> {
        self.all_groups
            .iter()
            .filter(|group| **group != self.primary_group)
            .cloned()
            .collect()
    }
}

/// Body of a `QUERY_JSON` response. Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub server_port: u16,
    pub player_count: usize,
    pub max_players: u32,
    pub player_list: Vec<String>,
}

impl From<&ServerSnapshot> for StatusReport {
    fn from(snapshot: &ServerSnapshot) -> Self {
        Self {
            server_port: snapshot.server_port,
            player_count: snapshot.player_count(),
            max_players: snapshot.max_players,
            player_list: snapshot.online_players.clone(),
        }
    }
}

/// Body of a `QUERY_RANKS:<player>` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RanksReport {
    pub primary: String,
    pub others: Vec<String>,
}

impl From<&PermissionSnapshot> for RanksReport {
    fn from(permissions: &PermissionSnapshot) -> Self {
        Self {
            primary: permissions.primary_group.clone(),
            others: permissions.others(),
        }
    }
}

pub fn encode_plain(snapshot: &ServerSnapshot) -> String {
    format!(
        "SERVERPORT {}\nPLAYERCOUNT {}\nMAXPLAYERS {}\nPLAYERLIST [{}]\n",
        snapshot.server_port,
        snapshot.player_count(),
        snapshot.max_players,
        snapshot.online_players.join(", ")
    )
}

pub fn encode_json(snapshot: &ServerSnapshot) -> Result<String, serde_json::Error> {
    let mut body = serde_json::to_string(&StatusReport::from(snapshot))?;
    body.push('\n');
    Ok(body)
}

pub fn encode_ranks(permissions: &PermissionSnapshot) -> Result<String, serde_json::Error> {
    let mut body = serde_json::to_string(&RanksReport::from(permissions))?;
    body.push('\n');
    Ok(body)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing {0} line")]
    MissingField(&'static str),
    #[error("invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("malformed player list: {0:?}")]
    MalformedList(String),
}

/// Decoded plain-text `QUERY` response, as seen by a monitoring client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainStatus {
    pub server_port: u16,
    pub player_count: usize,
    pub max_players: u32,
    pub player_list: Vec<String>,
}

impl FromStr for PlainStatus {
    type Err = ParseError;

    fn from_str(response: &str) -> Result<Self, Self::Err> {
        let mut server_port = None;
        let mut player_count = None;
        let mut max_players = None;
        let mut player_list = None;

        for line in response.lines() {
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            match key {
                "SERVERPORT" => server_port = Some(parse_number("SERVERPORT", value)?),
                "PLAYERCOUNT" => player_count = Some(parse_number("PLAYERCOUNT", value)?),
                "MAXPLAYERS" => max_players = Some(parse_number("MAXPLAYERS", value)?),
                "PLAYERLIST" => player_list = Some(parse_player_list(value)?),
                _ => {}
            }
        }

        Ok(PlainStatus {
            server_port: server_port.ok_or(ParseError::MissingField("SERVERPORT"))?,
            player_count: player_count.ok_or(ParseError::MissingField("PLAYERCOUNT"))?,
            max_players: max_players.ok_or(ParseError::MissingField("MAXPLAYERS"))?,
            player_list: player_list.ok_or(ParseError::MissingField("PLAYERLIST"))?,
        })
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_player_list(value: &str) -> Result<Vec<String>, ParseError> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ParseError::MalformedList(value.to_string()))?;

    if inner.is_empty() {
        return Ok(Vec::new());
    }

    // Names containing ", " cannot be told apart from the separator
    Ok(inner.split(", ").map(str::to_string).collect())
}
