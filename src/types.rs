use serde::{Deserialize, Deserializer, Serialize};

/// A single memory-game tile. Two cards of a pair share `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: u32,
    pub value: String,
}

/// One entry of a player list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub nickname: String,
    pub id: String,
    pub is_host: bool,
    pub score: i64,
}

/// Player list plus the room's lifecycle flags.
///
/// Shared by the `playerListUpdate` broadcast and the HTTP query endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerList {
    pub data: Vec<PlayerInfo>,
    pub waiting_for_players: bool,
    pub game_started: bool,
    pub game_ended: bool,
}

impl PlayerList {
    /// What the query surface reports for a room nobody has created.
    pub fn unknown_room() -> Self {
        Self {
            data: Vec::new(),
            waiting_for_players: true,
            game_started: false,
            game_ended: true,
        }
    }
}

/// A player's standing when a round ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub nickname: String,
    pub score: i64,
    pub finished: bool,
    pub rank: usize,
    pub total_players: usize,
}

/// Lifecycle of a room. There is no way back to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    Waiting,
    InProgress,
    Ended,
}

impl GamePhase {
    pub fn waiting_for_players(self) -> bool {
        self == Self::Waiting
    }

    pub fn game_started(self) -> bool {
        self == Self::InProgress
    }

    pub fn game_ended(self) -> bool {
        self == Self::Ended
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Ended => write!(f, "ENDED"),
        }
    }
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    Error {
        message: String,
    },
    PlayerListUpdate(PlayerList),
    GameStarted,
    #[serde(rename_all = "camelCase")]
    GameData {
        cards: Vec<Card>,
        game_time: u64,
    },
    ScoreUpdate {
        nickname: String,
        score: i64,
    },
    #[serde(rename_all = "camelCase")]
    GameEnded {
        reason: String,
        final_results: Vec<FinalResult>,
    },
    RoomClosed {
        reason: String,
    },
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    Join,
    #[serde(rename_all = "camelCase")]
    HostStartGame {
        #[serde(default, deserialize_with = "lenient_int")]
        num_pairs: Option<i64>,
        #[serde(default, deserialize_with = "lenient_int")]
        game_time: Option<i64>,
    },
    FlipCard {
        #[serde(default, deserialize_with = "lenient_int")]
        score: Option<i64>,
    },
    HostCloseGame,
    #[serde(rename_all = "camelCase")]
    GameOver {
        #[serde(default)]
        all_pairs_found: bool,
    },
    #[serde(other)]
    Unknown,
}

/// Accepts a JSON number or a string with a leading integer ("8", "8px").
/// Anything else reads as `None`.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => parse_leading_int(&s),
        _ => None,
    })
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let n: i64 = digits[..end].parse().ok()?;
    Some(if negative { -n } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ClientMsg {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn host_start_game_accepts_numbers_and_strings() {
        assert_eq!(
            parse(r#"{"type":"hostStartGame","numPairs":8,"gameTime":"60"}"#),
            ClientMsg::HostStartGame {
                num_pairs: Some(8),
                game_time: Some(60),
            }
        );
    }

    #[test]
    fn missing_or_garbage_numbers_read_as_none() {
        assert_eq!(
            parse(r#"{"type":"hostStartGame","numPairs":"abc"}"#),
            ClientMsg::HostStartGame {
                num_pairs: None,
                game_time: None,
            }
        );
        assert_eq!(
            parse(r#"{"type":"flipCard","score":null}"#),
            ClientMsg::FlipCard { score: None }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(parse(r#"{"type":"cardClick","cardId":3}"#), ClientMsg::Unknown);
    }

    #[test]
    fn unit_messages_ignore_extra_fields() {
        assert_eq!(parse(r#"{"type":"join","nickname":"Alice"}"#), ClientMsg::Join);
        assert_eq!(parse(r#"{"type":"hostCloseGame"}"#), ClientMsg::HostCloseGame);
    }

    #[test]
    fn leading_int_follows_parse_int() {
        assert_eq!(parse_leading_int("42"), Some(42));
        assert_eq!(parse_leading_int("  -7 apples"), Some(-7));
        assert_eq!(parse_leading_int("x1"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn server_messages_use_camel_case_wire_names() {
        let msg = ServerMsg::GameData {
            cards: vec![Card {
                id: 0,
                value: "v".to_string(),
            }],
            game_time: 60,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "gameData");
        assert_eq!(json["gameTime"], 60);

        let list = ServerMsg::PlayerListUpdate(PlayerList::unknown_room());
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["type"], "playerListUpdate");
        assert_eq!(json["waitingForPlayers"], true);
        assert!(json["data"].as_array().unwrap().is_empty());

        let started = serde_json::to_value(ServerMsg::GameStarted).unwrap();
        assert_eq!(started, serde_json::json!({ "type": "gameStarted" }));
    }
}
