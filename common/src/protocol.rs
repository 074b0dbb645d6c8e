//! Messages exchanged with the browser over a game's WebSocket.
//!
//! Every frame is an [`Envelope`]: `{"author": <participant>, "content": {...}}`.
//! Inbound content is decoded once, here, into [`Inbound`]; nothing past this
//! module looks at raw JSON. Outbound content keeps the string-valued fields
//! the client renders from.

use std::fmt::{self, Display};

use thiserror::Error;

use crate::{ParticipantId, PieceColour, RoomId, Square};

const GAME_KIND: &str = "chess";

/// A move request: drag the piece standing on `from` onto `to`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub from: Square,
    pub to: Square,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Quit,
    Acknowledge,
    ResetRequest,
    ResetAck,
    Move(Action),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("square `{0}` is off the board")]
    OffBoard(String),
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Coordinate {
    Index(i64),
    Text(String),
}

impl Coordinate {
    fn square(self) -> Result<Square, ProtocolError> {
        match self {
            Coordinate::Index(index) => u8::try_from(index)
                .ok()
                .and_then(Square::from_index)
                .ok_or_else(|| ProtocolError::OffBoard(index.to_string())),
            Coordinate::Text(text) => text.parse().map_err(|_| ProtocolError::OffBoard(text)),
        }
    }
}

#[derive(Deserialize, Debug)]
struct Content {
    #[serde(rename = "type")]
    kind: Option<String>,
    msg: Option<String>,
    from: Option<Coordinate>,
    to: Option<Coordinate>,
}

// Browsers send the bare content object; other clients wrap it.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Wire {
    Envelope { content: Content },
    Bare(Content),
}

impl Inbound {
    pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
        let content = match serde_json::from_str(text)? {
            Wire::Envelope { content } => content,
            Wire::Bare(content) => content,
        };

        let kind = content.kind.ok_or(ProtocolError::MissingField("type"))?;
        match kind.as_str() {
            "cmd" => {
                let msg = content.msg.ok_or(ProtocolError::MissingField("msg"))?;
                match msg.as_str() {
                    "quit" => Ok(Inbound::Quit),
                    "acknowledge" => Ok(Inbound::Acknowledge),
                    "reset-req" => Ok(Inbound::ResetRequest),
                    "reset-ack" => Ok(Inbound::ResetAck),
                    _ => Err(ProtocolError::UnknownCommand(msg)),
                }
            }
            "move" => {
                let from = content
                    .from
                    .ok_or(ProtocolError::MissingField("from"))?
                    .square()?;
                let to = content
                    .to
                    .ok_or(ProtocolError::MissingField("to"))?
                    .square()?;
                Ok(Inbound::Move(Action { from, to }))
            }
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    pub author: String,
    pub content: T,
}

impl<T> Envelope<T> {
    pub fn new<A: Display>(author: A, content: T) -> Envelope<T> {
        Envelope {
            author: author.to_string(),
            content,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    Connected,
    Disconnected,
    Acknowledge,
    ResetReq,
    ResetAck,
}

/// One square as the client draws it: its cosmetic background and the glyph
/// key of its occupant (empty for no piece).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SerializedSquare {
    pub color: String,
    pub piece: String,
}

/// Full snapshot sent to a player when they (re)connect.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub board: Vec<SerializedSquare>,
    pub color: Option<PieceColour>,
    pub turn: PieceColour,
    pub winner: Option<PieceColour>,
}

/// Both squares of a rejected move, so the client can put the dragged piece
/// back where it was.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MoveContext {
    #[serde(with = "stringly")]
    pub src: Square,
    pub src_color: String,
    pub src_piece: String,
    #[serde(with = "stringly")]
    pub dst: Square,
    pub dst_color: String,
    pub dst_piece: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    Cmd {
        msg: Command,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        board: Option<String>,
    },
    State(StateChange),
    Move {
        #[serde(with = "stringly")]
        src: Square,
        #[serde(with = "stringly")]
        dst: Square,
        #[serde(with = "stringly")]
        taken: bool,
    },
    Error {
        msg: String,
        #[serde(flatten)]
        context: Option<MoveContext>,
    },
    Castle {
        #[serde(with = "stringly")]
        k_src: Square,
        #[serde(with = "stringly")]
        r_src: Square,
        #[serde(with = "stringly")]
        k_dst: Square,
        #[serde(with = "stringly")]
        r_dst: Square,
    },
    Checkmate {
        color: PieceColour,
    },
    TakeAck {
        #[serde(with = "stringly")]
        src: Square,
        #[serde(with = "stringly")]
        dst: Square,
    },
}

impl Outbound {
    pub fn cmd(msg: Command) -> Outbound {
        Outbound::Cmd { msg, board: None }
    }

    pub fn error<E: Display>(error: E) -> Outbound {
        Outbound::Error {
            msg: error.to_string(),
            context: None,
        }
    }
}

/// Reply to the create-room and join-room requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RoomReply {
    Joined {
        room: String,
        id: String,
        #[serde(rename = "type")]
        kind: String,
    },
    Rejected {
        message: String,
        #[serde(rename = "type")]
        kind: String,
    },
}

impl RoomReply {
    pub fn joined(room: RoomId, id: ParticipantId) -> RoomReply {
        RoomReply::Joined {
            room: room.to_string(),
            id: id.to_string(),
            kind: GAME_KIND.to_owned(),
        }
    }

    pub fn rejected<R: Display>(reason: R) -> RoomReply {
        RoomReply::Rejected {
            message: reason.to_string(),
            kind: GAME_KIND.to_owned(),
        }
    }
}

/// Numbers and flags travel as strings in outbound content.
mod stringly {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use test_case::test_case;

    fn square(index: u8) -> Square {
        Square::from_index(index).unwrap()
    }

    #[test_case(r#"{"type":"cmd","msg":"quit"}"#, Inbound::Quit; "quit")]
    #[test_case(r#"{"type":"cmd","msg":"acknowledge"}"#, Inbound::Acknowledge; "acknowledge")]
    #[test_case(r#"{"type":"cmd","msg":"reset-req"}"#, Inbound::ResetRequest; "reset request")]
    #[test_case(r#"{"type":"cmd","msg":"reset-ack"}"#, Inbound::ResetAck; "reset ack")]
    fn decodes_commands(text: &str, expected: Inbound) {
        assert_eq!(Inbound::decode(text).unwrap(), expected);
    }

    #[test_case(r#"{"from":12,"to":28,"type":"move"}"#; "bare numbers")]
    #[test_case(r#"{"type":"move","from":"12","to":"28"}"#; "bare strings")]
    #[test_case(r#"{"author":"x","content":{"type":"move","from":"12","to":"28"}}"#; "envelope")]
    fn decodes_moves(text: &str) {
        assert_eq!(
            Inbound::decode(text).unwrap(),
            Inbound::Move(Action {
                from: square(12),
                to: square(28),
            })
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            Inbound::decode("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"msg":"quit"}"#),
            Err(ProtocolError::MissingField("type"))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"type":"move","from":3}"#),
            Err(ProtocolError::MissingField("to"))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"type":"chat","chatm":"hi"}"#),
            Err(ProtocolError::UnknownType(kind)) if kind == "chat"
        ));
        assert!(matches!(
            Inbound::decode(r#"{"type":"cmd","msg":"resign"}"#),
            Err(ProtocolError::UnknownCommand(msg)) if msg == "resign"
        ));
        assert!(matches!(
            Inbound::decode(r#"{"type":"move","from":64,"to":0}"#),
            Err(ProtocolError::OffBoard(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"type":"move","from":-1,"to":0}"#),
            Err(ProtocolError::OffBoard(_))
        ));
    }

    #[test]
    fn move_fields_are_strings() {
        let event = Outbound::Move {
            src: square(12),
            dst: square(28),
            taken: false,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "move", "src": "12", "dst": "28", "taken": "false"})
        );
    }

    #[test]
    fn error_carries_move_context() {
        let event = Outbound::Error {
            msg: "not your turn".to_owned(),
            context: Some(MoveContext {
                src: square(52),
                src_color: "white/35".to_owned(),
                src_piece: "c/c7/Chess_pdt45.svg".to_owned(),
                dst: square(44),
                dst_color: "white/15".to_owned(),
                dst_piece: String::new(),
            }),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["msg"], "not your turn");
        assert_eq!(value["src"], "52");
        assert_eq!(value["dst_piece"], "");

        let plain = serde_json::to_value(Outbound::error("no reset pending")).unwrap();
        assert_eq!(plain, json!({"type": "error", "msg": "no reset pending"}));
    }

    #[test]
    fn event_tags_match_the_client() {
        let tags: Vec<Value> = vec![
            Outbound::cmd(Command::ResetReq),
            Outbound::Castle {
                k_src: square(4),
                r_src: square(7),
                k_dst: square(6),
                r_dst: square(5),
            },
            Outbound::Checkmate {
                color: PieceColour::Black,
            },
            Outbound::TakeAck {
                src: square(1),
                dst: square(2),
            },
        ]
        .into_iter()
        .map(|event| serde_json::to_value(event).unwrap())
        .collect();

        assert_eq!(tags[0], json!({"type": "cmd", "msg": "reset-req"}));
        assert_eq!(tags[1]["type"], "castle");
        assert_eq!(tags[1]["k_dst"], "6");
        assert_eq!(tags[2], json!({"type": "checkmate", "color": "black"}));
        assert_eq!(tags[3]["type"], "take-ack");
    }

    #[test]
    fn outbound_parses_back() {
        let event = Outbound::Move {
            src: square(8),
            dst: square(16),
            taken: true,
        };
        let text = serde_json::to_string(&Envelope::new("someone", event.clone())).unwrap();
        let parsed: Envelope<Outbound> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.author, "someone");
        assert_eq!(parsed.content, event);
    }

    #[test]
    fn room_replies() {
        let room = RoomId::new();
        let id = ParticipantId::new();
        let joined = serde_json::to_value(RoomReply::joined(room, id)).unwrap();
        assert_eq!(joined["room"], room.to_string());
        assert_eq!(joined["id"], id.to_string());
        assert_eq!(joined["type"], "chess");

        let rejected = serde_json::to_string(&RoomReply::rejected("room full")).unwrap();
        assert_eq!(
            serde_json::from_str::<RoomReply>(&rejected).unwrap(),
            RoomReply::Rejected {
                message: "room full".to_owned(),
                kind: "chess".to_owned(),
            }
        );
    }
}
