//! Message kinds and the delimited text codec.
//!
//! A datagram carries exactly one message: the integer kind followed by the
//! message's fields, each rendered as text and terminated by [`SEPARATOR`].
//! `PLAYER_INFO(1, 10, 20, 0.5, 0.0, 1.57)` goes out as `4;1;10;20;0.5;0;1.57;`.
//!
//! Decoding produces a fully typed [`Message`]: the field count for the kind
//! must match exactly and every field must parse, so handlers never see a
//! half-formed message.

use crate::PlayerId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Token that terminates every field, including the kind.
pub const SEPARATOR: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ClientRequestConnect = 0,
    ClientAccepted = 1,
    ClientJoined = 2,
    ClientRejected = 3,
    PlayerInfo = 4,
    PlayerCollision = 5,
    PlayerAttack = 6,
    PlayerHit = 7,
    GameStart = 8,
    ClientDisconnect = 9,
    ClientLeft = 10,
    Heartbeat = 11,
}

impl MessageKind {
    pub const ALL: [MessageKind; 12] = [
        MessageKind::ClientRequestConnect,
        MessageKind::ClientAccepted,
        MessageKind::ClientJoined,
        MessageKind::ClientRejected,
        MessageKind::PlayerInfo,
        MessageKind::PlayerCollision,
        MessageKind::PlayerAttack,
        MessageKind::PlayerHit,
        MessageKind::GameStart,
        MessageKind::ClientDisconnect,
        MessageKind::ClientLeft,
        MessageKind::Heartbeat,
    ];

    /// Integer written as field 0 on the wire.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| i64::from(kind.code()) == code)
    }

    /// Number of fields that follow the kind.
    pub fn field_count(self) -> usize {
        match self {
            MessageKind::ClientRequestConnect
            | MessageKind::GameStart
            | MessageKind::ClientDisconnect
            | MessageKind::Heartbeat => 0,
            MessageKind::ClientAccepted
            | MessageKind::ClientJoined
            | MessageKind::ClientRejected
            | MessageKind::PlayerHit
            | MessageKind::ClientLeft => 1,
            MessageKind::PlayerAttack => 3,
            MessageKind::PlayerCollision => 4,
            MessageKind::PlayerInfo => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::ClientRequestConnect => "CLIENT_REQUEST_CONNECT",
            MessageKind::ClientAccepted => "CLIENT_ACCEPTED",
            MessageKind::ClientJoined => "CLIENT_JOINED",
            MessageKind::ClientRejected => "CLIENT_REJECTED",
            MessageKind::PlayerInfo => "PLAYER_INFO",
            MessageKind::PlayerCollision => "PLAYER_COLLISION",
            MessageKind::PlayerAttack => "PLAYER_ATTACK",
            MessageKind::PlayerHit => "PLAYER_HIT",
            MessageKind::GameStart => "GAME_START",
            MessageKind::ClientDisconnect => "CLIENT_DISCONNECT",
            MessageKind::ClientLeft => "CLIENT_LEFT",
            MessageKind::Heartbeat => "HEARTBEAT",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which arm an attack flag refers to. Sent as `0` (left) or `1` (right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackSide {
    Left,
    Right,
}

impl AttackSide {
    pub fn code(self) -> i32 {
        match self {
            AttackSide::Left => 0,
            AttackSide::Right => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AttackSide::Left),
            1 => Some(AttackSide::Right),
            _ => None,
        }
    }

    /// Slot in a per-side flag array.
    pub fn index(self) -> usize {
        self.code() as usize
    }
}

/// Reason codes the server puts in `CLIENT_REJECTED`.
///
/// Clients accept any integer; these are just the ones this server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ServerFull = 1,
    MatchInProgress = 2,
}

impl RejectReason {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(RejectReason::ServerFull),
            2 => Some(RejectReason::MatchInProgress),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ServerFull => f.write_str("server full"),
            RejectReason::MatchInProgress => f.write_str("match already in progress"),
        }
    }
}

/// One protocol message with its typed fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClientRequestConnect,
    ClientAccepted {
        id: PlayerId,
    },
    ClientJoined {
        id: PlayerId,
    },
    ClientRejected {
        reason: i32,
    },
    PlayerInfo {
        id: PlayerId,
        x: i32,
        y: i32,
        vel_x: f32,
        vel_y: f32,
        rotation: f32,
    },
    PlayerCollision {
        id: PlayerId,
        tile_x: i32,
        tile_y: i32,
        entering: bool,
    },
    PlayerAttack {
        id: PlayerId,
        side: AttackSide,
        active: bool,
    },
    /// Client to server: `id` is the victim. Server to client: `id` is the
    /// attacker, and the receiving client's own player is the victim.
    PlayerHit {
        id: PlayerId,
    },
    GameStart,
    ClientDisconnect,
    ClientLeft {
        id: PlayerId,
    },
    Heartbeat,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ClientRequestConnect => MessageKind::ClientRequestConnect,
            Message::ClientAccepted { .. } => MessageKind::ClientAccepted,
            Message::ClientJoined { .. } => MessageKind::ClientJoined,
            Message::ClientRejected { .. } => MessageKind::ClientRejected,
            Message::PlayerInfo { .. } => MessageKind::PlayerInfo,
            Message::PlayerCollision { .. } => MessageKind::PlayerCollision,
            Message::PlayerAttack { .. } => MessageKind::PlayerAttack,
            Message::PlayerHit { .. } => MessageKind::PlayerHit,
            Message::GameStart => MessageKind::GameStart,
            Message::ClientDisconnect => MessageKind::ClientDisconnect,
            Message::ClientLeft { .. } => MessageKind::ClientLeft,
            Message::Heartbeat => MessageKind::Heartbeat,
        }
    }

    fn fields(&self) -> Vec<String> {
        match self {
            Message::ClientRequestConnect
            | Message::GameStart
            | Message::ClientDisconnect
            | Message::Heartbeat => Vec::new(),
            Message::ClientAccepted { id }
            | Message::ClientJoined { id }
            | Message::PlayerHit { id }
            | Message::ClientLeft { id } => vec![id.to_string()],
            Message::ClientRejected { reason } => vec![reason.to_string()],
            Message::PlayerInfo {
                id,
                x,
                y,
                vel_x,
                vel_y,
                rotation,
            } => vec![
                id.to_string(),
                x.to_string(),
                y.to_string(),
                vel_x.to_string(),
                vel_y.to_string(),
                rotation.to_string(),
            ],
            Message::PlayerCollision {
                id,
                tile_x,
                tile_y,
                entering,
            } => vec![
                id.to_string(),
                tile_x.to_string(),
                tile_y.to_string(),
                entering.to_string(),
            ],
            Message::PlayerAttack { id, side, active } => vec![
                id.to_string(),
                side.code().to_string(),
                active.to_string(),
            ],
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("empty payload")]
    Empty,

    #[error("message kind {0:?} is not an integer")]
    InvalidKind(String),

    #[error("unknown message kind {0}")]
    UnknownKind(i64),

    #[error("{kind} expects {expected} fields, got {found}")]
    FieldCount {
        kind: MessageKind,
        expected: usize,
        found: usize,
    },

    /// `index` counts the fields after the kind, starting at 0.
    #[error("{kind} field {index} has invalid value {value:?}")]
    InvalidField {
        kind: MessageKind,
        index: usize,
        value: String,
    },
}

/// Renders a message as a datagram payload.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut text = message.kind().code().to_string();
    text.push_str(SEPARATOR);

    for field in message.fields() {
        text.push_str(&field);
        text.push_str(SEPARATOR);
    }

    text.into_bytes()
}

/// Parses a datagram payload into a typed message.
///
/// The trailing separator is optional on input.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let body = text.strip_suffix(SEPARATOR).unwrap_or(text);
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut parts = body.split(SEPARATOR);
    let head = parts.next().unwrap_or_default();
    let code: i64 = head
        .parse()
        .map_err(|_| DecodeError::InvalidKind(head.to_string()))?;
    let kind = MessageKind::from_code(code).ok_or(DecodeError::UnknownKind(code))?;

    let values: Vec<&str> = parts.collect();
    let expected = kind.field_count();
    if values.len() != expected {
        return Err(DecodeError::FieldCount {
            kind,
            expected,
            found: values.len(),
        });
    }

    let fields = Fields {
        kind,
        values: &values,
    };

    let message = match kind {
        MessageKind::ClientRequestConnect => Message::ClientRequestConnect,
        MessageKind::ClientAccepted => Message::ClientAccepted {
            id: fields.parse(0)?,
        },
        MessageKind::ClientJoined => Message::ClientJoined {
            id: fields.parse(0)?,
        },
        MessageKind::ClientRejected => Message::ClientRejected {
            reason: fields.parse(0)?,
        },
        MessageKind::PlayerInfo => Message::PlayerInfo {
            id: fields.parse(0)?,
            x: fields.parse(1)?,
            y: fields.parse(2)?,
            vel_x: fields.parse(3)?,
            vel_y: fields.parse(4)?,
            rotation: fields.parse(5)?,
        },
        MessageKind::PlayerCollision => Message::PlayerCollision {
            id: fields.parse(0)?,
            tile_x: fields.parse(1)?,
            tile_y: fields.parse(2)?,
            entering: fields.boolean(3)?,
        },
        MessageKind::PlayerAttack => Message::PlayerAttack {
            id: fields.parse(0)?,
            side: fields.side(1)?,
            active: fields.boolean(2)?,
        },
        MessageKind::PlayerHit => Message::PlayerHit {
            id: fields.parse(0)?,
        },
        MessageKind::GameStart => Message::GameStart,
        MessageKind::ClientDisconnect => Message::ClientDisconnect,
        MessageKind::ClientLeft => Message::ClientLeft {
            id: fields.parse(0)?,
        },
        MessageKind::Heartbeat => Message::Heartbeat,
    };

    Ok(message)
}

struct Fields<'a> {
    kind: MessageKind,
    values: &'a [&'a str],
}

impl Fields<'_> {
    fn raw(&self, index: usize) -> Result<&str, DecodeError> {
        self.values
            .get(index)
            .copied()
            .ok_or(DecodeError::FieldCount {
                kind: self.kind,
                expected: self.kind.field_count(),
                found: self.values.len(),
            })
    }

    fn invalid(&self, index: usize, value: &str) -> DecodeError {
        DecodeError::InvalidField {
            kind: self.kind,
            index,
            value: value.to_string(),
        }
    }

    fn parse<T: FromStr>(&self, index: usize) -> Result<T, DecodeError> {
        let value = self.raw(index)?;
        value.parse().map_err(|_| self.invalid(index, value))
    }

    fn boolean(&self, index: usize) -> Result<bool, DecodeError> {
        match self.raw(index)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.invalid(index, other)),
        }
    }

    fn side(&self, index: usize) -> Result<AttackSide, DecodeError> {
        let value = self.raw(index)?;
        value
            .parse::<i32>()
            .ok()
            .and_then(AttackSide::from_code)
            .ok_or_else(|| self.invalid(index, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::ClientRequestConnect,
            Message::ClientAccepted { id: 1 },
            Message::ClientJoined { id: 2 },
            Message::ClientRejected { reason: 3 },
            Message::PlayerInfo {
                id: 1,
                x: 10,
                y: -20,
                vel_x: 0.5,
                vel_y: 0.0,
                rotation: 1.57,
            },
            Message::PlayerCollision {
                id: 4,
                tile_x: 12,
                tile_y: 3,
                entering: true,
            },
            Message::PlayerAttack {
                id: 2,
                side: AttackSide::Right,
                active: false,
            },
            Message::PlayerHit { id: 5 },
            Message::GameStart,
            Message::ClientDisconnect,
            Message::ClientLeft { id: 6 },
            Message::Heartbeat,
        ]
    }

    #[test]
    fn test_every_kind_round_trips() {
        let messages = sample_messages();
        assert_eq!(messages.len(), MessageKind::ALL.len());

        for message in messages {
            let decoded = decode(&encode(&message)).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_player_info_wire_text() {
        let message = Message::PlayerInfo {
            id: 1,
            x: 10,
            y: 20,
            vel_x: 0.5,
            vel_y: 0.0,
            rotation: 1.57,
        };
        assert_eq!(encode(&message), b"4;1;10;20;0.5;0;1.57;".to_vec());
    }

    #[test]
    fn test_fieldless_kinds_still_carry_separator() {
        assert_eq!(encode(&Message::ClientRequestConnect), b"0;".to_vec());
        assert_eq!(encode(&Message::GameStart), b"8;".to_vec());
    }

    #[test]
    fn test_booleans_and_sides_use_literal_tokens() {
        let message = Message::PlayerAttack {
            id: 9,
            side: AttackSide::Left,
            active: true,
        };
        assert_eq!(encode(&message), b"6;9;0;true;".to_vec());

        let collision = Message::PlayerCollision {
            id: 9,
            tile_x: -1,
            tile_y: 2,
            entering: false,
        };
        assert_eq!(encode(&collision), b"5;9;-1;2;false;".to_vec());
    }

    #[test]
    fn test_decode_accepts_missing_trailing_separator() {
        let decoded = decode(b"1;42").unwrap();
        assert_eq!(decoded, Message::ClientAccepted { id: 42 });
    }

    #[test]
    fn test_decode_parses_floats_exactly() {
        match decode(b"4;3;-5;7;-0.125;12.5;1.25;").unwrap() {
            Message::PlayerInfo {
                id,
                x,
                y,
                vel_x,
                vel_y,
                rotation,
            } => {
                assert_eq!(id, 3);
                assert_eq!((x, y), (-5, 7));
                assert_approx_eq!(vel_x, -0.125);
                assert_approx_eq!(vel_y, 12.5);
                assert_approx_eq!(rotation, 1.25);
            }
            other => panic!("Wrong message decoded: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert_eq!(decode(b""), Err(DecodeError::Empty));
        assert_eq!(decode(b";"), Err(DecodeError::Empty));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(decode(&[0xff, 0xfe, b';']), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert_eq!(decode(b"99;1;"), Err(DecodeError::UnknownKind(99)));
        assert_eq!(
            decode(b"hello;"),
            Err(DecodeError::InvalidKind("hello".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert_eq!(
            decode(b"4;1;10;20;"),
            Err(DecodeError::FieldCount {
                kind: MessageKind::PlayerInfo,
                expected: 6,
                found: 3,
            })
        );
    }

    #[test]
    fn test_decode_rejects_extra_fields() {
        assert_eq!(
            decode(b"8;1;"),
            Err(DecodeError::FieldCount {
                kind: MessageKind::GameStart,
                expected: 0,
                found: 1,
            })
        );
    }

    #[test]
    fn test_decode_rejects_malformed_fields() {
        assert_eq!(
            decode(b"5;1;2;3;yes;"),
            Err(DecodeError::InvalidField {
                kind: MessageKind::PlayerCollision,
                index: 3,
                value: "yes".to_string(),
            })
        );
        assert_eq!(
            decode(b"6;1;2;true;"),
            Err(DecodeError::InvalidField {
                kind: MessageKind::PlayerAttack,
                index: 1,
                value: "2".to_string(),
            })
        );
        assert_eq!(
            decode(b"1;-1;"),
            Err(DecodeError::InvalidField {
                kind: MessageKind::ClientAccepted,
                index: 0,
                value: "-1".to_string(),
            })
        );
    }

    #[test]
    fn test_kind_codes_are_stable() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_code(i64::from(kind.code())), Some(kind));
        }
        assert_eq!(MessageKind::PlayerInfo.code(), 4);
        assert_eq!(MessageKind::from_code(-1), None);
    }

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::from_code(1), Some(RejectReason::ServerFull));
        assert_eq!(RejectReason::from_code(2), Some(RejectReason::MatchInProgress));
        assert_eq!(RejectReason::from_code(3), None);
        assert_eq!(RejectReason::ServerFull.to_string(), "server full");
    }
}
