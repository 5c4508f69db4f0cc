use serde_json::Value;

use crate::types::Direction;

/// Client intents, one JSON object per WebSocket text frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIntent {
    Move { direction: Direction },
    Attack,
    /// Redundant with stairs auto-descend; kept for forward compatibility.
    Descend,
    Pause,
    Resume,
}

/// `None` means a protocol error (malformed JSON, unknown type, bad
/// direction); the caller answers with an `error` message and must not touch
/// game state.
pub fn parse_client_message(raw: &str) -> Option<ClientIntent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "move" => {
            let direction = Direction::parse_move(object.get("direction")?.as_str()?)?;
            Some(ClientIntent::Move { direction })
        }
        "attack" => Some(ClientIntent::Attack),
        "descend" => Some(ClientIntent::Descend),
        "pause" => Some(ClientIntent::Pause),
        "resume" => Some(ClientIntent::Resume),
        _ => None,
    }
}

/// Outbound message kinds. `enemy_tick` is reserved for server-driven enemy
/// activity between player turns; the current turn model never produces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerMessageKind {
    Init,
    Update,
    EnemyTick,
    Error,
}

impl ServerMessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Update => "update",
            Self::EnemyTick => "enemy_tick",
            Self::Error => "error",
        }
    }
}
