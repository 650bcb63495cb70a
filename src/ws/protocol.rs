//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::game::command::InputCommand;
use crate::game::entity::{PlayerId, Team};
use crate::game::snapshot::Snapshot;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to enter the room; must be the first message
    Join {
        #[serde(default, deserialize_with = "lenient_string")]
        name: String,
    },

    /// Latest player intent, replaces any pending input
    Input(InputCommand),

    /// Liveness probe
    Ping {
        /// Opaque client token, echoed back
        #[serde(default)]
        t: Value,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Join accepted
    Welcome {
        id: PlayerId,
        team: Team,
        /// `[width, height, goal_width, goal_height]`
        field: [f32; 4],
        tick_rate: u32,
    },

    /// Join refused; the server closes the connection afterwards
    Reject { reason: String },

    /// Echo of a ping token
    Pong { t: Value },

    /// Transient event text (join, leave, goal, round result)
    Toast { msg: String },

    /// Full world state, once per tick
    State { snapshot: Snapshot },

    /// Protocol error after the handshake
    Error { code: String, message: String },
}

/// Pre-serialized frame shared by every recipient of a broadcast
pub type Frame = Arc<str>;

/// Protocol-level failures on an established connection
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("binary frames are not supported")]
    UnexpectedBinary,

    #[error("already joined")]
    AlreadyJoined,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "bad_message",
            Self::UnexpectedBinary => "bad_frame",
            Self::AlreadyJoined => "already_joined",
        }
    }

    pub fn to_msg(&self) -> ServerMsg {
        ServerMsg::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Decode one text frame
pub fn decode(text: &str) -> Result<ClientMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Serialize a message once so it can be fanned out
pub fn encode(msg: &ServerMsg) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(msg).map(Frame::from)
}

/// JSON bools as-is, numbers as non-zero, anything else `false`
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    })
}

/// Finite numbers as `f32`, anything else `0.0`
pub fn lenient_f32<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().map(|v| v as f32).unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if value.is_finite() { value } else { 0.0 })
}

/// Strings as-is, anything else empty
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_join() {
        match decode(r#"{"type":"join","name":"Pelé"}"#).unwrap() {
            ClientMsg::Join { name } => assert_eq!(name, "Pelé"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn join_without_name_is_accepted() {
        match decode(r#"{"type":"join"}"#).unwrap() {
            ClientMsg::Join { name } => assert!(name.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_flat_input() {
        let msg = decode(
            r#"{"type":"input","up":true,"right":true,"kick":true,"aimx":0.5,"aimy":-0.5}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::Input(cmd) => {
                assert!(cmd.up && cmd.right && cmd.kick);
                assert!(!cmd.down && !cmd.left && !cmd.sprint);
                assert_eq!(cmd.aimx, 0.5);
                assert_eq!(cmd.aimy, -0.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_typed_input_fields_are_neutralized() {
        let msg = decode(
            r#"{"type":"input","up":"yes","down":1,"sprint":null,"aimx":"far","aimy":1e300}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::Input(cmd) => {
                assert!(!cmd.up);
                assert!(cmd.down);
                assert!(!cmd.sprint);
                assert_eq!(cmd.aimx, 0.0);
                assert_eq!(cmd.aimy, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_input_is_neutral() {
        match decode(r#"{"type":"input"}"#).unwrap() {
            ClientMsg::Input(cmd) => assert_eq!(cmd, InputCommand::default()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ping_token_is_preserved() {
        match decode(r#"{"type":"ping","t":{"seq":3}}"#).unwrap() {
            ClientMsg::Ping { t } => assert_eq!(t, json!({"seq": 3})),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_envelopes_fail() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode(r#"{"name":"x"}"#), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"type":"teleport"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn server_messages_are_tagged() {
        let reject = encode(&ServerMsg::Reject {
            reason: "room is full".into(),
        })
        .unwrap();
        let value: Value = serde_json::from_str(&reject).unwrap();
        assert_eq!(value, json!({"type": "reject", "reason": "room is full"}));

        let welcome = encode(&ServerMsg::Welcome {
            id: PlayerId(3),
            team: Team::Blue,
            field: [1200.0, 700.0, 20.0, 220.0],
            tick_rate: 30,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&welcome).unwrap();
        assert_eq!(value["type"], "welcome");
        assert_eq!(value["id"], 3);
        assert_eq!(value["team"], "blue");
    }

    #[test]
    fn protocol_errors_render_codes() {
        let msg = ProtocolError::AlreadyJoined.to_msg();
        match msg {
            ServerMsg::Error { code, message } => {
                assert_eq!(code, "already_joined");
                assert_eq!(message, "already joined");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
