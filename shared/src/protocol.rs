//! JSON wire protocol.
//!
//! Every message is an object tagged by its `type` field. Inbound packets are
//! decoded into [`ClientPacket`] and then validated into a [`ClientCommand`];
//! anything that fails either step is dropped by the server without a reply.

use crate::{Direction, Point, Snake};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown direction {0:?}")]
    UnknownDirection(String),
}

/// Inbound message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientPacket {
    Direction {
        dir: String,
    },
    Restart,
    Admin {
        #[serde(default)]
        command: Option<String>,
    },
}

impl ClientPacket {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    SpawnFood,
    ResetGame,
    KickAll,
    /// Any other sub-command, including a missing one.
    Other(Option<String>),
}

impl From<Option<String>> for AdminCommand {
    fn from(command: Option<String>) -> Self {
        match command.as_deref() {
            Some("spawnFood") => AdminCommand::SpawnFood,
            Some("resetGame") => AdminCommand::ResetGame,
            Some("kickAll") => AdminCommand::KickAll,
            _ => AdminCommand::Other(command),
        }
    }
}

/// A validated player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    SetDirection(Direction),
    Restart,
    Admin(AdminCommand),
}

impl TryFrom<ClientPacket> for ClientCommand {
    type Error = ProtocolError;

    fn try_from(packet: ClientPacket) -> Result<Self, Self::Error> {
        match packet {
            ClientPacket::Direction { dir } => Ok(ClientCommand::SetDirection(dir.parse()?)),
            ClientPacket::Restart => Ok(ClientCommand::Restart),
            ClientPacket::Admin { command } => Ok(ClientCommand::Admin(command.into())),
        }
    }
}

/// Decodes and validates one inbound text frame.
pub fn decode_client_command(text: &str) -> Result<ClientCommand, ProtocolError> {
    let packet: ClientPacket = serde_json::from_str(text)?;
    ClientCommand::try_from(packet)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Playing,
}

/// Outbound message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerPacket {
    Init {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    Dead,
    AdminMsg {
        message: String,
    },
    Update {
        snakes: BTreeMap<String, Snake>,
        food: Vec<Point>,
        state: GameStatus,
    },
}

impl ServerPacket {
    pub fn admin_msg(message: impl Into<String>) -> Self {
        ServerPacket::AdminMsg {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
