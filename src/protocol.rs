//! Wire envelopes exchanged over the game socket.
//!
//! Clients send `{"jsonType": ..., "data": ...}`; the server answers with
//! `{"type": ..., "data": ...}`.

use crate::{
  engine::SubmittedAction,
  error::ProtocolError,
  session::{Changelog, GameState, Lobby},
};
use serde::{Deserialize, Serialize};

/// A decoded client frame.
#[derive(Debug, Clone)]
pub enum ClientCommand {
  StartGame,
  SubmitAction { game_id: String, action: SubmittedAction },
  EndGame,
  LeaveLobby,
  KickPlayer { player_to_kick: String },
}

#[derive(Deserialize)]
struct RawCommand {
  #[serde(rename = "jsonType")]
  json_type: String,
  #[serde(default)]
  data: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitActionData {
  #[serde(default)]
  game_id: String,
  action: SubmittedAction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KickData {
  player_to_kick: String,
}

impl ClientCommand {
  pub fn decode(text: &str) -> Result<Self, ProtocolError> {
    let raw: RawCommand = serde_json::from_str(text)?;
    match raw.json_type.as_str() {
      "startGame" => Ok(ClientCommand::StartGame),
      "endGame" => Ok(ClientCommand::EndGame),
      "leaveLobby" => Ok(ClientCommand::LeaveLobby),
      "submitAction" => {
        let data: SubmitActionData = serde_json::from_value(raw.data)?;
        Ok(ClientCommand::SubmitAction {
          game_id: data.game_id,
          action: data.action,
        })
      }
      "kickPlayer" => {
        let data: KickData = serde_json::from_value(raw.data)?;
        Ok(ClientCommand::KickPlayer {
          player_to_kick: data.player_to_kick,
        })
      }
      other => Err(ProtocolError::UnknownType(other.to_string())),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      ClientCommand::StartGame => "startGame",
      ClientCommand::SubmitAction { .. } => "submitAction",
      ClientCommand::EndGame => "endGame",
      ClientCommand::LeaveLobby => "leaveLobby",
      ClientCommand::KickPlayer { .. } => "kickPlayer",
    }
  }
}

/// Lobby snapshot. `player_id` names the player the snapshot was sent for, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMessage {
  #[serde(rename = "playerID")]
  pub player_id: String,
  #[serde(rename = "lobbyInfo")]
  pub lobby_info: Lobby,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
  LobbyInfo(LobbyMessage),
  GameState(Box<GameState>),
  Changelog(Changelog),
  Error(Notice),
  Close(Notice),
}

impl ServerMessage {
  pub fn lobby(player_id: impl Into<String>, lobby: Lobby) -> Self {
    ServerMessage::LobbyInfo(LobbyMessage {
      player_id: player_id.into(),
      lobby_info: lobby,
    })
  }

  pub fn game_state(state: GameState) -> Self {
    ServerMessage::GameState(Box::new(state))
  }

  pub fn error(message: impl ToString) -> Self {
    ServerMessage::Error(Notice {
      message: message.to_string(),
    })
  }

  pub fn close(message: impl ToString) -> Self {
    ServerMessage::Close(Notice {
      message: message.to_string(),
    })
  }

  pub fn encode(&self) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(self)?)
  }
}
