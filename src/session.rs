//! Lobby, player and game-state records shared by every room.

use crate::{
  error::SessionError,
  game::{GameDefinition, GameRules},
  pieces::View,
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const ROOM_CODE_LEN: usize = 4;

/// Millisecond timestamp followed by 10 random characters.
pub fn generate_id() -> String {
  let mut rng = rand::thread_rng();
  let suffix: String = (0..10)
    .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
    .collect();
  format!("{}{}", Utc::now().timestamp_millis(), suffix)
}

/// Four uppercase letters players type to join a lobby.
pub fn generate_room_code() -> String {
  let mut rng = rand::thread_rng();
  (0..ROOM_CODE_LEN)
    .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
    .collect()
}

/// Lifecycle of a lobby. Only ever advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LobbyStatus {
  #[default]
  #[serde(rename = "Awaiting Start")]
  AwaitingStart,
  #[serde(rename = "In Progress")]
  InProgress,
  #[serde(rename = "Game Ended")]
  Ended,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Player {
  pub id: String,
  pub name: String,
  /// Private views, empty until the game starts.
  pub hand: Vec<View>,
}

impl Player {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      id: generate_id(),
      name: name.into(),
      hand: Vec::new(),
    }
  }
}

/// Players gathered around one game definition, keyed by room code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lobby {
  pub room_code: String,
  pub game_definition_id: String,
  /// Empty until the game starts.
  pub game_state_id: String,
  pub status: LobbyStatus,
  pub game_name: String,
  pub num_players: usize,
  pub max_players: usize,
  pub players: Vec<Player>,
  pub host: Player,
}

impl Lobby {
  pub fn new(room_code: impl Into<String>, definition: &GameDefinition) -> Self {
    Self {
      room_code: room_code.into(),
      game_definition_id: definition.id.clone(),
      game_name: definition.name.clone(),
      max_players: definition.max_players,
      ..Self::default()
    }
  }

  /// Seat a new player named `name`. The first player to arrive hosts.
  pub fn add_player(&mut self, name: &str) -> Result<Player, SessionError> {
    if self.num_players >= self.max_players {
      return Err(SessionError::RoomFull(self.max_players));
    }
    if self.status != LobbyStatus::AwaitingStart {
      return Err(SessionError::AlreadyStarted);
    }
    if self.players.iter().any(|p| p.name == name) {
      return Err(SessionError::NameTaken(name.to_string()));
    }

    let player = Player::new(name);
    if self.players.is_empty() {
      self.host = player.clone();
    }
    self.players.push(player.clone());
    self.num_players = self.players.len();
    Ok(player)
  }

  /// Remove `player_id`, handing host to the next player in line if needed.
  pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
    let index = self.players.iter().position(|p| p.id == player_id)?;
    let removed = self.players.remove(index);
    self.num_players = self.players.len();

    if self.host.id == player_id {
      self.host = self.players.first().cloned().unwrap_or_default();
    }
    Some(removed)
  }

  pub fn find_player(&self, player_id: &str) -> Option<&Player> {
    self.players.iter().find(|p| p.id == player_id)
  }

  pub fn is_host(&self, player_id: &str) -> bool {
    !self.host.id.is_empty() && self.host.id == player_id
  }

  pub fn mark_started(&mut self, game_state_id: impl Into<String>) -> Result<(), SessionError> {
    if self.status != LobbyStatus::AwaitingStart {
      return Err(SessionError::AlreadyStarted);
    }
    self.game_state_id = game_state_id.into();
    self.status = LobbyStatus::InProgress;
    Ok(())
  }

  pub fn mark_ended(&mut self) -> Result<(), SessionError> {
    if self.status == LobbyStatus::Ended {
      return Err(SessionError::GameEnded);
    }
    self.status = LobbyStatus::Ended;
    Ok(())
  }
}

/// The live table the rule engine mutates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
  pub id: String,
  pub game_definition_id: String,
  pub game_name: String,
  pub players: Vec<Player>,
  /// Id of the player whose turn it is.
  pub current_player: String,
  pub rules: GameRules,
  pub splash_text: String,
  /// Public views, visible to every player.
  pub views: Vec<View>,
}

impl GameState {
  pub fn player_index(&self, player_id: &str) -> Option<usize> {
    self.players.iter().position(|p| p.id == player_id)
  }

  /// Public views followed by each player's hand, in seat order.
  pub fn all_views(&self) -> impl Iterator<Item = &View> {
    self
      .views
      .iter()
      .chain(self.players.iter().flat_map(|p| p.hand.iter()))
  }

  pub fn find_view(&self, view_id: &str) -> Option<&View> {
    self.all_views().find(|v| v.id == view_id)
  }

  /// Every view unchanged, used to resync a client whose action was refused.
  pub fn baseline_changelog(&self) -> Changelog {
    Changelog {
      views: self.all_views().cloned().collect(),
      current_player: self.current_player.clone(),
      most_recent_action: String::new(),
    }
  }

  pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
    let index = self.player_index(player_id)?;
    Some(self.players.remove(index))
  }
}

/// Views touched by one turn, in their post-turn state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Changelog {
  pub views: Vec<View>,
  pub current_player: String,
  /// Human readable summary. Empty when the turn had no effect.
  pub most_recent_action: String,
}
