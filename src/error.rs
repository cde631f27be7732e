#[cfg(feature = "redis-backend")]
use redis::RedisError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[cfg(feature = "redis-backend")]
  #[error("Backend error: {0}")]
  Backend(#[from] RedisError),

  #[error("No record stored under '{0}'")]
  Missing(String),
}

/// The kind of entity a turn failed to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  View,
  Card,
  Collection,
  Player,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      EntityKind::View => "view",
      EntityKind::Card => "card",
      EntityKind::Collection => "collection",
      EntityKind::Player => "player",
    };
    f.write_str(name)
  }
}

/// Errors raised by the rule engine. A turn that returns one of these has not mutated the game state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
  #[error("could not find {kind} with id '{id}'")]
  NotFound { kind: EntityKind, id: String },

  #[error("'{id}' is not a {expected}")]
  TypeMismatch { id: String, expected: &'static str },

  #[error("'{0}' has no cards to pick from")]
  Empty(String),

  #[error("card '{card}' is not allowed in '{collection}'")]
  NotAdmitted { card: String, collection: String },
}

impl EngineError {
  pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
    EngineError::NotFound { kind, id: id.into() }
  }
}

/// Errors raised by the lobby lifecycle and the room processor.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("{0}")]
  Validation(String),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("no room with code '{0}'")]
  UnknownRoom(String),

  #[error("no player with id '{0}' in lobby")]
  UnknownPlayer(String),

  #[error("Lobby's max player count ({0}) already reached")]
  RoomFull(usize),

  #[error("Game has already started!")]
  AlreadyStarted,

  #[error("Game has not started yet")]
  NotStarted,

  #[error("Game has ended")]
  GameEnded,

  #[error("Name '{0}' already taken!")]
  NameTaken(String),

  #[error("Found already open connection for player '{0}'")]
  DuplicateSession(String),

  #[error("Player is not the host of the lobby!")]
  NotHost,

  #[error("Your action was rejected because it's not your turn!")]
  OutOfTurn,

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Errors decoding a client frame. These are logged and the frame is dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("malformed message: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("unknown jsonType '{0}'")]
  UnknownType(String),
}
