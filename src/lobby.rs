//! Lobby lifecycle: hosting, joining, rejoining, leaving and kicking.
//!
//! [`LobbyManager`] is split into an admission phase, run before the socket
//! upgrade so failures can still be answered with an HTTP status, and an
//! attach phase that registers the upgraded connection with the room.

use crate::{
  engine::{initial_state, EndTurn, Turn},
  error::SessionError,
  processor::RoomProcessor,
  protocol::ServerMessage,
  repository::SessionStore,
  room::{ConnectionHandle, RoomRegistry},
  session::{Changelog, GameState, Lobby, LobbyStatus},
};
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const REMOVED_NOTICE: &str = "Player has been removed from Lobby. Closing connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionKind {
  Host,
  Join,
  Rejoin,
}

/// A validated request to connect `player_id` to `room_code`.
#[derive(Debug, Clone)]
pub struct Admission {
  pub room_code: String,
  pub player_id: String,
  pub kind: AdmissionKind,
}

/// Result of removing a player from a lobby.
#[derive(Debug, Clone)]
pub struct Departure {
  pub lobby: Lobby,
  /// Set when the game was running; carries the updated turn holder.
  pub changelog: Option<Changelog>,
  /// Whether the last player left and the room was torn down.
  pub closed: bool,
}

#[derive(Clone)]
pub struct LobbyManager {
  registry: RoomRegistry,
  sessions: SessionStore,
  /// Serializes lobby read-modify-write sequences.
  records: Arc<Mutex<()>>,
}

fn require(value: &str, name: &str) -> Result<(), SessionError> {
  if value.trim().is_empty() {
    return Err(SessionError::Validation(format!("Missing {name} in request")));
  }
  Ok(())
}

impl LobbyManager {
  pub fn new(registry: RoomRegistry, sessions: SessionStore) -> Self {
    Self {
      registry,
      sessions,
      records: Arc::new(Mutex::new(())),
    }
  }

  pub fn registry(&self) -> &RoomRegistry {
    &self.registry
  }

  pub fn sessions(&self) -> &SessionStore {
    &self.sessions
  }

  /// Create a lobby for `game_id` with `player_name` as host and open its room.
  pub async fn host(&self, game_id: &str, player_name: &str) -> Result<Admission, SessionError> {
    require(game_id, "gameId")?;
    require(player_name, "playerName")?;

    let definition = self.sessions.definition(game_id).await.map_err(|e| {
      tracing::warn!("Could not load game definition {}: {}", game_id, e);
      SessionError::Internal(format!("Unable to load game '{game_id}'"))
    })?;

    let _guard = self.records.lock().await;
    let mut lobby = self.sessions.create_lobby(&definition).await?;
    let player = lobby.add_player(player_name)?;
    self
      .sessions
      .save_lobby(&lobby)
      .await
      .map_err(|e| SessionError::Internal(e.to_string()))?;

    self.open_room(&lobby.room_code).await;
    tracing::info!("{} is hosting lobby {}", player_name, lobby.room_code);
    Ok(Admission {
      room_code: lobby.room_code,
      player_id: player.id,
      kind: AdmissionKind::Host,
    })
  }

  /// Seat `player_name` in an open lobby.
  pub async fn join(&self, room_code: &str, player_name: &str) -> Result<Admission, SessionError> {
    require(room_code, "roomCode")?;
    require(player_name, "playerName")?;

    if !self.registry.has_room(room_code).await {
      return Err(SessionError::UnknownRoom(room_code.to_string()));
    }

    let _guard = self.records.lock().await;
    let mut lobby = self.sessions.load_lobby(room_code).await?;
    let player = lobby.add_player(player_name)?;
    self.sessions.save_lobby(&lobby).await?;

    tracing::info!("{} joined lobby {}", player_name, room_code);
    Ok(Admission {
      room_code: room_code.to_string(),
      player_id: player.id,
      kind: AdmissionKind::Join,
    })
  }

  /// Reconnect a player who joined before.
  pub async fn rejoin(&self, room_code: &str, player_id: &str) -> Result<Admission, SessionError> {
    require(room_code, "roomCode")?;
    require(player_id, "playerId")?;

    let lobby = self.sessions.load_lobby(room_code).await?;
    if lobby.find_player(player_id).is_none() {
      return Err(SessionError::UnknownPlayer(player_id.to_string()));
    }
    if self.registry.is_connected(room_code, player_id).await {
      return Err(SessionError::DuplicateSession(player_id.to_string()));
    }
    if lobby.status != LobbyStatus::Ended {
      self.open_room(room_code).await;
    }

    Ok(Admission {
      room_code: room_code.to_string(),
      player_id: player_id.to_string(),
      kind: AdmissionKind::Rejoin,
    })
  }

  /// Bind an upgraded connection to its admission.
  ///
  /// On error the connection has already been told why and asked to close.
  pub async fn attach(&self, admission: &Admission, handle: ConnectionHandle) -> Result<(), SessionError> {
    let result = self.try_attach(admission, handle.clone()).await;
    if let Err(e) = &result {
      tracing::warn!(
        "Could not attach {} to room {}: {}",
        admission.player_id,
        admission.room_code,
        e
      );
      if admission.kind == AdmissionKind::Join {
        self
          .registry
          .unregister(&admission.room_code, &admission.player_id, handle.id())
          .await;
        if let Err(release) = self.release_seat(&admission.room_code, &admission.player_id).await {
          tracing::warn!("Could not release seat of {}: {}", admission.player_id, release);
        }
      }
      handle.send(&ServerMessage::error(e));
      handle.close();
    }
    result
  }

  /// Give back the seat of a joiner whose connection never attached.
  async fn release_seat(&self, room_code: &str, player_id: &str) -> Result<(), SessionError> {
    let _guard = self.records.lock().await;
    let mut lobby = self.sessions.load_lobby(room_code).await?;
    if lobby.status == LobbyStatus::AwaitingStart && lobby.remove_player(player_id).is_some() {
      self.sessions.save_lobby(&lobby).await?;
      tracing::info!("Released unattached seat of {} in lobby {}", player_id, room_code);
    }
    Ok(())
  }

  async fn try_attach(&self, admission: &Admission, handle: ConnectionHandle) -> Result<(), SessionError> {
    let Admission {
      room_code,
      player_id,
      kind,
    } = admission;

    match kind {
      AdmissionKind::Host => {
        self.registry.register(room_code, player_id, handle).await?;
        let lobby = self.sessions.load_lobby(room_code).await?;
        self
          .registry
          .send_to(room_code, player_id, &ServerMessage::lobby(player_id.as_str(), lobby))
          .await;
      }
      AdmissionKind::Join => {
        self.registry.register(room_code, player_id, handle).await?;
        let lobby = self.sessions.load_lobby(room_code).await?;
        self
          .registry
          .broadcast(room_code, &ServerMessage::lobby(player_id.as_str(), lobby))
          .await;
      }
      AdmissionKind::Rejoin => {
        let lobby = self.sessions.load_lobby(room_code).await?;
        let snapshot = match lobby.status {
          LobbyStatus::AwaitingStart => ServerMessage::lobby(player_id.as_str(), lobby),
          LobbyStatus::InProgress => {
            ServerMessage::game_state(self.sessions.load_game_state(&lobby.game_state_id).await?)
          }
          LobbyStatus::Ended => return Err(SessionError::GameEnded),
        };
        handle.send(&snapshot);
        self.registry.register(room_code, player_id, handle).await?;
        tracing::info!("Player {} rejoined room {}", player_id, room_code);
      }
    }
    Ok(())
  }

  /// The single cleanup path for a connection that went away on its own.
  ///
  /// The player keeps their seat and may rejoin.
  pub async fn disconnect(&self, room_code: &str, player_id: &str, connection_id: u64) {
    if !self.registry.unregister(room_code, player_id, connection_id).await {
      return;
    }
    tracing::debug!("Connection {} for {} cleaned up", connection_id, player_id);
    if let Err(e) = self.reap_room(room_code).await {
      tracing::warn!("Could not check room {} for reclaiming: {}", room_code, e);
    }
  }

  /// Close `room_code` if nobody is connected and its lobby is gone or ended.
  ///
  /// Rooms of live lobbies stay open for rejoins until the lobby record expires.
  pub async fn reap_room(&self, room_code: &str) -> Result<bool, SessionError> {
    match self.sessions.find_lobby(room_code).await? {
      Some(lobby) if lobby.status != LobbyStatus::Ended => Ok(false),
      _ => Ok(self.registry.close_if_idle(room_code).await),
    }
  }

  /// Sweep every open room through [`LobbyManager::reap_room`].
  pub async fn reap_idle_rooms(&self) -> usize {
    let mut reaped = 0;
    for code in self.registry.room_codes().await {
      match self.reap_room(&code).await {
        Ok(true) => reaped += 1,
        Ok(false) => {}
        Err(e) => tracing::warn!("Could not check room {} for reclaiming: {}", code, e),
      }
    }
    if reaped > 0 {
      tracing::info!("Reclaimed {} idle rooms", reaped);
    }
    reaped
  }

  /// Remove `player_id` from the lobby, and from the game if it is running.
  pub async fn leave(&self, room_code: &str, player_id: &str) -> Result<Departure, SessionError> {
    let departure = {
      let _guard = self.records.lock().await;
      let mut lobby = self.sessions.load_lobby(room_code).await?;
      lobby
        .remove_player(player_id)
        .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))?;

      let changelog = if lobby.status == LobbyStatus::InProgress {
        let mut state = self.sessions.load_game_state(&lobby.game_state_id).await?;
        remove_from_game(&mut state, player_id);
        self.sessions.save_game_state(&mut state).await?;
        Some(state.baseline_changelog())
      } else {
        None
      };

      let closed = lobby.players.is_empty();
      if closed {
        self.sessions.delete_lobby(room_code).await?;
      } else {
        self.sessions.save_lobby(&lobby).await?;
      }
      Departure {
        lobby,
        changelog,
        closed,
      }
    };

    tracing::info!("Player {} left lobby {}", player_id, room_code);
    self
      .registry
      .close_player(room_code, player_id, &ServerMessage::close(REMOVED_NOTICE))
      .await;
    if departure.closed {
      self
        .registry
        .close_room(room_code, &ServerMessage::close("Lobby is empty"))
        .await;
    }
    Ok(departure)
  }

  /// Host-only removal of another player.
  pub async fn kick(&self, room_code: &str, requester: &str, target: &str) -> Result<Departure, SessionError> {
    let lobby = self.sessions.load_lobby(room_code).await?;
    if !lobby.is_host(requester) {
      return Err(SessionError::NotHost);
    }
    tracing::info!("Host {} kicked {} from {}", requester, target, room_code);
    self.leave(room_code, target).await
  }

  /// Build and persist the opening table, moving the lobby to in-progress.
  pub async fn start_game<R: RngCore + Send>(
    &self,
    room_code: &str,
    rng: &mut R,
  ) -> Result<GameState, SessionError> {
    let _guard = self.records.lock().await;
    let mut lobby = self.sessions.load_lobby(room_code).await?;
    if lobby.status != LobbyStatus::AwaitingStart {
      return Err(SessionError::AlreadyStarted);
    }

    let definition = self
      .sessions
      .definition(&lobby.game_definition_id)
      .await
      .map_err(|e| SessionError::Internal(e.to_string()))?;
    let mut state = initial_state(&definition, &lobby, rng);
    self.sessions.save_game_state(&mut state).await?;

    lobby.mark_started(state.id.clone())?;
    self.sessions.save_lobby(&lobby).await?;
    tracing::info!("Game {} started in lobby {}", state.id, room_code);
    Ok(state)
  }

  /// Host-only: end the game and tear the room down.
  pub async fn end_game(&self, room_code: &str, requester: &str) -> Result<(), SessionError> {
    {
      let _guard = self.records.lock().await;
      let mut lobby = self.sessions.load_lobby(room_code).await?;
      if !lobby.is_host(requester) {
        return Err(SessionError::NotHost);
      }
      lobby.mark_ended()?;
      self.sessions.save_lobby(&lobby).await?;
    }

    tracing::info!("Game in lobby {} ended by host", room_code);
    self
      .registry
      .close_room(room_code, &ServerMessage::close(SessionError::GameEnded))
      .await;
    Ok(())
  }

  /// Open the room and spawn its processor, unless it is already running.
  pub async fn open_room(&self, room_code: &str) {
    if let Some(queue) = self.registry.open(room_code).await {
      let processor = RoomProcessor::new(room_code.to_string(), self.clone(), queue);
      tokio::spawn(processor.run());
    }
  }

  /// Re-open a room for every stored lobby that has not ended.
  pub async fn restore_rooms(&self) -> Result<usize, SessionError> {
    let mut restored = 0;
    for code in self.sessions.room_codes().await? {
      match self.sessions.find_lobby(&code).await? {
        Some(lobby) if lobby.status != LobbyStatus::Ended => {
          self.open_room(&code).await;
          restored += 1;
        }
        _ => {}
      }
    }
    Ok(restored)
  }
}

/// Drop `player_id` from the game, passing the turn on first if it was theirs.
fn remove_from_game(state: &mut GameState, player_id: &str) {
  if state.current_player == player_id {
    let mut rng = rand::thread_rng();
    if let Err(e) = Turn::EndTurn(EndTurn::default()).execute(state, player_id, &mut rng) {
      tracing::warn!("Could not pass turn for departing {}: {}", player_id, e);
    }
  }
  state.remove_player(player_id);
  if state.current_player == player_id {
    state.current_player = state.players.first().map(|p| p.id.clone()).unwrap_or_default();
  }
}
