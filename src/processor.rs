//! The single consumer of a room's action queue.

use crate::{
  engine::SubmittedAction,
  error::SessionError,
  lobby::{Departure, LobbyManager},
  protocol::{ClientCommand, ServerMessage},
  room::ClientMessage,
  session::LobbyStatus,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;

/// Drains one room's queue, one message at a time.
///
/// Every game-state mutation for the room happens here, so actions never run
/// concurrently. The loop ends when the registry drops the queue.
pub struct RoomProcessor {
  room_code: String,
  lobbies: LobbyManager,
  queue: mpsc::UnboundedReceiver<ClientMessage>,
  rng: StdRng,
}

impl RoomProcessor {
  pub fn new(
    room_code: String,
    lobbies: LobbyManager,
    queue: mpsc::UnboundedReceiver<ClientMessage>,
  ) -> Self {
    Self {
      room_code,
      lobbies,
      queue,
      rng: StdRng::from_entropy(),
    }
  }

  pub async fn run(mut self) {
    tracing::info!("Room processor started for {}", self.room_code);
    while let Some(msg) = self.queue.recv().await {
      self.process(msg).await;
    }
    tracing::info!("Room processor stopped for {}", self.room_code);
  }

  async fn process(&mut self, msg: ClientMessage) {
    let command = match ClientCommand::decode(&msg.text) {
      Ok(command) => command,
      Err(e) => {
        tracing::warn!("Dropping message from {} in {}: {}", msg.player_id, self.room_code, e);
        return;
      }
    };
    let name = command.name();
    tracing::debug!("{} from {} in {}", name, msg.player_id, self.room_code);

    let sender = msg.player_id.as_str();
    let result = match command {
      ClientCommand::StartGame => self.start_game().await,
      ClientCommand::SubmitAction { game_id, action } => self.submit_action(sender, &game_id, action).await,
      ClientCommand::EndGame => self.lobbies.end_game(&self.room_code, sender).await.map(|_| None),
      ClientCommand::LeaveLobby => self
        .lobbies
        .leave(&self.room_code, sender)
        .await
        .map(announce),
      ClientCommand::KickPlayer { player_to_kick } => self
        .lobbies
        .kick(&self.room_code, sender, &player_to_kick)
        .await
        .map(announce),
    };

    match result {
      Ok(Some(messages)) => {
        for message in &messages {
          self.lobbies.registry().broadcast(&self.room_code, message).await;
        }
      }
      Ok(None) => {}
      Err(SessionError::UnknownRoom(_)) => {
        tracing::info!("Lobby {} no longer exists, closing its room", self.room_code);
        self
          .lobbies
          .registry()
          .close_room(&self.room_code, &ServerMessage::close("Lobby no longer exists"))
          .await;
      }
      Err(e) => {
        tracing::warn!("{} in {} failed for {}: {}", name, self.room_code, sender, e);
        self
          .lobbies
          .registry()
          .send_to(&self.room_code, sender, &ServerMessage::error(&e))
          .await;
      }
    }
  }

  async fn start_game(&mut self) -> Result<Option<Vec<ServerMessage>>, SessionError> {
    let state = self.lobbies.start_game(&self.room_code, &mut self.rng).await?;
    Ok(Some(vec![ServerMessage::game_state(state)]))
  }

  async fn submit_action(
    &mut self,
    sender: &str,
    game_id: &str,
    mut action: SubmittedAction,
  ) -> Result<Option<Vec<ServerMessage>>, SessionError> {
    // Acting player is whoever owns the connection
    action.player_id = sender.to_string();

    let sessions = self.lobbies.sessions();
    let lobby = sessions.load_lobby(&self.room_code).await?;
    match lobby.status {
      LobbyStatus::AwaitingStart => return Err(SessionError::NotStarted),
      LobbyStatus::Ended => return Err(SessionError::GameEnded),
      LobbyStatus::InProgress => {}
    }
    if !game_id.is_empty() && game_id != lobby.game_state_id {
      tracing::debug!("Client sent stale game id {} for {}", game_id, lobby.game_state_id);
    }

    let mut state = sessions.load_game_state(&lobby.game_state_id).await?;
    let registry = self.lobbies.registry();

    if state.rules.enforce_turn_order && state.current_player != sender {
      tracing::info!(
        "{} acted out of turn in {} (current player {})",
        sender,
        self.room_code,
        state.current_player
      );
      registry
        .send_to(&self.room_code, sender, &ServerMessage::Changelog(state.baseline_changelog()))
        .await;
      return Err(SessionError::OutOfTurn);
    }

    let turn = match action.decode() {
      Ok(turn) => turn,
      Err(e) => {
        tracing::warn!("Dropping malformed {:?} turn from {} in {}: {}", action.kind, sender, self.room_code, e);
        return Ok(None);
      }
    };

    let outcome = turn.execute(&mut state, sender, &mut self.rng);
    sessions.save_game_state(&mut state).await?;

    match outcome {
      Ok(changelog) => Ok(Some(vec![ServerMessage::Changelog(changelog)])),
      Err(refused) => {
        registry
          .broadcast(&self.room_code, &ServerMessage::Changelog(refused.changelog))
          .await;
        registry
          .send_to(&self.room_code, sender, &ServerMessage::error(&refused.cause))
          .await;
        Ok(None)
      }
    }
  }
}

/// Lobby snapshot for the remaining players, plus the turn update if the game is running.
fn announce(departure: Departure) -> Option<Vec<ServerMessage>> {
  if departure.closed {
    return None;
  }
  let mut messages = vec![ServerMessage::lobby("", departure.lobby)];
  if let Some(changelog) = departure.changelog {
    messages.push(ServerMessage::Changelog(changelog));
  }
  Some(messages)
}
