//! Typed persistence of lobby and game-state records.

use crate::{
  error::{SessionError, StoreError},
  game::{DefinitionSource, GameDefinition},
  session::{generate_id, generate_room_code, GameState, Lobby},
  store::{game_state_key, lobby_key, KeyValueStore, StoreExt, LOBBY_PREFIX},
};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};

/// Default lifetime of lobby and game-state records.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(168 * 60 * 60);

const ROOM_CODE_ATTEMPTS: usize = 32;

/// Reads and writes session records through a [`KeyValueStore`].
///
/// Every write refreshes the record's expiry to `retention`.
#[derive(Clone)]
pub struct SessionStore {
  store: Arc<dyn KeyValueStore>,
  definitions: Arc<dyn DefinitionSource>,
  retention: Duration,
}

impl SessionStore {
  pub fn new(
    store: Arc<dyn KeyValueStore>,
    definitions: Arc<dyn DefinitionSource>,
    retention: Duration,
  ) -> Self {
    Self {
      store,
      definitions,
      retention,
    }
  }

  pub async fn definition(&self, id: &str) -> Result<GameDefinition, StoreError> {
    self.definitions.get(id).await
  }

  pub async fn find_lobby(&self, room_code: &str) -> Result<Option<Lobby>, StoreError> {
    self.store.get_json(&lobby_key(room_code)).await
  }

  pub async fn load_lobby(&self, room_code: &str) -> Result<Lobby, SessionError> {
    self
      .find_lobby(room_code)
      .await?
      .ok_or_else(|| SessionError::UnknownRoom(room_code.to_string()))
  }

  pub async fn save_lobby(&self, lobby: &Lobby) -> Result<(), StoreError> {
    self
      .store
      .set_json(&lobby_key(&lobby.room_code), lobby, Some(self.retention))
      .await?;
    tracing::debug!("Saved lobby {} ({:?})", lobby.room_code, lobby.status);
    Ok(())
  }

  pub async fn delete_lobby(&self, room_code: &str) -> Result<bool, StoreError> {
    self.store.delete(&lobby_key(room_code)).await
  }

  /// Create and save an empty lobby for `definition` under a fresh room code.
  pub async fn create_lobby(&self, definition: &GameDefinition) -> Result<Lobby, SessionError> {
    for _ in 0..ROOM_CODE_ATTEMPTS {
      let code = generate_room_code();
      if self.store.get(&lobby_key(&code)).await?.is_some() {
        continue;
      }
      let lobby = Lobby::new(code, definition);
      self.save_lobby(&lobby).await?;
      tracing::info!("Created lobby {} for game {}", lobby.room_code, definition.id);
      return Ok(lobby);
    }
    Err(SessionError::Internal("could not allocate a room code".into()))
  }

  pub async fn load_game_state(&self, id: &str) -> Result<GameState, SessionError> {
    let key = game_state_key(id);
    let state = self.store.get_json(&key).await?;
    state.ok_or(SessionError::Store(StoreError::Missing(key)))
  }

  /// Save `state`, assigning it an id first if it has none.
  pub async fn save_game_state(&self, state: &mut GameState) -> Result<(), StoreError> {
    if state.id.is_empty() {
      state.id = generate_id();
    }
    self
      .store
      .set_json(&game_state_key(&state.id), state, Some(self.retention))
      .await
  }

  /// Room codes of every stored lobby.
  pub async fn room_codes(&self) -> Result<Vec<String>, StoreError> {
    let keys: Vec<String> = self.store.scan(LOBBY_PREFIX).await?.collect().await;
    Ok(
      keys
        .into_iter()
        .filter_map(|k| k.strip_prefix(LOBBY_PREFIX).map(str::to_string))
        .collect(),
    )
  }
}
