//! Registry of live rooms and the connections attached to them.

use crate::{error::SessionError, protocol::ServerMessage};
use axum::extract::ws::Message;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};
use tokio::sync::{mpsc, RwLock};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Write side of one client connection.
///
/// Frames pushed here are drained by the connection's writer task. A send
/// only fails once that task has gone away.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
  id: u64,
  sender: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
  pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
    Self {
      id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
      sender,
    }
  }

  /// A handle plus the receiver its writer task should drain.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self::new(tx), rx)
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn send_text(&self, text: &str) -> bool {
    self.sender.send(Message::Text(text.to_owned().into())).is_ok()
  }

  pub fn send(&self, msg: &ServerMessage) -> bool {
    match msg.encode() {
      Ok(text) => self.send_text(&text),
      Err(e) => {
        tracing::error!("Failed to encode outgoing message: {}", e);
        false
      }
    }
  }

  /// Ask the writer task to send a close frame and stop.
  pub fn close(&self) {
    let _ = self.sender.send(Message::Close(None));
  }
}

/// A raw frame read from a client, waiting for the room processor.
#[derive(Debug, Clone)]
pub struct ClientMessage {
  pub player_id: String,
  pub text: String,
}

struct Room {
  clients: HashMap<String, ConnectionHandle>,
  queue: mpsc::UnboundedSender<ClientMessage>,
}

/// All live rooms, keyed by room code.
///
/// The lock only guards map updates; frames are handed to unbounded
/// channels, so nothing awaits network I/O while it is held.
#[derive(Clone, Default)]
pub struct RoomRegistry {
  rooms: Arc<RwLock<HashMap<String, Room>>>,
}

impl RoomRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create the room if it does not exist yet.
  ///
  /// Returns the queue receiver for a newly created room, `None` if the room
  /// was already open.
  pub async fn open(&self, room_code: &str) -> Option<mpsc::UnboundedReceiver<ClientMessage>> {
    let mut rooms = self.rooms.write().await;
    if rooms.contains_key(room_code) {
      return None;
    }
    let (queue, rx) = mpsc::unbounded_channel();
    rooms.insert(
      room_code.to_string(),
      Room {
        clients: HashMap::new(),
        queue,
      },
    );
    tracing::info!("Opened room {}", room_code);
    Some(rx)
  }

  pub async fn has_room(&self, room_code: &str) -> bool {
    self.rooms.read().await.contains_key(room_code)
  }

  pub async fn is_connected(&self, room_code: &str, player_id: &str) -> bool {
    self
      .rooms
      .read()
      .await
      .get(room_code)
      .is_some_and(|room| room.clients.contains_key(player_id))
  }

  pub async fn register(
    &self,
    room_code: &str,
    player_id: &str,
    handle: ConnectionHandle,
  ) -> Result<(), SessionError> {
    let mut rooms = self.rooms.write().await;
    let room = rooms
      .get_mut(room_code)
      .ok_or_else(|| SessionError::UnknownRoom(room_code.to_string()))?;
    if room.clients.contains_key(player_id) {
      return Err(SessionError::DuplicateSession(player_id.to_string()));
    }
    room.clients.insert(player_id.to_string(), handle);
    tracing::info!("Player {} connected to room {}", player_id, room_code);
    Ok(())
  }

  /// Drop the entry for `player_id` if it still belongs to `connection_id`.
  pub async fn unregister(&self, room_code: &str, player_id: &str, connection_id: u64) -> bool {
    let mut rooms = self.rooms.write().await;
    let Some(room) = rooms.get_mut(room_code) else {
      return false;
    };
    if room.clients.get(player_id).is_some_and(|h| h.id == connection_id) {
      room.clients.remove(player_id);
      tracing::info!("Player {} disconnected from room {}", player_id, room_code);
      return true;
    }
    false
  }

  /// Hand a frame to the room processor. `false` if the room is gone.
  pub async fn enqueue(&self, room_code: &str, msg: ClientMessage) -> bool {
    self
      .rooms
      .read()
      .await
      .get(room_code)
      .is_some_and(|room| room.queue.send(msg).is_ok())
  }

  /// Send `msg` to every connection in the room, dropping dead ones.
  pub async fn broadcast(&self, room_code: &str, msg: &ServerMessage) {
    let text = match msg.encode() {
      Ok(text) => text,
      Err(e) => {
        tracing::error!("Failed to encode broadcast for room {}: {}", room_code, e);
        return;
      }
    };

    let dead: Vec<(String, u64)> = {
      let rooms = self.rooms.read().await;
      let Some(room) = rooms.get(room_code) else {
        return;
      };
      room
        .clients
        .iter()
        .filter(|(_, handle)| !handle.send_text(&text))
        .map(|(player_id, handle)| (player_id.clone(), handle.id))
        .collect()
    };

    for (player_id, connection_id) in dead {
      tracing::warn!("Dropping dead connection for {} in room {}", player_id, room_code);
      self.unregister(room_code, &player_id, connection_id).await;
    }
  }

  /// Send `msg` to one player. Returns whether it was handed off.
  pub async fn send_to(&self, room_code: &str, player_id: &str, msg: &ServerMessage) -> bool {
    let handle = {
      let rooms = self.rooms.read().await;
      rooms
        .get(room_code)
        .and_then(|room| room.clients.get(player_id))
        .cloned()
    };
    let Some(handle) = handle else {
      return false;
    };
    if handle.send(msg) {
      return true;
    }
    self.unregister(room_code, player_id, handle.id).await;
    false
  }

  /// Remove a player's connection, sending `notice` before closing it.
  pub async fn close_player(&self, room_code: &str, player_id: &str, notice: &ServerMessage) {
    let handle = {
      let mut rooms = self.rooms.write().await;
      rooms
        .get_mut(room_code)
        .and_then(|room| room.clients.remove(player_id))
    };
    if let Some(handle) = handle {
      handle.send(notice);
      handle.close();
    }
  }

  /// Tear the room down: notify and close every connection and drop the queue.
  pub async fn close_room(&self, room_code: &str, notice: &ServerMessage) {
    let room = self.rooms.write().await.remove(room_code);
    let Some(room) = room else {
      return;
    };
    for handle in room.clients.values() {
      handle.send(notice);
      handle.close();
    }
    tracing::info!("Closed room {}", room_code);
  }

  /// Drop the room and its queue if no connection is attached.
  pub async fn close_if_idle(&self, room_code: &str) -> bool {
    let mut rooms = self.rooms.write().await;
    if !rooms.get(room_code).is_some_and(|room| room.clients.is_empty()) {
      return false;
    }
    rooms.remove(room_code);
    tracing::info!("Reclaimed idle room {}", room_code);
    true
  }

  pub async fn room_codes(&self) -> Vec<String> {
    self.rooms.read().await.keys().cloned().collect()
  }
}
