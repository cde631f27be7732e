//! Key-value persistence abstraction with in-memory and Redis backends.
//!
//! This module provides a trait [`KeyValueStore`] and two implementations:
//! [`InMemoryStore`] for local, single-process use (and tests), and
//! [`RedisStore`] for sharing lobby and game records across processes.
//!
//! Values are opaque bytes at the trait level. [`StoreExt`] layers JSON
//! encoding on top so callers can read and write typed records directly.
//! Every write may carry a time-to-live after which the key disappears.
//!
//! ## Example Usage
//! ```no_run
//! use parlor::store::{InMemoryStore, StoreExt};
//! use serde::{Serialize, Deserialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note { text: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryStore::new();
//!     store.set_json("note:1", &Note { text: "hi".into() }, Some(Duration::from_secs(60))).await.unwrap();
//!     let note: Option<Note> = store.get_json("note:1").await.unwrap();
//!     assert!(note.is_some());
//! }
//! ```

use crate::error::StoreError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::InMemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis::RedisStore;

/// Key prefix for lobby records, followed by the room code.
pub const LOBBY_PREFIX: &str = "lobby:";
/// Key prefix for game state records, followed by the game state id.
pub const GAME_STATE_PREFIX: &str = "gameState:";
/// Key prefix for game definitions, owned by the definition service.
pub const GAME_PREFIX: &str = "game:";

pub fn lobby_key(room_code: &str) -> String {
  format!("{LOBBY_PREFIX}{room_code}")
}

pub fn game_state_key(id: &str) -> String {
  format!("{GAME_STATE_PREFIX}{id}")
}

pub fn game_key(id: &str) -> String {
  format!("{GAME_PREFIX}{id}")
}

/// Trait implemented by all storage backends.
///
/// The store is treated as non-transactional: there is no atomicity across
/// keys, and callers must tolerate a crash between two writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Fetch the raw value stored under `key`, or `None` if absent or expired.
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Store `value` under `key`, replacing any previous value.
  ///
  /// ## Parameters
  /// - `ttl`: Optional time-to-live. `None` keeps the key until deleted.
  async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;

  /// Remove `key`. Returns whether a value was actually removed.
  async fn delete(&self, key: &str) -> Result<bool, StoreError>;

  /// List every live key starting with `prefix`.
  ///
  /// The stream is detached from the backend connection and can be consumed at leisure.
  async fn scan(&self, prefix: &str) -> Result<BoxStream<'static, String>, StoreError>;
}

/// Extension trait providing JSON-typed access on top of any [`KeyValueStore`].
#[async_trait]
pub trait StoreExt: KeyValueStore {
  /// Read and decode the record under `key`.
  async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StoreError> {
    match self.get(key).await? {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  /// Encode and write `value` under `key`.
  async fn set_json<T: Serialize + Send + Sync>(
    &self,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
  ) -> Result<(), StoreError> {
    let payload = serde_json::to_vec(value)?;
    self.set(key, payload, ttl).await
  }
}

// Blanket implementation
impl<T: KeyValueStore + ?Sized> StoreExt for T {}
