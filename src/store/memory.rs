//! In-memory key-value store with lazy expiry.

use super::KeyValueStore;
use crate::error::StoreError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

struct Entry {
  value: Vec<u8>,
  expires_at: Option<Instant>,
}

impl Entry {
  fn is_live(&self, now: Instant) -> bool {
    self.expires_at.map_or(true, |at| now < at)
  }
}

/// In-memory store backed by a mutex-guarded map.
///
/// Best for a single server process or for tests. Expired keys are dropped
/// the next time they are read or scanned.
#[derive(Clone, Default)]
pub struct InMemoryStore {
  entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of live keys currently held.
  pub fn len(&self) -> usize {
    let now = Instant::now();
    let map = self.entries.lock().expect("InMemoryStore lock poisoned");
    map.values().filter(|e| e.is_live(now)).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let now = Instant::now();
    let mut map = self.entries.lock().expect("InMemoryStore lock poisoned");

    match map.get(key) {
      Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
      Some(_) => {
        map.remove(key);
        Ok(None)
      }
      None => Ok(None),
    }
  }

  async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
    let expires_at = ttl.map(|ttl| Instant::now() + ttl);
    let mut map = self.entries.lock().expect("InMemoryStore lock poisoned");
    map.insert(key.to_string(), Entry { value, expires_at });
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<bool, StoreError> {
    let now = Instant::now();
    let mut map = self.entries.lock().expect("InMemoryStore lock poisoned");
    Ok(map.remove(key).is_some_and(|e| e.is_live(now)))
  }

  async fn scan(&self, prefix: &str) -> Result<BoxStream<'static, String>, StoreError> {
    let now = Instant::now();
    let keys: Vec<String> = {
      let mut map = self.entries.lock().expect("InMemoryStore lock poisoned");
      map.retain(|_, e| e.is_live(now));
      map.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    };
    Ok(stream::iter(keys).boxed())
  }
}
