//! Redis key-value store.

use super::KeyValueStore;
use crate::error::StoreError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Redis-backed store for sharing records across processes.
///
/// Opens a multiplexed connection per call; Redis enforces expiry natively.
#[derive(Clone)]
pub struct RedisStore {
  client: Client,
}

impl RedisStore {
  /// Create a new Redis store from a connection string.
  ///
  /// Example: `RedisStore::new("redis://127.0.0.1/")?`
  pub fn new(addr: &str) -> Result<Self, StoreError> {
    Ok(Self {
      client: Client::open(addr)?,
    })
  }

  async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
    Ok(self.client.get_multiplexed_tokio_connection().await?)
  }
}

#[async_trait]
impl KeyValueStore for RedisStore {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let mut conn = self.connection().await?;
    let value: Option<Vec<u8>> = conn.get(key).await?;
    Ok(value)
  }

  async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
    let mut conn = self.connection().await?;
    match ttl {
      // Redis rejects SETEX with a zero expiry
      Some(ttl) => {
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs).await?;
      }
      None => conn.set::<_, _, ()>(key, value).await?,
    }
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<bool, StoreError> {
    let mut conn = self.connection().await?;
    let removed: u64 = conn.del(key).await?;
    Ok(removed > 0)
  }

  async fn scan(&self, prefix: &str) -> Result<BoxStream<'static, String>, StoreError> {
    let mut conn = self.connection().await?;
    let pattern = format!("{prefix}*");
    let mut keys = Vec::new();
    {
      let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
      while let Some(key) = iter.next_item().await {
        keys.push(key);
      }
    }
    tracing::debug!("Redis scan for '{}' found {} keys", pattern, keys.len());
    Ok(stream::iter(keys).boxed())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::StoreExt;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
  struct TestRecord {
    val: String,
  }

  // This test requires a running Redis instance at localhost:6379
  // Run: `docker run -p 6379:6379 redis`
  #[tokio::test]
  #[ignore]
  async fn redis_store_works() {
    let store = RedisStore::new("redis://127.0.0.1/").unwrap();

    store
      .set_json("parlor-test:1", &TestRecord { val: "hello".into() }, Some(Duration::from_secs(5)))
      .await
      .unwrap();

    let found: Option<TestRecord> = store.get_json("parlor-test:1").await.unwrap();
    assert_eq!(found, Some(TestRecord { val: "hello".into() }));

    let keys: Vec<String> = store.scan("parlor-test:").await.unwrap().collect().await;
    assert!(keys.contains(&"parlor-test:1".to_string()));

    assert!(store.delete("parlor-test:1").await.unwrap());
  }
}
