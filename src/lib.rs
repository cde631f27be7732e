//! Real-time session server for turn-based tabletop card games.
//!
//! Players host or join a lobby over a WebSocket, the host starts the game and
//! every action is applied by the room's single processor, which persists the
//! new game state and broadcasts a changelog of the views it touched.
//!
//! ## Example
//! ```no_run
//! use parlor::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     Server::new().with_config(config.clone()).listen(&config.addr()).await
//! }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod lobby;
pub mod pieces;
pub mod processor;
pub mod protocol;
pub mod repository;
pub mod room;
pub mod server;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use error::{EngineError, ProtocolError, SessionError, StoreError};
pub use game::{DefinitionSource, GameDefinition, StoredDefinitions};
pub use lobby::LobbyManager;
pub use server::{router, Server};
pub use store::{InMemoryStore, KeyValueStore, StoreExt};

#[cfg(feature = "redis-backend")]
pub use store::RedisStore;

/// Install the global tracing subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
          "{}=debug,tower_http=debug,axum::rejection=trace",
          env!("CARGO_CRATE_NAME")
        )
        .into()
      }),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();
}

/// Load configuration, pick a store and serve.
pub async fn run() -> anyhow::Result<()> {
  let config = ServerConfig::from_env()?;
  init_tracing();

  let server = Server::new().with_config(config.clone());

  #[cfg(feature = "redis-backend")]
  let server = match &config.redis_url {
    Some(url) => {
      tracing::info!("Using Redis store at {}", url);
      server.with_store(RedisStore::new(url)?)
    }
    None => server,
  };
  #[cfg(not(feature = "redis-backend"))]
  let server = {
    if let Some(url) = &config.redis_url {
      tracing::warn!(
        "REDIS_URL is set to {} but the redis-backend feature is disabled, using the in-memory store",
        url
      );
    }
    server
  };

  server.listen(&config.addr()).await
}
