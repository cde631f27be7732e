//! HTTP and WebSocket surface: lobby entry points and the per-connection loop.

use crate::{
  config::ServerConfig,
  error::SessionError,
  game::{DefinitionSource, StoredDefinitions},
  lobby::{Admission, LobbyManager},
  repository::SessionStore,
  room::{ClientMessage, ConnectionHandle, RoomRegistry},
  store::{InMemoryStore, KeyValueStore},
};
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  http::{header::CONTENT_TYPE, Method, StatusCode},
  response::{IntoResponse, Response},
  routing::get,
  Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tower_http::{
  compression::CompressionLayer,
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

const ROOM_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl SessionError {
  pub fn status(&self) -> StatusCode {
    match self {
      SessionError::Validation(_) => StatusCode::BAD_REQUEST,
      SessionError::UnknownRoom(_) | SessionError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
      SessionError::RoomFull(_)
      | SessionError::AlreadyStarted
      | SessionError::NotStarted
      | SessionError::GameEnded
      | SessionError::NameTaken(_)
      | SessionError::DuplicateSession(_)
      | SessionError::OutOfTurn => StatusCode::CONFLICT,
      SessionError::NotHost => StatusCode::FORBIDDEN,
      SessionError::Internal(_) | SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for SessionError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!("Request failed: {}", self);
    } else {
      tracing::debug!("Request rejected: {}", self);
    }
    (status, self.to_string()).into_response()
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostParams {
  #[serde(default)]
  game_id: String,
  #[serde(default)]
  player_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinParams {
  #[serde(default)]
  room_code: String,
  #[serde(default)]
  player_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejoinParams {
  #[serde(default)]
  room_code: String,
  #[serde(default)]
  player_id: String,
}

async fn heartbeat() -> &'static str {
  "OK"
}

async fn host_lobby(
  State(lobbies): State<LobbyManager>,
  Query(params): Query<HostParams>,
  ws: WebSocketUpgrade,
) -> Response {
  match lobbies.host(&params.game_id, &params.player_name).await {
    Ok(admission) => ws.on_upgrade(move |socket| handle_socket(socket, lobbies, admission)),
    Err(e) => e.into_response(),
  }
}

async fn join_lobby(
  State(lobbies): State<LobbyManager>,
  Query(params): Query<JoinParams>,
  ws: WebSocketUpgrade,
) -> Response {
  match lobbies.join(&params.room_code, &params.player_name).await {
    Ok(admission) => ws.on_upgrade(move |socket| handle_socket(socket, lobbies, admission)),
    Err(e) => e.into_response(),
  }
}

async fn rejoin_lobby(
  State(lobbies): State<LobbyManager>,
  Query(params): Query<RejoinParams>,
  ws: WebSocketUpgrade,
) -> Response {
  match lobbies.rejoin(&params.room_code, &params.player_id).await {
    Ok(admission) => ws.on_upgrade(move |socket| handle_socket(socket, lobbies, admission)),
    Err(e) => e.into_response(),
  }
}

/// Pump one upgraded socket until either side goes away.
async fn handle_socket(socket: WebSocket, lobbies: LobbyManager, admission: Admission) {
  let (mut sink, mut stream) = socket.split();
  let (handle, mut outgoing) = ConnectionHandle::channel();
  let connection_id = handle.id();

  // Writer: drains the handle until a close frame or a failed send
  let player = admission.player_id.clone();
  let mut writer = tokio::spawn(async move {
    while let Some(msg) = outgoing.recv().await {
      let closing = matches!(msg, Message::Close(_));
      if sink.send(msg).await.is_err() {
        tracing::warn!("Failed to send message to {}", player);
        break;
      }
      if closing {
        break;
      }
    }
  });

  if lobbies.attach(&admission, handle).await.is_err() {
    let _ = writer.await;
    return;
  }

  let Admission {
    room_code,
    player_id,
    ..
  } = admission;

  loop {
    tokio::select! {
      frame = stream.next() => match frame {
        Some(Ok(Message::Text(text))) => {
          let msg = ClientMessage {
            player_id: player_id.clone(),
            text: text.as_str().to_string(),
          };
          if !lobbies.registry().enqueue(&room_code, msg).await {
            tracing::debug!("Room {} is gone, closing reader for {}", room_code, player_id);
            break;
          }
        }
        Some(Ok(Message::Close(_))) | None => {
          tracing::info!("Player {} closed connection", player_id);
          break;
        }
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          tracing::debug!("Read error for {}: {}", player_id, e);
          break;
        }
      },
      _ = &mut writer => break,
    }
  }

  lobbies.disconnect(&room_code, &player_id, connection_id).await;
  writer.abort();
}

/// The router with all lobby entry points mounted.
pub fn router(lobbies: LobbyManager) -> Router {
  let cors = CorsLayer::new()
    .allow_methods([Method::GET])
    .allow_origin(Any)
    .allow_headers([CONTENT_TYPE]);

  Router::new()
    .route("/", get(heartbeat))
    .route("/hostLobby", get(host_lobby))
    .route("/joinLobby", get(join_lobby))
    .route("/rejoinLobby", get(rejoin_lobby))
    .with_state(lobbies)
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .layer(CompressionLayer::new())
}

/// Session server builder.
pub struct Server {
  store: Arc<dyn KeyValueStore>,
  definitions: Option<Arc<dyn DefinitionSource>>,
  config: ServerConfig,
}

impl Server {
  /// Create a server backed by an in-memory store.
  pub fn new() -> Self {
    Self {
      store: Arc::new(InMemoryStore::new()),
      definitions: None,
      config: ServerConfig::default(),
    }
  }

  /// Configure the record store.
  pub fn with_store(mut self, store: impl KeyValueStore + 'static) -> Self {
    self.store = Arc::new(store);
    self
  }

  /// Configure where game definitions come from. Defaults to the store's `game:` keys.
  pub fn with_definitions(mut self, definitions: impl DefinitionSource + 'static) -> Self {
    self.definitions = Some(Arc::new(definitions));
    self
  }

  pub fn with_config(mut self, config: ServerConfig) -> Self {
    self.config = config;
    self
  }

  /// Wire up the lobby manager without serving.
  pub fn build(&self) -> LobbyManager {
    let definitions = self
      .definitions
      .clone()
      .unwrap_or_else(|| Arc::new(StoredDefinitions::new(self.store.clone())));
    let sessions = SessionStore::new(self.store.clone(), definitions, self.config.retention);
    LobbyManager::new(RoomRegistry::new(), sessions)
  }

  /// Restore live rooms and serve until the listener fails.
  pub async fn listen(self, addr: &str) -> anyhow::Result<()> {
    let lobbies = self.build();
    let restored = lobbies.restore_rooms().await?;
    if restored > 0 {
      tracing::info!("Restored {} rooms from the store", restored);
    }

    // Reclaim rooms whose lobbies expired or ended while nobody was connected
    let sweeper = lobbies.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(ROOM_SWEEP_INTERVAL);
      loop {
        interval.tick().await;
        sweeper.reap_idle_rooms().await;
      }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Session server listening on {}", addr);
    axum::serve(listener, router(lobbies)).await?;
    Ok(())
  }
}

impl Default for Server {
  fn default() -> Self {
    Self::new()
  }
}
