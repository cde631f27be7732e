use axum::extract::ws::Message;
use parlor::{
  game::{Dealer, GameDefinition, GameRules, Sparks, StoredDefinitions},
  lobby::{Admission, LobbyManager},
  pieces::{Card, CardPlace, Deck, View},
  protocol::ServerMessage,
  room::{ClientMessage, ConnectionHandle},
  session::LobbyStatus,
  InMemoryStore, Server, SessionError,
};
use serde_json::json;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::timeout};

struct Client {
  room: String,
  id: String,
  connection: u64,
  rx: mpsc::UnboundedReceiver<Message>,
}

impl Client {
  async fn frame(&mut self) -> Message {
    timeout(Duration::from_secs(2), self.rx.recv())
      .await
      .expect("timed out waiting for a frame")
      .expect("connection channel closed")
  }

  async fn next(&mut self) -> ServerMessage {
    match self.frame().await {
      Message::Text(text) => serde_json::from_str(text.as_str()).expect("bad server frame"),
      other => panic!("expected a text frame, got {other:?}"),
    }
  }

  async fn wait_for(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
      let msg = self.next().await;
      if pred(&msg) {
        return msg;
      }
    }
  }

  async fn send(&self, lobbies: &LobbyManager, command: serde_json::Value) {
    self.send_text(lobbies, &command.to_string()).await;
  }

  async fn send_text(&self, lobbies: &LobbyManager, text: &str) {
    let msg = ClientMessage {
      player_id: self.id.clone(),
      text: text.to_string(),
    };
    assert!(lobbies.registry().enqueue(&self.room, msg).await);
  }

  fn is_idle(&mut self) -> bool {
    self.rx.try_recv().is_err()
  }
}

async fn connect(lobbies: &LobbyManager, admission: Admission) -> Client {
  let (handle, rx) = ConnectionHandle::channel();
  let connection = handle.id();
  lobbies.attach(&admission, handle).await.expect("attach failed");
  Client {
    room: admission.room_code,
    id: admission.player_id,
    connection,
    rx,
  }
}

fn definition(max_players: usize, deal: usize) -> GameDefinition {
  let mut table = View::new("table", 0);
  table
    .pieces
    .decks
    .push(Deck::new("draw").with_cards((0..20).map(|i| Card::new(format!("c{i}")))));
  table.pieces.card_places.push(CardPlace::new("discard"));

  let mut views = vec![table];
  views.extend((1..=4).map(|n| View::new(format!("hand-{n}"), n)));

  GameDefinition {
    id: "rummy".into(),
    name: "Rummy".into(),
    max_players,
    rules: GameRules {
      enforce_turn_order: true,
      show_other_player_details: false,
    },
    sparks: Sparks {
      dealer: Dealer {
        enabled: deal > 0,
        num_to_deal: deal,
        deck_to_use: "draw".into(),
      },
      ..Sparks::default()
    },
    views,
    ..GameDefinition::default()
  }
}

async fn server(definition: GameDefinition) -> LobbyManager {
  let store = InMemoryStore::new();
  StoredDefinitions::new(Arc::new(store.clone()))
    .put(definition)
    .await
    .unwrap();
  Server::new().with_store(store).build()
}

fn is_game_state(msg: &ServerMessage) -> bool {
  matches!(msg, ServerMessage::GameState(_))
}

#[tokio::test]
async fn dealer_deals_five_cards_to_four_players() {
  let lobbies = server(definition(4, 5)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut clients = vec![connect(&lobbies, host).await];
  for name in ["bob", "carol", "dave"] {
    let admission = lobbies.join(&room, name).await.unwrap();
    clients.push(connect(&lobbies, admission).await);
  }

  clients[0].send(&lobbies, json!({"jsonType": "startGame"})).await;

  let mut states = Vec::new();
  for client in &mut clients {
    match client.wait_for(is_game_state).await {
      ServerMessage::GameState(state) => states.push(state),
      _ => unreachable!(),
    }
  }

  let state = &states[0];
  assert_eq!(state.players.len(), 4);
  assert_eq!(state.current_player, clients[0].id);

  let mut dealt = HashSet::new();
  for player in &state.players {
    let hand = &player.hand[0].pieces.orphans;
    assert_eq!(hand.len(), 5);
    for card in hand {
      assert!(dealt.insert(card.piece.id.clone()), "card dealt twice");
    }
  }
  assert_eq!(dealt.len(), 20);
  assert!(state.views[0].pieces.decks[0].cards.is_empty());

  let lobby = lobbies.sessions().load_lobby(&room).await.unwrap();
  assert_eq!(lobby.status, LobbyStatus::InProgress);
  assert_eq!(lobby.game_state_id, state.id);
  let stored = lobbies.sessions().load_game_state(&state.id).await.unwrap();
  assert_eq!(&stored, state.as_ref());
}

#[tokio::test]
async fn join_is_rejected_when_full_or_started() {
  let lobbies = server(definition(2, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;

  assert!(matches!(lobbies.join(&room, "alice").await, Err(SessionError::NameTaken(_))));
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let _bob = connect(&lobbies, bob).await;

  assert!(matches!(lobbies.join(&room, "carol").await, Err(SessionError::RoomFull(2))));
  let lobby = lobbies.sessions().load_lobby(&room).await.unwrap();
  assert_eq!(lobby.num_players, 2);
  assert_eq!(lobby.players.len(), 2);

  assert!(matches!(lobbies.join("QQQQ", "erin").await, Err(SessionError::UnknownRoom(_))));
  assert!(matches!(lobbies.join(&room, "").await, Err(SessionError::Validation(_))));

  // Bob's arrival is broadcast to the host with Bob's id
  let joined = alice
    .wait_for(|m| matches!(m, ServerMessage::LobbyInfo(info) if info.lobby_info.num_players == 2))
    .await;
  assert!(matches!(joined, ServerMessage::LobbyInfo(info) if !info.player_id.is_empty()));
}

#[tokio::test]
async fn rejoin_resyncs_according_to_status() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let bob = connect(&lobbies, bob).await;
  let bob_id = bob.id.clone();

  // Still connected
  assert!(matches!(
    lobbies.rejoin(&room, &bob_id).await,
    Err(SessionError::DuplicateSession(_))
  ));
  assert!(matches!(
    lobbies.rejoin(&room, "stranger").await,
    Err(SessionError::UnknownPlayer(_))
  ));

  // Awaiting start: lobby snapshot
  lobbies.disconnect(&room, &bob_id, bob.connection).await;
  let mut bob = connect(&lobbies, lobbies.rejoin(&room, &bob_id).await.unwrap()).await;
  assert!(matches!(bob.next().await, ServerMessage::LobbyInfo(info) if info.player_id == bob_id));

  // In progress: the live game state
  alice.send(&lobbies, json!({"jsonType": "startGame"})).await;
  alice.wait_for(is_game_state).await;
  bob.wait_for(is_game_state).await;
  lobbies.disconnect(&room, &bob_id, bob.connection).await;
  let mut bob = connect(&lobbies, lobbies.rejoin(&room, &bob_id).await.unwrap()).await;
  match bob.next().await {
    ServerMessage::GameState(state) => assert_eq!(state.players.len(), 2),
    other => panic!("expected game state, got {other:?}"),
  }

  // Ended: error then close, and no registration
  alice.send(&lobbies, json!({"jsonType": "endGame"})).await;
  assert!(matches!(alice.wait_for(|m| matches!(m, ServerMessage::Close(_))).await, ServerMessage::Close(_)));
  assert!(matches!(alice.frame().await, Message::Close(_)));

  let admission = lobbies.rejoin(&room, &bob_id).await.unwrap();
  let (handle, mut rx) = ConnectionHandle::channel();
  let err = lobbies.attach(&admission, handle).await.unwrap_err();
  assert!(matches!(err, SessionError::GameEnded));
  assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t.as_str().contains("\"Error\"")));
  assert!(matches!(rx.recv().await, Some(Message::Close(_))));
  assert!(!lobbies.registry().has_room(&room).await);
}

#[tokio::test]
async fn out_of_turn_action_changes_nothing() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let mut bob = connect(&lobbies, bob).await;

  alice.send(&lobbies, json!({"jsonType": "startGame"})).await;
  alice.wait_for(is_game_state).await;
  bob.wait_for(is_game_state).await;

  let lobby = lobbies.sessions().load_lobby(&room).await.unwrap();
  let before = lobbies.sessions().load_game_state(&lobby.game_state_id).await.unwrap();

  let end_turn = json!({
    "jsonType": "submitAction",
    "data": {"gameId": lobby.game_state_id, "action": {"type": "EndTurn", "playerId": alice.id, "turn": {}}}
  });
  // Bob claims to be Alice, the server acts on the connection's identity
  bob.send(&lobbies, end_turn.clone()).await;

  match bob.next().await {
    ServerMessage::Changelog(changelog) => {
      let ids: Vec<&str> = changelog.views.iter().map(|v| v.id.as_str()).collect();
      assert_eq!(ids, vec!["table", "hand-1", "hand-2"]);
      assert_eq!(changelog.current_player, alice.id);
    }
    other => panic!("expected baseline changelog, got {other:?}"),
  }
  match bob.next().await {
    ServerMessage::Error(notice) => assert!(notice.message.contains("not your turn")),
    other => panic!("expected error, got {other:?}"),
  }
  assert!(alice.is_idle());

  let after = lobbies.sessions().load_game_state(&lobby.game_state_id).await.unwrap();
  assert_eq!(before, after);

  // Alice may act
  alice.send(&lobbies, end_turn).await;
  match alice.next().await {
    ServerMessage::Changelog(changelog) => {
      assert_eq!(changelog.current_player, bob.id);
      assert!(!changelog.most_recent_action.is_empty());
    }
    other => panic!("expected changelog, got {other:?}"),
  }
}

#[tokio::test]
async fn refused_turn_is_broadcast_with_error_to_submitter() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let mut bob = connect(&lobbies, bob).await;

  alice.send(&lobbies, json!({"jsonType": "startGame"})).await;
  alice.wait_for(is_game_state).await;
  bob.wait_for(is_game_state).await;

  alice
    .send(
      &lobbies,
      json!({
        "jsonType": "submitAction",
        "data": {"gameId": "", "action": {"type": "Cardflip", "turn": {"flipCard": "ghost", "inView": "table"}}}
      }),
    )
    .await;

  for client in [&mut alice, &mut bob] {
    match client.next().await {
      ServerMessage::Changelog(changelog) => {
        assert_eq!(changelog.views.len(), 1);
        assert!(changelog.most_recent_action.is_empty());
      }
      other => panic!("expected changelog, got {other:?}"),
    }
  }
  assert!(matches!(alice.next().await, ServerMessage::Error(n) if n.message.contains("ghost")));
  assert!(bob.is_idle());
}

#[tokio::test]
async fn kick_requires_host_and_closes_target() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let mut bob = connect(&lobbies, bob).await;
  let carol = lobbies.join(&room, "carol").await.unwrap();
  let mut carol = connect(&lobbies, carol).await;

  // Let the join broadcasts land first
  bob.wait_for(|m| matches!(m, ServerMessage::LobbyInfo(i) if i.lobby_info.num_players == 3)).await;

  bob
    .send(&lobbies, json!({"jsonType": "kickPlayer", "data": {"playerToKick": carol.id}}))
    .await;
  assert!(matches!(bob.next().await, ServerMessage::Error(n) if n.message.contains("not the host")));

  alice
    .send(&lobbies, json!({"jsonType": "kickPlayer", "data": {"playerToKick": carol.id}}))
    .await;
  assert!(matches!(
    carol.wait_for(|m| matches!(m, ServerMessage::Close(_))).await,
    ServerMessage::Close(n) if n.message.contains("removed")
  ));
  assert!(matches!(carol.frame().await, Message::Close(_)));

  let update = alice
    .wait_for(|m| matches!(m, ServerMessage::LobbyInfo(i) if i.player_id.is_empty()))
    .await;
  assert!(matches!(update, ServerMessage::LobbyInfo(i) if i.lobby_info.num_players == 2));
  assert!(!lobbies.registry().is_connected(&room, &carol.id).await);
}

#[tokio::test]
async fn host_leaving_passes_host_and_last_leaver_closes_room() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let mut bob = connect(&lobbies, bob).await;

  alice.send(&lobbies, json!({"jsonType": "leaveLobby"})).await;
  let update = bob
    .wait_for(|m| matches!(m, ServerMessage::LobbyInfo(i) if i.lobby_info.num_players == 1))
    .await;
  match update {
    ServerMessage::LobbyInfo(info) => assert_eq!(info.lobby_info.host.id, bob.id),
    _ => unreachable!(),
  }

  bob.send(&lobbies, json!({"jsonType": "leaveLobby"})).await;
  bob.wait_for(|m| matches!(m, ServerMessage::Close(_))).await;
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert!(!lobbies.registry().has_room(&room).await);
}

#[tokio::test]
async fn idle_room_is_reclaimed_once_its_lobby_is_gone() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let alice = connect(&lobbies, host).await;

  // A live lobby keeps its room so the player can come back
  lobbies.disconnect(&room, &alice.id, alice.connection).await;
  assert!(lobbies.registry().has_room(&room).await);
  assert_eq!(lobbies.reap_idle_rooms().await, 0);

  lobbies.sessions().delete_lobby(&room).await.unwrap();
  assert_eq!(lobbies.reap_idle_rooms().await, 1);
  assert!(!lobbies.registry().has_room(&room).await);
  assert!(lobbies.registry().room_codes().await.is_empty());

  let msg = ClientMessage {
    player_id: alice.id.clone(),
    text: json!({"jsonType": "startGame"}).to_string(),
  };
  assert!(!lobbies.registry().enqueue(&room, msg).await);
}

#[tokio::test]
async fn room_closes_when_its_lobby_record_vanishes() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  assert!(matches!(alice.next().await, ServerMessage::LobbyInfo(_)));

  lobbies.sessions().delete_lobby(&room).await.unwrap();
  alice.send(&lobbies, json!({"jsonType": "startGame"})).await;

  assert!(matches!(alice.next().await, ServerMessage::Close(n) if n.message.contains("no longer exists")));
  assert!(matches!(alice.frame().await, Message::Close(_)));
  assert!(!lobbies.registry().has_room(&room).await);
}

#[tokio::test]
async fn leaving_mid_game_removes_player_and_passes_turn() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  let mut others = Vec::new();
  for name in ["bob", "carol"] {
    let admission = lobbies.join(&room, name).await.unwrap();
    others.push(connect(&lobbies, admission).await);
  }

  alice.send(&lobbies, json!({"jsonType": "startGame"})).await;
  alice.wait_for(is_game_state).await;
  for client in &mut others {
    client.wait_for(is_game_state).await;
  }

  // Alice hosts and holds the turn
  alice.send(&lobbies, json!({"jsonType": "leaveLobby"})).await;
  assert!(matches!(alice.wait_for(|m| matches!(m, ServerMessage::Close(_))).await, ServerMessage::Close(_)));

  let bob_id = others[0].id.clone();
  let carol_id = others[1].id.clone();
  for client in &mut others {
    match client.next().await {
      ServerMessage::LobbyInfo(info) => {
        assert!(info.player_id.is_empty());
        assert_eq!(info.lobby_info.num_players, 2);
        assert_eq!(info.lobby_info.host.id, bob_id);
      }
      other => panic!("expected lobby snapshot, got {other:?}"),
    }
    match client.next().await {
      ServerMessage::Changelog(changelog) => {
        assert_eq!(changelog.current_player, bob_id);
        let ids: Vec<&str> = changelog.views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["table", "hand-2", "hand-3"]);
      }
      other => panic!("expected changelog, got {other:?}"),
    }
  }

  let lobby = lobbies.sessions().load_lobby(&room).await.unwrap();
  let state = lobbies.sessions().load_game_state(&lobby.game_state_id).await.unwrap();
  let seated: Vec<&str> = state.players.iter().map(|p| p.id.as_str()).collect();
  assert_eq!(seated, vec![bob_id.as_str(), carol_id.as_str()]);
  assert_eq!(state.current_player, bob_id);
  assert!(!lobbies.registry().is_connected(&room, &alice.id).await);
}

#[tokio::test]
async fn only_the_host_may_end_the_game() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let mut alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  let mut bob = connect(&lobbies, bob).await;

  alice
    .wait_for(|m| matches!(m, ServerMessage::LobbyInfo(i) if i.lobby_info.num_players == 2))
    .await;
  bob
    .wait_for(|m| matches!(m, ServerMessage::LobbyInfo(i) if i.lobby_info.num_players == 2))
    .await;

  bob.send(&lobbies, json!({"jsonType": "endGame"})).await;
  assert!(matches!(bob.next().await, ServerMessage::Error(n) if n.message.contains("not the host")));
  assert!(alice.is_idle());

  let lobby = lobbies.sessions().load_lobby(&room).await.unwrap();
  assert_eq!(lobby.status, LobbyStatus::AwaitingStart);
  assert!(lobbies.registry().has_room(&room).await);
  assert!(lobbies.registry().is_connected(&room, &bob.id).await);
}

#[tokio::test]
async fn garbage_frames_are_dropped_and_room_keeps_working() {
  let lobbies = server(definition(4, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let mut alice = connect(&lobbies, host).await;
  assert!(matches!(alice.next().await, ServerMessage::LobbyInfo(_)));

  alice.send(&lobbies, json!({"jsonType": "dance"})).await;
  alice.send_text(&lobbies, "not json at all").await;
  alice.send(&lobbies, json!({"jsonType": "startGame"})).await;
  assert!(is_game_state(&alice.next().await));

  // A turn payload that does not decode is dropped too
  alice
    .send(
      &lobbies,
      json!({
        "jsonType": "submitAction",
        "data": {"gameId": "", "action": {"type": "Movement", "turn": {"atX": "left"}}}
      }),
    )
    .await;
  alice
    .send(
      &lobbies,
      json!({"jsonType": "submitAction", "data": {"gameId": "", "action": {"type": "EndTurn"}}}),
    )
    .await;
  match alice.next().await {
    ServerMessage::Changelog(changelog) => assert_eq!(changelog.current_player, alice.id),
    other => panic!("expected changelog, got {other:?}"),
  }
}

#[tokio::test]
async fn failed_join_attach_gives_the_seat_back() {
  let lobbies = server(definition(2, 0)).await;

  let host = lobbies.host("rummy", "alice").await.unwrap();
  let room = host.room_code.clone();
  let _alice = connect(&lobbies, host).await;
  let bob = lobbies.join(&room, "bob").await.unwrap();
  assert_eq!(lobbies.sessions().load_lobby(&room).await.unwrap().num_players, 2);

  // The room goes away between the join and the upgrade
  lobbies
    .registry()
    .close_room(&room, &ServerMessage::close("closing"))
    .await;
  let (handle, mut rx) = ConnectionHandle::channel();
  let err = lobbies.attach(&bob, handle).await.unwrap_err();
  assert!(matches!(err, SessionError::UnknownRoom(_)));
  assert!(matches!(rx.recv().await, Some(Message::Text(_))));
  assert!(matches!(rx.recv().await, Some(Message::Close(_))));

  let lobby = lobbies.sessions().load_lobby(&room).await.unwrap();
  assert_eq!(lobby.num_players, 1);
  assert!(lobby.find_player(&bob.player_id).is_none());
}
