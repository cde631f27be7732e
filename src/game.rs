//! Game definitions: the static rules and board layout a lobby plays.
//!
//! Definitions are authored and stored elsewhere; the server only reads them
//! through [`DefinitionSource`].

use crate::{
  error::StoreError,
  pieces::View,
  store::{game_key, KeyValueStore, StoreExt},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameRules {
  /// Whether players may see details about other players, such as hand sizes.
  pub show_other_player_details: bool,
  /// Reject actions from anyone but the current player.
  pub enforce_turn_order: bool,
}

/// Deals `num_to_deal` random cards from `deck_to_use` to every player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dealer {
  pub enabled: bool,
  pub num_to_deal: usize,
  pub deck_to_use: String,
}

/// Moves `num_to_flip` random cards from `deck_to_use` into `card_place_to_use`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flipper {
  pub enabled: bool,
  pub num_to_flip: usize,
  pub deck_to_use: String,
  pub card_place_to_use: String,
}

/// Automatic setup steps applied when a game starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sparks {
  pub dealer: Dealer,
  pub flipper: Flipper,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameDefinition {
  pub id: String,
  pub name: String,
  pub genre: String,
  pub author: String,
  pub max_players: usize,
  pub rules: GameRules,
  pub sparks: Sparks,
  /// Shown to every player when the game starts.
  pub splash_text: String,
  pub views: Vec<View>,
}

impl GameDefinition {
  /// Copies of every view owned by `player_number`. 0 selects the public views.
  pub fn views_for_player(&self, player_number: u32) -> Vec<View> {
    self
      .views
      .iter()
      .filter(|v| v.owner_player_number == player_number)
      .cloned()
      .collect()
  }
}

/// Read access to game definitions.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
  async fn get(&self, id: &str) -> Result<GameDefinition, StoreError>;
}

/// Definitions kept under the store's `game:` keys.
#[derive(Clone)]
pub struct StoredDefinitions {
  store: Arc<dyn KeyValueStore>,
}

impl StoredDefinitions {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// Write `definition` without expiry, generating an id if it has none.
  pub async fn put(&self, mut definition: GameDefinition) -> Result<GameDefinition, StoreError> {
    if definition.id.is_empty() {
      definition.id = crate::session::generate_id();
    }
    self
      .store
      .set_json(&game_key(&definition.id), &definition, None)
      .await?;
    tracing::debug!("Saved game definition {}", definition.id);
    Ok(definition)
  }
}

#[async_trait]
impl DefinitionSource for StoredDefinitions {
  async fn get(&self, id: &str) -> Result<GameDefinition, StoreError> {
    let key = game_key(id);
    self
      .store
      .get_json(&key)
      .await?
      .ok_or(StoreError::Missing(key))
  }
}
