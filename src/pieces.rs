//! Cards, card collections and the views that hold them.
//!
//! A [`View`] owns a [`PieceSet`]: named [`Deck`]s and [`CardPlace`]s plus a
//! list of loose "orphan" cards that are not inside any collection. Decks and
//! card places share their identity and whitelist through an embedded
//! [`Zone`] and expose the same capabilities through [`CardContainer`].

use rand::{seq::SliceRandom, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attributes shared by every piece on the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GamePiece {
  pub id: String,
  pub name: String,
  /// Free-form key/value properties, matched against collection whitelists.
  pub tags: HashMap<String, String>,
  pub color: String,
  /// Color used by clients for hit testing, distinct from the display color.
  pub hit_color: String,
  pub label: String,
  pub x: f32,
  pub y: f32,
  /// Id of the view this piece currently belongs to.
  pub parent_view: String,
}

impl GamePiece {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      ..Self::default()
    }
  }
}

/// A playing card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
  #[serde(flatten)]
  pub piece: GamePiece,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub facedown: bool,
}

impl Card {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      piece: GamePiece::new(id),
      ..Self::default()
    }
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.piece.tags.insert(key.into(), value.into());
    self
  }

  pub fn id(&self) -> &str {
    &self.piece.id
  }

  pub fn flip(&mut self) {
    self.facedown = !self.facedown;
  }
}

/// Identity and admission rules shared by every card collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
  #[serde(flatten)]
  pub piece: GamePiece,
  /// Tag key -> approved values. Empty means every card is admitted.
  #[serde(default)]
  pub tags_whitelist: HashMap<String, Vec<String>>,
}

impl Zone {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      piece: GamePiece::new(id),
      tags_whitelist: HashMap::new(),
    }
  }

  /// Whether `card` may be inserted into a collection with this zone.
  ///
  /// A single whitelisted key carrying an approved value is enough; the card
  /// does not have to satisfy every key.
  pub fn admits(&self, card: &Card) -> bool {
    if self.tags_whitelist.is_empty() {
      return true;
    }
    self.tags_whitelist.iter().any(|(key, approved)| {
      card
        .piece
        .tags
        .get(key)
        .is_some_and(|value| !value.is_empty() && approved.iter().any(|a| a == value))
    })
  }
}

/// Which concrete collection type a container is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
  Deck,
  CardPlace,
}

impl ContainerKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ContainerKind::Deck => "Deck",
      ContainerKind::CardPlace => "CardPlace",
    }
  }
}

/// Capabilities shared by [`Deck`] and [`CardPlace`].
pub trait CardContainer {
  fn zone(&self) -> &Zone;
  fn cards(&self) -> &[Card];
  fn cards_mut(&mut self) -> &mut Vec<Card>;
  fn kind(&self) -> ContainerKind;

  fn id(&self) -> &str {
    &self.zone().piece.id
  }

  /// Append `card`. No admission or duplicate checks are made.
  fn add_card(&mut self, card: Card) {
    self.cards_mut().push(card);
  }

  /// Remove the card with `card_id`, if present.
  fn remove_card(&mut self, card_id: &str) -> Option<Card> {
    let index = self.cards().iter().position(|c| c.id() == card_id)?;
    Some(self.cards_mut().remove(index))
  }

  fn find_card(&self, card_id: &str) -> Option<&Card> {
    self.cards().iter().find(|c| c.id() == card_id)
  }

  /// Uniformly pick one of the current cards, or `None` when empty.
  fn pick_random(&self, rng: &mut dyn RngCore) -> Option<&Card> {
    self.cards().choose(rng)
  }

  fn len(&self) -> usize {
    self.cards().len()
  }

  fn is_empty(&self) -> bool {
    self.cards().is_empty()
  }

  fn card_is_allowed(&self, card: &Card) -> bool {
    self.zone().admits(card)
  }
}

/// A draw pile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
  #[serde(flatten)]
  pub zone: Zone,
  #[serde(default)]
  pub cards: Vec<Card>,
}

impl Deck {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      zone: Zone::new(id),
      cards: Vec::new(),
    }
  }

  pub fn with_cards(mut self, cards: impl IntoIterator<Item = Card>) -> Self {
    self.cards.extend(cards);
    self
  }
}

impl CardContainer for Deck {
  fn zone(&self) -> &Zone {
    &self.zone
  }

  fn cards(&self) -> &[Card] {
    &self.cards
  }

  fn cards_mut(&mut self) -> &mut Vec<Card> {
    &mut self.cards
  }

  fn kind(&self) -> ContainerKind {
    ContainerKind::Deck
  }
}

/// A play area or discard pile where cards are laid down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPlace {
  #[serde(flatten)]
  pub zone: Zone,
  #[serde(default, rename = "placedCards")]
  pub cards: Vec<Card>,
}

impl CardPlace {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      zone: Zone::new(id),
      cards: Vec::new(),
    }
  }

  pub fn with_cards(mut self, cards: impl IntoIterator<Item = Card>) -> Self {
    self.cards.extend(cards);
    self
  }
}

impl CardContainer for CardPlace {
  fn zone(&self) -> &Zone {
    &self.zone
  }

  fn cards(&self) -> &[Card] {
    &self.cards
  }

  fn cards_mut(&mut self) -> &mut Vec<Card> {
    &mut self.cards
  }

  fn kind(&self) -> ContainerKind {
    ContainerKind::CardPlace
  }
}

/// Position of a collection inside a [`PieceSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerSlot {
  Deck(usize),
  CardPlace(usize),
}

impl ContainerSlot {
  pub fn kind(self) -> ContainerKind {
    match self {
      ContainerSlot::Deck(_) => ContainerKind::Deck,
      ContainerSlot::CardPlace(_) => ContainerKind::CardPlace,
    }
  }
}

/// The pieces rendered within one view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PieceSet {
  pub decks: Vec<Deck>,
  pub card_places: Vec<CardPlace>,
  /// Cards that are not inside any deck or card place.
  pub orphans: Vec<Card>,
}

impl PieceSet {
  /// Find the collection with `id`, deck first.
  pub fn locate(&self, id: &str) -> Option<ContainerSlot> {
    if let Some(i) = self.decks.iter().position(|d| d.zone.piece.id == id) {
      return Some(ContainerSlot::Deck(i));
    }
    self
      .card_places
      .iter()
      .position(|cp| cp.zone.piece.id == id)
      .map(ContainerSlot::CardPlace)
  }

  pub fn container(&self, slot: ContainerSlot) -> &dyn CardContainer {
    match slot {
      ContainerSlot::Deck(i) => &self.decks[i],
      ContainerSlot::CardPlace(i) => &self.card_places[i],
    }
  }

  pub fn container_mut(&mut self, slot: ContainerSlot) -> &mut dyn CardContainer {
    match slot {
      ContainerSlot::Deck(i) => &mut self.decks[i],
      ContainerSlot::CardPlace(i) => &mut self.card_places[i],
    }
  }

  pub fn orphan(&self, card_id: &str) -> Option<&Card> {
    self.orphans.iter().find(|c| c.id() == card_id)
  }

  pub fn orphan_mut(&mut self, card_id: &str) -> Option<&mut Card> {
    self.orphans.iter_mut().find(|c| c.id() == card_id)
  }

  /// Remove and return the orphan with `card_id`.
  pub fn take_orphan(&mut self, card_id: &str) -> Option<Card> {
    let index = self.orphans.iter().position(|c| c.id() == card_id)?;
    Some(self.orphans.remove(index))
  }
}

/// A collection of pieces shown either to everyone or to one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct View {
  pub id: String,
  /// 0 marks a public view; any other number is a player's private view.
  pub owner_player_number: u32,
  /// Index of the background mat clients render behind this view.
  pub playmat: u32,
  pub pieces: PieceSet,
}

impl View {
  pub fn new(id: impl Into<String>, owner_player_number: u32) -> Self {
    Self {
      id: id.into(),
      owner_player_number,
      ..Self::default()
    }
  }
}
