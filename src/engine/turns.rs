use super::{locate_view, view_at, view_at_mut, Touched};
use crate::{
  error::{EngineError, EntityKind},
  pieces::{CardContainer, ContainerKind},
  session::GameState,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Put a loose card of `from_view` into a collection of `in_view`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Insertion {
  pub insert_card: String,
  pub from_view: String,
  pub to_collection: String,
  pub in_view: String,
}

impl Insertion {
  pub(super) fn apply(&self, state: &mut GameState, touched: &mut Touched) -> Result<String, EngineError> {
    let from = locate_view(state, &self.from_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.from_view))?;
    touched.touch(&self.from_view);

    let card = view_at(state, from)
      .pieces
      .orphan(&self.insert_card)
      .ok_or_else(|| EngineError::not_found(EntityKind::Card, &self.insert_card))?;

    let to = locate_view(state, &self.in_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.in_view))?;
    touched.touch(&self.in_view);

    let target = view_at(state, to);
    let slot = target
      .pieces
      .locate(&self.to_collection)
      .ok_or_else(|| EngineError::not_found(EntityKind::Collection, &self.to_collection))?;
    if !target.pieces.container(slot).card_is_allowed(card) {
      return Err(EngineError::NotAdmitted {
        card: self.insert_card.clone(),
        collection: self.to_collection.clone(),
      });
    }

    let mut card = view_at_mut(state, from)
      .pieces
      .take_orphan(&self.insert_card)
      .ok_or_else(|| EngineError::not_found(EntityKind::Card, &self.insert_card))?;
    card.piece.parent_view = self.in_view.clone();
    view_at_mut(state, to).pieces.container_mut(slot).add_card(card);

    Ok(format!("put a card into {}", self.to_collection))
  }
}

/// Take a card out of a collection and leave it loose in `to_view`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Withdrawal {
  /// Empty draws a random card.
  pub withdraw_card: String,
  pub from_collection: String,
  pub in_view: String,
  pub to_view: String,
}

impl Withdrawal {
  pub(super) fn apply(
    &self,
    state: &mut GameState,
    touched: &mut Touched,
    rng: &mut dyn RngCore,
  ) -> Result<String, EngineError> {
    let from = locate_view(state, &self.in_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.in_view))?;
    touched.touch(&self.in_view);

    let source = view_at(state, from);
    let slot = source
      .pieces
      .locate(&self.from_collection)
      .ok_or_else(|| EngineError::not_found(EntityKind::Collection, &self.from_collection))?;
    let container = source.pieces.container(slot);

    let card_id = if self.withdraw_card.is_empty() {
      container
        .pick_random(rng)
        .ok_or_else(|| EngineError::Empty(self.from_collection.clone()))?
        .piece
        .id
        .clone()
    } else {
      container
        .find_card(&self.withdraw_card)
        .ok_or_else(|| EngineError::not_found(EntityKind::Card, &self.withdraw_card))?
        .piece
        .id
        .clone()
    };
    let (x, y) = (container.zone().piece.x, container.zone().piece.y);

    let to = locate_view(state, &self.to_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.to_view))?;
    touched.touch(&self.to_view);

    let mut card = view_at_mut(state, from)
      .pieces
      .container_mut(slot)
      .remove_card(&card_id)
      .ok_or_else(|| EngineError::not_found(EntityKind::Card, &card_id))?;
    card.piece.parent_view = self.to_view.clone();
    card.piece.x = x;
    card.piece.y = y;
    view_at_mut(state, to).pieces.orphans.push(card);

    Ok(format!("drew a card from {}", self.from_collection))
  }
}

/// Move a loose card, optionally into another view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Movement {
  pub card_id: String,
  pub from_view: String,
  pub to_view: String,
  pub at_x: f32,
  pub at_y: f32,
}

impl Movement {
  pub(super) fn apply(&self, state: &mut GameState, touched: &mut Touched) -> Result<String, EngineError> {
    let from = locate_view(state, &self.from_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.from_view))?;
    touched.touch(&self.from_view);

    if view_at(state, from).pieces.orphan(&self.card_id).is_none() {
      return Err(EngineError::not_found(EntityKind::Card, &self.card_id));
    }

    let to = locate_view(state, &self.to_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.to_view))?;
    touched.touch(&self.to_view);

    let mut card = view_at_mut(state, from)
      .pieces
      .take_orphan(&self.card_id)
      .ok_or_else(|| EngineError::not_found(EntityKind::Card, &self.card_id))?;
    card.piece.parent_view = self.to_view.clone();
    card.piece.x = self.at_x;
    card.piece.y = self.at_y;
    view_at_mut(state, to).pieces.orphans.push(card);

    Ok(if self.from_view == self.to_view {
      "moved a card".to_string()
    } else {
      format!("moved a card to {}", self.to_view)
    })
  }
}

/// Pass the turn, to `next_player` or to the next seat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndTurn {
  pub next_player: String,
}

impl EndTurn {
  pub(super) fn apply(&self, state: &mut GameState) -> Result<String, EngineError> {
    let current = state
      .player_index(&state.current_player)
      .ok_or_else(|| EngineError::not_found(EntityKind::Player, &state.current_player))?;

    let next = if self.next_player.is_empty() {
      (current + 1) % state.players.len()
    } else {
      state
        .player_index(&self.next_player)
        .ok_or_else(|| EngineError::not_found(EntityKind::Player, &self.next_player))?
    };

    state.current_player = state.players[next].id.clone();
    Ok(format!("ended their turn, {} is up", state.players[next].name))
  }
}

/// Turn over a loose card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cardflip {
  pub flip_card: String,
  pub in_view: String,
}

impl Cardflip {
  pub(super) fn apply(&self, state: &mut GameState, touched: &mut Touched) -> Result<String, EngineError> {
    let slot = locate_view(state, &self.in_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.in_view))?;
    touched.touch(&self.in_view);

    let card = view_at_mut(state, slot)
      .pieces
      .orphan_mut(&self.flip_card)
      .ok_or_else(|| EngineError::not_found(EntityKind::Card, &self.flip_card))?;
    card.flip();

    Ok(if card.facedown {
      "turned a card face down".to_string()
    } else {
      "turned a card face up".to_string()
    })
  }
}

/// Return every card of a card place to a deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reshuffle {
  pub from_card_place: String,
  pub to_deck: String,
  pub from_view: String,
  pub to_view: String,
}

impl Reshuffle {
  pub(super) fn apply(&self, state: &mut GameState, touched: &mut Touched) -> Result<String, EngineError> {
    let from = locate_view(state, &self.from_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.from_view))?;
    touched.touch(&self.from_view);

    let source = view_at(state, from)
      .pieces
      .locate(&self.from_card_place)
      .ok_or_else(|| EngineError::not_found(EntityKind::Collection, &self.from_card_place))?;
    if source.kind() != ContainerKind::CardPlace {
      return Err(EngineError::TypeMismatch {
        id: self.from_card_place.clone(),
        expected: ContainerKind::CardPlace.as_str(),
      });
    }

    let to = locate_view(state, &self.to_view)
      .ok_or_else(|| EngineError::not_found(EntityKind::View, &self.to_view))?;
    touched.touch(&self.to_view);

    let target = view_at(state, to)
      .pieces
      .locate(&self.to_deck)
      .ok_or_else(|| EngineError::not_found(EntityKind::Collection, &self.to_deck))?;
    if target.kind() != ContainerKind::Deck {
      return Err(EngineError::TypeMismatch {
        id: self.to_deck.clone(),
        expected: ContainerKind::Deck.as_str(),
      });
    }

    let mut cards = std::mem::take(view_at_mut(state, from).pieces.container_mut(source).cards_mut());
    let moved = cards.len();
    for card in &mut cards {
      card.piece.parent_view = self.to_view.clone();
    }
    view_at_mut(state, to)
      .pieces
      .container_mut(target)
      .cards_mut()
      .extend(cards);

    Ok(format!("shuffled {moved} cards from {} into {}", self.from_card_place, self.to_deck))
  }
}
