use crate::{
  game::{Dealer, Flipper, GameDefinition, Sparks},
  pieces::{CardContainer, View},
  session::{GameState, Lobby, Player},
};
use rand::RngCore;

/// Horizontal spacing between dealt cards.
const DEAL_SPACING: f32 = 20.0;

/// Build the opening table for `lobby` from `definition`, then run its sparks.
///
/// The returned state has no id yet; one is assigned when it is first saved.
pub fn initial_state(definition: &GameDefinition, lobby: &Lobby, rng: &mut dyn RngCore) -> GameState {
  let players: Vec<Player> = lobby
    .players
    .iter()
    .enumerate()
    .map(|(seat, member)| {
      let number = seat as u32 + 1;
      let mut hand = definition.views_for_player(number);
      if hand.is_empty() {
        hand.push(View::new(format!("hand-{}", member.id), number));
      }
      Player {
        id: member.id.clone(),
        name: member.name.clone(),
        hand,
      }
    })
    .collect();

  let mut state = GameState {
    id: String::new(),
    game_definition_id: definition.id.clone(),
    game_name: definition.name.clone(),
    current_player: players.first().map(|p| p.id.clone()).unwrap_or_default(),
    players,
    rules: definition.rules,
    splash_text: definition.splash_text.clone(),
    views: definition.views_for_player(0),
  };

  apply_sparks(&mut state, &definition.sparks, rng);
  state
}

pub fn apply_sparks(state: &mut GameState, sparks: &Sparks, rng: &mut dyn RngCore) {
  if sparks.dealer.enabled {
    deal(state, &sparks.dealer, rng);
  }
  if sparks.flipper.enabled {
    flip(state, &sparks.flipper, rng);
  }
}

/// (view index, deck index) of a public deck.
fn find_public_deck(state: &GameState, deck_id: &str) -> Option<(usize, usize)> {
  state.views.iter().enumerate().find_map(|(v, view)| {
    view
      .pieces
      .decks
      .iter()
      .position(|d| d.zone.piece.id == deck_id)
      .map(|d| (v, d))
  })
}

fn deal(state: &mut GameState, dealer: &Dealer, rng: &mut dyn RngCore) {
  let Some((v, d)) = find_public_deck(state, &dealer.deck_to_use) else {
    tracing::warn!("Dealer deck '{}' not found, skipping", dealer.deck_to_use);
    return;
  };

  let GameState { views, players, .. } = state;
  let deck = &mut views[v].pieces.decks[d];

  for player in players.iter_mut() {
    let Some(hand) = player.hand.first_mut() else {
      continue;
    };
    for i in 0..dealer.num_to_deal {
      let Some(card_id) = deck.pick_random(rng).map(|c| c.piece.id.clone()) else {
        tracing::warn!("Dealer deck '{}' ran out of cards", dealer.deck_to_use);
        return;
      };
      if let Some(mut card) = deck.remove_card(&card_id) {
        card.piece.parent_view = hand.id.clone();
        card.piece.x = i as f32 * DEAL_SPACING;
        card.piece.y = 0.0;
        hand.pieces.orphans.push(card);
      }
    }
  }
}

fn flip(state: &mut GameState, flipper: &Flipper, rng: &mut dyn RngCore) {
  let Some((dv, d)) = find_public_deck(state, &flipper.deck_to_use) else {
    tracing::warn!("Flipper deck '{}' not found, skipping", flipper.deck_to_use);
    return;
  };
  let place = state.views.iter().enumerate().find_map(|(v, view)| {
    view
      .pieces
      .card_places
      .iter()
      .position(|cp| cp.zone.piece.id == flipper.card_place_to_use)
      .map(|cp| (v, cp))
  });
  let Some((pv, p)) = place else {
    tracing::warn!("Flipper card place '{}' not found, skipping", flipper.card_place_to_use);
    return;
  };

  let place_view = state.views[pv].id.clone();
  for _ in 0..flipper.num_to_flip {
    let deck = &mut state.views[dv].pieces.decks[d];
    let Some(card_id) = deck.pick_random(rng).map(|c| c.piece.id.clone()) else {
      tracing::warn!("Flipper deck '{}' ran out of cards", flipper.deck_to_use);
      return;
    };
    let Some(mut card) = deck.remove_card(&card_id) else {
      continue;
    };
    card.piece.parent_view = place_view.clone();
    card.facedown = false;
    state.views[pv].pieces.card_places[p].add_card(card);
  }
}
