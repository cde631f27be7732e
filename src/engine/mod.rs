//! Rule engine: turn execution, initial state construction and sparks.
//!
//! Every turn validates all of the entities it references before touching
//! anything, so a turn that returns an error leaves the [`GameState`]
//! exactly as it found it. The error still carries a [`Changelog`] of the
//! views located before the failing check so clients can redraw them.

use crate::{
  error::EngineError,
  pieces::View,
  session::{Changelog, GameState},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod sparks;
mod turns;

pub use sparks::{apply_sparks, initial_state};
pub use turns::{Cardflip, EndTurn, Insertion, Movement, Reshuffle, Withdrawal};

/// Discriminator of a submitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnKind {
  Insertion,
  Withdrawal,
  Movement,
  EndTurn,
  Cardflip,
  Reshuffle,
}

/// An action as sent by a client, before the turn payload is decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAction {
  #[serde(rename = "type")]
  pub kind: TurnKind,
  #[serde(default)]
  pub player_id: String,
  #[serde(default)]
  pub turn: serde_json::Value,
}

impl SubmittedAction {
  /// Decode `turn` according to `kind`.
  pub fn decode(&self) -> Result<Turn, serde_json::Error> {
    let payload = match &self.turn {
      serde_json::Value::Null => serde_json::Value::Object(Default::default()),
      other => other.clone(),
    };
    Ok(match self.kind {
      TurnKind::Insertion => Turn::Insertion(serde_json::from_value(payload)?),
      TurnKind::Withdrawal => Turn::Withdrawal(serde_json::from_value(payload)?),
      TurnKind::Movement => Turn::Movement(serde_json::from_value(payload)?),
      TurnKind::EndTurn => Turn::EndTurn(serde_json::from_value(payload)?),
      TurnKind::Cardflip => Turn::Cardflip(serde_json::from_value(payload)?),
      TurnKind::Reshuffle => Turn::Reshuffle(serde_json::from_value(payload)?),
    })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
  Insertion(Insertion),
  Withdrawal(Withdrawal),
  Movement(Movement),
  EndTurn(EndTurn),
  Cardflip(Cardflip),
  Reshuffle(Reshuffle),
}

/// A refused turn. `changelog` lists the views located before the failure, unchanged.
#[derive(Debug, Clone, Error)]
#[error("{cause}")]
pub struct TurnError {
  pub changelog: Changelog,
  #[source]
  pub cause: EngineError,
}

impl Turn {
  /// Apply this turn to `state` on behalf of `player_id`.
  pub fn execute(
    &self,
    state: &mut GameState,
    player_id: &str,
    rng: &mut dyn RngCore,
  ) -> Result<Changelog, TurnError> {
    let mut touched = Touched::default();
    let result = match self {
      Turn::Insertion(t) => t.apply(state, &mut touched),
      Turn::Withdrawal(t) => t.apply(state, &mut touched, rng),
      Turn::Movement(t) => t.apply(state, &mut touched),
      Turn::EndTurn(t) => t.apply(state),
      Turn::Cardflip(t) => t.apply(state, &mut touched),
      Turn::Reshuffle(t) => t.apply(state, &mut touched),
    };

    match result {
      Ok(summary) => {
        let action = format!("{} {}", player_name(state, player_id), summary);
        tracing::debug!("Turn applied: {}", action);
        Ok(touched.changelog(state, action))
      }
      Err(cause) => {
        tracing::debug!("Turn refused for {}: {}", player_id, cause);
        Err(TurnError {
          changelog: touched.changelog(state, String::new()),
          cause,
        })
      }
    }
  }
}

fn player_name<'a>(state: &'a GameState, player_id: &'a str) -> &'a str {
  state
    .players
    .iter()
    .find(|p| p.id == player_id)
    .map(|p| p.name.as_str())
    .unwrap_or(player_id)
}

/// Where a view lives inside a [`GameState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViewSlot {
  Table(usize),
  Hand { player: usize, view: usize },
}

pub(crate) fn locate_view(state: &GameState, view_id: &str) -> Option<ViewSlot> {
  if let Some(i) = state.views.iter().position(|v| v.id == view_id) {
    return Some(ViewSlot::Table(i));
  }
  state.players.iter().enumerate().find_map(|(player, p)| {
    p.hand
      .iter()
      .position(|v| v.id == view_id)
      .map(|view| ViewSlot::Hand { player, view })
  })
}

pub(crate) fn view_at(state: &GameState, slot: ViewSlot) -> &View {
  match slot {
    ViewSlot::Table(i) => &state.views[i],
    ViewSlot::Hand { player, view } => &state.players[player].hand[view],
  }
}

pub(crate) fn view_at_mut(state: &mut GameState, slot: ViewSlot) -> &mut View {
  match slot {
    ViewSlot::Table(i) => &mut state.views[i],
    ViewSlot::Hand { player, view } => &mut state.players[player].hand[view],
  }
}

/// Ids of the views a turn has touched, first touch first.
#[derive(Debug, Default)]
pub(crate) struct Touched {
  ids: Vec<String>,
}

impl Touched {
  pub(crate) fn touch(&mut self, view_id: &str) {
    if !self.ids.iter().any(|id| id == view_id) {
      self.ids.push(view_id.to_string());
    }
  }

  fn changelog(self, state: &GameState, most_recent_action: String) -> Changelog {
    Changelog {
      views: self
        .ids
        .iter()
        .filter_map(|id| state.find_view(id).cloned())
        .collect(),
      current_player: state.current_player.clone(),
      most_recent_action,
    }
  }
}
