//! Slots: one spin of three weighted reels.
//!
//! The spin is drawn once. Replaying [`TurnAction::Spin`] on a board that has
//! already spun returns the same outcome without drawing again, so a
//! settlement that failed to commit can be retried.

use serde_json::{json, Value};

use super::odds::{slots_multiplier, spin_reel, SlotSymbol};
use super::rng::RandomSource;
use super::types::{GameKind, GameParams, TurnAction};
use super::{mismatch, RoundEnd, TurnGame, TurnStep};
use crate::errors::{ValidationError, WagerResult};

#[derive(Debug, Clone, Default)]
pub struct SlotsBoard {
    reels: Option<[SlotSymbol; 3]>,
}

impl SlotsBoard {
    pub fn reels(&self) -> Option<[SlotSymbol; 3]> {
        self.reels
    }

    fn result_tag(&self) -> &'static str {
        match self.reels {
            Some([a, b, c]) if a == b && b == c => "triple",
            Some([a, b, c]) if a == b || b == c || a == c => "pair",
            Some(_) => "lose",
            None => "pending",
        }
    }
}

impl TurnGame for SlotsBoard {
    const KIND: GameKind = GameKind::Slots;

    fn check(params: &GameParams) -> Result<(), ValidationError> {
        match params {
            GameParams::Slots => Ok(()),
            _ => Err(mismatch(Self::KIND)),
        }
    }

    fn deal(params: &GameParams, _rng: &mut dyn RandomSource) -> WagerResult<Self> {
        Self::check(params)?;
        Ok(Self::default())
    }

    fn play(&mut self, action: &TurnAction, rng: &mut dyn RandomSource) -> WagerResult<TurnStep> {
        if !matches!(action, TurnAction::Spin) {
            return Err(mismatch(Self::KIND).into());
        }
        let reels = match self.reels {
            Some(reels) => reels,
            None => {
                let reels = [spin_reel(rng), spin_reel(rng), spin_reel(rng)];
                self.reels = Some(reels);
                reels
            }
        };
        if slots_multiplier(&reels) > 0.0 {
            Ok(TurnStep::Complete)
        } else {
            Ok(TurnStep::Bust)
        }
    }

    fn multiplier(&self) -> f64 {
        self.reels.as_ref().map_or(1.0, slots_multiplier)
    }

    fn can_cash_out(&self) -> bool {
        false
    }

    fn public_view(&self) -> Value {
        json!({ "reels": self.reels, "coeff": self.multiplier() })
    }

    fn audit(&self, stake: i64, end: RoundEnd) -> Value {
        let result = match end {
            RoundEnd::Forfeit => "forfeit",
            _ => self.result_tag(),
        };
        json!({
            "bet": stake,
            "reels": self.reels,
            "coeff": self.multiplier(),
            "result": result,
        })
    }
}
