//! Coin flip: call the coin, double the multiplier on every correct call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::odds::{coinflip_multiplier, flip_coin};
use super::rng::RandomSource;
use super::types::{CoinSide, GameKind, GameParams, TurnAction};
use super::{mismatch, RoundEnd, TurnGame, TurnStep};
use crate::errors::{ValidationError, WagerResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoinMove {
    pub guess: CoinSide,
    pub landed: CoinSide,
}

impl CoinMove {
    pub fn correct(&self) -> bool {
        self.guess == self.landed
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoinFlipBoard {
    wins: u32,
    moves: Vec<CoinMove>,
}

impl CoinFlipBoard {
    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn moves(&self) -> &[CoinMove] {
        &self.moves
    }
}

impl TurnGame for CoinFlipBoard {
    const KIND: GameKind = GameKind::CoinFlip;

    fn check(params: &GameParams) -> Result<(), ValidationError> {
        match params {
            GameParams::CoinFlip => Ok(()),
            _ => Err(mismatch(Self::KIND)),
        }
    }

    fn deal(params: &GameParams, _rng: &mut dyn RandomSource) -> WagerResult<Self> {
        Self::check(params)?;
        Ok(Self::default())
    }

    fn play(&mut self, action: &TurnAction, rng: &mut dyn RandomSource) -> WagerResult<TurnStep> {
        let TurnAction::Flip { side } = action else {
            return Err(mismatch(Self::KIND).into());
        };
        let landed = if flip_coin(rng) { CoinSide::Heads } else { CoinSide::Tails };
        let mv = CoinMove { guess: *side, landed };
        self.moves.push(mv);

        if mv.correct() {
            self.wins += 1;
            Ok(TurnStep::Continue)
        } else {
            Ok(TurnStep::Bust)
        }
    }

    fn multiplier(&self) -> f64 {
        coinflip_multiplier(self.wins)
    }

    fn can_cash_out(&self) -> bool {
        self.wins > 0
    }

    fn public_view(&self) -> Value {
        json!({
            "wins": self.wins,
            "moves": self.moves,
            "coeff": self.multiplier(),
            "next_coeff": coinflip_multiplier(self.wins + 1),
        })
    }

    fn audit(&self, stake: i64, end: RoundEnd) -> Value {
        let result = match end {
            RoundEnd::Bust => "lose",
            RoundEnd::CashOut | RoundEnd::Complete => "cashout",
            RoundEnd::Forfeit => "forfeit",
        };
        json!({
            "bet": stake,
            "moves": self.moves,
            "coeff": self.multiplier(),
            "result": result,
        })
    }
}
