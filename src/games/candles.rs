//! Candles: call whether the next candle on the chart closes up or down.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::odds::{
    candle_direction, candles_multiplier, next_candle, preview_candle, round2, CANDLE_BASE_PRICE, CANDLE_PREVIEW,
};
use super::rng::RandomSource;
use super::types::{Direction, GameKind, GameParams, TurnAction};
use super::{mismatch, RoundEnd, TurnGame, TurnStep};
use crate::errors::{ValidationError, WagerResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandleMove {
    pub guess: Direction,
    pub change: i32,
    pub price: i32,
}

impl CandleMove {
    pub fn correct(&self) -> bool {
        candle_direction(self.change) == self.guess
    }
}

#[derive(Debug, Clone)]
pub struct CandlesBoard {
    /// Opening chart shown before the first call
    preview: Vec<i32>,
    price: i32,
    wins: u32,
    moves: Vec<CandleMove>,
}

impl CandlesBoard {
    pub fn price(&self) -> i32 {
        self.price
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn moves(&self) -> &[CandleMove] {
        &self.moves
    }

    fn candles(&self) -> Vec<i32> {
        self.preview.iter().copied().chain(self.moves.iter().map(|m| m.change)).collect()
    }
}

impl TurnGame for CandlesBoard {
    const KIND: GameKind = GameKind::Candles;

    fn check(params: &GameParams) -> Result<(), ValidationError> {
        match params {
            GameParams::Candles => Ok(()),
            _ => Err(mismatch(Self::KIND)),
        }
    }

    fn deal(params: &GameParams, rng: &mut dyn RandomSource) -> WagerResult<Self> {
        Self::check(params)?;
        let preview: Vec<i32> = (0..CANDLE_PREVIEW).map(|_| preview_candle(rng)).collect();
        let price = CANDLE_BASE_PRICE + preview.iter().sum::<i32>();
        Ok(Self { preview, price, wins: 0, moves: Vec::new() })
    }

    fn play(&mut self, action: &TurnAction, rng: &mut dyn RandomSource) -> WagerResult<TurnStep> {
        let TurnAction::Predict { direction } = *action else {
            return Err(mismatch(Self::KIND).into());
        };
        let change = next_candle(rng);
        self.price += change;
        let mv = CandleMove { guess: direction, change, price: self.price };
        self.moves.push(mv);

        if mv.correct() {
            self.wins += 1;
            Ok(TurnStep::Continue)
        } else {
            Ok(TurnStep::Bust)
        }
    }

    fn multiplier(&self) -> f64 {
        candles_multiplier(self.wins)
    }

    fn can_cash_out(&self) -> bool {
        self.wins > 0
    }

    fn public_view(&self) -> Value {
        json!({
            "candles": self.candles(),
            "price": self.price,
            "wins": self.wins,
            "coeff": round2(self.multiplier()),
            "next_coeff": round2(candles_multiplier(self.wins + 1)),
        })
    }

    fn audit(&self, stake: i64, end: RoundEnd) -> Value {
        let result = match end {
            RoundEnd::Bust => "loss",
            RoundEnd::CashOut | RoundEnd::Complete => "cashout",
            RoundEnd::Forfeit => "forfeit",
        };
        json!({
            "bet": stake,
            "moves": self.moves,
            "candles": self.candles(),
            "coeff": round2(self.multiplier()),
            "result": result,
        })
    }
}
