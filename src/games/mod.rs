//! Turn-based games and the shared board trait.
//!
//! Each game module owns a board type implementing [`TurnGame`]. Boards are
//! pure state machines over a [`rng::RandomSource`]; they never touch
//! balances or the ledger. [`processor::GameProcessor`] does that.

pub mod candles;
pub mod coinflip;
pub mod miner;
pub mod odds;
pub mod processor;
pub mod rng;
pub mod slots;
pub mod tower;
pub mod types;

use serde_json::Value;

use crate::errors::{ValidationError, WagerResult};
use rng::RandomSource;
use types::{GameKind, GameParams, TurnAction};

/// What a single turn did to the round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStep {
    /// Round goes on at the board's new multiplier
    Continue,
    /// Losing draw; the stake is gone
    Bust,
    /// Board ran out of moves; pays the board's multiplier without a cash-out
    Complete,
}

/// How a round ended, for the audit payload's result tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEnd {
    Bust,
    CashOut,
    Complete,
    Forfeit,
}

pub trait TurnGame: Sized + Clone {
    const KIND: GameKind;

    /// Reject bad parameters. Runs before the stake is debited.
    fn check(params: &GameParams) -> Result<(), ValidationError>;

    /// Lay out a fresh board. Parameters have already passed [`TurnGame::check`].
    fn deal(params: &GameParams, rng: &mut dyn RandomSource) -> WagerResult<Self>;

    fn play(&mut self, action: &TurnAction, rng: &mut dyn RandomSource) -> WagerResult<TurnStep>;

    /// Multiplier a cash-out would pay right now.
    fn multiplier(&self) -> f64;

    fn can_cash_out(&self) -> bool;

    /// Board as the player may see it mid-round.
    fn public_view(&self) -> Value;

    /// Full round record for the ledger.
    fn audit(&self, stake: i64, end: RoundEnd) -> Value;
}

fn mismatch(kind: GameKind) -> ValidationError {
    ValidationError::ActionMismatch(kind.to_string())
}

/// Board of whichever game a session is playing
#[derive(Debug, Clone)]
pub enum GameBoard {
    CoinFlip(coinflip::CoinFlipBoard),
    Miner(miner::MinerBoard),
    Tower(tower::TowerBoard),
    Slots(slots::SlotsBoard),
    Candles(candles::CandlesBoard),
}

macro_rules! dispatch {
    ($board:expr, $b:ident => $body:expr) => {
        match $board {
            GameBoard::CoinFlip($b) => $body,
            GameBoard::Miner($b) => $body,
            GameBoard::Tower($b) => $body,
            GameBoard::Slots($b) => $body,
            GameBoard::Candles($b) => $body,
        }
    };
}

impl GameBoard {
    pub fn check(params: &GameParams) -> Result<(), ValidationError> {
        match params.kind() {
            GameKind::CoinFlip => coinflip::CoinFlipBoard::check(params),
            GameKind::Miner => miner::MinerBoard::check(params),
            GameKind::Tower => tower::TowerBoard::check(params),
            GameKind::Slots => slots::SlotsBoard::check(params),
            GameKind::Candles => candles::CandlesBoard::check(params),
            other => Err(ValidationError::UnsupportedGame(other.to_string())),
        }
    }

    pub fn deal(params: &GameParams, rng: &mut dyn RandomSource) -> WagerResult<Self> {
        Ok(match params.kind() {
            GameKind::CoinFlip => GameBoard::CoinFlip(coinflip::CoinFlipBoard::deal(params, rng)?),
            GameKind::Miner => GameBoard::Miner(miner::MinerBoard::deal(params, rng)?),
            GameKind::Tower => GameBoard::Tower(tower::TowerBoard::deal(params, rng)?),
            GameKind::Slots => GameBoard::Slots(slots::SlotsBoard::deal(params, rng)?),
            GameKind::Candles => GameBoard::Candles(candles::CandlesBoard::deal(params, rng)?),
            other => return Err(ValidationError::UnsupportedGame(other.to_string()).into()),
        })
    }

    pub fn kind(&self) -> GameKind {
        match self {
            GameBoard::CoinFlip(_) => GameKind::CoinFlip,
            GameBoard::Miner(_) => GameKind::Miner,
            GameBoard::Tower(_) => GameKind::Tower,
            GameBoard::Slots(_) => GameKind::Slots,
            GameBoard::Candles(_) => GameKind::Candles,
        }
    }

    pub fn play(&mut self, action: &TurnAction, rng: &mut dyn RandomSource) -> WagerResult<TurnStep> {
        dispatch!(self, b => b.play(action, rng))
    }

    pub fn multiplier(&self) -> f64 {
        dispatch!(self, b => b.multiplier())
    }

    pub fn can_cash_out(&self) -> bool {
        dispatch!(self, b => b.can_cash_out())
    }

    pub fn public_view(&self) -> Value {
        dispatch!(self, b => b.public_view())
    }

    pub fn audit(&self, stake: i64, end: RoundEnd) -> Value {
        dispatch!(self, b => b.audit(stake, end))
    }
}
