use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;
use crate::ledger::{AccountId, EntryId};

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    CoinFlip,
    Miner,
    Tower,
    Slots,
    Candles,
    Crash,
    /// Wheel of fortune spin, free on a cooldown or paid
    Wheel,
    /// Hourly guess-the-number bonus
    Hourly,
    /// Promo code redemption
    Promo,
}

impl GameKind {
    pub const TURN_BASED: [GameKind; 5] =
        [GameKind::CoinFlip, GameKind::Miner, GameKind::Tower, GameKind::Slots, GameKind::Candles];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::CoinFlip => "coinflip",
            GameKind::Miner => "miner",
            GameKind::Tower => "tower",
            GameKind::Slots => "slots",
            GameKind::Candles => "candles",
            GameKind::Crash => "crash",
            GameKind::Wheel => "wheel",
            GameKind::Hourly => "hourly",
            GameKind::Promo => "promo",
        }
    }

    pub fn is_turn_based(&self) -> bool {
        Self::TURN_BASED.contains(self)
    }

    /// Credits that are not wagered rounds
    pub fn is_bonus(&self) -> bool {
        matches!(self, GameKind::Wheel | GameKind::Hourly | GameKind::Promo)
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coinflip" | "coin" => Ok(GameKind::CoinFlip),
            "miner" | "mines" => Ok(GameKind::Miner),
            "tower" => Ok(GameKind::Tower),
            "slots" => Ok(GameKind::Slots),
            "candles" => Ok(GameKind::Candles),
            "crash" | "jetpack" => Ok(GameKind::Crash),
            "wheel" | "fortune" => Ok(GameKind::Wheel),
            "hourly" | "bonus" => Ok(GameKind::Hourly),
            "promo" | "promocode" => Ok(GameKind::Promo),
            other => Err(ValidationError::InvalidParameter {
                field: "game".to_string(),
                reason: format!("unknown game '{}'", other),
            }),
        }
    }
}

/// Coin flip choice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    Heads,
    Tails,
}

impl fmt::Display for CoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinSide::Heads => write!(f, "heads"),
            CoinSide::Tails => write!(f, "tails"),
        }
    }
}

/// Candle direction guess
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Per-game options chosen at round start
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum GameParams {
    CoinFlip,
    Miner { mines: u8 },
    Tower { floors: u8, traps: u8 },
    Slots,
    Candles,
}

impl GameParams {
    pub fn kind(&self) -> GameKind {
        match self {
            GameParams::CoinFlip => GameKind::CoinFlip,
            GameParams::Miner { .. } => GameKind::Miner,
            GameParams::Tower { .. } => GameKind::Tower,
            GameParams::Slots => GameKind::Slots,
            GameParams::Candles => GameKind::Candles,
        }
    }
}

/// One player input on an active session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TurnAction {
    Flip { side: CoinSide },
    OpenCell { cell: u8 },
    PickTile { column: u8 },
    Predict { direction: Direction },
    Spin,
}

/// Game outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Loss,
}

/// What a resolved round did to the account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionView {
    pub entry_id: EntryId,
    pub account: AccountId,
    pub game: GameKind,
    pub stake: i64,
    pub outcome: GameOutcome,
    pub multiplier: f64,
    pub payout: i64,
    pub balance: i64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Resolved(ResolutionView),
}

/// Player-facing snapshot of a turn-based session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub account: AccountId,
    pub game: GameKind,
    pub stake: i64,
    pub multiplier: f64,
    pub potential_payout: i64,
    /// Board as the player may see it; hidden layouts are omitted while active
    pub board: serde_json::Value,
    pub status: SessionStatus,
}

impl SessionView {
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, SessionStatus::Resolved(_))
    }

    pub fn resolution(&self) -> Option<&ResolutionView> {
        match &self.status {
            SessionStatus::Resolved(r) => Some(r),
            SessionStatus::Active => None,
        }
    }
}

/// `floor(stake × multiplier)`, tolerant of binary float error on two-decimal multipliers.
pub fn payout_for(stake: i64, multiplier: f64) -> i64 {
    (stake as f64 * multiplier + 1e-9).floor() as i64
}
