//! API Request and Response Models

use serde::{Deserialize, Serialize};

use crate::admin::PromoLimits;
use crate::errors::ValidationError;
use crate::games::types::{GameKind, GameParams, TurnAction};
use crate::ledger::{AccountId, AdjustmentFilter, HistoryFilter, PageRequest};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account: AccountId,
    pub balance: i64,
    pub blocked: bool,
    pub best_crash_multiplier: f64,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

/// GET /accounts/:id/history?game=miner&win=true&reversed=false&page=1&page_size=10
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub game: Option<String>,
    pub win: Option<bool>,
    pub reversed: Option<bool>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl HistoryQuery {
    pub fn page_request(&self) -> Result<PageRequest, ValidationError> {
        PageRequest::new(self.page, self.page_size)
    }

    pub fn filter(&self) -> Result<HistoryFilter, ValidationError> {
        let game = self.game.as_deref().map(str::parse::<GameKind>).transpose()?;
        Ok(HistoryFilter { game, win: self.win, reversed: self.reversed })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentQuery {
    pub account: Option<AccountId>,
    pub reversed: Option<bool>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl AdjustmentQuery {
    pub fn page_request(&self) -> Result<PageRequest, ValidationError> {
        PageRequest::new(self.page, self.page_size)
    }

    pub fn filter(&self) -> AdjustmentFilter {
        AdjustmentFilter { account: self.account, reversed: self.reversed }
    }
}

/// POST /games/:game/start
#[derive(Debug, Clone, Deserialize)]
pub struct StartGameRequest {
    pub account: AccountId,
    pub stake: i64,
    pub mines: Option<u8>,
    pub floors: Option<u8>,
    pub traps: Option<u8>,
}

impl StartGameRequest {
    /// Build the board options for `kind`; range checks happen in the engine.
    pub fn params(&self, kind: GameKind) -> Result<GameParams, ValidationError> {
        match kind {
            GameKind::CoinFlip => Ok(GameParams::CoinFlip),
            GameKind::Miner => Ok(GameParams::Miner { mines: required(self.mines, "mines")? }),
            GameKind::Tower => Ok(GameParams::Tower {
                floors: self.floors.unwrap_or(12),
                traps: required(self.traps, "traps")?,
            }),
            GameKind::Slots => Ok(GameParams::Slots),
            GameKind::Candles => Ok(GameParams::Candles),
            other => Err(ValidationError::UnsupportedGame(other.to_string())),
        }
    }
}

fn required(value: Option<u8>, field: &str) -> Result<u8, ValidationError> {
    value.ok_or_else(|| ValidationError::InvalidParameter {
        field: field.to_string(),
        reason: "is required".to_string(),
    })
}

/// POST /games/:game/turn
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub account: AccountId,
    #[serde(flatten)]
    pub action: TurnAction,
}

/// POST /games/:game/cashout and /forfeit
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRequest {
    pub account: AccountId,
}

/// POST /crash/start
#[derive(Debug, Clone, Deserialize)]
pub struct CrashStartRequest {
    pub account: AccountId,
    pub stake: i64,
    pub auto_cashout: Option<f64>,
}

/// Any admin call names the acting admin
#[derive(Debug, Clone, Deserialize)]
pub struct AdminRequest {
    pub admin_id: AccountId,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BalanceOperation {
    Add,
    Sub,
    Set,
}

/// POST /admin/accounts/:id/balance
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceAdjustRequest {
    pub admin_id: AccountId,
    pub operation: BalanceOperation,
    pub amount: i64,
}

/// POST /admin/accounts/:id/reset
#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    pub admin_id: AccountId,
    #[serde(default)]
    pub confirm: bool,
}

/// POST /admin/promos
#[derive(Debug, Clone, Deserialize)]
pub struct PromoRequest {
    pub admin_id: AccountId,
    pub code: String,
    pub reward: i64,
    pub max_uses: Option<u32>,
    pub max_per_user: Option<u32>,
}

impl PromoRequest {
    pub fn limits(&self) -> PromoLimits {
        let defaults = PromoLimits::default();
        PromoLimits {
            max_uses: self.max_uses,
            max_per_user: self.max_per_user.unwrap_or(defaults.max_per_user),
        }
    }
}

/// POST /bonus/hourly
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyRequest {
    pub account: AccountId,
    pub guess: u32,
}

/// POST /bonus/wheel
#[derive(Debug, Clone, Deserialize)]
pub struct WheelRequest {
    pub account: AccountId,
    #[serde(default)]
    pub paid: bool,
}

/// Query for DELETE /admin/promos/:code
#[derive(Debug, Clone, Deserialize)]
pub struct AdminQuery {
    pub admin_id: AccountId,
}
