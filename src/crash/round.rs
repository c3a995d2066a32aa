use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::games::types::ResolutionView;
use crate::ledger::AccountId;

/// How a round left the air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashResult {
    Crash,
    Collect,
    Auto,
}

impl CrashResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrashResult::Crash => "crash",
            CrashResult::Collect => "collect",
            CrashResult::Auto => "auto",
        }
    }
}

/// Outcome fixed by a tick whose ledger commit has not landed yet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSettlement {
    pub result: CrashResult,
    pub multiplier: f64,
    pub payout: i64,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundPhase {
    Flying,
    Settling(PendingSettlement),
    Crashed { at: DateTime<Utc> },
    CashedOut,
    AutoCollected,
    /// Discarded by an account reset; nothing was written
    Cancelled,
}

impl RoundPhase {
    /// Stake debited but no ledger entry written yet.
    pub fn holds_stake(&self) -> bool {
        matches!(self, RoundPhase::Flying | RoundPhase::Settling(_))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Flying,
    Settling,
    Crashed,
    CashedOut,
    AutoCollected,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CrashRound {
    pub round_id: u64,
    pub account: AccountId,
    pub stake: i64,
    /// Hidden from the player until the round ends
    pub crash_point: f64,
    pub multiplier: f64,
    pub auto_cashout: Option<f64>,
    pub phase: RoundPhase,
    pub resolution: Option<ResolutionView>,
    pub started_at: DateTime<Utc>,
}

impl CrashRound {
    pub fn new(
        round_id: u64,
        account: AccountId,
        stake: i64,
        crash_point: f64,
        auto_cashout: Option<f64>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            round_id,
            account,
            stake,
            crash_point,
            multiplier: 1.0,
            auto_cashout,
            phase: RoundPhase::Flying,
            resolution: None,
            started_at,
        }
    }

    pub fn state(&self) -> RoundState {
        match self.phase {
            RoundPhase::Flying => RoundState::Flying,
            RoundPhase::Settling(_) => RoundState::Settling,
            RoundPhase::Crashed { .. } => RoundState::Crashed,
            RoundPhase::CashedOut => RoundState::CashedOut,
            RoundPhase::AutoCollected => RoundState::AutoCollected,
            RoundPhase::Cancelled => RoundState::Cancelled,
        }
    }

    pub fn audit(&self, result: CrashResult, multiplier: f64) -> Value {
        json!({
            "bet": self.stake,
            "crash_point": self.crash_point,
            "multiplier": multiplier,
            "auto_cashout": self.auto_cashout,
            "result": result.as_str(),
        })
    }

    pub fn view(&self) -> RoundView {
        RoundView {
            round_id: self.round_id,
            account: self.account,
            stake: self.stake,
            multiplier: self.multiplier,
            auto_cashout: self.auto_cashout,
            state: self.state(),
            resolution: self.resolution.clone(),
        }
    }
}

/// Player-facing snapshot of a crash round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundView {
    pub round_id: u64,
    pub account: AccountId,
    pub stake: i64,
    pub multiplier: f64,
    pub auto_cashout: Option<f64>,
    pub state: RoundState,
    pub resolution: Option<ResolutionView>,
}

impl RoundView {
    pub fn is_flying(&self) -> bool {
        self.state == RoundState::Flying
    }
}
