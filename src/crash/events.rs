//! Crash round events for display subscribers

use serde::{Deserialize, Serialize};

use crate::games::types::ResolutionView;
use crate::ledger::AccountId;

/// Published on every multiplier change and once per resolution.
///
/// Delivery is best effort; a round resolves whether or not anyone is listening.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrashEvent {
    Update {
        account: AccountId,
        round_id: u64,
        multiplier: f64,
    },
    Resolved {
        account: AccountId,
        round_id: u64,
        result: String,
        resolution: ResolutionView,
    },
}

impl CrashEvent {
    pub fn account(&self) -> AccountId {
        match self {
            CrashEvent::Update { account, .. } | CrashEvent::Resolved { account, .. } => *account,
        }
    }

    pub fn round_id(&self) -> u64 {
        match self {
            CrashEvent::Update { round_id, .. } | CrashEvent::Resolved { round_id, .. } => *round_id,
        }
    }
}
