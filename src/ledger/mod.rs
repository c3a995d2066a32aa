//! Durable ledger: accounts, game results and admin adjustments
//!
//! Every resolved round becomes one [`LedgerEntry`]; every admin action
//! becomes one [`AdminAdjustment`]. Both carry a `reversed` flag that the
//! rollback engine toggles. Balances only move through [`BalanceService`]
//! and the store's atomic [`StoreBatch`] commits.

pub mod balance;
pub mod rocks;
pub mod store;

pub use balance::BalanceService;
pub use rocks::RocksLedgerStore;
pub use store::{CommitReceipt, LedgerStore, MemoryStore, Mutation, OverdraftGuard, StoreBatch};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{StateError, ValidationError};
use crate::games::types::GameKind;

pub type AccountId = i64;
pub type EntryId = u64;
pub type AdjustmentId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub balance: i64,
    pub blocked: bool,
    /// Highest multiplier ever collected by hand in a crash round
    pub best_crash_multiplier: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_hourly: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_wheel: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(id: AccountId, balance: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            balance,
            blocked: false,
            best_crash_multiplier: 0.0,
            created_at,
            last_hourly: None,
            last_wheel: None,
        }
    }

    pub fn last_claim(&self, cooldown: Cooldown) -> Option<DateTime<Utc>> {
        match cooldown {
            Cooldown::Hourly => self.last_hourly,
            Cooldown::Wheel => self.last_wheel,
        }
    }

    fn last_claim_mut(&mut self, cooldown: Cooldown) -> &mut Option<DateTime<Utc>> {
        match cooldown {
            Cooldown::Hourly => &mut self.last_hourly,
            Cooldown::Wheel => &mut self.last_wheel,
        }
    }

    /// Stamp a claim at `at`. With `wait` set, fail while the previous claim is younger than it.
    pub fn claim(&mut self, cooldown: Cooldown, at: DateTime<Utc>, wait: Option<Duration>) -> Result<(), StateError> {
        if let (Some(wait), Some(last)) = (wait, self.last_claim(cooldown)) {
            let remaining = last + wait - at;
            if remaining > Duration::zero() {
                return Err(StateError::CooldownActive { remaining_secs: remaining.num_seconds().max(1) });
            }
        }
        *self.last_claim_mut(cooldown) = Some(at);
        Ok(())
    }
}

/// Bonuses gated by a per-account waiting period
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cooldown {
    Hourly,
    Wheel,
}

/// One flip of a record's `reversed` flag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToggleEvent {
    pub at: DateTime<Utc>,
    /// Flag value after this toggle
    pub reversed: bool,
    pub admin_id: Option<AccountId>,
}

/// A resolved round before the store has assigned it an id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLedgerEntry {
    pub account: AccountId,
    pub game: GameKind,
    pub details: serde_json::Value,
    pub stake: i64,
    pub amount: i64,
    pub win: bool,
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// Win entries record the payout as their amount.
    pub fn win(
        account: AccountId,
        game: GameKind,
        stake: i64,
        payout: i64,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { account, game, details, stake, amount: payout, win: true, created_at }
    }

    /// Loss entries record the lost stake as their amount.
    pub fn loss(
        account: AccountId,
        game: GameKind,
        stake: i64,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { account, game, details, stake, amount: stake, win: false, created_at }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account: AccountId,
    pub game: GameKind,
    /// Opaque audit payload: bet, moves or board, final multiplier, result tag
    pub details: serde_json::Value,
    pub stake: i64,
    pub amount: i64,
    pub win: bool,
    pub reversed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub toggles: Vec<ToggleEvent>,
}

impl LedgerEntry {
    pub fn from_new(id: EntryId, new: NewLedgerEntry) -> Self {
        Self {
            id,
            account: new.account,
            game: new.game,
            details: new.details,
            stake: new.stake,
            amount: new.amount,
            win: new.win,
            reversed: false,
            created_at: new.created_at,
            toggles: Vec::new(),
        }
    }

    /// Balance movement of the round itself, stake debit included.
    pub fn settled_effect(&self) -> i64 {
        -self.stake + if self.win { self.amount } else { 0 }
    }

    /// Correction applied while reversed. Depends only on the original outcome:
    /// a reversed win takes the payout back, a reversed loss returns the stake.
    pub fn reversal_correction(&self) -> i64 {
        if self.win {
            -self.amount
        } else {
            self.amount
        }
    }

    /// Net contribution of this entry to the account balance right now.
    pub fn balance_effect(&self) -> i64 {
        self.settled_effect() + if self.reversed { self.reversal_correction() } else { 0 }
    }

    /// Code a promo redemption entry was paid for.
    pub fn promo_code(&self) -> Option<&str> {
        match self.game {
            GameKind::Promo => self.details.get("code").and_then(serde_json::Value::as_str),
            _ => None,
        }
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            id: self.id,
            game: self.game,
            amount: self.amount,
            win: self.win,
            reversed: self.reversed,
            created_at: self.created_at,
        }
    }
}

/// History row without the audit payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSummary {
    pub id: EntryId,
    pub game: GameKind,
    pub amount: i64,
    pub win: bool,
    pub reversed: bool,
    pub created_at: DateTime<Utc>,
}

/// Administrator action, with enough data to invert it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    AddBalance { account: AccountId, amount: i64 },
    SubBalance { account: AccountId, amount: i64 },
    /// `previous` is captured when the adjustment is made so the change can be undone
    SetBalance { account: AccountId, previous: i64, balance: i64 },
    BlockUser { account: AccountId },
    UnblockUser { account: AccountId },
    CreatePromo { code: String, reward: i64 },
    DeletePromo { code: String },
    DeleteUser { account: AccountId },
    RollbackGame { account: AccountId, entry_id: EntryId },
    RollbackAdjustment { account: Option<AccountId>, adjustment_id: AdjustmentId },
    ResetAccount { account: AccountId },
    /// Recorded by an outside tool; the engine has no way to undo it
    External { name: String, account: Option<AccountId> },
}

impl AdminAction {
    pub fn name(&self) -> &str {
        match self {
            AdminAction::AddBalance { .. } => "add_balance",
            AdminAction::SubBalance { .. } => "sub_balance",
            AdminAction::SetBalance { .. } => "set_balance",
            AdminAction::BlockUser { .. } => "block_user",
            AdminAction::UnblockUser { .. } => "unblock_user",
            AdminAction::CreatePromo { .. } => "create_promo",
            AdminAction::DeletePromo { .. } => "delete_promo",
            AdminAction::DeleteUser { .. } => "delete_user",
            AdminAction::RollbackGame { .. } => "rollback_game",
            AdminAction::RollbackAdjustment { .. } => "rollback_admin_log",
            AdminAction::ResetAccount { .. } => "reset_account",
            AdminAction::External { name, .. } => name.as_str(),
        }
    }

    /// Account the action targets, if any.
    pub fn target_account(&self) -> Option<AccountId> {
        match self {
            AdminAction::AddBalance { account, .. }
            | AdminAction::SubBalance { account, .. }
            | AdminAction::SetBalance { account, .. }
            | AdminAction::BlockUser { account }
            | AdminAction::UnblockUser { account }
            | AdminAction::DeleteUser { account }
            | AdminAction::RollbackGame { account, .. }
            | AdminAction::ResetAccount { account } => Some(*account),
            AdminAction::RollbackAdjustment { account, .. } | AdminAction::External { account, .. } => *account,
            AdminAction::CreatePromo { .. } | AdminAction::DeletePromo { .. } => None,
        }
    }

    /// Balance delta the action applies to its target while in force.
    pub fn balance_delta(&self) -> i64 {
        match self {
            AdminAction::AddBalance { amount, .. } => *amount,
            AdminAction::SubBalance { amount, .. } => -*amount,
            AdminAction::SetBalance { previous, balance, .. } => balance - previous,
            _ => 0,
        }
    }
}

/// An admin action before the store has assigned it an id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAdjustment {
    pub admin_id: AccountId,
    pub action: AdminAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminAdjustment {
    pub id: AdjustmentId,
    pub admin_id: AccountId,
    pub action: AdminAction,
    pub reversed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub toggles: Vec<ToggleEvent>,
}

impl AdminAdjustment {
    pub fn from_new(id: AdjustmentId, new: NewAdjustment) -> Self {
        Self {
            id,
            admin_id: new.admin_id,
            action: new.action,
            reversed: false,
            created_at: new.created_at,
            toggles: Vec::new(),
        }
    }

    pub fn balance_effect(&self) -> i64 {
        if self.reversed {
            0
        } else {
            self.action.balance_delta()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promo {
    pub code: String,
    pub reward: i64,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    /// Total redemptions allowed; `None` is unlimited
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default = "one")]
    pub max_per_user: u32,
    #[serde(default)]
    pub uses: u32,
    /// Live redemptions per account
    #[serde(default)]
    pub redeemed_by: BTreeMap<AccountId, u32>,
}

fn one() -> u32 {
    1
}

impl Promo {
    pub fn new(code: &str, reward: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            code: code.to_string(),
            reward,
            deleted: false,
            created_at,
            max_uses: None,
            max_per_user: 1,
            uses: 0,
            redeemed_by: BTreeMap::new(),
        }
    }

    pub fn redemptions_by(&self, account: AccountId) -> u32 {
        self.redeemed_by.get(&account).copied().unwrap_or(0)
    }

    /// Count one redemption. `enforce` checks the code is live and under both limits.
    pub fn redeem(&mut self, account: AccountId, enforce: bool) -> Result<(), StateError> {
        if enforce {
            if self.deleted {
                return Err(StateError::PromoNotFound(self.code.clone()));
            }
            if self.max_uses.is_some_and(|max| self.uses >= max) {
                return Err(StateError::PromoExhausted(self.code.clone()));
            }
            if self.redemptions_by(account) >= self.max_per_user {
                return Err(StateError::PromoAlreadyRedeemed(self.code.clone()));
            }
        }
        self.uses = self.uses.saturating_add(1);
        *self.redeemed_by.entry(account).or_insert(0) += 1;
        Ok(())
    }

    /// Give one redemption back. Counts never go below zero.
    pub fn release(&mut self, account: AccountId) {
        self.uses = self.uses.saturating_sub(1);
        if let Some(count) = self.redeemed_by.get_mut(&account) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.redeemed_by.remove(&account);
            }
        }
    }
}

/// Optional history filters; `None` matches everything
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryFilter {
    pub game: Option<GameKind>,
    pub win: Option<bool>,
    pub reversed: Option<bool>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.game.map_or(true, |g| g == entry.game)
            && self.win.map_or(true, |w| w == entry.win)
            && self.reversed.map_or(true, |r| r == entry.reversed)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdjustmentFilter {
    pub account: Option<AccountId>,
    pub reversed: Option<bool>,
}

impl AdjustmentFilter {
    pub fn matches(&self, adjustment: &AdminAdjustment) -> bool {
        self.account.map_or(true, |a| adjustment.action.target_account() == Some(a))
            && self.reversed.map_or(true, |r| r == adjustment.reversed)
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, page_size: 10 }
    }
}

impl PageRequest {
    pub const MAX_PAGE_SIZE: usize = 100;

    pub fn new(page: usize, page_size: usize) -> Result<Self, ValidationError> {
        if page == 0 {
            return Err(ValidationError::InvalidPage("page numbers start at 1".to_string()));
        }
        if page_size == 0 || page_size > Self::MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidPage(format!(
                "page_size must be between 1 and {}",
                Self::MAX_PAGE_SIZE
            )));
        }
        if (page - 1).checked_mul(page_size).is_none() {
            return Err(ValidationError::InvalidPage(format!("page {} is out of range", page)));
        }
        Ok(Self { page, page_size })
    }

    /// Items skipped before this page starts; saturates for hand-built requests.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Slice an already ordered, already filtered sequence.
    pub fn paginate<T>(&self, items: impl IntoIterator<Item = T>) -> Page<T> {
        let mut total = 0;
        let offset = self.offset();
        let mut out = Vec::new();
        for item in items {
            if total >= offset && out.len() < self.page_size {
                out.push(item);
            }
            total += 1;
        }
        Page { items: out, total, page: self.page, page_size: self.page_size }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

pub type HistoryPage = Page<LedgerSummary>;
