//! Ledger store abstraction and the in-memory implementation
//!
//! Writes go through [`LedgerStore::commit`] with a [`StoreBatch`]. A batch is
//! staged against the current tables first; if any mutation fails (overdraft,
//! stale toggle, missing record) nothing is written.

use chrono::{DateTime, Duration, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    Account, AccountId, AdjustmentFilter, AdjustmentId, AdminAdjustment, Cooldown, EntryId, HistoryFilter, HistoryPage,
    LedgerEntry, NewAdjustment, NewLedgerEntry, Page, PageRequest, Promo, ToggleEvent,
};
use crate::errors::{ConsistencyError, StateError, StorageError, WagerError, WagerResult};

/// Whether a balance adjustment may take the balance below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdraftGuard {
    Reject,
    Allow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create the account with `balance` unless it already exists
    EnsureAccount { account: AccountId, balance: i64, at: DateTime<Utc> },
    AdjustBalance { account: AccountId, delta: i64, guard: OverdraftGuard },
    /// Fail the batch unless the staged balance still equals `balance`
    ExpectBalance { account: AccountId, balance: i64 },
    AppendEntry(NewLedgerEntry),
    /// Flip `reversed`, failing if it no longer equals `expected`
    ToggleEntry { id: EntryId, expected: bool, event: ToggleEvent },
    AppendAdjustment(NewAdjustment),
    ToggleAdjustment { id: AdjustmentId, expected: bool, event: ToggleEvent },
    SetBlocked { account: AccountId, blocked: bool },
    PutPromo(Promo),
    SetPromoDeleted { code: String, deleted: bool },
    RecordBestMultiplier { account: AccountId, multiplier: f64 },
    /// Stamp a bonus claim; with `wait` set the previous claim must be at least that old
    ClaimBonus { account: AccountId, cooldown: Cooldown, at: DateTime<Utc>, wait: Option<Duration> },
    /// Count a redemption; `enforce` applies the promo's limits
    RedeemPromo { code: String, account: AccountId, enforce: bool },
    ReleasePromo { code: String, account: AccountId },
    /// Drop every entry and adjustment of the account and restore `balance`
    ResetAccount { account: AccountId, balance: i64 },
}

/// Ordered list of mutations committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreBatch {
    mutations: Vec<Mutation>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn append_entry(self, entry: NewLedgerEntry) -> Self {
        self.push(Mutation::AppendEntry(entry))
    }

    pub fn append_adjustment(self, adjustment: NewAdjustment) -> Self {
        self.push(Mutation::AppendAdjustment(adjustment))
    }

    pub(crate) fn adjust_balance(self, account: AccountId, delta: i64, guard: OverdraftGuard) -> Self {
        if delta == 0 {
            return self;
        }
        self.push(Mutation::AdjustBalance { account, delta, guard })
    }
}

/// What a successful commit produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub entry_ids: Vec<EntryId>,
    pub adjustment_ids: Vec<AdjustmentId>,
    /// Final balance of every account the batch touched
    pub balances: HashMap<AccountId, i64>,
    pub entries_removed: usize,
    pub adjustments_removed: usize,
}

impl CommitReceipt {
    pub fn balance_of(&self, account: AccountId) -> Option<i64> {
        self.balances.get(&account).copied()
    }
}

pub trait LedgerStore: Send + Sync {
    fn account(&self, id: AccountId) -> WagerResult<Option<Account>>;

    fn ledger_entry(&self, id: EntryId) -> WagerResult<Option<LedgerEntry>>;

    fn adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>>;

    fn promo(&self, code: &str) -> WagerResult<Option<Promo>>;

    /// Every entry of the account, newest first.
    fn entries_for(&self, account: AccountId) -> WagerResult<Vec<LedgerEntry>>;

    /// Every admin adjustment, newest first.
    fn all_adjustments(&self) -> WagerResult<Vec<AdminAdjustment>>;

    fn commit(&self, batch: StoreBatch) -> WagerResult<CommitReceipt>;

    /// Adjustments targeting the account, newest first.
    fn adjustments_for(&self, account: AccountId) -> WagerResult<Vec<AdminAdjustment>> {
        Ok(self
            .all_adjustments()?
            .into_iter()
            .filter(|a| a.action.target_account() == Some(account))
            .collect())
    }

    fn history(&self, account: AccountId, filter: &HistoryFilter, page: PageRequest) -> WagerResult<HistoryPage> {
        let entries = self.entries_for(account)?;
        Ok(page.paginate(entries.iter().filter(|e| filter.matches(e)).map(LedgerEntry::summary)))
    }

    fn adjustments(&self, filter: &AdjustmentFilter, page: PageRequest) -> WagerResult<Page<AdminAdjustment>> {
        let all = self.all_adjustments()?;
        Ok(page.paginate(all.into_iter().filter(|a| filter.matches(a))))
    }
}

/// Read access the staging pass needs from a backend, taken under its write lock
pub(crate) trait StagingSource {
    fn load_account(&self, id: AccountId) -> WagerResult<Option<Account>>;
    fn load_entry(&self, id: EntryId) -> WagerResult<Option<LedgerEntry>>;
    fn load_adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>>;
    fn load_promo(&self, code: &str) -> WagerResult<Option<Promo>>;
    fn entry_ids_for(&self, account: AccountId) -> WagerResult<Vec<EntryId>>;
    fn adjustment_ids_for(&self, account: AccountId) -> WagerResult<Vec<AdjustmentId>>;
    fn next_ids(&self) -> WagerResult<(EntryId, AdjustmentId)>;
}

#[derive(Debug, Clone)]
pub(crate) enum Staged<T> {
    Put(T),
    Delete(T),
}

impl<T> Staged<T> {
    fn live_mut(&mut self) -> Option<&mut T> {
        match self {
            Staged::Put(v) => Some(v),
            Staged::Delete(_) => None,
        }
    }
}

/// Result of staging a batch; backends persist it in one write
#[derive(Debug, Default)]
pub(crate) struct StagedChanges {
    pub accounts: BTreeMap<AccountId, Account>,
    pub entries: BTreeMap<EntryId, Staged<LedgerEntry>>,
    pub adjustments: BTreeMap<AdjustmentId, Staged<AdminAdjustment>>,
    pub promos: BTreeMap<String, Promo>,
    pub next_entry_id: EntryId,
    pub next_adjustment_id: AdjustmentId,
    pub receipt: CommitReceipt,
}

impl StagedChanges {
    fn account_mut<S: StagingSource>(&mut self, src: &S, id: AccountId) -> WagerResult<&mut Account> {
        match self.accounts.entry(id) {
            Entry::Occupied(o) => Ok(o.into_mut()),
            Entry::Vacant(v) => {
                let account = src.load_account(id)?.ok_or(StateError::AccountNotFound(id))?;
                Ok(v.insert(account))
            }
        }
    }

    fn entry_mut<S: StagingSource>(&mut self, src: &S, id: EntryId) -> WagerResult<&mut LedgerEntry> {
        let staged = match self.entries.entry(id) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let entry = src.load_entry(id)?.ok_or(StateError::EntryNotFound(id))?;
                v.insert(Staged::Put(entry))
            }
        };
        staged.live_mut().ok_or_else(|| StateError::EntryNotFound(id).into())
    }

    fn adjustment_mut<S: StagingSource>(&mut self, src: &S, id: AdjustmentId) -> WagerResult<&mut AdminAdjustment> {
        let staged = match self.adjustments.entry(id) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let adjustment = src.load_adjustment(id)?.ok_or(StateError::AdjustmentNotFound(id))?;
                v.insert(Staged::Put(adjustment))
            }
        };
        staged.live_mut().ok_or_else(|| StateError::AdjustmentNotFound(id).into())
    }

    fn promo_mut<S: StagingSource>(&mut self, src: &S, code: &str) -> WagerResult<&mut Promo> {
        match self.promos.entry(code.to_string()) {
            Entry::Occupied(o) => Ok(o.into_mut()),
            Entry::Vacant(v) => {
                let promo = src.load_promo(code)?.ok_or_else(|| StateError::PromoNotFound(code.to_string()))?;
                Ok(v.insert(promo))
            }
        }
    }

    /// Give back a redemption slot; a promo that no longer exists has nothing to give back.
    fn release_promo<S: StagingSource>(&mut self, src: &S, code: &str, account: AccountId) -> WagerResult<()> {
        match self.promo_mut(src, code) {
            Ok(promo) => {
                promo.release(account);
                Ok(())
            }
            Err(WagerError::State(StateError::PromoNotFound(_))) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn reset<S: StagingSource>(&mut self, src: &S, account: AccountId, balance: i64) -> WagerResult<()> {
        let acct = self.account_mut(src, account)?;
        acct.balance = balance;
        acct.blocked = false;
        acct.best_crash_multiplier = 0.0;
        acct.last_hourly = None;
        acct.last_wheel = None;

        let mut entry_ids = src.entry_ids_for(account)?;
        entry_ids.extend(self.entries.iter().filter_map(|(id, s)| match s {
            Staged::Put(e) if e.account == account => Some(*id),
            _ => None,
        }));
        entry_ids.sort_unstable();
        entry_ids.dedup();
        for id in entry_ids {
            let entry = self.entry_mut(src, id)?.clone();
            if let Some(code) = entry.promo_code().filter(|_| !entry.reversed) {
                self.release_promo(src, code, account)?;
            }
            self.entries.insert(id, Staged::Delete(entry));
            self.receipt.entries_removed += 1;
        }

        let mut adjustment_ids = src.adjustment_ids_for(account)?;
        adjustment_ids.extend(self.adjustments.iter().filter_map(|(id, s)| match s {
            Staged::Put(a) if a.action.target_account() == Some(account) => Some(*id),
            _ => None,
        }));
        adjustment_ids.sort_unstable();
        adjustment_ids.dedup();
        for id in adjustment_ids {
            let adjustment = self.adjustment_mut(src, id)?.clone();
            self.adjustments.insert(id, Staged::Delete(adjustment));
            self.receipt.adjustments_removed += 1;
        }
        Ok(())
    }
}

/// Validate and stage every mutation in order. Nothing is persisted here.
pub(crate) fn stage<S: StagingSource>(src: &S, batch: StoreBatch) -> WagerResult<StagedChanges> {
    let (next_entry_id, next_adjustment_id) = src.next_ids()?;
    let mut staged = StagedChanges { next_entry_id, next_adjustment_id, ..Default::default() };

    for mutation in batch.mutations {
        match mutation {
            Mutation::EnsureAccount { account, balance, at } => {
                if let Entry::Vacant(v) = staged.accounts.entry(account) {
                    let existing = src.load_account(account)?;
                    v.insert(existing.unwrap_or_else(|| Account::new(account, balance, at)));
                }
            }
            Mutation::AdjustBalance { account, delta, guard } => {
                let acct = staged.account_mut(src, account)?;
                let next = acct
                    .balance
                    .checked_add(delta)
                    .ok_or(ConsistencyError::BalanceOverflow { account, delta })?;
                if guard == OverdraftGuard::Reject && next < 0 {
                    return Err(ConsistencyError::Overdraft { account, amount: -delta, balance: acct.balance }.into());
                }
                acct.balance = next;
            }
            Mutation::ExpectBalance { account, balance } => {
                let found = staged.account_mut(src, account)?.balance;
                if found != balance {
                    return Err(ConsistencyError::BalanceChanged { account, expected: balance, found }.into());
                }
            }
            Mutation::AppendEntry(new) => {
                staged.account_mut(src, new.account)?;
                let id = staged.next_entry_id;
                staged.next_entry_id += 1;
                staged.entries.insert(id, Staged::Put(LedgerEntry::from_new(id, new)));
                staged.receipt.entry_ids.push(id);
            }
            Mutation::ToggleEntry { id, expected, event } => {
                let entry = staged.entry_mut(src, id)?;
                if entry.reversed != expected {
                    return Err(ConsistencyError::ConcurrentToggle(id).into());
                }
                entry.reversed = !expected;
                entry.toggles.push(event);
            }
            Mutation::AppendAdjustment(new) => {
                let id = staged.next_adjustment_id;
                staged.next_adjustment_id += 1;
                staged.adjustments.insert(id, Staged::Put(AdminAdjustment::from_new(id, new)));
                staged.receipt.adjustment_ids.push(id);
            }
            Mutation::ToggleAdjustment { id, expected, event } => {
                let adjustment = staged.adjustment_mut(src, id)?;
                if adjustment.reversed != expected {
                    return Err(ConsistencyError::ConcurrentToggle(id).into());
                }
                adjustment.reversed = !expected;
                adjustment.toggles.push(event);
            }
            Mutation::SetBlocked { account, blocked } => {
                staged.account_mut(src, account)?.blocked = blocked;
            }
            Mutation::PutPromo(promo) => {
                staged.promos.insert(promo.code.clone(), promo);
            }
            Mutation::SetPromoDeleted { code, deleted } => {
                staged.promo_mut(src, &code)?.deleted = deleted;
            }
            Mutation::RecordBestMultiplier { account, multiplier } => {
                let acct = staged.account_mut(src, account)?;
                if multiplier > acct.best_crash_multiplier {
                    acct.best_crash_multiplier = multiplier;
                }
            }
            Mutation::ClaimBonus { account, cooldown, at, wait } => {
                staged.account_mut(src, account)?.claim(cooldown, at, wait)?;
            }
            Mutation::RedeemPromo { code, account, enforce } => {
                staged.account_mut(src, account)?;
                staged.promo_mut(src, &code)?.redeem(account, enforce)?;
            }
            Mutation::ReleasePromo { code, account } => staged.release_promo(src, &code, account)?,
            Mutation::ResetAccount { account, balance } => staged.reset(src, account, balance)?,
        }
    }

    staged.receipt.balances = staged.accounts.iter().map(|(id, a)| (*id, a.balance)).collect();
    Ok(staged)
}

struct Tables {
    accounts: HashMap<AccountId, Account>,
    entries: BTreeMap<EntryId, LedgerEntry>,
    adjustments: BTreeMap<AdjustmentId, AdminAdjustment>,
    promos: HashMap<String, Promo>,
    next_entry_id: EntryId,
    next_adjustment_id: AdjustmentId,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            entries: BTreeMap::new(),
            adjustments: BTreeMap::new(),
            promos: HashMap::new(),
            next_entry_id: 1,
            next_adjustment_id: 1,
        }
    }
}

impl StagingSource for Tables {
    fn load_account(&self, id: AccountId) -> WagerResult<Option<Account>> {
        Ok(self.accounts.get(&id).cloned())
    }

    fn load_entry(&self, id: EntryId) -> WagerResult<Option<LedgerEntry>> {
        Ok(self.entries.get(&id).cloned())
    }

    fn load_adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>> {
        Ok(self.adjustments.get(&id).cloned())
    }

    fn load_promo(&self, code: &str) -> WagerResult<Option<Promo>> {
        Ok(self.promos.get(code).cloned())
    }

    fn entry_ids_for(&self, account: AccountId) -> WagerResult<Vec<EntryId>> {
        Ok(self.entries.values().filter(|e| e.account == account).map(|e| e.id).collect())
    }

    fn adjustment_ids_for(&self, account: AccountId) -> WagerResult<Vec<AdjustmentId>> {
        Ok(self
            .adjustments
            .values()
            .filter(|a| a.action.target_account() == Some(account))
            .map(|a| a.id)
            .collect())
    }

    fn next_ids(&self) -> WagerResult<(EntryId, AdjustmentId)> {
        Ok((self.next_entry_id, self.next_adjustment_id))
    }
}

/// Ledger store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with `StorageError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl LedgerStore for MemoryStore {
    fn account(&self, id: AccountId) -> WagerResult<Option<Account>> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    fn ledger_entry(&self, id: EntryId) -> WagerResult<Option<LedgerEntry>> {
        Ok(self.read().entries.get(&id).cloned())
    }

    fn adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>> {
        Ok(self.read().adjustments.get(&id).cloned())
    }

    fn promo(&self, code: &str) -> WagerResult<Option<Promo>> {
        Ok(self.read().promos.get(code).cloned())
    }

    fn entries_for(&self, account: AccountId) -> WagerResult<Vec<LedgerEntry>> {
        Ok(self.read().entries.values().rev().filter(|e| e.account == account).cloned().collect())
    }

    fn all_adjustments(&self) -> WagerResult<Vec<AdminAdjustment>> {
        Ok(self.read().adjustments.values().rev().cloned().collect())
    }

    fn commit(&self, batch: StoreBatch) -> WagerResult<CommitReceipt> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".to_string()).into());
        }

        let mut tables = self.write();
        let staged = stage(&*tables, batch)?;

        tables.accounts.extend(staged.accounts);
        for (id, change) in staged.entries {
            match change {
                Staged::Put(entry) => {
                    tables.entries.insert(id, entry);
                }
                Staged::Delete(_) => {
                    tables.entries.remove(&id);
                }
            }
        }
        for (id, change) in staged.adjustments {
            match change {
                Staged::Put(adjustment) => {
                    tables.adjustments.insert(id, adjustment);
                }
                Staged::Delete(_) => {
                    tables.adjustments.remove(&id);
                }
            }
        }
        tables.promos.extend(staged.promos);
        tables.next_entry_id = staged.next_entry_id;
        tables.next_adjustment_id = staged.next_adjustment_id;

        Ok(staged.receipt)
    }
}
