//! Account balance service
//!
//! The only place that builds balance-changing mutations. Engines go through
//! [`BalanceService::stake`] and [`BalanceService::settle`]; admin tools and
//! rollbacks compose batches with the `with_*` helpers.

use std::sync::Arc;

use super::store::{LedgerStore, Mutation, OverdraftGuard, StoreBatch};
use super::{Account, AccountId, CommitReceipt, EntryId, NewLedgerEntry};
use crate::clock::Clock;
use crate::config::EconomyConfig;
use crate::errors::{ConsistencyError, StateError, ValidationError, WagerResult};

/// Ledger entry written by a settlement and the balance it left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub entry_id: EntryId,
    pub balance: i64,
}

pub struct BalanceService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    default_balance: i64,
    max_stake: Option<i64>,
}

impl BalanceService {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, economy: &EconomyConfig) -> Self {
        Self {
            store,
            clock,
            default_balance: economy.default_balance,
            max_stake: economy.max_stake,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn default_balance(&self) -> i64 {
        self.default_balance
    }

    fn ensure(&self, account: AccountId) -> Mutation {
        Mutation::EnsureAccount { account, balance: self.default_balance, at: self.clock.now() }
    }

    /// Load the account, creating it with the default balance on first reference.
    pub fn account(&self, id: AccountId) -> WagerResult<Account> {
        if let Some(account) = self.store.account(id)? {
            return Ok(account);
        }
        self.store.commit(StoreBatch::new().push(self.ensure(id)))?;
        tracing::info!(account = id, balance = self.default_balance, "created account");
        self.store.account(id)?.ok_or_else(|| StateError::AccountNotFound(id).into())
    }

    pub fn balance(&self, id: AccountId) -> WagerResult<i64> {
        Ok(self.account(id)?.balance)
    }

    pub fn credit(&self, account: AccountId, amount: i64) -> WagerResult<i64> {
        positive(amount)?;
        self.commit_for(account, self.with_credit(StoreBatch::new(), account, amount))
    }

    /// Fails with `ConsistencyError::Overdraft` instead of clamping.
    pub fn debit(&self, account: AccountId, amount: i64) -> WagerResult<i64> {
        positive(amount)?;
        self.commit_for(account, self.with_debit(StoreBatch::new(), account, amount))
    }

    /// Every check an engine must pass before debiting a stake. Nothing is mutated.
    pub fn check_stake(&self, account: AccountId, stake: i64) -> WagerResult<Account> {
        if stake <= 0 {
            return Err(ValidationError::NonPositiveStake(stake).into());
        }
        if let Some(max) = self.max_stake {
            if stake > max {
                return Err(ValidationError::StakeAboveLimit { stake, max }.into());
            }
        }
        let acct = self.check_active(account)?;
        if acct.balance < stake {
            return Err(ValidationError::InsufficientBalance { stake, balance: acct.balance }.into());
        }
        Ok(acct)
    }

    /// Load the account and refuse it if blocked.
    pub fn check_active(&self, account: AccountId) -> WagerResult<Account> {
        let acct = self.account(account)?;
        if acct.blocked {
            return Err(ValidationError::AccountBlocked(account).into());
        }
        Ok(acct)
    }

    /// Debit a round's stake. Returns the balance afterwards.
    pub fn stake(&self, account: AccountId, stake: i64) -> WagerResult<i64> {
        self.check_stake(account, stake)?;
        self.commit_for(account, self.with_debit(StoreBatch::new(), account, stake))
    }

    /// Empty batch that creates the account first if needed.
    pub fn opening_batch(&self, account: AccountId) -> StoreBatch {
        StoreBatch::new().push(self.ensure(account))
    }

    /// Batch crediting `payout` (if any) and appending the round's entry.
    pub fn settlement_batch(&self, account: AccountId, payout: i64, entry: NewLedgerEntry) -> StoreBatch {
        let batch = self.opening_batch(account);
        let batch = if payout > 0 { self.with_credit(batch, account, payout) } else { batch };
        batch.append_entry(entry)
    }

    /// Credit the payout and record the round in one commit.
    pub fn settle(&self, account: AccountId, payout: i64, entry: NewLedgerEntry) -> WagerResult<Settlement> {
        self.commit_settlement(account, self.settlement_batch(account, payout, entry))
    }

    /// Debit the stake and record a loss in one commit; used when a round is lost at the moment it starts.
    pub fn forfeit_stake(&self, account: AccountId, stake: i64, entry: NewLedgerEntry) -> WagerResult<Settlement> {
        self.check_stake(account, stake)?;
        let batch = self.with_debit(StoreBatch::new(), account, stake).append_entry(entry);
        self.commit_settlement(account, batch)
    }

    pub fn commit_settlement(&self, account: AccountId, batch: StoreBatch) -> WagerResult<Settlement> {
        let receipt = self.store.commit(batch)?;
        let entry_id = receipt
            .entry_ids
            .first()
            .copied()
            .ok_or_else(|| ConsistencyError::InvariantViolated("settlement wrote no ledger entry".to_string()))?;
        let balance = match receipt.balance_of(account) {
            Some(balance) => balance,
            None => self.balance(account)?,
        };
        Ok(Settlement { entry_id, balance })
    }

    pub fn with_credit(&self, batch: StoreBatch, account: AccountId, amount: i64) -> StoreBatch {
        batch.push(self.ensure(account)).adjust_balance(account, amount, OverdraftGuard::Reject)
    }

    pub fn with_debit(&self, batch: StoreBatch, account: AccountId, amount: i64) -> StoreBatch {
        batch.push(self.ensure(account)).adjust_balance(account, -amount, OverdraftGuard::Reject)
    }

    /// Signed correction that may leave the balance negative. Only rollbacks use this.
    pub fn with_correction(&self, batch: StoreBatch, account: AccountId, delta: i64) -> StoreBatch {
        batch.push(self.ensure(account)).adjust_balance(account, delta, OverdraftGuard::Allow)
    }

    pub fn commit(&self, batch: StoreBatch) -> WagerResult<CommitReceipt> {
        self.store.commit(batch)
    }

    fn commit_for(&self, account: AccountId, batch: StoreBatch) -> WagerResult<i64> {
        let receipt = self.store.commit(batch)?;
        match receipt.balance_of(account) {
            Some(balance) => Ok(balance),
            None => self.balance(account),
        }
    }
}

/// Reject zero and negative admin or transfer amounts.
pub fn positive(amount: i64) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::errors::WagerError;
    use crate::games::types::GameKind;
    use crate::ledger::MemoryStore;
    use serde_json::json;

    fn service() -> BalanceService {
        BalanceService::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), &EconomyConfig::default())
    }

    #[test]
    fn accounts_are_created_lazily_with_default_balance() {
        let balances = service();
        assert_eq!(balances.balance(11).unwrap(), 500);
    }

    #[test]
    fn debit_fails_loudly_instead_of_clamping() {
        let balances = service();
        let err = balances.debit(1, 501).unwrap_err();
        assert!(matches!(err, WagerError::Consistency(ConsistencyError::Overdraft { .. })));
        assert_eq!(balances.balance(1).unwrap(), 500);
    }

    #[test]
    fn stake_checks_run_before_mutation() {
        let balances = service();
        assert!(matches!(
            balances.stake(1, 0).unwrap_err(),
            WagerError::Validation(ValidationError::NonPositiveStake(0))
        ));
        assert!(matches!(
            balances.stake(1, 600).unwrap_err(),
            WagerError::Validation(ValidationError::InsufficientBalance { stake: 600, balance: 500 })
        ));
        assert_eq!(balances.stake(1, 200).unwrap(), 300);
    }

    #[test]
    fn max_stake_is_enforced() {
        let economy = EconomyConfig { default_balance: 500, max_stake: Some(100) };
        let balances = BalanceService::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), &economy);
        assert!(matches!(
            balances.stake(1, 101).unwrap_err(),
            WagerError::Validation(ValidationError::StakeAboveLimit { .. })
        ));
    }

    #[test]
    fn settle_credits_and_records_atomically() {
        let balances = service();
        balances.stake(1, 100).unwrap();
        let entry = NewLedgerEntry::win(1, GameKind::CoinFlip, 100, 800, json!({"coeff": 8.0}), chrono::Utc::now());
        let settlement = balances.settle(1, 800, entry).unwrap();

        assert_eq!(settlement.balance, 1200);
        let stored = balances.store().ledger_entry(settlement.entry_id).unwrap().unwrap();
        assert!(stored.win);
        assert_eq!(stored.amount, 800);
    }

    #[test]
    fn correction_may_go_negative() {
        let balances = service();
        let batch = balances.with_correction(StoreBatch::new(), 1, -700);
        balances.commit(batch).unwrap();
        assert_eq!(balances.balance(1).unwrap(), -200);
    }
}
