//! Administrator actions
//!
//! Each action commits its effect together with the [`AdminAdjustment`] that
//! records it, so the rollback engine can later invert it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::{ConsistencyError, StateError, ValidationError, WagerError, WagerResult};
use crate::ledger::balance::{positive, BalanceService};
use crate::ledger::{
    AccountId, AdjustmentFilter, AdjustmentId, AdminAction, AdminAdjustment, Mutation, NewAdjustment, Page, PageRequest,
    Promo, StoreBatch,
};

/// What an admin action left behind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminReceipt {
    pub adjustment_id: AdjustmentId,
    pub account: Option<AccountId>,
    pub balance: Option<i64>,
}

const SET_BALANCE_ATTEMPTS: u32 = 3;

/// Redemption limits of a promo code
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromoLimits {
    /// `None` is unlimited
    pub max_uses: Option<u32>,
    pub max_per_user: u32,
}

impl Default for PromoLimits {
    fn default() -> Self {
        Self { max_uses: None, max_per_user: 1 }
    }
}

pub struct AdminService {
    balances: Arc<BalanceService>,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    pub fn new(balances: Arc<BalanceService>, clock: Arc<dyn Clock>) -> Self {
        Self { balances, clock }
    }

    pub fn add_balance(&self, admin_id: AccountId, account: AccountId, amount: i64) -> WagerResult<AdminReceipt> {
        positive(amount)?;
        let batch = self.balances.with_credit(StoreBatch::new(), account, amount);
        self.record(admin_id, batch, AdminAction::AddBalance { account, amount })
    }

    /// Fails with an overdraft error rather than taking the balance below zero.
    pub fn sub_balance(&self, admin_id: AccountId, account: AccountId, amount: i64) -> WagerResult<AdminReceipt> {
        positive(amount)?;
        let batch = self.balances.with_debit(StoreBatch::new(), account, amount);
        self.record(admin_id, batch, AdminAction::SubBalance { account, amount })
    }

    /// Overwrite the balance, keeping the previous value so the change can be undone.
    pub fn set_balance(&self, admin_id: AccountId, account: AccountId, balance: i64) -> WagerResult<AdminReceipt> {
        if balance < 0 {
            return Err(ValidationError::InvalidParameter {
                field: "balance".to_string(),
                reason: "must not be negative".to_string(),
            }
            .into());
        }
        let mut attempt = 1;
        loop {
            let previous = self.balances.balance(account)?;
            // settlements may land between the read and the commit; the batch refuses a stale `previous`
            let batch = StoreBatch::new().push(Mutation::ExpectBalance { account, balance: previous });
            let batch = self.balances.with_correction(batch, account, balance - previous);
            match self.record(admin_id, batch, AdminAction::SetBalance { account, previous, balance }) {
                Err(WagerError::Consistency(ConsistencyError::BalanceChanged { found, .. }))
                    if attempt < SET_BALANCE_ATTEMPTS =>
                {
                    tracing::debug!(account, previous, found, attempt, "balance moved during set_balance, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    pub fn block_user(&self, admin_id: AccountId, account: AccountId) -> WagerResult<AdminReceipt> {
        self.balances.account(account)?;
        let batch = StoreBatch::new().push(Mutation::SetBlocked { account, blocked: true });
        self.record(admin_id, batch, AdminAction::BlockUser { account })
    }

    pub fn unblock_user(&self, admin_id: AccountId, account: AccountId) -> WagerResult<AdminReceipt> {
        self.balances.account(account)?;
        let batch = StoreBatch::new().push(Mutation::SetBlocked { account, blocked: false });
        self.record(admin_id, batch, AdminAction::UnblockUser { account })
    }

    pub fn create_promo(&self, admin_id: AccountId, code: &str, reward: i64) -> WagerResult<AdminReceipt> {
        self.create_promo_with_limits(admin_id, code, reward, PromoLimits::default())
    }

    /// Re-creating a deleted code keeps its redemption counts so earlier redemptions can still be rolled back.
    pub fn create_promo_with_limits(
        &self,
        admin_id: AccountId,
        code: &str,
        reward: i64,
        limits: PromoLimits,
    ) -> WagerResult<AdminReceipt> {
        positive(reward)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::InvalidParameter {
                field: "code".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        if limits.max_per_user == 0 || limits.max_uses == Some(0) {
            return Err(ValidationError::InvalidParameter {
                field: "limits".to_string(),
                reason: "redemption limits must be at least 1".to_string(),
            }
            .into());
        }
        let mut promo = Promo::new(code, reward, self.clock.now());
        if let Some(existing) = self.balances.store().promo(code)? {
            if !existing.deleted {
                return Err(StateError::PromoExists(code.to_string()).into());
            }
            promo.uses = existing.uses;
            promo.redeemed_by = existing.redeemed_by;
        }
        promo.max_uses = limits.max_uses;
        promo.max_per_user = limits.max_per_user;
        let batch = StoreBatch::new().push(Mutation::PutPromo(promo));
        self.record(admin_id, batch, AdminAction::CreatePromo { code: code.to_string(), reward })
    }

    pub fn delete_promo(&self, admin_id: AccountId, code: &str) -> WagerResult<AdminReceipt> {
        match self.balances.store().promo(code)? {
            Some(promo) if !promo.deleted => {}
            _ => return Err(StateError::PromoNotFound(code.to_string()).into()),
        }
        let batch = StoreBatch::new().push(Mutation::SetPromoDeleted { code: code.to_string(), deleted: true });
        self.record(admin_id, batch, AdminAction::DeletePromo { code: code.to_string() })
    }

    /// Log an action performed outside the engine. It can never be rolled back.
    pub fn record_external(&self, admin_id: AccountId, name: &str, account: Option<AccountId>) -> WagerResult<AdminReceipt> {
        let action = AdminAction::External { name: name.to_string(), account };
        self.record(admin_id, StoreBatch::new(), action)
    }

    pub fn list_adjustments(&self, filter: &AdjustmentFilter, page: PageRequest) -> WagerResult<Page<AdminAdjustment>> {
        self.balances.store().adjustments(filter, page)
    }

    fn record(&self, admin_id: AccountId, batch: StoreBatch, action: AdminAction) -> WagerResult<AdminReceipt> {
        let account = action.target_account();
        let name = action.name().to_string();
        let batch = batch.append_adjustment(NewAdjustment { admin_id, action, created_at: self.clock.now() });
        let receipt = self.balances.commit(batch)?;

        let adjustment_id = receipt.adjustment_ids.first().copied().unwrap_or_default();
        let balance = account.and_then(|id| receipt.balance_of(id));
        tracing::info!(admin_id, adjustment_id, action = %name, ?account, "admin action recorded");
        Ok(AdminReceipt { adjustment_id, account, balance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::EconomyConfig;
    use crate::ledger::{LedgerStore, MemoryStore, OverdraftGuard};
    use crate::metrics::MetricsRegistry;
    use crate::rollback::RollbackEngine;

    fn services() -> (Arc<BalanceService>, AdminService, RollbackEngine) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let balances = Arc::new(BalanceService::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            &EconomyConfig::default(),
        ));
        let admin = AdminService::new(balances.clone(), clock.clone());
        let rollback = RollbackEngine::new(balances.clone(), clock, MetricsRegistry::new());
        (balances, admin, rollback)
    }

    #[test]
    fn add_and_sub_balance_are_invertible() {
        let (balances, admin, rollback) = services();
        let add = admin.add_balance(9, 1, 250).unwrap();
        assert_eq!(add.balance, Some(750));
        let sub = admin.sub_balance(9, 1, 100).unwrap();
        assert_eq!(sub.balance, Some(650));

        rollback.rollback_admin_adjustment(add.adjustment_id, 9).unwrap();
        assert_eq!(balances.balance(1).unwrap(), 400);
        rollback.rollback_admin_adjustment(sub.adjustment_id, 9).unwrap();
        assert_eq!(balances.balance(1).unwrap(), 500);
    }

    #[test]
    fn sub_balance_refuses_overdraft() {
        let (balances, admin, _) = services();
        let err = admin.sub_balance(9, 1, 501).unwrap_err();
        assert!(matches!(err, WagerError::Consistency(ConsistencyError::Overdraft { .. })));
        assert_eq!(balances.balance(1).unwrap(), 500);
    }

    #[test]
    fn set_balance_reverts_to_previous() {
        let (balances, admin, rollback) = services();
        let set = admin.set_balance(9, 1, 120).unwrap();
        assert_eq!(set.balance, Some(120));

        let undo = rollback.rollback_admin_adjustment(set.adjustment_id, 9).unwrap();
        assert_eq!(undo.balance_delta, 380);
        assert_eq!(balances.balance(1).unwrap(), 500);

        rollback.rollback_admin_adjustment(set.adjustment_id, 9).unwrap();
        assert_eq!(balances.balance(1).unwrap(), 120);
    }

    /// Lands a settlement credit just before the first batch that pins a balance.
    struct RacingStore {
        inner: MemoryStore,
        raced: std::sync::atomic::AtomicBool,
    }

    impl LedgerStore for RacingStore {
        fn account(&self, id: AccountId) -> WagerResult<Option<crate::ledger::Account>> {
            self.inner.account(id)
        }
        fn ledger_entry(&self, id: crate::ledger::EntryId) -> WagerResult<Option<crate::ledger::LedgerEntry>> {
            self.inner.ledger_entry(id)
        }
        fn adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>> {
            self.inner.adjustment(id)
        }
        fn promo(&self, code: &str) -> WagerResult<Option<Promo>> {
            self.inner.promo(code)
        }
        fn entries_for(&self, account: AccountId) -> WagerResult<Vec<crate::ledger::LedgerEntry>> {
            self.inner.entries_for(account)
        }
        fn all_adjustments(&self) -> WagerResult<Vec<AdminAdjustment>> {
            self.inner.all_adjustments()
        }
        fn commit(&self, batch: StoreBatch) -> WagerResult<crate::ledger::CommitReceipt> {
            let pins = batch.mutations().iter().any(|m| matches!(m, Mutation::ExpectBalance { .. }));
            if pins && !self.raced.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.inner.commit(StoreBatch::new().adjust_balance(1, 70, OverdraftGuard::Reject))?;
            }
            self.inner.commit(batch)
        }
    }

    #[test]
    fn set_balance_lands_exactly_despite_a_concurrent_settlement() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(RacingStore { inner: MemoryStore::new(), raced: Default::default() });
        let balances = Arc::new(BalanceService::new(store.clone(), clock.clone(), &EconomyConfig::default()));
        let admin = AdminService::new(balances.clone(), clock.clone());
        let rollback = RollbackEngine::new(balances.clone(), clock, MetricsRegistry::new());

        let set = admin.set_balance(9, 1, 200).unwrap();
        assert_eq!(set.balance, Some(200));
        assert_eq!(balances.balance(1).unwrap(), 200);

        let logged = balances.store().adjustment(set.adjustment_id).unwrap().unwrap();
        assert_eq!(logged.action, AdminAction::SetBalance { account: 1, previous: 570, balance: 200 });
        assert_eq!(store.all_adjustments().unwrap().len(), 1);

        // undoing restores the balance the set actually replaced
        rollback.rollback_admin_adjustment(set.adjustment_id, 9).unwrap();
        assert_eq!(balances.balance(1).unwrap(), 570);
    }

    #[test]
    fn huge_credit_fails_without_touching_the_balance() {
        let (balances, admin, _) = services();
        let err = admin.add_balance(9, 1, i64::MAX).unwrap_err();
        assert!(matches!(err, WagerError::Consistency(ConsistencyError::BalanceOverflow { account: 1, .. })));
        assert_eq!(balances.balance(1).unwrap(), 500);
        assert!(balances.store().adjustments_for(1).unwrap().is_empty());
    }

    #[test]
    fn non_positive_amounts_are_rejected_everywhere() {
        let (balances, admin, _) = services();
        for amount in [0, -5] {
            let rejected = |err: WagerError| {
                matches!(err, WagerError::Validation(ValidationError::NonPositiveAmount(a)) if a == amount)
            };
            assert!(rejected(admin.add_balance(9, 1, amount).unwrap_err()));
            assert!(rejected(admin.sub_balance(9, 1, amount).unwrap_err()));
            assert!(rejected(admin.create_promo(9, "ZERO", amount).unwrap_err()));
            assert!(rejected(balances.credit(1, amount).unwrap_err()));
            assert!(rejected(balances.debit(1, amount).unwrap_err()));
        }
        assert_eq!(balances.balance(1).unwrap(), 500);
        assert!(balances.store().adjustments_for(1).unwrap().is_empty());
    }

    #[test]
    fn block_toggles_with_rollback() {
        let (balances, admin, rollback) = services();
        let block = admin.block_user(9, 1).unwrap();
        assert!(balances.account(1).unwrap().blocked);
        assert!(balances.stake(1, 10).is_err());

        rollback.rollback_admin_adjustment(block.adjustment_id, 9).unwrap();
        assert!(!balances.account(1).unwrap().blocked);
    }

    #[test]
    fn promo_delete_and_restore() {
        let (balances, admin, rollback) = services();
        admin.create_promo(9, "SPRING", 100).unwrap();
        assert!(matches!(
            admin.create_promo(9, "SPRING", 100).unwrap_err(),
            WagerError::State(StateError::PromoExists(_))
        ));

        let deleted = admin.delete_promo(9, "SPRING").unwrap();
        assert!(balances.store().promo("SPRING").unwrap().unwrap().deleted);
        rollback.rollback_admin_adjustment(deleted.adjustment_id, 9).unwrap();
        assert!(!balances.store().promo("SPRING").unwrap().unwrap().deleted);

        assert!(admin.delete_promo(9, "MISSING").is_err());
    }

    #[test]
    fn promo_limits_are_stored_and_survive_recreation() {
        let (balances, admin, _) = services();
        let limits = PromoLimits { max_uses: Some(10), max_per_user: 2 };
        admin.create_promo_with_limits(9, "WINTER", 30, limits).unwrap();
        let stored = balances.store().promo("WINTER").unwrap().unwrap();
        assert_eq!(stored.max_uses, Some(10));
        assert_eq!(stored.max_per_user, 2);

        let mut used = stored.clone();
        used.redeem(1, true).unwrap();
        balances.commit(StoreBatch::new().push(Mutation::PutPromo(used))).unwrap();
        admin.delete_promo(9, "WINTER").unwrap();

        admin.create_promo(9, "WINTER", 60).unwrap();
        let recreated = balances.store().promo("WINTER").unwrap().unwrap();
        assert_eq!(recreated.reward, 60);
        assert_eq!(recreated.max_per_user, 1);
        assert_eq!(recreated.uses, 1);
        assert_eq!(recreated.redemptions_by(1), 1);

        let zero = PromoLimits { max_uses: Some(0), max_per_user: 1 };
        assert!(matches!(
            admin.create_promo_with_limits(9, "NEVER", 5, zero).unwrap_err(),
            WagerError::Validation(_)
        ));
    }

    #[test]
    fn external_actions_cannot_be_rolled_back() {
        let (_, admin, rollback) = services();
        let receipt = admin.record_external(9, "channel_broadcast", None).unwrap();
        let err = rollback.rollback_admin_adjustment(receipt.adjustment_id, 9).unwrap_err();
        assert!(matches!(err, WagerError::Consistency(ConsistencyError::NoInverse(name)) if name == "channel_broadcast"));
    }

    #[test]
    fn listing_filters_by_account() {
        let (_, admin, _) = services();
        admin.add_balance(9, 1, 10).unwrap();
        admin.add_balance(9, 2, 10).unwrap();
        admin.block_user(9, 1).unwrap();

        let filter = AdjustmentFilter { account: Some(1), reversed: None };
        let page = admin.list_adjustments(&filter, PageRequest::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].action, AdminAction::BlockUser { account: 1 });
    }
}
