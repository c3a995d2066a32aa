//! Toggle rollback of ledger entries and admin adjustments, plus account reset
//!
//! A rollback flips the record's `reversed` flag and applies the matching
//! balance correction in the same commit. Calling it again redoes the original
//! effect. The correction's sign depends only on what the record originally
//! did, never on which way the flag is being flipped.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::{ConsistencyError, StateError, WagerResult};
use crate::ledger::balance::BalanceService;
use crate::ledger::{
    AccountId, AdjustmentId, AdminAction, CommitReceipt, EntryId, Mutation, NewAdjustment, StoreBatch, ToggleEvent,
};
use crate::metrics::MetricsRegistry;

/// Outcome of one rollback toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToggleResult {
    pub record_id: u64,
    pub account: Option<AccountId>,
    /// Flag value after the toggle
    pub reversed: bool,
    pub balance_delta: i64,
    /// Balance of `account` after the toggle
    pub balance: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetResult {
    pub account: AccountId,
    pub entries_removed: usize,
    pub adjustments_removed: usize,
    pub balance: i64,
}

pub struct RollbackEngine {
    balances: Arc<BalanceService>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRegistry,
}

impl RollbackEngine {
    pub fn new(balances: Arc<BalanceService>, clock: Arc<dyn Clock>, metrics: MetricsRegistry) -> Self {
        Self { balances, clock, metrics }
    }

    pub fn rollback_game(&self, entry_id: EntryId, admin_id: AccountId) -> WagerResult<ToggleResult> {
        let entry = self
            .balances
            .store()
            .ledger_entry(entry_id)?
            .ok_or(StateError::EntryNotFound(entry_id))?;

        let reversing = !entry.reversed;
        let correction = entry.reversal_correction();
        let delta = if reversing { correction } else { -correction };
        let now = self.clock.now();

        let batch = match entry.promo_code() {
            Some(code) if reversing => {
                StoreBatch::new().push(Mutation::ReleasePromo { code: code.to_string(), account: entry.account })
            }
            Some(code) => StoreBatch::new().push(Mutation::RedeemPromo {
                code: code.to_string(),
                account: entry.account,
                enforce: false,
            }),
            None => StoreBatch::new(),
        };
        let batch = self
            .balances
            .with_correction(batch, entry.account, delta)
            .push(Mutation::ToggleEntry {
                id: entry_id,
                expected: entry.reversed,
                event: ToggleEvent { at: now, reversed: reversing, admin_id: Some(admin_id) },
            })
            .append_adjustment(NewAdjustment {
                admin_id,
                action: AdminAction::RollbackGame { account: entry.account, entry_id },
                created_at: now,
            });
        let receipt = self.balances.commit(batch)?;
        let balance = self.balance_after(&receipt, Some(entry.account))?;

        MetricsRegistry::incr(&self.metrics.rollbacks_total);
        tracing::info!(
            entry_id,
            account = entry.account,
            admin_id,
            reversed = reversing,
            delta,
            "ledger entry toggled"
        );
        let verb = if reversing { "reversed" } else { "restored" };
        Ok(ToggleResult {
            record_id: entry_id,
            account: Some(entry.account),
            reversed: reversing,
            balance_delta: delta,
            balance,
            message: format!("{} #{} {} ({:+})", entry.game, entry_id, verb, delta),
        })
    }

    pub fn rollback_admin_adjustment(&self, adjustment_id: AdjustmentId, admin_id: AccountId) -> WagerResult<ToggleResult> {
        let adjustment = self
            .balances
            .store()
            .adjustment(adjustment_id)?
            .ok_or(StateError::AdjustmentNotFound(adjustment_id))?;

        let reversing = !adjustment.reversed;
        let target = adjustment.action.target_account();
        let mut delta = 0;
        let batch = match &adjustment.action {
            AdminAction::AddBalance { account, .. }
            | AdminAction::SubBalance { account, .. }
            | AdminAction::SetBalance { account, .. } => {
                let original = adjustment.action.balance_delta();
                delta = if reversing { -original } else { original };
                self.balances.with_correction(StoreBatch::new(), *account, delta)
            }
            AdminAction::BlockUser { account } => {
                StoreBatch::new().push(Mutation::SetBlocked { account: *account, blocked: !reversing })
            }
            AdminAction::UnblockUser { account } => {
                StoreBatch::new().push(Mutation::SetBlocked { account: *account, blocked: reversing })
            }
            AdminAction::CreatePromo { code, .. } => {
                StoreBatch::new().push(Mutation::SetPromoDeleted { code: code.clone(), deleted: reversing })
            }
            AdminAction::DeletePromo { code } => {
                StoreBatch::new().push(Mutation::SetPromoDeleted { code: code.clone(), deleted: !reversing })
            }
            AdminAction::DeleteUser { .. }
            | AdminAction::RollbackGame { .. }
            | AdminAction::RollbackAdjustment { .. }
            | AdminAction::ResetAccount { .. }
            | AdminAction::External { .. } => {
                let action = adjustment.action.name().to_string();
                tracing::error!(adjustment_id, admin_id, action = %action, "rollback refused: action has no inverse");
                return Err(ConsistencyError::NoInverse(action).into());
            }
        };

        let now = self.clock.now();
        let batch = batch
            .push(Mutation::ToggleAdjustment {
                id: adjustment_id,
                expected: adjustment.reversed,
                event: ToggleEvent { at: now, reversed: reversing, admin_id: Some(admin_id) },
            })
            .append_adjustment(NewAdjustment {
                admin_id,
                action: AdminAction::RollbackAdjustment { account: target, adjustment_id },
                created_at: now,
            });
        let receipt = self.balances.commit(batch)?;
        let balance = self.balance_after(&receipt, target)?;

        MetricsRegistry::incr(&self.metrics.rollbacks_total);
        tracing::info!(
            adjustment_id,
            action = adjustment.action.name(),
            admin_id,
            reversed = reversing,
            delta,
            "admin adjustment toggled"
        );
        let verb = if reversing { "reversed" } else { "restored" };
        Ok(ToggleResult {
            record_id: adjustment_id,
            account: target,
            reversed: reversing,
            balance_delta: delta,
            balance,
            message: format!("{} #{} {}", adjustment.action.name(), adjustment_id, verb),
        })
    }

    /// Wipe the account's history and restore the default balance.
    ///
    /// Unlike every rollback this cannot be undone: the removed records are gone.
    pub fn reset_account(&self, account: AccountId, admin_id: AccountId) -> WagerResult<ResetResult> {
        let default_balance = self.balances.default_balance();
        let now = self.clock.now();
        let batch = StoreBatch::new()
            .push(Mutation::EnsureAccount { account, balance: default_balance, at: now })
            .push(Mutation::ResetAccount { account, balance: default_balance })
            .append_adjustment(NewAdjustment {
                admin_id,
                action: AdminAction::ResetAccount { account },
                created_at: now,
            });
        let receipt = self.balances.commit(batch)?;

        MetricsRegistry::incr(&self.metrics.resets_total);
        tracing::warn!(
            account,
            admin_id,
            entries_removed = receipt.entries_removed,
            adjustments_removed = receipt.adjustments_removed,
            "account reset, history removed permanently"
        );
        Ok(ResetResult {
            account,
            entries_removed: receipt.entries_removed,
            adjustments_removed: receipt.adjustments_removed,
            balance: receipt.balance_of(account).unwrap_or(default_balance),
        })
    }

    fn balance_after(&self, receipt: &CommitReceipt, account: Option<AccountId>) -> WagerResult<Option<i64>> {
        match account {
            Some(id) => match receipt.balance_of(id) {
                Some(balance) => Ok(Some(balance)),
                None => self.balances.balance(id).map(Some),
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::EconomyConfig;
    use crate::errors::WagerError;
    use crate::games::types::GameKind;
    use crate::ledger::{LedgerStore, MemoryStore, NewLedgerEntry};
    use chrono::Utc;
    use serde_json::json;

    fn engine() -> (Arc<BalanceService>, RollbackEngine) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let balances = Arc::new(BalanceService::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            &EconomyConfig::default(),
        ));
        let rollback = RollbackEngine::new(balances.clone(), clock, MetricsRegistry::new());
        (balances, rollback)
    }

    fn play(balances: &BalanceService, win: bool, stake: i64, payout: i64) -> EntryId {
        balances.stake(1, stake).unwrap();
        let entry = if win {
            NewLedgerEntry::win(1, GameKind::CoinFlip, stake, payout, json!({}), Utc::now())
        } else {
            NewLedgerEntry::loss(1, GameKind::CoinFlip, stake, json!({}), Utc::now())
        };
        balances.settle(1, if win { payout } else { 0 }, entry).unwrap().entry_id
    }

    #[test]
    fn win_reversal_takes_the_payout_back() {
        let (balances, rollback) = engine();
        let id = play(&balances, true, 100, 800);
        assert_eq!(balances.balance(1).unwrap(), 1200);

        let first = rollback.rollback_game(id, 99).unwrap();
        assert!(first.reversed);
        assert_eq!(first.balance_delta, -800);
        assert_eq!(first.balance, Some(400));

        let second = rollback.rollback_game(id, 99).unwrap();
        assert!(!second.reversed);
        assert_eq!(second.balance, Some(1200));
    }

    #[test]
    fn loss_reversal_refunds_the_stake() {
        let (balances, rollback) = engine();
        let id = play(&balances, false, 100, 0);
        assert_eq!(rollback.rollback_game(id, 1).unwrap().balance, Some(500));
        assert_eq!(rollback.rollback_game(id, 1).unwrap().balance, Some(400));

        let entry = balances.store().ledger_entry(id).unwrap().unwrap();
        assert_eq!(entry.toggles.len(), 2);
        assert!(!entry.reversed);
    }

    #[test]
    fn double_rollback_restores_every_outcome() {
        let (balances, rollback) = engine();
        balances.credit(1, 100_000).unwrap();
        for stake in [1, 2, 3, 7, 50, 99, 250, 500, 4_999] {
            for payout in [stake, stake + 1, 2 * stake, 37 * stake] {
                for win in [true, false] {
                    let before_round = balances.balance(1).unwrap();
                    let id = play(&balances, win, stake, payout);
                    let settled = balances.balance(1).unwrap();

                    let reversed = rollback.rollback_game(id, 1).unwrap();
                    let expected = if win { before_round - stake } else { before_round };
                    assert_eq!(reversed.balance, Some(expected), "win={} stake={} payout={}", win, stake, payout);

                    let restored = rollback.rollback_game(id, 1).unwrap();
                    assert_eq!(restored.balance, Some(settled), "win={} stake={} payout={}", win, stake, payout);
                    assert_eq!(reversed.balance_delta + restored.balance_delta, 0);
                }
            }
        }
    }

    #[test]
    fn reversal_may_overdraw() {
        let (balances, rollback) = engine();
        let id = play(&balances, true, 100, 800);
        balances.debit(1, 1200).unwrap();
        assert_eq!(rollback.rollback_game(id, 1).unwrap().balance, Some(-800));
    }

    #[test]
    fn unknown_records_are_state_errors() {
        let (_, rollback) = engine();
        assert!(matches!(
            rollback.rollback_game(42, 1).unwrap_err(),
            WagerError::State(StateError::EntryNotFound(42))
        ));
        assert!(matches!(
            rollback.rollback_admin_adjustment(42, 1).unwrap_err(),
            WagerError::State(StateError::AdjustmentNotFound(42))
        ));
    }

    #[test]
    fn records_without_inverse_fail_closed() {
        let (balances, rollback) = engine();
        let receipt = balances
            .commit(StoreBatch::new().append_adjustment(NewAdjustment {
                admin_id: 1,
                action: AdminAction::DeleteUser { account: 5 },
                created_at: Utc::now(),
            }))
            .unwrap();
        let id = receipt.adjustment_ids[0];

        let err = rollback.rollback_admin_adjustment(id, 1).unwrap_err();
        assert!(matches!(err, WagerError::Consistency(ConsistencyError::NoInverse(_))));
        assert!(!balances.store().adjustment(id).unwrap().unwrap().reversed);
    }

    #[test]
    fn reset_restores_default_and_drops_history() {
        let (balances, rollback) = engine();
        play(&balances, true, 100, 800);
        play(&balances, false, 50, 0);

        let result = rollback.reset_account(1, 7).unwrap();
        assert_eq!(result.entries_removed, 2);
        assert_eq!(result.balance, 500);
        assert!(balances.store().entries_for(1).unwrap().is_empty());
        // only the reset's own audit record remains
        let audit = balances.store().adjustments_for(1).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AdminAction::ResetAccount { account: 1 });
    }
}
