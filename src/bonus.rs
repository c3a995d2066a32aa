//! Bonus credits outside the wagered games
//!
//! The hourly guess, the wheel of fortune and promo redemption each settle
//! into one ledger entry, so a bonus is rolled back exactly like a round.
//! Cooldowns and promo limits are checked again inside the commit; the
//! checks made here only avoid spending a random draw on a claim that
//! cannot succeed.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::BonusConfig;
use crate::errors::{StateError, ValidationError, WagerResult};
use crate::games::odds;
use crate::games::rng::RandomProvider;
use crate::games::types::GameKind;
use crate::ledger::balance::BalanceService;
use crate::ledger::{AccountId, Cooldown, EntryId, Mutation, NewLedgerEntry, StoreBatch};
use crate::metrics::MetricsRegistry;

/// What a bonus claim paid and the ledger entry that records it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BonusReceipt {
    pub entry_id: EntryId,
    pub account: AccountId,
    pub kind: GameKind,
    /// Coins spent to take part; only paid wheel spins cost anything
    pub cost: i64,
    pub reward: i64,
    pub balance: i64,
    pub details: serde_json::Value,
}

impl BonusReceipt {
    pub fn won(&self) -> bool {
        self.reward > 0
    }
}

pub struct BonusService {
    balances: Arc<BalanceService>,
    rng: Arc<dyn RandomProvider>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRegistry,
    config: BonusConfig,
}

impl BonusService {
    pub fn new(
        balances: Arc<BalanceService>,
        rng: Arc<dyn RandomProvider>,
        clock: Arc<dyn Clock>,
        metrics: MetricsRegistry,
        config: BonusConfig,
    ) -> Self {
        Self { balances, rng, clock, metrics, config }
    }

    /// Guess a number in 1..=3. A hit pays the hourly reward; the claim is used up either way.
    pub fn claim_hourly(&self, account: AccountId, guess: u32) -> WagerResult<BonusReceipt> {
        if !(1..=odds::HOURLY_CHOICES).contains(&guess) {
            return Err(ValidationError::InvalidParameter {
                field: "guess".to_string(),
                reason: format!("must be between 1 and {}", odds::HOURLY_CHOICES),
            }
            .into());
        }
        let now = self.clock.now();
        let wait = Some(self.config.hourly_cooldown());
        let mut acct = self.balances.check_active(account)?;
        acct.claim(Cooldown::Hourly, now, wait)?;

        let actual = {
            let mut rng = self.rng.source();
            odds::hourly_number(rng.as_mut())
        };
        let reward = if guess == actual { self.config.hourly_reward } else { 0 };
        let details = json!({
            "guess": guess,
            "actual": actual,
            "result": if reward > 0 { "hit" } else { "miss" },
        });
        let batch = self
            .balances
            .opening_batch(account)
            .push(Mutation::ClaimBonus { account, cooldown: Cooldown::Hourly, at: now, wait });
        self.settle(account, GameKind::Hourly, 0, reward, details, batch)
    }

    /// Free spins wait out the wheel cooldown. Paid spins skip it but still restart it.
    pub fn spin_wheel(&self, account: AccountId, paid: bool) -> WagerResult<BonusReceipt> {
        let now = self.clock.now();
        let (cost, wait) = if paid {
            (self.config.wheel_paid_cost, None)
        } else {
            (0, Some(self.config.wheel_cooldown()))
        };
        let mut acct = self.balances.check_active(account)?;
        if acct.balance < cost {
            return Err(ValidationError::InsufficientBalance { stake: cost, balance: acct.balance }.into());
        }
        acct.claim(Cooldown::Wheel, now, wait)?;

        let sector = {
            let mut rng = self.rng.source();
            odds::wheel_sector(rng.as_mut())
        };
        let details = json!({ "sector": sector.label, "reward": sector.reward, "paid": paid });
        let batch = self
            .balances
            .opening_batch(account)
            .push(Mutation::ClaimBonus { account, cooldown: Cooldown::Wheel, at: now, wait });
        let batch = if paid { self.balances.with_debit(batch, account, cost) } else { batch };
        self.settle(account, GameKind::Wheel, cost, sector.reward, details, batch)
    }

    /// Credit a promo code's reward, subject to its global and per-account limits.
    pub fn redeem_promo(&self, account: AccountId, code: &str) -> WagerResult<BonusReceipt> {
        let code = code.trim();
        self.balances.check_active(account)?;
        let mut promo = self
            .balances
            .store()
            .promo(code)?
            .ok_or_else(|| StateError::PromoNotFound(code.to_string()))?;
        promo.redeem(account, true)?;

        let details = json!({ "code": promo.code, "reward": promo.reward });
        let batch = self.balances.opening_batch(account).push(Mutation::RedeemPromo {
            code: promo.code.clone(),
            account,
            enforce: true,
        });
        self.settle(account, GameKind::Promo, 0, promo.reward, details, batch)
    }

    fn settle(
        &self,
        account: AccountId,
        kind: GameKind,
        cost: i64,
        reward: i64,
        details: serde_json::Value,
        batch: StoreBatch,
    ) -> WagerResult<BonusReceipt> {
        let now = self.clock.now();
        let (batch, entry) = if reward > 0 {
            let entry = NewLedgerEntry::win(account, kind, cost, reward, details.clone(), now);
            (self.balances.with_credit(batch, account, reward), entry)
        } else {
            (batch, NewLedgerEntry::loss(account, kind, cost, details.clone(), now))
        };
        let settlement = self.balances.commit_settlement(account, batch.append_entry(entry))?;

        MetricsRegistry::incr(&self.metrics.bonuses_claimed);
        tracing::info!(account, kind = %kind, entry_id = settlement.entry_id, cost, reward, "bonus claimed");
        Ok(BonusReceipt {
            entry_id: settlement.entry_id,
            account,
            kind,
            cost,
            reward,
            balance: settlement.balance,
            details,
        })
    }
}
