//! Crash (jetpack) engine
//!
//! The only game whose state moves without player input. Each active round
//! lives behind its own mutex in an injected registry; the background ticker
//! and a player's cash-out both take that mutex, and whichever reaches a
//! terminal phase first writes the round's only ledger entry while still
//! holding it. Every round carries a generation id so a ticker left over from
//! an earlier round exits without touching the new one.

pub mod events;
pub mod round;

pub use events::CrashEvent;
pub use round::{CrashResult, CrashRound, PendingSettlement, RoundPhase, RoundState, RoundView};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::CrashConfig;
use crate::errors::{StateError, ValidationError, WagerError, WagerResult};
use crate::games::odds::{crash_point, next_crash_multiplier};
use crate::games::rng::RandomProvider;
use crate::games::types::{payout_for, GameKind, GameOutcome, ResolutionView};
use crate::ledger::balance::{BalanceService, Settlement};
use crate::ledger::{AccountId, Mutation, NewLedgerEntry};
use crate::metrics::MetricsRegistry;

type RoundHandle = Arc<Mutex<CrashRound>>;

fn lock(handle: &RoundHandle) -> MutexGuard<'_, CrashRound> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct CrashEngine {
    balances: Arc<BalanceService>,
    rng: Arc<dyn RandomProvider>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRegistry,
    config: CrashConfig,
    rounds: DashMap<AccountId, RoundHandle>,
    next_round_id: AtomicU64,
    events: broadcast::Sender<CrashEvent>,
}

impl CrashEngine {
    pub fn new(
        balances: Arc<BalanceService>,
        rng: Arc<dyn RandomProvider>,
        clock: Arc<dyn Clock>,
        metrics: MetricsRegistry,
        config: CrashConfig,
        event_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            balances,
            rng,
            clock,
            metrics,
            config,
            rounds: DashMap::new(),
            next_round_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrashEvent> {
        self.events.subscribe()
    }

    /// Draw the hidden crash point and take off.
    ///
    /// An instant bust is settled here as a loss and the round never flies.
    pub fn start_round(self: &Arc<Self>, account: AccountId, stake: i64, auto_cashout: Option<f64>) -> WagerResult<RoundView> {
        if let Some(threshold) = auto_cashout {
            if !threshold.is_finite() || threshold <= 1.0 {
                return Err(ValidationError::InvalidParameter {
                    field: "auto_cashout".to_string(),
                    reason: format!("{} must be above 1.00", threshold),
                }
                .into());
            }
        }

        let slot = self.rounds.entry(account);
        if let Entry::Occupied(existing) = &slot {
            if lock(existing.get()).phase.holds_stake() {
                return Err(StateError::RoundInProgress(account).into());
            }
        }
        self.balances.check_stake(account, stake)?;

        let point = {
            let mut rng = self.rng.source();
            crash_point(rng.as_mut())
        };
        let round_id = self.next_round_id.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let mut round = CrashRound::new(round_id, account, stake, point, auto_cashout, now);
        MetricsRegistry::incr(&self.metrics.crash_rounds_started);

        if point <= 0.0 {
            let details = round.audit(CrashResult::Crash, 0.0);
            let entry = NewLedgerEntry::loss(account, GameKind::Crash, stake, details.clone(), now);
            let settlement = self.balances.forfeit_stake(account, stake, entry)?;
            let resolution = loss_resolution(&round, settlement, details);
            round.phase = RoundPhase::Crashed { at: now };
            round.resolution = Some(resolution.clone());
            let view = round.view();
            drop(slot.insert(Arc::new(Mutex::new(round))));

            self.metrics.record_resolution(GameOutcome::Loss);
            tracing::info!(account, round_id, stake, "crash round bust on takeoff");
            self.publish(CrashEvent::Resolved {
                account,
                round_id,
                result: CrashResult::Crash.as_str().to_string(),
                resolution,
            });
            return Ok(view);
        }

        self.balances.stake(account, stake)?;
        let view = round.view();
        drop(slot.insert(Arc::new(Mutex::new(round))));

        tracing::info!(account, round_id, stake, ?auto_cashout, "crash round started");
        self.publish(CrashEvent::Update { account, round_id, multiplier: view.multiplier });
        if self.config.background_ticks {
            self.spawn_ticker(account, round_id);
        }
        Ok(view)
    }

    /// Advance the account's round by one tick, or retry a settlement that
    /// failed to commit. Background tickers call this on a timer; tests call
    /// it directly to force an ordering.
    pub fn tick(&self, account: AccountId) -> WagerResult<RoundView> {
        self.advance(account, None)
    }

    pub fn cash_out(&self, account: AccountId) -> WagerResult<ResolutionView> {
        let handle = self.current(account).ok_or(StateError::RoundNotActive(account))?;
        let mut round = lock(&handle);

        match &round.phase {
            RoundPhase::Flying => {}
            RoundPhase::Settling(pending) if pending.result == CrashResult::Crash => {
                return Err(self.grace_reject(&round));
            }
            RoundPhase::Crashed { at } => {
                let since = self.clock.now().signed_duration_since(*at);
                let grace = chrono::Duration::from_std(self.config.grace_period()).unwrap_or(chrono::Duration::zero());
                if since <= grace {
                    return Err(self.grace_reject(&round));
                }
                return Err(StateError::RoundNotActive(account).into());
            }
            RoundPhase::Cancelled => return Err(StateError::RoundNotActive(account).into()),
            RoundPhase::Settling(_) | RoundPhase::CashedOut | RoundPhase::AutoCollected => {
                return Err(StateError::RoundAlreadyResolved.into());
            }
        }

        let multiplier = round.multiplier;
        let payout = payout_for(round.stake, multiplier);
        let details = round.audit(CrashResult::Collect, multiplier);
        let entry = NewLedgerEntry::win(account, GameKind::Crash, round.stake, payout, details.clone(), self.clock.now());
        let batch = self
            .balances
            .settlement_batch(account, payout, entry)
            .push(Mutation::RecordBestMultiplier { account, multiplier });
        let settlement = self.balances.commit_settlement(account, batch)?;

        let resolution = win_resolution(&round, settlement, multiplier, payout, details);
        round.phase = RoundPhase::CashedOut;
        round.resolution = Some(resolution.clone());

        self.metrics.record_resolution(GameOutcome::Win);
        tracing::info!(account, round_id = round.round_id, multiplier, payout, "crash cash-out");
        self.publish(CrashEvent::Resolved {
            account,
            round_id: round.round_id,
            result: CrashResult::Collect.as_str().to_string(),
            resolution: resolution.clone(),
        });
        Ok(resolution)
    }

    pub fn round(&self, account: AccountId) -> Option<RoundView> {
        self.current(account).map(|handle| lock(&handle).view())
    }

    /// Stake held by a round that has not written its entry yet.
    pub fn open_stake(&self, account: AccountId) -> i64 {
        match self.current(account) {
            Some(handle) => {
                let round = lock(&handle);
                if round.phase.holds_stake() {
                    round.stake
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    /// Forget the account's round without writing anything. Its ticker exits on the next wake-up.
    pub fn drop_rounds(&self, account: AccountId) -> usize {
        match self.rounds.remove(&account) {
            Some((_, handle)) => {
                let mut round = lock(&handle);
                if round.phase.holds_stake() {
                    round.phase = RoundPhase::Cancelled;
                }
                1
            }
            None => 0,
        }
    }

    fn current(&self, account: AccountId) -> Option<RoundHandle> {
        self.rounds.get(&account).map(|r| Arc::clone(r.value()))
    }

    fn publish(&self, event: CrashEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn grace_reject(&self, round: &CrashRound) -> WagerError {
        MetricsRegistry::incr(&self.metrics.crash_grace_rejects);
        tracing::warn!(
            account = round.account,
            round_id = round.round_id,
            crash_point = round.crash_point,
            "cash-out arrived just after the crash"
        );
        StateError::JustCrashed { crash_point: round.crash_point }.into()
    }

    fn advance(&self, account: AccountId, expected_round: Option<u64>) -> WagerResult<RoundView> {
        let handle = self.current(account).ok_or(StateError::RoundNotActive(account))?;
        let mut round = lock(&handle);
        if expected_round.map_or(false, |id| id != round.round_id) {
            return Err(StateError::RoundNotActive(account).into());
        }

        let flying = match round.phase {
            RoundPhase::Flying => true,
            RoundPhase::Settling(_) => false,
            _ => return Err(StateError::RoundNotActive(account).into()),
        };

        if flying {
            let next = next_crash_multiplier(round.multiplier);
            MetricsRegistry::incr(&self.metrics.crash_ticks_total);
            let decided_at = self.clock.now();
            let pending = match round.auto_cashout {
                Some(threshold) if next >= threshold => Some(PendingSettlement {
                    result: CrashResult::Auto,
                    multiplier: threshold,
                    payout: payout_for(round.stake, threshold),
                    decided_at,
                }),
                _ if next >= round.crash_point => Some(PendingSettlement {
                    result: CrashResult::Crash,
                    multiplier: next,
                    payout: 0,
                    decided_at,
                }),
                _ => None,
            };

            let Some(pending) = pending else {
                round.multiplier = next;
                tracing::debug!(account, round_id = round.round_id, multiplier = next, "tick");
                self.publish(CrashEvent::Update { account, round_id: round.round_id, multiplier: next });
                return Ok(round.view());
            };
            round.multiplier = pending.multiplier;
            round.phase = RoundPhase::Settling(pending);
        }

        self.settle_pending(&mut round)?;
        Ok(round.view())
    }

    /// Commit a fixed outcome. On failure the round stays `Settling` for the next retry.
    fn settle_pending(&self, round: &mut CrashRound) -> WagerResult<()> {
        let RoundPhase::Settling(pending) = round.phase.clone() else {
            return Ok(());
        };
        let account = round.account;
        let details = round.audit(pending.result, pending.multiplier);
        let now = self.clock.now();
        let entry = if pending.payout > 0 {
            NewLedgerEntry::win(account, GameKind::Crash, round.stake, pending.payout, details.clone(), now)
        } else {
            NewLedgerEntry::loss(account, GameKind::Crash, round.stake, details.clone(), now)
        };

        let settlement = match self.balances.settle(account, pending.payout, entry) {
            Ok(settlement) => settlement,
            Err(e) => {
                MetricsRegistry::incr(&self.metrics.settlement_retries);
                tracing::error!(account, round_id = round.round_id, error = %e, "crash settlement failed, will retry");
                return Err(e);
            }
        };

        let (resolution, outcome) = match pending.result {
            CrashResult::Crash => {
                round.phase = RoundPhase::Crashed { at: self.clock.now() };
                (loss_resolution(round, settlement, details), GameOutcome::Loss)
            }
            CrashResult::Auto | CrashResult::Collect => {
                round.phase = RoundPhase::AutoCollected;
                let resolution = win_resolution(round, settlement, pending.multiplier, pending.payout, details);
                (resolution, GameOutcome::Win)
            }
        };
        round.resolution = Some(resolution.clone());

        self.metrics.record_resolution(outcome);
        tracing::info!(
            account,
            round_id = round.round_id,
            result = pending.result.as_str(),
            multiplier = pending.multiplier,
            crash_point = round.crash_point,
            "crash round resolved"
        );
        self.publish(CrashEvent::Resolved {
            account,
            round_id: round.round_id,
            result: pending.result.as_str().to_string(),
            resolution,
        });
        Ok(())
    }

    fn spawn_ticker(self: &Arc<Self>, account: AccountId, round_id: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(account, round_id, "no async runtime, crash round will only advance on manual ticks");
            return;
        };
        let engine = Arc::clone(self);
        runtime.spawn(async move { engine.run_ticker(account, round_id).await });
    }

    async fn run_ticker(&self, account: AccountId, round_id: u64) {
        let mut delay = self.config.tick_interval();
        loop {
            tokio::time::sleep(delay).await;
            match self.advance(account, Some(round_id)) {
                Ok(view) if view.is_flying() => delay = self.config.tick_interval(),
                Ok(_) => break,
                Err(e) if e.is_retryable() => delay = self.config.settle_retry(),
                Err(_) => break,
            }
        }
        tracing::debug!(account, round_id, "ticker stopped");
    }
}

fn loss_resolution(round: &CrashRound, settlement: Settlement, details: serde_json::Value) -> ResolutionView {
    ResolutionView {
        entry_id: settlement.entry_id,
        account: round.account,
        game: GameKind::Crash,
        stake: round.stake,
        outcome: GameOutcome::Loss,
        multiplier: 0.0,
        payout: 0,
        balance: settlement.balance,
        details,
    }
}

fn win_resolution(
    round: &CrashRound,
    settlement: Settlement,
    multiplier: f64,
    payout: i64,
    details: serde_json::Value,
) -> ResolutionView {
    ResolutionView {
        entry_id: settlement.entry_id,
        account: round.account,
        game: GameKind::Crash,
        stake: round.stake,
        outcome: GameOutcome::Win,
        multiplier,
        payout,
        balance: settlement.balance,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{EconomyConfig, StakehouseConfig};
    use crate::games::rng::ScriptedRandom;
    use crate::ledger::{LedgerStore, MemoryStore};

    struct Harness {
        store: Arc<MemoryStore>,
        balances: Arc<BalanceService>,
        clock: ManualClock,
        rng: ScriptedRandom,
        engine: Arc<CrashEngine>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let balances = Arc::new(BalanceService::new(store.clone(), Arc::new(clock.clone()), &EconomyConfig::default()));
        let rng = ScriptedRandom::default();
        let config = StakehouseConfig::for_testing().crash;
        let engine = Arc::new(CrashEngine::new(
            balances.clone(),
            Arc::new(rng.clone()),
            Arc::new(clock.clone()),
            MetricsRegistry::new(),
            config,
            16,
        ));
        Harness { store, balances, clock, rng, engine }
    }

    #[test]
    fn half_draw_crashes_on_fourth_tick() {
        let h = harness();
        h.rng.push([0.5]);
        let view = h.engine.start_round(1, 100, None).unwrap();
        assert!(view.is_flying());
        assert_eq!(h.balances.balance(1).unwrap(), 400);

        let seen: Vec<f64> = (0..3).map(|_| h.engine.tick(1).unwrap().multiplier).collect();
        assert_eq!(seen, vec![1.18, 1.40, 1.67]);

        let last = h.engine.tick(1).unwrap();
        assert_eq!(last.state, RoundState::Crashed);
        assert_eq!(last.multiplier, 2.00);
        let resolution = last.resolution.unwrap();
        assert_eq!(resolution.outcome, GameOutcome::Loss);
        assert_eq!(resolution.details["crash_point"], 1.9);
        assert_eq!(h.balances.balance(1).unwrap(), 400);
    }

    #[test]
    fn cash_out_before_crash_wins_and_blocks_the_tick() {
        let h = harness();
        h.rng.push([0.5]);
        h.engine.start_round(1, 100, None).unwrap();
        h.engine.tick(1).unwrap();
        let resolution = h.engine.cash_out(1).unwrap();
        assert_eq!(resolution.payout, 118);
        assert_eq!(resolution.balance, 518);

        assert!(matches!(h.engine.tick(1).unwrap_err(), WagerError::State(StateError::RoundNotActive(1))));
        assert!(matches!(h.engine.cash_out(1).unwrap_err(), WagerError::State(StateError::RoundAlreadyResolved)));
        assert_eq!(h.store.entries_for(1).unwrap().len(), 1);
        assert_eq!(h.store.account(1).unwrap().unwrap().best_crash_multiplier, 1.18);
    }

    #[test]
    fn cash_out_inside_grace_is_explained() {
        let h = harness();
        h.rng.push([0.5]);
        h.engine.start_round(1, 100, None).unwrap();
        for _ in 0..4 {
            h.engine.tick(1).unwrap();
        }
        let err = h.engine.cash_out(1).unwrap_err();
        assert!(matches!(err, WagerError::State(StateError::JustCrashed { crash_point }) if crash_point == 1.9));

        h.clock.advance(chrono::Duration::milliseconds(51));
        let err = h.engine.cash_out(1).unwrap_err();
        assert!(matches!(err, WagerError::State(StateError::RoundNotActive(1))));
        assert_eq!(h.store.entries_for(1).unwrap().len(), 1);
        assert_eq!(h.balances.balance(1).unwrap(), 400);
    }

    #[test]
    fn instant_bust_never_flies() {
        let h = harness();
        h.rng.push([0.01]);
        let view = h.engine.start_round(1, 100, None).unwrap();
        assert_eq!(view.state, RoundState::Crashed);
        assert_eq!(h.balances.balance(1).unwrap(), 400);
        let entries = h.store.entries_for(1).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].win);
        assert!(h.engine.tick(1).is_err());
    }

    #[test]
    fn auto_cashout_beats_the_crash_check() {
        let h = harness();
        // crash point 1.90, threshold reached on the second tick
        h.rng.push([0.5]);
        h.engine.start_round(1, 100, Some(1.3)).unwrap();
        h.engine.tick(1).unwrap();
        let view = h.engine.tick(1).unwrap();
        assert_eq!(view.state, RoundState::AutoCollected);
        assert_eq!(view.resolution.unwrap().payout, 130);
        assert_eq!(h.balances.balance(1).unwrap(), 530);
    }

    #[test]
    fn auto_threshold_must_exceed_one() {
        let h = harness();
        let err = h.engine.start_round(1, 100, Some(1.0)).unwrap_err();
        assert!(matches!(err, WagerError::Validation(_)));
        assert_eq!(h.balances.balance(1).unwrap(), 500);
    }

    #[test]
    fn one_round_in_flight_per_account() {
        let h = harness();
        h.rng.push([0.5, 0.5]);
        h.engine.start_round(1, 100, None).unwrap();
        let err = h.engine.start_round(1, 100, None).unwrap_err();
        assert!(matches!(err, WagerError::State(StateError::RoundInProgress(1))));
        assert_eq!(h.engine.open_stake(1), 100);
    }

    #[test]
    fn failed_settlement_is_retried_not_lost() {
        let h = harness();
        h.rng.push([0.5]);
        h.engine.start_round(1, 100, None).unwrap();
        for _ in 0..3 {
            h.engine.tick(1).unwrap();
        }

        h.store.set_unavailable(true);
        assert!(h.engine.tick(1).unwrap_err().is_retryable());
        assert_eq!(h.engine.round(1).unwrap().state, RoundState::Settling);
        assert!(matches!(
            h.engine.cash_out(1).unwrap_err(),
            WagerError::State(StateError::JustCrashed { .. })
        ));

        h.store.set_unavailable(false);
        assert_eq!(h.engine.tick(1).unwrap().state, RoundState::Crashed);
        assert_eq!(h.store.entries_for(1).unwrap().len(), 1);
    }

    #[test]
    fn dropped_round_writes_nothing() {
        let h = harness();
        h.rng.push([0.5]);
        h.engine.start_round(1, 100, None).unwrap();
        assert_eq!(h.engine.drop_rounds(1), 1);
        assert!(h.engine.tick(1).is_err());
        assert!(h.store.entries_for(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn background_ticker_resolves_the_round() {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::SystemClock);
        let balances = Arc::new(BalanceService::new(store.clone(), clock.clone(), &EconomyConfig::default()));
        let mut config = StakehouseConfig::for_testing().crash;
        config.tick_interval_ms = 5;
        config.background_ticks = true;
        let engine = Arc::new(CrashEngine::new(
            balances,
            Arc::new(ScriptedRandom::new([0.5])),
            clock,
            MetricsRegistry::new(),
            config,
            16,
        ));
        let mut events = engine.subscribe();

        engine.start_round(1, 100, None).unwrap();
        let resolved = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(CrashEvent::Resolved { result, .. }) => break result,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream closed: {}", e),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(resolved, "crash");
        assert_eq!(store.entries_for(1).unwrap().len(), 1);
    }
}
