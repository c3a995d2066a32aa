//! Engine façade
//!
//! Wires the balance service, the game engines, the bonus service, the
//! rollback engine and the admin service around one ledger store. The chat
//! layer and the HTTP adapter only ever talk to [`Casino`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::admin::AdminService;
use crate::bonus::{BonusReceipt, BonusService};
use crate::clock::{Clock, SystemClock};
use crate::config::{StakehouseConfig, StorageBackend};
use crate::crash::{CrashEngine, CrashEvent, RoundView};
use crate::errors::{StateError, ValidationError, WagerResult};
use crate::games::processor::GameProcessor;
use crate::games::rng::{EntropyProvider, RandomProvider};
use crate::games::types::{GameKind, GameParams, ResolutionView, SessionView, TurnAction};
use crate::ledger::balance::BalanceService;
use crate::ledger::{
    Account, AccountId, AdjustmentId, EntryId, HistoryFilter, HistoryPage, LedgerEntry, LedgerStore, MemoryStore,
    PageRequest, RocksLedgerStore,
};
use crate::metrics::MetricsRegistry;
use crate::rollback::{ResetResult, RollbackEngine, ToggleResult};

/// Both sides of the balance invariant for one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reconciliation {
    pub account: AccountId,
    pub balance: i64,
    pub default_balance: i64,
    pub entries_effect: i64,
    pub adjustments_effect: i64,
    pub open_stakes: i64,
}

impl Reconciliation {
    pub fn expected(&self) -> i64 {
        self.default_balance + self.entries_effect + self.adjustments_effect - self.open_stakes
    }

    pub fn is_consistent(&self) -> bool {
        self.balance == self.expected()
    }
}

pub struct Casino {
    balances: Arc<BalanceService>,
    games: GameProcessor,
    crash: Arc<CrashEngine>,
    rollback: RollbackEngine,
    admin: AdminService,
    bonus: BonusService,
    metrics: MetricsRegistry,
}

impl Casino {
    pub fn new(
        config: &StakehouseConfig,
        store: Arc<dyn LedgerStore>,
        rng: Arc<dyn RandomProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = MetricsRegistry::new();
        let balances = Arc::new(BalanceService::new(store, clock.clone(), &config.economy));
        let games = GameProcessor::new(balances.clone(), rng.clone(), clock.clone(), metrics.clone());
        let bonus = BonusService::new(
            balances.clone(),
            rng.clone(),
            clock.clone(),
            metrics.clone(),
            config.bonus.clone(),
        );
        let crash = Arc::new(CrashEngine::new(
            balances.clone(),
            rng,
            clock.clone(),
            metrics.clone(),
            config.crash.clone(),
            config.api.event_buffer,
        ));
        let rollback = RollbackEngine::new(balances.clone(), clock.clone(), metrics.clone());
        let admin = AdminService::new(balances.clone(), clock);

        Self { balances, games, crash, rollback, admin, bonus, metrics }
    }

    /// Build with the store named by the configuration, OS entropy and the system clock.
    pub fn from_config(config: &StakehouseConfig) -> WagerResult<Self> {
        let store: Arc<dyn LedgerStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::RocksDb => {
                Arc::new(RocksLedgerStore::open(&config.storage.data_directory, &config.storage)?)
            }
        };
        tracing::info!(backend = ?config.storage.backend, "ledger store ready");
        Ok(Self::new(config, store, Arc::new(EntropyProvider), Arc::new(SystemClock)))
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        self.balances.store()
    }

    pub fn start_turn_based_game(
        &self,
        account: AccountId,
        game: GameKind,
        stake: i64,
        params: GameParams,
    ) -> WagerResult<SessionView> {
        self.games.start(account, game, stake, params)
    }

    pub fn play_turn(&self, account: AccountId, game: GameKind, action: TurnAction) -> WagerResult<SessionView> {
        self.games.play_turn(account, game, action)
    }

    pub fn cash_out(&self, account: AccountId, game: GameKind) -> WagerResult<ResolutionView> {
        self.games.cash_out(account, game)
    }

    pub fn forfeit(&self, account: AccountId, game: GameKind) -> WagerResult<ResolutionView> {
        self.games.forfeit(account, game)
    }

    pub fn session(&self, account: AccountId, game: GameKind) -> Option<SessionView> {
        self.games.session(account, game)
    }

    pub fn start_crash_round(&self, account: AccountId, stake: i64, auto_cashout: Option<f64>) -> WagerResult<RoundView> {
        self.crash.start_round(account, stake, auto_cashout)
    }

    pub fn crash_cash_out(&self, account: AccountId) -> WagerResult<ResolutionView> {
        self.crash.cash_out(account)
    }

    pub fn crash_tick(&self, account: AccountId) -> WagerResult<RoundView> {
        self.crash.tick(account)
    }

    pub fn crash_round(&self, account: AccountId) -> Option<RoundView> {
        self.crash.round(account)
    }

    pub fn subscribe_crash(&self) -> broadcast::Receiver<CrashEvent> {
        self.crash.subscribe()
    }

    pub fn claim_hourly(&self, account: AccountId, guess: u32) -> WagerResult<BonusReceipt> {
        self.bonus.claim_hourly(account, guess)
    }

    pub fn spin_wheel(&self, account: AccountId, paid: bool) -> WagerResult<BonusReceipt> {
        self.bonus.spin_wheel(account, paid)
    }

    pub fn redeem_promo(&self, account: AccountId, code: &str) -> WagerResult<BonusReceipt> {
        self.bonus.redeem_promo(account, code)
    }

    pub fn get_balance(&self, account: AccountId) -> WagerResult<i64> {
        self.balances.balance(account)
    }

    pub fn get_account(&self, account: AccountId) -> WagerResult<Account> {
        self.balances.account(account)
    }

    pub fn get_history(&self, account: AccountId, filter: &HistoryFilter, page: PageRequest) -> WagerResult<HistoryPage> {
        self.store().history(account, filter, page)
    }

    pub fn get_entry(&self, entry_id: EntryId) -> WagerResult<LedgerEntry> {
        self.store()
            .ledger_entry(entry_id)?
            .ok_or_else(|| StateError::EntryNotFound(entry_id).into())
    }

    pub fn rollback_game(&self, entry_id: EntryId, admin_id: AccountId) -> WagerResult<ToggleResult> {
        self.rollback.rollback_game(entry_id, admin_id)
    }

    pub fn rollback_admin_adjustment(&self, adjustment_id: AdjustmentId, admin_id: AccountId) -> WagerResult<ToggleResult> {
        self.rollback.rollback_admin_adjustment(adjustment_id, admin_id)
    }

    /// Irreversible: open sessions and rounds are discarded, history is deleted
    /// and the default balance restored. Not a toggle.
    pub fn reset_account(&self, account: AccountId, admin_id: AccountId) -> WagerResult<ResetResult> {
        let sessions = self.games.drop_sessions(account);
        let rounds = self.crash.drop_rounds(account);
        if sessions + rounds > 0 {
            tracing::warn!(account, sessions, rounds, "discarded open rounds before reset");
        }
        self.rollback.reset_account(account, admin_id)
    }

    /// Recompute the balance from the ledger and compare it with the stored one.
    pub fn reconcile(&self, account: AccountId) -> WagerResult<Reconciliation> {
        let balance = self.balances.balance(account)?;
        let entries_effect = self.store().entries_for(account)?.iter().map(LedgerEntry::balance_effect).sum();
        let adjustments_effect = self
            .store()
            .adjustments_for(account)?
            .iter()
            .map(|a| a.balance_effect())
            .sum();
        let open_stakes = self.games.open_stakes(account) + self.crash.open_stake(account);

        Ok(Reconciliation {
            account,
            balance,
            default_balance: self.balances.default_balance(),
            entries_effect,
            adjustments_effect,
            open_stakes,
        })
    }
}

/// Parse a game name from a request path, rejecting the crash game for turn-based routes.
pub fn turn_based_kind(name: &str) -> Result<GameKind, ValidationError> {
    let kind: GameKind = name.parse()?;
    if !kind.is_turn_based() {
        return Err(ValidationError::UnsupportedGame(kind.to_string()));
    }
    Ok(kind)
}
