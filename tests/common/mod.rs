//! Shared fixtures for the integration tests

#![allow(dead_code)]

use stakehouse::{
    clock::{Clock, ManualClock},
    games::rng::ScriptedRandom,
    ledger::{LedgerStore, MemoryStore},
    Casino, StakehouseConfig,
};
use std::sync::Arc;

pub struct Harness {
    pub casino: Casino,
    pub store: Arc<MemoryStore>,
    pub rng: ScriptedRandom,
    pub clock: ManualClock,
}

/// Memory store, scripted draws (all `0.0` unless pushed) and a frozen clock.
pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let rng = ScriptedRandom::default();
    let clock = ManualClock::default();
    let casino = Casino::new(
        &StakehouseConfig::for_testing(),
        store.clone() as Arc<dyn LedgerStore>,
        Arc::new(rng.clone()),
        Arc::new(clock.clone()) as Arc<dyn Clock>,
    );
    Harness { casino, store, rng, clock }
}

impl Harness {
    pub fn balance(&self, account: i64) -> i64 {
        self.casino.get_balance(account).unwrap()
    }

    pub fn entry_count(&self, account: i64) -> usize {
        self.store.entries_for(account).unwrap().len()
    }

    pub fn assert_reconciled(&self, account: i64) {
        let rec = self.casino.reconcile(account).unwrap();
        assert!(rec.is_consistent(), "ledger and balance disagree: {:?}", rec);
    }
}
