//! Durable ledger records stored in RocksDB.
//!
//! Values are JSON. Per-account indexes use an inverted id so a forward
//! prefix scan yields newest first.

use rocksdb::WriteBatch;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

use super::store::{stage, Staged, StagingSource};
use super::{
    Account, AccountId, AdjustmentId, AdminAdjustment, CommitReceipt, EntryId, LedgerEntry, LedgerStore, Promo,
    StoreBatch,
};
use crate::config::StorageConfig;
use crate::errors::{StorageError, WagerResult};
use crate::storage::OptimizedStorage;

const ACCOUNT_PREFIX: &[u8] = b"account:";
const ENTRY_PREFIX: &[u8] = b"ledger:entry:";
const ENTRY_BY_ACCOUNT_PREFIX: &[u8] = b"ledger:acct:";
const ADJUSTMENT_PREFIX: &[u8] = b"admin:entry:";
const ADJUSTMENT_BY_ACCOUNT_PREFIX: &[u8] = b"admin:acct:";
const PROMO_PREFIX: &[u8] = b"promo:";
const NEXT_ENTRY_ID_KEY: &[u8] = b"meta:next_entry_id";
const NEXT_ADJUSTMENT_ID_KEY: &[u8] = b"meta:next_adjustment_id";

fn keyed(prefix: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + parts.iter().map(|p| p.len()).sum::<usize>());
    key.extend_from_slice(prefix);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

fn account_key(id: AccountId) -> Vec<u8> {
    keyed(ACCOUNT_PREFIX, &[&id.to_be_bytes()])
}

fn entry_key(id: EntryId) -> Vec<u8> {
    keyed(ENTRY_PREFIX, &[&id.to_be_bytes()])
}

fn account_scope(prefix: &[u8], account: AccountId) -> Vec<u8> {
    keyed(prefix, &[&account.to_be_bytes()])
}

fn account_index_key(prefix: &[u8], account: AccountId, id: u64) -> Vec<u8> {
    // Key layout: prefix | account(be) | inv_id(be)
    let inv_id = u64::MAX - id;
    keyed(prefix, &[&account.to_be_bytes(), &inv_id.to_be_bytes()])
}

fn adjustment_key(id: AdjustmentId) -> Vec<u8> {
    keyed(ADJUSTMENT_PREFIX, &[&id.to_be_bytes()])
}

fn promo_key(code: &str) -> Vec<u8> {
    keyed(PROMO_PREFIX, &[code.as_bytes()])
}

fn id_from_index_key(key: &[u8]) -> Option<u64> {
    let tail: [u8; 8] = key.get(key.len().checked_sub(8)?..)?.try_into().ok()?;
    Some(u64::MAX - u64::from_be_bytes(tail))
}

fn encode<T: Serialize>(what: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)))
}

pub struct RocksLedgerStore {
    storage: OptimizedStorage,
    /// Serializes commits so staging reads and the batch write see the same state
    write_lock: Mutex<()>,
}

impl RocksLedgerStore {
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> WagerResult<Self> {
        let storage = OptimizedStorage::with_config(path, config)?;
        tracing::info!(path = %config.data_directory, "opened ledger database");
        Ok(Self::new(storage))
    }

    pub fn new(storage: OptimizedStorage) -> Self {
        Self { storage, write_lock: Mutex::new(()) }
    }

    fn load<T: DeserializeOwned>(&self, what: &str, key: &[u8]) -> WagerResult<Option<T>> {
        match self.storage.get(key)? {
            Some(bytes) => Ok(Some(decode(what, &bytes)?)),
            None => Ok(None),
        }
    }

    fn load_counter(&self, key: &[u8]) -> WagerResult<u64> {
        match self.storage.get(key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::CorruptedData("id counter is not 8 bytes".to_string()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(1),
        }
    }

    fn indexed_ids(&self, prefix: &[u8], account: AccountId) -> WagerResult<Vec<u64>> {
        let rows = self.storage.scan_prefix(&account_scope(prefix, account))?;
        Ok(rows.iter().filter_map(|(key, _)| id_from_index_key(key)).collect())
    }
}

impl StagingSource for RocksLedgerStore {
    fn load_account(&self, id: AccountId) -> WagerResult<Option<Account>> {
        self.load("account", &account_key(id))
    }

    fn load_entry(&self, id: EntryId) -> WagerResult<Option<LedgerEntry>> {
        self.load("ledger entry", &entry_key(id))
    }

    fn load_adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>> {
        self.load("admin adjustment", &adjustment_key(id))
    }

    fn load_promo(&self, code: &str) -> WagerResult<Option<Promo>> {
        self.load("promo", &promo_key(code))
    }

    fn entry_ids_for(&self, account: AccountId) -> WagerResult<Vec<EntryId>> {
        self.indexed_ids(ENTRY_BY_ACCOUNT_PREFIX, account)
    }

    fn adjustment_ids_for(&self, account: AccountId) -> WagerResult<Vec<AdjustmentId>> {
        self.indexed_ids(ADJUSTMENT_BY_ACCOUNT_PREFIX, account)
    }

    fn next_ids(&self) -> WagerResult<(EntryId, AdjustmentId)> {
        Ok((self.load_counter(NEXT_ENTRY_ID_KEY)?, self.load_counter(NEXT_ADJUSTMENT_ID_KEY)?))
    }
}

impl LedgerStore for RocksLedgerStore {
    fn account(&self, id: AccountId) -> WagerResult<Option<Account>> {
        self.load_account(id)
    }

    fn ledger_entry(&self, id: EntryId) -> WagerResult<Option<LedgerEntry>> {
        self.load_entry(id)
    }

    fn adjustment(&self, id: AdjustmentId) -> WagerResult<Option<AdminAdjustment>> {
        self.load_adjustment(id)
    }

    fn promo(&self, code: &str) -> WagerResult<Option<Promo>> {
        self.load_promo(code)
    }

    fn entries_for(&self, account: AccountId) -> WagerResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for id in self.entry_ids_for(account)? {
            match self.load_entry(id)? {
                Some(entry) => entries.push(entry),
                None => tracing::warn!(entry_id = id, account, "dangling ledger index key"),
            }
        }
        Ok(entries)
    }

    fn all_adjustments(&self) -> WagerResult<Vec<AdminAdjustment>> {
        let rows = self.storage.scan_prefix(ADJUSTMENT_PREFIX)?;
        let mut out = rows
            .iter()
            .map(|(_, value)| decode::<AdminAdjustment>("admin adjustment", value))
            .collect::<Result<Vec<_>, _>>()?;
        out.reverse();
        Ok(out)
    }

    fn adjustments_for(&self, account: AccountId) -> WagerResult<Vec<AdminAdjustment>> {
        let mut out = Vec::new();
        for id in self.adjustment_ids_for(account)? {
            if let Some(adjustment) = self.load_adjustment(id)? {
                out.push(adjustment);
            }
        }
        Ok(out)
    }

    fn commit(&self, batch: StoreBatch) -> WagerResult<CommitReceipt> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let staged = stage(self, batch)?;

        let mut wb = WriteBatch::default();
        for (id, account) in &staged.accounts {
            wb.put(account_key(*id), encode("account", account)?);
        }
        for (id, change) in &staged.entries {
            match change {
                Staged::Put(entry) => {
                    wb.put(entry_key(*id), encode("ledger entry", entry)?);
                    wb.put(account_index_key(ENTRY_BY_ACCOUNT_PREFIX, entry.account, *id), b"");
                }
                Staged::Delete(entry) => {
                    wb.delete(entry_key(*id));
                    wb.delete(account_index_key(ENTRY_BY_ACCOUNT_PREFIX, entry.account, *id));
                }
            }
        }
        for (id, change) in &staged.adjustments {
            match change {
                Staged::Put(adjustment) => {
                    wb.put(adjustment_key(*id), encode("admin adjustment", adjustment)?);
                    if let Some(account) = adjustment.action.target_account() {
                        wb.put(account_index_key(ADJUSTMENT_BY_ACCOUNT_PREFIX, account, *id), b"");
                    }
                }
                Staged::Delete(adjustment) => {
                    wb.delete(adjustment_key(*id));
                    if let Some(account) = adjustment.action.target_account() {
                        wb.delete(account_index_key(ADJUSTMENT_BY_ACCOUNT_PREFIX, account, *id));
                    }
                }
            }
        }
        for (code, promo) in &staged.promos {
            wb.put(promo_key(code), encode("promo", promo)?);
        }
        wb.put(NEXT_ENTRY_ID_KEY, staged.next_entry_id.to_be_bytes());
        wb.put(NEXT_ADJUSTMENT_ID_KEY, staged.next_adjustment_id.to_be_bytes());

        self.storage.write(wb)?;
        tracing::debug!(
            entries = staged.receipt.entry_ids.len(),
            adjustments = staged.receipt.adjustment_ids.len(),
            "committed ledger batch"
        );
        Ok(staged.receipt)
    }
}
