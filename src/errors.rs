//! Error types for the wagering engine
//!
//! Every failure falls into one of the categories below. Validation and state
//! errors are raised before anything is mutated; consistency errors fail
//! closed; storage errors mean the durable store could not be reached.

use thiserror::Error;

use crate::ledger::{AccountId, EntryId};

/// Root error type for all engine operations
#[derive(Debug, Error)]
pub enum WagerError {
    /// Bad input rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Action not allowed in the current session or round state
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Record has no valid inverse or the ledger would be corrupted
    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    /// Durable store unreachable or returned unreadable data
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("stake must be positive, got {0}")]
    NonPositiveStake(i64),
    #[error("stake {stake} exceeds balance {balance}")]
    InsufficientBalance { stake: i64, balance: i64 },
    #[error("stake {stake} exceeds the limit of {max}")]
    StakeAboveLimit { stake: i64, max: i64 },
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },
    #[error("action does not apply to {0}")]
    ActionMismatch(String),
    #[error("{0} is not a turn-based game")]
    UnsupportedGame(String),
    #[error("account {0} is blocked")]
    AccountBlocked(AccountId),
    #[error("invalid page request: {0}")]
    InvalidPage(String),
}

/// Session and round state errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("no active {game} session for account {account}")]
    NoActiveSession { account: AccountId, game: String },
    #[error("a {game} session is already in progress for account {account}")]
    SessionInProgress { account: AccountId, game: String },
    #[error("nothing to collect yet")]
    NothingToCollect,
    #[error("cell {0} is already open")]
    CellAlreadyOpen(u8),
    #[error("a crash round is already in flight for account {0}")]
    RoundInProgress(AccountId),
    #[error("no active crash round for account {0}")]
    RoundNotActive(AccountId),
    #[error("round crashed at {crash_point:.2}x before the cash-out arrived")]
    JustCrashed { crash_point: f64 },
    #[error("round already resolved")]
    RoundAlreadyResolved,
    #[error("ledger entry {0} not found")]
    EntryNotFound(EntryId),
    #[error("admin adjustment {0} not found")]
    AdjustmentNotFound(u64),
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("promo {0} not found")]
    PromoNotFound(String),
    #[error("promo {0} already exists")]
    PromoExists(String),
    #[error("promo {0} has no redemptions left")]
    PromoExhausted(String),
    #[error("promo {0} already redeemed by this account")]
    PromoAlreadyRedeemed(String),
    #[error("bonus available again in {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },
}

/// Ledger consistency errors; these always fail closed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsistencyError {
    #[error("action {0} cannot be rolled back")]
    NoInverse(String),
    #[error("debit of {amount} would overdraw account {account} (balance {balance})")]
    Overdraft { account: AccountId, amount: i64, balance: i64 },
    #[error("adjusting account {account} by {delta} overflows its balance")]
    BalanceOverflow { account: AccountId, delta: i64 },
    #[error("balance of account {account} moved from {expected} to {found} during the update")]
    BalanceChanged { account: AccountId, expected: i64, found: i64 },
    #[error("record {0} was toggled concurrently")]
    ConcurrentToggle(u64),
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Storage system errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration and validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl WagerError {
    /// Short text safe to show to a player or admin; never includes internal state.
    pub fn user_message(&self) -> String {
        match self {
            WagerError::Validation(e) => match e {
                ValidationError::NonPositiveStake(_) => "Stake must be greater than zero".into(),
                ValidationError::InsufficientBalance { .. } => "Not enough coins".into(),
                ValidationError::StakeAboveLimit { max, .. } => format!("Maximum stake is {}", max),
                ValidationError::AccountBlocked(_) => "Your account is blocked".into(),
                other => other.to_string(),
            },
            WagerError::State(e) => match e {
                StateError::NoActiveSession { .. } | StateError::RoundNotActive(_) => {
                    "This round is already over".into()
                }
                StateError::JustCrashed { crash_point } => {
                    format!("Too late! It crashed at {:.2}x", crash_point)
                }
                StateError::RoundAlreadyResolved => "This round is already over".into(),
                StateError::CooldownActive { remaining_secs } => {
                    let (hours, minutes) = (remaining_secs / 3600, (remaining_secs % 3600) / 60);
                    if hours > 0 {
                        format!("Come back in {}h {}m", hours, minutes)
                    } else {
                        format!("Come back in {}m {}s", minutes, remaining_secs % 60)
                    }
                }
                StateError::PromoNotFound(_) => "Promo code not found".into(),
                StateError::PromoExhausted(_) => "This promo code has run out".into(),
                StateError::PromoAlreadyRedeemed(_) => "You have already used this promo code".into(),
                other => other.to_string(),
            },
            WagerError::Consistency(ConsistencyError::NoInverse(action)) => {
                format!("Action '{}' cannot be rolled back", action)
            }
            WagerError::Consistency(_) => "Operation refused to keep balances consistent".into(),
            WagerError::Storage(_) => "Service temporarily unavailable, try again".into(),
            WagerError::Configuration(_) => "Service misconfigured".into(),
        }
    }

    /// Only store outages are worth retrying; every other error is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WagerError::Storage(StorageError::Unavailable(_))
                | WagerError::Storage(StorageError::WriteFailed(_))
                | WagerError::Storage(StorageError::ReadFailed(_))
        )
    }
}

// External error conversions
impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<rocksdb::Error> for WagerError {
    fn from(e: rocksdb::Error) -> Self {
        WagerError::Storage(e.into())
    }
}

impl From<std::io::Error> for WagerError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                WagerError::Storage(StorageError::DatabaseOpenFailed(e.to_string()))
            }
            _ => WagerError::Storage(StorageError::ReadFailed(e.to_string())),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptedData(e.to_string())
    }
}

impl From<serde_json::Error> for WagerError {
    fn from(e: serde_json::Error) -> Self {
        WagerError::Storage(e.into())
    }
}

// Convenience type alias for Results
pub type WagerResult<T> = Result<T, WagerError>;
