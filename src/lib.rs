//! Stakehouse - wagering engine with a reversible ledger
//!
//! Turn-based games (coin flip, miner, tower, slots, candles) and a continuous
//! crash game settle into one durable ledger, next to the hourly bonus, the
//! wheel of fortune and promo redemptions. Every settled round and every
//! admin action can be toggled back, and the balance can always be rebuilt
//! from the ledger.

pub mod admin;
pub mod api;
pub mod bonus;
pub mod casino;
pub mod clock;
pub mod config;
pub mod crash;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod rollback;
pub mod storage;

pub use casino::{Casino, Reconciliation};
pub use config::{ConfigLoader, StakehouseConfig};
pub use errors::{WagerError, WagerResult};
pub use games::types::{GameKind, GameParams, ResolutionView, SessionView, TurnAction};
