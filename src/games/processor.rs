//! Turn-based game engine
//!
//! Owns the in-memory session registry and drives each session through
//! Idle → Staked → Active → Resolved. A board is only written back to the
//! registry after the turn's ledger commit succeeded, so a store failure
//! leaves the session exactly as it was before the call.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::rng::RandomProvider;
use super::types::{
    payout_for, GameKind, GameOutcome, GameParams, ResolutionView, SessionStatus, SessionView, TurnAction,
};
use super::{GameBoard, RoundEnd, TurnStep};
use crate::clock::Clock;
use crate::errors::{StateError, ValidationError, WagerResult};
use crate::ledger::balance::BalanceService;
use crate::ledger::{AccountId, NewLedgerEntry};
use crate::metrics::MetricsRegistry;

/// Live state of one account's round in one game
#[derive(Debug, Clone)]
pub struct GameSession {
    pub account: AccountId,
    pub stake: i64,
    pub board: GameBoard,
    pub started_at: DateTime<Utc>,
}

impl GameSession {
    pub fn kind(&self) -> GameKind {
        self.board.kind()
    }

    pub fn view(&self) -> SessionView {
        let multiplier = self.board.multiplier();
        SessionView {
            account: self.account,
            game: self.kind(),
            stake: self.stake,
            multiplier,
            potential_payout: payout_for(self.stake, multiplier),
            board: self.board.public_view(),
            status: SessionStatus::Active,
        }
    }
}

type SessionKey = (AccountId, GameKind);

pub struct GameProcessor {
    balances: Arc<BalanceService>,
    rng: Arc<dyn RandomProvider>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRegistry,
    sessions: DashMap<SessionKey, GameSession>,
}

impl GameProcessor {
    pub fn new(
        balances: Arc<BalanceService>,
        rng: Arc<dyn RandomProvider>,
        clock: Arc<dyn Clock>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            balances,
            rng,
            clock,
            metrics,
            sessions: DashMap::new(),
        }
    }

    /// Debit the stake and deal a fresh board.
    ///
    /// Slots resolves inside this call; every other game returns an active session.
    pub fn start(&self, account: AccountId, kind: GameKind, stake: i64, params: GameParams) -> WagerResult<SessionView> {
        if !kind.is_turn_based() {
            return Err(ValidationError::UnsupportedGame(kind.to_string()).into());
        }
        if params.kind() != kind {
            return Err(ValidationError::ActionMismatch(kind.to_string()).into());
        }
        GameBoard::check(&params)?;

        let vacant = match self.sessions.entry((account, kind)) {
            Entry::Occupied(_) => {
                return Err(StateError::SessionInProgress { account, game: kind.to_string() }.into());
            }
            Entry::Vacant(vacant) => vacant,
        };

        self.balances.stake(account, stake)?;
        let mut rng = self.rng.source();
        let board = match GameBoard::deal(&params, rng.as_mut()) {
            Ok(board) => board,
            Err(e) => {
                self.balances.credit(account, stake)?;
                return Err(e);
            }
        };

        let session = GameSession { account, stake, board, started_at: self.clock.now() };
        let slot = vacant.insert(session);
        MetricsRegistry::incr(&self.metrics.sessions_started);
        tracing::info!(account, game = %kind, stake, "session started");

        if kind == GameKind::Slots {
            // release the shard lock before re-entering through play_turn
            drop(slot);
            return self.play_turn(account, kind, TurnAction::Spin);
        }
        Ok(slot.view())
    }

    pub fn play_turn(&self, account: AccountId, kind: GameKind, action: TurnAction) -> WagerResult<SessionView> {
        let mut occupied = match self.sessions.entry((account, kind)) {
            Entry::Occupied(o) => o,
            Entry::Vacant(_) => return Err(no_session(account, kind)),
        };

        let session = occupied.get_mut();
        let mut board = session.board.clone();
        let mut rng = self.rng.source();
        let step = board.play(&action, rng.as_mut())?;

        let (end, payout) = match step {
            TurnStep::Continue => {
                session.board = board;
                return Ok(session.view());
            }
            TurnStep::Bust => (RoundEnd::Bust, 0),
            TurnStep::Complete => (RoundEnd::Complete, payout_for(session.stake, board.multiplier())),
        };

        match self.settle(session, &board, end, payout) {
            Ok(resolution) => {
                let view = resolved_view(session, resolution);
                occupied.remove();
                Ok(view)
            }
            Err(e) => {
                // a spin outcome is fixed once drawn; keep it for the retry
                if kind == GameKind::Slots {
                    session.board = board;
                }
                Err(e)
            }
        }
    }

    pub fn cash_out(&self, account: AccountId, kind: GameKind) -> WagerResult<ResolutionView> {
        let mut occupied = match self.sessions.entry((account, kind)) {
            Entry::Occupied(o) => o,
            Entry::Vacant(_) => return Err(no_session(account, kind)),
        };
        let session = occupied.get_mut();
        if !session.board.can_cash_out() {
            return Err(StateError::NothingToCollect.into());
        }
        let payout = payout_for(session.stake, session.board.multiplier());
        let board = session.board.clone();
        let resolution = self.settle(session, &board, RoundEnd::CashOut, payout)?;
        occupied.remove();
        Ok(resolution)
    }

    /// Walk away from an open session. The stake stays lost.
    pub fn forfeit(&self, account: AccountId, kind: GameKind) -> WagerResult<ResolutionView> {
        let mut occupied = match self.sessions.entry((account, kind)) {
            Entry::Occupied(o) => o,
            Entry::Vacant(_) => return Err(no_session(account, kind)),
        };
        let session = occupied.get_mut();
        let board = session.board.clone();
        let resolution = self.settle(session, &board, RoundEnd::Forfeit, 0)?;
        occupied.remove();
        Ok(resolution)
    }

    pub fn session(&self, account: AccountId, kind: GameKind) -> Option<SessionView> {
        self.sessions.get(&(account, kind)).map(|s| s.view())
    }

    /// Stakes debited for sessions that have not resolved yet.
    pub fn open_stakes(&self, account: AccountId) -> i64 {
        self.sessions
            .iter()
            .filter(|s| s.key().0 == account)
            .map(|s| s.value().stake)
            .sum()
    }

    /// Discard every open session of the account without writing entries.
    pub fn drop_sessions(&self, account: AccountId) -> usize {
        let mut removed = 0;
        self.sessions.retain(|(owner, _), _| {
            if *owner == account {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn settle(&self, session: &GameSession, board: &GameBoard, end: RoundEnd, payout: i64) -> WagerResult<ResolutionView> {
        let kind = board.kind();
        let details = board.audit(session.stake, end);
        let now = self.clock.now();
        let (outcome, entry) = if payout > 0 {
            let entry = NewLedgerEntry::win(session.account, kind, session.stake, payout, details.clone(), now);
            (GameOutcome::Win, entry)
        } else {
            let entry = NewLedgerEntry::loss(session.account, kind, session.stake, details.clone(), now);
            (GameOutcome::Loss, entry)
        };

        let settlement = self.balances.settle(session.account, payout, entry)?;
        self.metrics.record_resolution(outcome);
        tracing::info!(
            account = session.account,
            game = %kind,
            entry_id = settlement.entry_id,
            stake = session.stake,
            payout,
            "round resolved"
        );

        Ok(ResolutionView {
            entry_id: settlement.entry_id,
            account: session.account,
            game: kind,
            stake: session.stake,
            outcome,
            multiplier: if payout > 0 { board.multiplier() } else { 0.0 },
            payout,
            balance: settlement.balance,
            details,
        })
    }
}

fn no_session(account: AccountId, kind: GameKind) -> crate::errors::WagerError {
    StateError::NoActiveSession { account, game: kind.to_string() }.into()
}

fn resolved_view(session: &GameSession, resolution: ResolutionView) -> SessionView {
    SessionView {
        account: session.account,
        game: resolution.game,
        stake: session.stake,
        multiplier: resolution.multiplier,
        potential_payout: resolution.payout,
        board: resolution.details.clone(),
        status: SessionStatus::Resolved(resolution),
    }
}
