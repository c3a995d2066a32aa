//! End-to-end rounds of the turn-based games through the engine façade

mod common;

use common::harness;
use stakehouse::errors::{StateError, ValidationError, WagerError};
use stakehouse::games::types::{CoinSide, Direction, GameOutcome, SessionStatus};
use stakehouse::{GameKind, GameParams, TurnAction};

const HEADS: TurnAction = TurnAction::Flip { side: CoinSide::Heads };

#[test]
fn coin_flip_three_wins_pays_eight_times() {
    let h = harness();
    let view = h.casino.start_turn_based_game(1, GameKind::CoinFlip, 100, GameParams::CoinFlip).unwrap();
    assert_eq!(view.status, SessionStatus::Active);
    assert_eq!(h.balance(1), 400);

    for expected in [2.0, 4.0, 8.0] {
        let view = h.casino.play_turn(1, GameKind::CoinFlip, HEADS).unwrap();
        assert_eq!(view.multiplier, expected);
    }

    let resolution = h.casino.cash_out(1, GameKind::CoinFlip).unwrap();
    assert_eq!(resolution.outcome, GameOutcome::Win);
    assert_eq!(resolution.payout, 800);
    assert_eq!(resolution.balance, 1200);

    let entry = h.casino.get_entry(resolution.entry_id).unwrap();
    assert!(entry.win);
    assert_eq!(entry.amount, 800);
    assert_eq!(entry.details["result"], "cashout");
    h.assert_reconciled(1);
}

#[test]
fn coin_flip_wrong_call_loses_the_stake() {
    let h = harness();
    h.rng.push([0.9]);
    h.casino.start_turn_based_game(1, GameKind::CoinFlip, 100, GameParams::CoinFlip).unwrap();
    let view = h.casino.play_turn(1, GameKind::CoinFlip, HEADS).unwrap();

    let resolution = view.resolution().unwrap();
    assert_eq!(resolution.outcome, GameOutcome::Loss);
    assert_eq!(resolution.balance, 400);
    assert!(h.casino.session(1, GameKind::CoinFlip).is_none());
    assert_eq!(h.casino.get_entry(resolution.entry_id).unwrap().amount, 100);
}

#[test]
fn miner_three_safe_cells_with_five_mines() {
    let h = harness();
    // zero draws put the mines on cells 0..5
    h.casino
        .start_turn_based_game(2, GameKind::Miner, 100, GameParams::Miner { mines: 5 })
        .unwrap();
    for cell in [10, 11, 12] {
        h.casino.play_turn(2, GameKind::Miner, TurnAction::OpenCell { cell }).unwrap();
    }

    let resolution = h.casino.cash_out(2, GameKind::Miner).unwrap();
    assert_eq!(resolution.multiplier, 1.82);
    assert_eq!(resolution.payout, 182);
    assert_eq!(h.balance(2), 582);
    assert_eq!(resolution.details["mine_positions"], serde_json::json!([0, 1, 2, 3, 4]));
}

#[test]
fn miner_hit_ends_the_round() {
    let h = harness();
    h.casino
        .start_turn_based_game(2, GameKind::Miner, 50, GameParams::Miner { mines: 3 })
        .unwrap();
    let view = h.casino.play_turn(2, GameKind::Miner, TurnAction::OpenCell { cell: 1 }).unwrap();
    let resolution = view.resolution().unwrap();
    assert_eq!(resolution.outcome, GameOutcome::Loss);
    assert_eq!(resolution.details["result"], "boom");
    assert_eq!(h.balance(2), 450);
}

#[test]
fn tower_trap_on_the_first_floor() {
    let h = harness();
    h.casino
        .start_turn_based_game(3, GameKind::Tower, 100, GameParams::Tower { floors: 12, traps: 1 })
        .unwrap();
    let view = h.casino.play_turn(3, GameKind::Tower, TurnAction::PickTile { column: 0 }).unwrap();

    let resolution = view.resolution().unwrap();
    assert_eq!(resolution.outcome, GameOutcome::Loss);
    assert_eq!(resolution.details["floor_reached"], 0);
    assert_eq!(resolution.details["result"], "boom");
    assert_eq!(h.balance(3), 400);
}

#[test]
fn tower_cash_out_pays_the_floor_reached() {
    let h = harness();
    h.casino
        .start_turn_based_game(3, GameKind::Tower, 100, GameParams::Tower { floors: 8, traps: 1 })
        .unwrap();
    for _ in 0..2 {
        h.casino.play_turn(3, GameKind::Tower, TurnAction::PickTile { column: 2 }).unwrap();
    }
    let resolution = h.casino.cash_out(3, GameKind::Tower).unwrap();
    assert_eq!(resolution.multiplier, 2.0);
    assert_eq!(resolution.payout, 200);
}

#[test]
fn slots_resolve_on_start() {
    let h = harness();
    let view = h.casino.start_turn_based_game(4, GameKind::Slots, 10, GameParams::Slots).unwrap();
    let resolution = view.resolution().unwrap();
    assert_eq!(resolution.multiplier, 3.0);
    assert_eq!(resolution.payout, 30);
    assert_eq!(h.balance(4), 520);
    assert!(h.casino.session(4, GameKind::Slots).is_none());
}

#[test]
fn candles_correct_call_then_cash_out() {
    let h = harness();
    h.casino.start_turn_based_game(5, GameKind::Candles, 100, GameParams::Candles).unwrap();
    let view = h
        .casino
        .play_turn(5, GameKind::Candles, TurnAction::Predict { direction: Direction::Up })
        .unwrap();
    assert_eq!(view.multiplier, 1.9);

    let resolution = h.casino.cash_out(5, GameKind::Candles).unwrap();
    assert_eq!(resolution.payout, 190);
    assert_eq!(h.balance(5), 590);
}

#[test]
fn resolved_rounds_reject_further_actions() {
    let h = harness();
    h.casino.start_turn_based_game(1, GameKind::CoinFlip, 100, GameParams::CoinFlip).unwrap();
    h.casino.play_turn(1, GameKind::CoinFlip, HEADS).unwrap();
    h.casino.cash_out(1, GameKind::CoinFlip).unwrap();
    let balance = h.balance(1);

    for _ in 0..3 {
        assert!(matches!(
            h.casino.cash_out(1, GameKind::CoinFlip).unwrap_err(),
            WagerError::State(StateError::NoActiveSession { .. })
        ));
        assert!(h.casino.play_turn(1, GameKind::CoinFlip, HEADS).is_err());
    }
    assert_eq!(h.balance(1), balance);
    assert_eq!(h.entry_count(1), 1);
}

#[test]
fn second_start_does_not_orphan_the_first_stake() {
    let h = harness();
    h.casino.start_turn_based_game(1, GameKind::CoinFlip, 100, GameParams::CoinFlip).unwrap();
    let err = h
        .casino
        .start_turn_based_game(1, GameKind::CoinFlip, 100, GameParams::CoinFlip)
        .unwrap_err();
    assert!(matches!(err, WagerError::State(StateError::SessionInProgress { .. })));
    assert_eq!(h.balance(1), 400);

    // other games run side by side
    h.casino
        .start_turn_based_game(1, GameKind::Miner, 50, GameParams::Miner { mines: 1 })
        .unwrap();
    assert_eq!(h.balance(1), 350);
    h.assert_reconciled(1);
}

#[test]
fn invalid_input_mutates_nothing() {
    let h = harness();
    let cases = [
        (0, GameParams::CoinFlip),
        (501, GameParams::CoinFlip),
        (10, GameParams::Miner { mines: 0 }),
        (10, GameParams::Miner { mines: 25 }),
        (10, GameParams::Tower { floors: 10, traps: 1 }),
    ];
    for (stake, params) in cases {
        let err = h.casino.start_turn_based_game(1, params.kind(), stake, params).unwrap_err();
        assert!(matches!(err, WagerError::Validation(_)), "{:?}", err);
    }
    assert!(matches!(
        h.casino
            .start_turn_based_game(1, GameKind::Tower, 10, GameParams::CoinFlip)
            .unwrap_err(),
        WagerError::Validation(ValidationError::ActionMismatch(_))
    ));
    assert_eq!(h.balance(1), 500);
    assert_eq!(h.entry_count(1), 0);
}

#[test]
fn forfeit_records_a_loss() {
    let h = harness();
    h.casino
        .start_turn_based_game(1, GameKind::Miner, 100, GameParams::Miner { mines: 3 })
        .unwrap();
    h.casino.play_turn(1, GameKind::Miner, TurnAction::OpenCell { cell: 20 }).unwrap();
    let resolution = h.casino.forfeit(1, GameKind::Miner).unwrap();
    assert_eq!(resolution.outcome, GameOutcome::Loss);
    assert_eq!(resolution.details["result"], "forfeit");
    assert_eq!(h.balance(1), 400);
    h.assert_reconciled(1);
}

#[test]
fn store_outage_leaves_the_session_playable() {
    let h = harness();
    h.casino.start_turn_based_game(1, GameKind::CoinFlip, 100, GameParams::CoinFlip).unwrap();
    h.casino.play_turn(1, GameKind::CoinFlip, HEADS).unwrap();

    h.store.set_unavailable(true);
    let err = h.casino.cash_out(1, GameKind::CoinFlip).unwrap_err();
    assert!(err.is_retryable());
    h.store.set_unavailable(false);

    assert!(h.casino.session(1, GameKind::CoinFlip).is_some());
    let resolution = h.casino.cash_out(1, GameKind::CoinFlip).unwrap();
    assert_eq!(resolution.payout, 200);
    assert_eq!(h.entry_count(1), 1);
}
