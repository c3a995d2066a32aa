//! Miner: a 5x5 grid hiding a chosen number of mines.

use serde_json::{json, Value};

use super::odds::{calc_miner_coeff, place_mines, MINER_CELLS};
use super::rng::RandomSource;
use super::types::{GameKind, GameParams, TurnAction};
use super::{mismatch, RoundEnd, TurnGame, TurnStep};
use crate::errors::{StateError, ValidationError, WagerResult};

#[derive(Debug, Clone)]
pub struct MinerBoard {
    mines: u8,
    mine_positions: Vec<u8>,
    opened: Vec<u8>,
    hit: Option<u8>,
}

impl MinerBoard {
    pub fn mines(&self) -> u8 {
        self.mines
    }

    pub fn safe_cells(&self) -> u8 {
        MINER_CELLS - self.mines
    }

    pub fn cleared(&self) -> u8 {
        self.opened.len() as u8
    }

    pub fn is_mine(&self, cell: u8) -> bool {
        self.mine_positions.binary_search(&cell).is_ok()
    }

    fn coeff_after(&self, cleared: u8) -> f64 {
        calc_miner_coeff(self.mines, cleared, self.safe_cells())
    }
}

impl TurnGame for MinerBoard {
    const KIND: GameKind = GameKind::Miner;

    fn check(params: &GameParams) -> Result<(), ValidationError> {
        match params {
            GameParams::Miner { mines } if (1..MINER_CELLS).contains(mines) => Ok(()),
            GameParams::Miner { mines } => Err(ValidationError::InvalidParameter {
                field: "mines".to_string(),
                reason: format!("{} is outside 1..={}", mines, MINER_CELLS - 1),
            }),
            _ => Err(mismatch(Self::KIND)),
        }
    }

    fn deal(params: &GameParams, rng: &mut dyn RandomSource) -> WagerResult<Self> {
        Self::check(params)?;
        let GameParams::Miner { mines } = *params else {
            return Err(mismatch(Self::KIND).into());
        };
        Ok(Self {
            mines,
            mine_positions: place_mines(mines, rng),
            opened: Vec::new(),
            hit: None,
        })
    }

    fn play(&mut self, action: &TurnAction, _rng: &mut dyn RandomSource) -> WagerResult<TurnStep> {
        let TurnAction::OpenCell { cell } = *action else {
            return Err(mismatch(Self::KIND).into());
        };
        if cell >= MINER_CELLS {
            return Err(ValidationError::InvalidParameter {
                field: "cell".to_string(),
                reason: format!("{} is outside 0..{}", cell, MINER_CELLS),
            }
            .into());
        }
        if self.opened.contains(&cell) {
            return Err(StateError::CellAlreadyOpen(cell).into());
        }

        if self.is_mine(cell) {
            self.hit = Some(cell);
            return Ok(TurnStep::Bust);
        }
        self.opened.push(cell);
        if self.cleared() == self.safe_cells() {
            Ok(TurnStep::Complete)
        } else {
            Ok(TurnStep::Continue)
        }
    }

    fn multiplier(&self) -> f64 {
        self.coeff_after(self.cleared())
    }

    fn can_cash_out(&self) -> bool {
        !self.opened.is_empty()
    }

    fn public_view(&self) -> Value {
        json!({
            "mines": self.mines,
            "opened": self.opened,
            "coeff": self.multiplier(),
            "next_coeff": self.coeff_after((self.cleared() + 1).min(self.safe_cells())),
        })
    }

    fn audit(&self, stake: i64, end: RoundEnd) -> Value {
        let result = match end {
            RoundEnd::Bust => "boom",
            RoundEnd::CashOut => "cashout",
            RoundEnd::Complete => "full",
            RoundEnd::Forfeit => "forfeit",
        };
        json!({
            "bet": stake,
            "mines": self.mines,
            "mine_positions": self.mine_positions,
            "opened": self.opened,
            "hit": self.hit,
            "coeff": self.multiplier(),
            "result": result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WagerError;
    use crate::games::rng::ScriptedRandom;

    fn board(mines: u8) -> MinerBoard {
        // all-zero draws put the mines on cells 0..mines
        MinerBoard::deal(&GameParams::Miner { mines }, &mut ScriptedRandom::default()).unwrap()
    }

    fn open(b: &mut MinerBoard, cell: u8) -> WagerResult<TurnStep> {
        b.play(&TurnAction::OpenCell { cell }, &mut ScriptedRandom::default())
    }

    #[test]
    fn three_safe_cells_with_five_mines() {
        let mut b = board(5);
        for cell in [10, 11, 12] {
            assert_eq!(open(&mut b, cell).unwrap(), TurnStep::Continue);
        }
        assert_eq!(b.multiplier(), 1.82);
        assert_eq!(b.audit(100, RoundEnd::CashOut)["result"], "cashout");
    }

    #[test]
    fn mine_busts_and_is_recorded() {
        let mut b = board(3);
        assert_eq!(open(&mut b, 2).unwrap(), TurnStep::Bust);
        let audit = b.audit(40, RoundEnd::Bust);
        assert_eq!(audit["hit"], 2);
        assert_eq!(audit["result"], "boom");
        assert!(!b.can_cash_out());
    }

    #[test]
    fn full_clear_completes() {
        let mut b = board(24);
        assert_eq!(open(&mut b, 24).unwrap(), TurnStep::Complete);
        assert_eq!(b.audit(10, RoundEnd::Complete)["result"], "full");
    }

    #[test]
    fn reopening_and_out_of_range_cells_are_rejected() {
        let mut b = board(1);
        open(&mut b, 5).unwrap();
        assert!(matches!(
            open(&mut b, 5).unwrap_err(),
            WagerError::State(StateError::CellAlreadyOpen(5))
        ));
        assert!(matches!(open(&mut b, 25).unwrap_err(), WagerError::Validation(_)));
        assert_eq!(b.cleared(), 1);
    }

    #[test]
    fn mine_count_is_validated() {
        assert!(MinerBoard::check(&GameParams::Miner { mines: 0 }).is_err());
        assert!(MinerBoard::check(&GameParams::Miner { mines: 25 }).is_err());
        assert!(MinerBoard::check(&GameParams::Miner { mines: 24 }).is_ok());
        assert!(MinerBoard::check(&GameParams::Slots).is_err());
    }

    #[test]
    fn public_view_hides_layout() {
        let b = board(5);
        assert!(b.public_view().get("mine_positions").is_none());
    }
}
