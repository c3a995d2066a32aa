//! Tower: climb floor by floor, picking one of three tiles on each.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::odds::{place_traps, tower_table, TOWER_COLUMNS};
use super::rng::RandomSource;
use super::types::{GameKind, GameParams, TurnAction};
use super::{mismatch, RoundEnd, TurnGame, TurnStep};
use crate::errors::{ValidationError, WagerResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TowerPick {
    pub floor: u8,
    pub column: u8,
    pub safe: bool,
}

#[derive(Debug, Clone)]
pub struct TowerBoard {
    floors: u8,
    traps_count: u8,
    /// Trap columns, one entry per floor, drawn when the board is dealt
    traps: Vec<Vec<u8>>,
    /// Floors cleared so far
    floor: u8,
    picks: Vec<TowerPick>,
    table: &'static [f64],
}

impl TowerBoard {
    pub fn floor_reached(&self) -> u8 {
        self.floor
    }

    pub fn floors(&self) -> u8 {
        self.floors
    }

    fn coeff_at(&self, floor: u8) -> f64 {
        match floor {
            0 => 1.0,
            f => self.table[(f.min(self.floors) - 1) as usize],
        }
    }
}

impl TurnGame for TowerBoard {
    const KIND: GameKind = GameKind::Tower;

    fn check(params: &GameParams) -> Result<(), ValidationError> {
        let GameParams::Tower { floors, traps } = *params else {
            return Err(mismatch(Self::KIND));
        };
        if tower_table(floors, traps).is_some() {
            return Ok(());
        }
        let (field, reason) = if !matches!(traps, 1 | 2) {
            ("traps", format!("{} traps per floor; choose 1 or 2", traps))
        } else {
            ("floors", format!("{} floors; choose 8 or 12", floors))
        };
        Err(ValidationError::InvalidParameter { field: field.to_string(), reason })
    }

    fn deal(params: &GameParams, rng: &mut dyn RandomSource) -> WagerResult<Self> {
        Self::check(params)?;
        let GameParams::Tower { floors, traps } = *params else {
            return Err(mismatch(Self::KIND).into());
        };
        let table = tower_table(floors, traps).ok_or_else(|| mismatch(Self::KIND))?;
        Ok(Self {
            floors,
            traps_count: traps,
            traps: (0..floors).map(|_| place_traps(traps, rng)).collect(),
            floor: 0,
            picks: Vec::new(),
            table,
        })
    }

    fn play(&mut self, action: &TurnAction, _rng: &mut dyn RandomSource) -> WagerResult<TurnStep> {
        let TurnAction::PickTile { column } = *action else {
            return Err(mismatch(Self::KIND).into());
        };
        if column >= TOWER_COLUMNS {
            return Err(ValidationError::InvalidParameter {
                field: "column".to_string(),
                reason: format!("{} is outside 0..{}", column, TOWER_COLUMNS),
            }
            .into());
        }

        let floor = self.floor;
        let safe = !self.traps[floor as usize].contains(&column);
        self.picks.push(TowerPick { floor, column, safe });
        if !safe {
            return Ok(TurnStep::Bust);
        }
        self.floor += 1;
        if self.floor == self.floors {
            Ok(TurnStep::Complete)
        } else {
            Ok(TurnStep::Continue)
        }
    }

    fn multiplier(&self) -> f64 {
        self.coeff_at(self.floor)
    }

    fn can_cash_out(&self) -> bool {
        self.floor > 0
    }

    fn public_view(&self) -> Value {
        json!({
            "floors": self.floors,
            "traps_count": self.traps_count,
            "floor_reached": self.floor,
            "picks": self.picks,
            // traps of cleared floors are no longer secret
            "revealed": &self.traps[..self.floor as usize],
            "table": self.table,
            "coeff": self.multiplier(),
            "next_coeff": self.coeff_at(self.floor + 1),
        })
    }

    fn audit(&self, stake: i64, end: RoundEnd) -> Value {
        let result = match end {
            RoundEnd::Bust => "boom",
            RoundEnd::CashOut => "cashout",
            RoundEnd::Complete => "top",
            RoundEnd::Forfeit => "forfeit",
        };
        json!({
            "bet": stake,
            "traps": self.traps,
            "traps_count": self.traps_count,
            "floor_reached": self.floor,
            "picks": self.picks,
            "coeff": self.multiplier(),
            "result": result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::rng::ScriptedRandom;

    fn tower(floors: u8, traps: u8) -> TowerBoard {
        // all-zero draws put the traps in the leftmost columns
        TowerBoard::deal(&GameParams::Tower { floors, traps }, &mut ScriptedRandom::default()).unwrap()
    }

    fn pick(b: &mut TowerBoard, column: u8) -> TurnStep {
        b.play(&TurnAction::PickTile { column }, &mut ScriptedRandom::default()).unwrap()
    }

    #[test]
    fn trap_on_first_floor_busts_at_floor_zero() {
        let mut b = tower(12, 1);
        assert_eq!(pick(&mut b, 0), TurnStep::Bust);
        let audit = b.audit(100, RoundEnd::Bust);
        assert_eq!(audit["floor_reached"], 0);
        assert_eq!(audit["result"], "boom");
        assert!(!b.can_cash_out());
    }

    #[test]
    fn climbing_follows_the_table() {
        let mut b = tower(8, 1);
        assert_eq!(pick(&mut b, 2), TurnStep::Continue);
        assert_eq!(b.multiplier(), 1.5);
        assert_eq!(pick(&mut b, 1), TurnStep::Continue);
        assert_eq!(b.multiplier(), 2.0);
        assert_eq!(b.floor_reached(), 2);
    }

    #[test]
    fn two_trap_mode_has_one_safe_column() {
        let mut b = tower(8, 2);
        assert_eq!(pick(&mut b, 1), TurnStep::Bust);

        let mut b = tower(8, 2);
        for _ in 0..7 {
            assert_eq!(pick(&mut b, 2), TurnStep::Continue);
        }
        assert_eq!(pick(&mut b, 2), TurnStep::Complete);
        assert_eq!(b.multiplier(), 260.0);
        assert_eq!(b.audit(1, RoundEnd::Complete)["result"], "top");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(TowerBoard::check(&GameParams::Tower { floors: 10, traps: 1 }).is_err());
        assert!(TowerBoard::check(&GameParams::Tower { floors: 8, traps: 3 }).is_err());
        let mut b = tower(8, 1);
        assert!(b.play(&TurnAction::PickTile { column: 3 }, &mut ScriptedRandom::default()).is_err());
        assert!(b.picks.is_empty());
    }

    #[test]
    fn view_only_reveals_cleared_floors() {
        let mut b = tower(8, 1);
        pick(&mut b, 1);
        let view = b.public_view();
        assert_eq!(view["revealed"].as_array().unwrap().len(), 1);
        assert!(view.get("traps").is_none());
    }
}
