//! Odds and payout tables for every game.
//!
//! All functions are pure: randomness comes in through a [`RandomSource`]
//! argument and nothing is cached between calls.

use serde::{Deserialize, Serialize};

use super::rng::RandomSource;
use super::types::Direction;

pub const MINER_CELLS: u8 = 25;
pub const TOWER_COLUMNS: u8 = 3;
pub const CANDLE_STEP: f64 = 1.9;
pub const CANDLE_BASE_PRICE: i32 = 100;
pub const CANDLE_PREVIEW: usize = 5;

pub const CRASH_INSTANT_BUST: f64 = 0.05;
pub const CRASH_HOUSE_FACTOR: f64 = 0.95;
pub const CRASH_GROWTH: f64 = 0.18;
pub const CRASH_GROWTH_EXPONENT: f64 = 1.2;

const TOWER_ONE_TRAP: [f64; 12] = [1.5, 2.0, 2.8, 4.0, 5.5, 8.0, 12.0, 18.0, 28.0, 42.0, 65.0, 100.0];
const TOWER_TWO_TRAPS: [f64; 12] =
    [2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 130.0, 260.0, 520.0, 1050.0, 2100.0, 4200.0];

pub const HOURLY_CHOICES: u32 = 3;

/// One slice of the wheel of fortune
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelSector {
    pub label: &'static str,
    pub reward: i64,
    pub weight: u32,
}

/// Expected reward about 27 coins per spin.
pub const WHEEL_SECTORS: [WheelSector; 6] = [
    WheelSector { label: "nothing", reward: 0, weight: 50 },
    WheelSector { label: "+15", reward: 15, weight: 20 },
    WheelSector { label: "+30", reward: 30, weight: 15 },
    WheelSector { label: "+75", reward: 75, weight: 8 },
    WheelSector { label: "+150", reward: 150, weight: 5 },
    WheelSector { label: "+300", reward: 300, weight: 2 },
];

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Heads or tails with equal odds; `true` means heads.
pub fn flip_coin(rng: &mut dyn RandomSource) -> bool {
    rng.next_below(2) == 0
}

pub fn coinflip_multiplier(wins: u32) -> f64 {
    2f64.powi(wins as i32)
}

/// House commission on miner payouts, by mine count.
pub fn miner_commission(mines: u8) -> f64 {
    match mines {
        0..=3 => 0.92,
        4..=5 => 0.90,
        6..=10 => 0.88,
        11..=15 => 0.86,
        _ => 0.85,
    }
}

/// Multiplier after `cleared` safe cells on a grid with `mines` mines.
///
/// Fair odds of drawing that many safe cells in a row, scaled by the
/// commission and rounded to cents. No cells cleared is the identity.
pub fn calc_miner_coeff(mines: u8, cleared: u8, safe_cells: u8) -> f64 {
    if cleared == 0 {
        return 1.0;
    }
    let total = (mines + safe_cells) as f64;
    let fair: f64 = (0..cleared)
        .map(|i| (total - i as f64) / (safe_cells as f64 - i as f64))
        .product();
    round2(fair * miner_commission(mines))
}

/// Positions of the mines on a fresh grid.
pub fn place_mines(mines: u8, rng: &mut dyn RandomSource) -> Vec<u8> {
    let mut picked: Vec<u8> = rng
        .sample_distinct(MINER_CELLS as usize, mines as usize)
        .into_iter()
        .map(|i| i as u8)
        .collect();
    picked.sort_unstable();
    picked
}

/// Payout table for a tower of `floors` floors with `traps` traps per floor.
pub fn tower_table(floors: u8, traps: u8) -> Option<&'static [f64]> {
    let table: &'static [f64] = match traps {
        1 => &TOWER_ONE_TRAP,
        2 => &TOWER_TWO_TRAPS,
        _ => return None,
    };
    match floors {
        8 | 12 => Some(&table[..floors as usize]),
        _ => None,
    }
}

/// Trap columns for one tower floor.
pub fn place_traps(traps: u8, rng: &mut dyn RandomSource) -> Vec<u8> {
    let mut picked: Vec<u8> = rng
        .sample_distinct(TOWER_COLUMNS as usize, traps as usize)
        .into_iter()
        .map(|i| i as u8)
        .collect();
    picked.sort_unstable();
    picked
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlotSymbol {
    Cherry,
    Lemon,
    Bell,
    Star,
    Diamond,
    Seven,
}

impl SlotSymbol {
    pub const ALL: [SlotSymbol; 6] = [
        SlotSymbol::Cherry,
        SlotSymbol::Lemon,
        SlotSymbol::Bell,
        SlotSymbol::Star,
        SlotSymbol::Diamond,
        SlotSymbol::Seven,
    ];

    /// Relative reel weight; rarer symbols pay more.
    pub fn weight(&self) -> u32 {
        match self {
            SlotSymbol::Cherry => 35,
            SlotSymbol::Lemon => 25,
            SlotSymbol::Bell => 18,
            SlotSymbol::Star => 12,
            SlotSymbol::Diamond => 7,
            SlotSymbol::Seven => 3,
        }
    }

    /// Multiple paid for three of a kind.
    pub fn triple_multiplier(&self) -> f64 {
        match self {
            SlotSymbol::Cherry => 3.0,
            SlotSymbol::Lemon => 5.0,
            SlotSymbol::Bell => 10.0,
            SlotSymbol::Star => 15.0,
            SlotSymbol::Diamond => 25.0,
            SlotSymbol::Seven => 50.0,
        }
    }
}

pub fn spin_reel(rng: &mut dyn RandomSource) -> SlotSymbol {
    let total: u32 = SlotSymbol::ALL.iter().map(SlotSymbol::weight).sum();
    let mut roll = (rng.next_f64() * total as f64) as u32;
    for symbol in SlotSymbol::ALL {
        if roll < symbol.weight() {
            return symbol;
        }
        roll -= symbol.weight();
    }
    SlotSymbol::Seven
}

/// Weighted pick over [`WHEEL_SECTORS`].
pub fn wheel_sector(rng: &mut dyn RandomSource) -> WheelSector {
    let total: u32 = WHEEL_SECTORS.iter().map(|s| s.weight).sum();
    let mut roll = (rng.next_f64() * total as f64) as u32;
    for sector in WHEEL_SECTORS {
        if roll < sector.weight {
            return sector;
        }
        roll -= sector.weight;
    }
    WHEEL_SECTORS[WHEEL_SECTORS.len() - 1]
}

/// The number a player has to guess for the hourly bonus, 1..=3.
pub fn hourly_number(rng: &mut dyn RandomSource) -> u32 {
    1 + rng.next_below(HOURLY_CHOICES)
}

/// Three of a kind pays the symbol's multiple, a pair refunds the stake, anything else loses.
pub fn slots_multiplier(reels: &[SlotSymbol; 3]) -> f64 {
    let [a, b, c] = *reels;
    if a == b && b == c {
        a.triple_multiplier()
    } else if a == b || b == c || a == c {
        1.0
    } else {
        0.0
    }
}

/// Next hidden candle move: up 1..=16 or down 1..=15.
pub fn next_candle(rng: &mut dyn RandomSource) -> i32 {
    if rng.next_below(2) == 0 {
        1 + rng.next_below(16) as i32
    } else {
        -(1 + rng.next_below(15) as i32)
    }
}

/// Nonzero move in -15..=15 for the opening chart.
pub fn preview_candle(rng: &mut dyn RandomSource) -> i32 {
    let v = rng.next_below(30) as i32;
    if v < 15 {
        v - 15
    } else {
        v - 14
    }
}

pub fn candle_direction(change: i32) -> Direction {
    if change > 0 {
        Direction::Up
    } else {
        Direction::Down
    }
}

pub fn candles_multiplier(wins: u32) -> f64 {
    CANDLE_STEP.powi(wins as i32)
}

/// Hidden crash point for a new round; `0.0` is an instant bust.
pub fn crash_point(rng: &mut dyn RandomSource) -> f64 {
    let r = rng.next_f64();
    if r < CRASH_INSTANT_BUST {
        return 0.0;
    }
    round2(CRASH_HOUSE_FACTOR / (1.0 - r))
}

/// Displayed multiplier one tick after `current`.
pub fn next_crash_multiplier(current: f64) -> f64 {
    let step = round2(CRASH_GROWTH * current.powf(CRASH_GROWTH_EXPONENT));
    round2(current + step)
}
