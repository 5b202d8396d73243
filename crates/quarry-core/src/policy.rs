//! # Resource Policy
//!
//! Level-indexed constants: mark potency, simultaneous-mark capacity,
//! and uses per recovery period. Pure functions, monotonic in level.

use crate::primitives::{Caster, DieExpression};

/// Potency die of a mark applied at `level`.
///
/// | Level  | Die  |
/// |--------|------|
/// | < 5    | 1d6  |
/// | 5–8    | 1d8  |
/// | 9–12   | 1d10 |
/// | 13–16  | 1d12 |
/// | ≥ 17   | 2d8  |
#[must_use]
pub fn potency(level: u32) -> DieExpression {
    match level {
        17.. => DieExpression::new(2, 8),
        13..=16 => DieExpression::new(1, 12),
        9..=12 => DieExpression::new(1, 10),
        5..=8 => DieExpression::new(1, 8),
        _ => DieExpression::new(1, 6),
    }
}

/// Marks a caster of `level` may hold at once.
#[must_use]
pub fn capacity(level: u32) -> usize {
    match level {
        14.. => 3,
        6..=13 => 2,
        _ => 1,
    }
}

/// Apply actions available per recovery period.
///
/// Zero when the ability numbers sum to zero or less.
#[must_use]
pub fn uses_per_period(proficiency: i32, mental_modifier: i32) -> u32 {
    proficiency.saturating_add(mental_modifier).max(0) as u32
}

/// All three constants for one caster, computed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub potency: DieExpression,
    pub capacity: usize,
    pub uses_per_period: u32,
}

impl Allowance {
    #[must_use]
    pub fn for_caster(caster: &Caster) -> Self {
        Self {
            potency: potency(caster.level),
            capacity: capacity(caster.level),
            uses_per_period: uses_per_period(caster.proficiency, caster.mental_modifier),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
