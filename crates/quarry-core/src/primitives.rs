//! # Primitives
//!
//! Identifier and value types shared by every layer of the engine.
//!
//! Entities (casters and targets) belong to the host application. The
//! engine only ever sees them through the plain data carried here.

use crate::error::DieParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Radius of a Detonation, in scene distance units.
pub const DETONATION_RADIUS: u32 = 10;

/// Duration of the Sight buff, in seconds.
pub const SIGHT_DURATION_SECS: u32 = 60;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Host-assigned identity of an entity (caster or target).
///
/// Opaque to the engine; compared and ordered as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Milliseconds since the Unix epoch, as reported by the host clock.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

// =============================================================================
// DIE EXPRESSION
// =============================================================================

/// A dice formula of the form `NdM`, e.g. `1d6` or `2d8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DieExpression {
    /// Number of dice rolled.
    pub count: u8,
    /// Faces per die.
    pub sides: u8,
}

impl DieExpression {
    #[must_use]
    pub const fn new(count: u8, sides: u8) -> Self {
        Self { count, sides }
    }

    /// Smallest total the expression can produce.
    #[must_use]
    pub fn min_total(&self) -> u32 {
        u32::from(self.count)
    }

    /// Largest total the expression can produce.
    #[must_use]
    pub fn max_total(&self) -> u32 {
        u32::from(self.count) * u32::from(self.sides)
    }
}

impl fmt::Display for DieExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)
    }
}

impl FromStr for DieExpression {
    type Err = DieParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (count, sides) = trimmed
            .split_once(['d', 'D'])
            .ok_or_else(|| DieParseError(trimmed.to_string()))?;

        // A bare "d6" means one die
        let count = if count.is_empty() {
            1
        } else {
            count
                .parse::<u8>()
                .map_err(|_| DieParseError(trimmed.to_string()))?
        };
        let sides = sides
            .parse::<u8>()
            .map_err(|_| DieParseError(trimmed.to_string()))?;

        if count == 0 || sides == 0 {
            return Err(DieParseError(trimmed.to_string()));
        }
        Ok(Self { count, sides })
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Current and maximum vitality (hit points).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitality {
    pub current: i64,
    pub max: i64,
}

impl Vitality {
    #[must_use]
    pub const fn new(current: i64, max: i64) -> Self {
        Self { current, max }
    }

    /// Vitality after gaining `amount`, clamped to `[0, max]`.
    #[must_use]
    pub fn healed_by(&self, amount: i64) -> i64 {
        self.current
            .saturating_add(amount)
            .clamp(0, self.max.max(0))
    }
}

/// The entity that applies and consumes marks.
///
/// A snapshot supplied by the host for each action; the engine never
/// reaches into ambient selection state to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caster {
    pub id: EntityId,
    pub name: String,
    /// Class level that drives potency and capacity.
    #[serde(default)]
    pub level: u32,
    /// Proficiency-like bonus.
    #[serde(default = "default_proficiency")]
    pub proficiency: i32,
    /// Mental-ability modifier.
    #[serde(default)]
    pub mental_modifier: i32,
    #[serde(default)]
    pub vitality: Vitality,
}

fn default_proficiency() -> i32 {
    2
}

impl Caster {
    /// Create a caster with the default proficiency and no modifier.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: u32) -> Self {
        Self {
            id: EntityId::new(id),
            name: name.into(),
            level,
            proficiency: default_proficiency(),
            mental_modifier: 0,
            vitality: Vitality::default(),
        }
    }

    #[must_use]
    pub fn with_abilities(mut self, proficiency: i32, mental_modifier: i32) -> Self {
        self.proficiency = proficiency;
        self.mental_modifier = mental_modifier;
        self
    }

    #[must_use]
    pub fn with_vitality(mut self, current: i64, max: i64) -> Self {
        self.vitality = Vitality::new(current, max);
        self
    }
}

/// Allegiance marker of a token relative to the players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Hostile,
    Neutral,
    Friendly,
    Secret,
}

/// A position on the scene, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// A placed token: the scene-level handle of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: EntityId,
    pub name: String,
    pub center: Point,
    pub disposition: Disposition,
}

impl Token {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        center: Point,
        disposition: Disposition,
    ) -> Self {
        Self {
            id: EntityId::new(id),
            name: name.into(),
            center,
            disposition,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
