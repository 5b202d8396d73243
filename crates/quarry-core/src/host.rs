//! # Host Collaborators
//!
//! The hosting application, seen from the engine: a scene of tokens on
//! a grid, visible indicators, dice, a notification sink, mutable
//! actors and a clock. Each concern is its own trait; [`Host`] bundles
//! them for the engine's entry points.

use crate::error::HostError;
use crate::notice::Notification;
use crate::primitives::{DieExpression, EntityId, Timestamp, Token};
use crate::spatial::GridScale;
use serde::{Deserialize, Serialize};

/// Icon of the Sight buff.
pub const SIGHT_ICON: &str = "icons/skills/awareness/eye-ringed-green.webp";

// =============================================================================
// INDICATORS
// =============================================================================

/// What to draw when creating a mark indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub icon: String,
    /// Caster whose mark this indicator shows.
    pub origin: EntityId,
    pub label: String,
}

/// Host-issued handle of a created indicator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorHandle(pub String);

/// A mark indicator currently shown on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub handle: IndicatorHandle,
    pub origin: EntityId,
    pub label: String,
}

// =============================================================================
// BUFFS
// =============================================================================

/// Skills a buff may grant advantage on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Perception,
    Survival,
}

/// A timed effect granted to an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buff {
    pub name: String,
    pub icon: String,
    /// Actor that granted the buff.
    pub origin: EntityId,
    /// Target whose mark was consumed to produce it.
    pub source_target: EntityId,
    pub duration_secs: u32,
    pub advantage_on: Vec<Skill>,
}

// =============================================================================
// COLLABORATOR TRAITS
// =============================================================================

/// Tokens and grid of the active scene.
pub trait Scene {
    /// Every token on the scene, in placement order.
    fn tokens(&self) -> Vec<Token>;

    fn grid(&self) -> GridScale;

    /// The first token belonging to `entity`.
    fn token_of(&self, entity: &EntityId) -> Option<Token> {
        self.tokens().into_iter().find(|token| &token.id == entity)
    }
}

/// Visible mark indicators on targets.
pub trait Indicators {
    fn create_indicator(
        &self,
        target: &EntityId,
        spec: &IndicatorSpec,
    ) -> Result<IndicatorHandle, HostError>;

    fn remove_indicator(&self, handle: &IndicatorHandle) -> Result<(), HostError>;

    /// Mark indicators currently on `target`.
    fn mark_indicators(&self, target: &EntityId) -> Result<Vec<Indicator>, HostError>;
}

/// Randomness.
pub trait Dice {
    /// Roll `expr` and return the total.
    fn roll(&self, expr: &DieExpression) -> Result<u32, HostError>;
}

/// User-facing notification sink. Never blocks on acknowledgment.
pub trait Notifier {
    fn emit(&self, notification: Notification);
}

/// Mutations of actors outside the engine's own attributes.
pub trait Actors {
    fn set_vitality(&self, actor: &EntityId, value: i64) -> Result<(), HostError>;

    fn grant_buff(&self, actor: &EntityId, buff: &Buff) -> Result<(), HostError>;
}

/// Wall clock.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Everything the engine needs from its host.
pub trait Host: Scene + Indicators + Dice + Notifier + Actors + Clock {}

impl<T: Scene + Indicators + Dice + Notifier + Actors + Clock> Host for T {}

/// Remove every indicator on `target` that shows `origin`'s mark.
pub(crate) fn remove_indicators_from<H: Indicators + ?Sized>(
    host: &H,
    target: &EntityId,
    origin: Option<&EntityId>,
) -> Result<usize, HostError> {
    let mut removed = 0usize;
    for indicator in host.mark_indicators(target)? {
        if origin.is_none_or(|origin| &indicator.origin == origin) {
            host.remove_indicator(&indicator.handle)?;
            removed = removed.saturating_add(1);
        }
    }
    Ok(removed)
}
