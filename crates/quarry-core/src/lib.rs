//! # Quarry Core
//!
//! Mark lifecycle and resource-accounting engine.
//!
//! A caster places a limited number of marks on opposing entities,
//! bounded by a per-caster capacity and a per-period use counter. Each
//! mark can be consumed once by an Unleash that produces one of three
//! mutually exclusive aspects, and marks are revoked in bulk when the
//! caster recovers or the target drops.
//!
//! ## Architecture
//!
//! ```text
//! policy ──► engine ──► store ──► attributes (memory | redb)
//!              │           ▲
//!              ▼           │
//!           unleash ───────┤
//!           lifecycle ─────┘
//!              │
//!              ▼
//!            host (scene, indicators, dice, notifier, actors, clock)
//! ```
//!
//! ## Rules
//!
//! - No floats: range checks use squared integer lengths.
//! - Randomness and time come only from the injected host.
//! - Every read-modify-write of a target's marks runs under that
//!   target's lock; use counters run under the caster's lock, always
//!   taken before any target lock.

pub mod attributes;
pub mod engine;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod notice;
pub mod policy;
pub mod primitives;
pub mod settings;
pub mod spatial;
pub mod storage;
pub mod store;
pub mod unleash;

#[cfg(test)]
mod test_support;

pub use attributes::{AttributeStore, MemoryAttributes, NAMESPACE};
pub use engine::{
    ApplySummary, BonusDamage, BonusRoll, CasterStatus, HeldMark, TargetFailure, TargetRef,
    Tracker,
};
pub use error::{DieParseError, HostError, QuarryError, QuarryResult, Severity, StoreError};
pub use host::{
    Actors, Buff, Clock, Dice, Host, Indicator, IndicatorHandle, IndicatorSpec, Indicators,
    Notifier, Scene, Skill,
};
pub use lifecycle::{EventBus, EventKind, HostEvent, RecoveryKind};
pub use notice::{NoticeLevel, NoticeRecord, Notification};
pub use policy::{Allowance, capacity, potency, uses_per_period};
pub use primitives::{
    Caster, DETONATION_RADIUS, DieExpression, Disposition, EntityId, Point, SIGHT_DURATION_SECS,
    Timestamp, Token, Vitality,
};
pub use settings::{DamageType, Settings};
pub use spatial::{GridScale, tokens_within};
pub use storage::RedbAttributes;
pub use store::{Mark, MarkMap, MarkStore};
pub use unleash::{
    Aspect, DetonationHit, DetonationReport, RegenerationReport, SightReport, UnleashReport,
};
