//! # Mark Engine
//!
//! The [`Tracker`] owns the mark store and the settings and exposes every
//! action of the engine. This module holds the apply action, manual
//! removal, bonus damage and status; Unleash and the lifecycle reactors
//! extend `Tracker` from their own modules.
//!
//! ## Apply accounting
//!
//! ```text
//! remaining_slots = capacity(level) - active marks of this caster
//! remaining_uses  = uses_per_period - uses consumed
//! apply_count     = min(remaining_slots, remaining_uses, candidates)
//! ```
//!
//! One apply action consumes one use however many targets it marks,
//! and none when every selected candidate was already marked.

use crate::attributes::AttributeStore;
use crate::error::{QuarryError, QuarryResult, Severity};
use crate::host::{Host, IndicatorSpec, Indicators, remove_indicators_from};
use crate::notice::Notification;
use crate::policy::Allowance;
use crate::primitives::{Caster, DieExpression, EntityId, Token};
use crate::settings::{DamageType, Settings};
use crate::store::{Mark, MarkStore, TargetGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

// =============================================================================
// REPORT TYPES
// =============================================================================

/// Id and display name of a target named in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub id: EntityId,
    pub name: String,
}

impl From<&Token> for TargetRef {
    fn from(token: &Token) -> Self {
        Self {
            id: token.id.clone(),
            name: token.name.clone(),
        }
    }
}

/// A target an apply batch could not mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub target: TargetRef,
    pub reason: String,
}

/// Structured result of an apply action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub caster: TargetRef,
    pub potency: DieExpression,
    pub damage_type: DamageType,
    /// Newly marked, in selection order.
    pub marked: Vec<TargetRef>,
    /// Selected but already carrying this caster's mark.
    pub skipped: Vec<TargetRef>,
    /// Candidates beyond the binding limit, left untouched.
    pub not_selected: Vec<TargetRef>,
    pub uses_consumed: u32,
    pub uses_max: u32,
    pub slots_before: usize,
    pub slots_after: usize,
}

impl ApplySummary {
    #[must_use]
    pub fn uses_remaining(&self) -> u32 {
        self.uses_max.saturating_sub(self.uses_consumed)
    }
}

/// Bonus damage a caster deals on a hit against its marked target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusDamage {
    pub potency: DieExpression,
    pub damage_type: DamageType,
}

impl BonusDamage {
    /// Roll formula with the damage type as flavor, e.g. `1d8[force]`.
    #[must_use]
    pub fn formula(&self) -> String {
        format!("{}[{}]", self.potency, self.damage_type)
    }
}

/// A rolled bonus damage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRoll {
    pub caster: TargetRef,
    pub target: TargetRef,
    pub bonus: BonusDamage,
    pub total: u32,
}

/// One mark held by a caster, as listed in its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldMark {
    pub target: TargetRef,
    pub potency: DieExpression,
}

/// A caster's current allowance and marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasterStatus {
    pub caster: TargetRef,
    pub potency: DieExpression,
    pub damage_type: DamageType,
    pub capacity: usize,
    pub uses_consumed: u32,
    pub uses_max: u32,
    pub marks: Vec<HeldMark>,
}

impl CasterStatus {
    #[must_use]
    pub fn uses_remaining(&self) -> u32 {
        self.uses_max.saturating_sub(self.uses_consumed)
    }
}

// =============================================================================
// TRACKER
// =============================================================================

/// The mark engine.
#[derive(Debug)]
pub struct Tracker<A> {
    store: MarkStore<A>,
    settings: Settings,
}

fn caster_ref(caster: &Caster) -> TargetRef {
    TargetRef {
        id: caster.id.clone(),
        name: caster.name.clone(),
    }
}

/// Entity ids on the scene, each once.
pub(crate) fn scene_entities<H: Host + ?Sized>(host: &H) -> BTreeSet<EntityId> {
    host.tokens().into_iter().map(|token| token.id).collect()
}

enum Placement {
    Marked,
    AlreadyMarked,
}

impl<A: AttributeStore> Tracker<A> {
    pub fn new(attributes: A, settings: Settings) -> Self {
        Self {
            store: MarkStore::new(attributes),
            settings,
        }
    }

    pub fn store(&self) -> &MarkStore<A> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mark as many of `candidates` as capacity and uses allow.
    ///
    /// Candidates are taken in the given order. All guards are checked
    /// before anything is written.
    pub fn apply_marks<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        candidates: &[Token],
        host: &H,
    ) -> QuarryResult<ApplySummary> {
        let allowance = Allowance::for_caster(caster);
        let counter = self.store.caster(&caster.id);

        let active = self
            .store
            .count_for_caster(&caster.id, &scene_entities(host))?;
        let slots = allowance.capacity.saturating_sub(active);
        if slots == 0 {
            warn!(caster = %caster.id, active, capacity = allowance.capacity, "apply refused: no capacity");
            return Err(QuarryError::NoCapacity {
                active,
                capacity: allowance.capacity,
            });
        }

        let used = counter.uses_consumed()?;
        let remaining_uses = allowance.uses_per_period.saturating_sub(used);
        if remaining_uses == 0 {
            warn!(caster = %caster.id, used, max = allowance.uses_per_period, "apply refused: no uses");
            return Err(QuarryError::NoUsesRemaining {
                used,
                max: allowance.uses_per_period,
            });
        }

        if candidates.is_empty() {
            return Err(QuarryError::NoTargetsSelected);
        }

        let apply_count = slots.min(remaining_uses as usize).min(candidates.len());
        let (selected, rest) = candidates.split_at(apply_count);

        let mut marked: Vec<&Token> = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        for token in selected {
            match self.place_mark(caster, token, allowance.potency, host) {
                Ok(Placement::Marked) => marked.push(token),
                Ok(Placement::AlreadyMarked) => skipped.push(TargetRef::from(token)),
                Err(err) => {
                    error!(caster = %caster.id, target_id = %token.id, error = %err, "failed to mark target");
                    failed.push(TargetFailure {
                        target: TargetRef::from(token),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let uses_consumed = if marked.is_empty() {
            used
        } else {
            let next = used.saturating_add(1);
            if let Err(err) = counter.set_uses(next) {
                error!(caster = %caster.id, error = %err, "use counter write failed, rolling back batch");
                for token in &marked {
                    let guard = self.store.target(&token.id);
                    if let Err(rollback) = self.retire(&guard, &caster.id, host) {
                        error!(target_id = %token.id, error = %rollback, "rollback failed");
                    }
                }
                return Err(err);
            }
            next
        };

        let summary = ApplySummary {
            caster: caster_ref(caster),
            potency: allowance.potency,
            damage_type: self.settings.damage_type,
            marked: marked.iter().map(|token| TargetRef::from(*token)).collect(),
            skipped,
            not_selected: rest.iter().map(TargetRef::from).collect(),
            uses_consumed,
            uses_max: allowance.uses_per_period,
            slots_before: slots,
            slots_after: slots.saturating_sub(marked.len()),
        };

        if !failed.is_empty() {
            return Err(QuarryError::PartialApply {
                summary: Box::new(summary),
                failed,
            });
        }

        info!(
            caster = %caster.id,
            marked = summary.marked.len(),
            skipped = summary.skipped.len(),
            uses_remaining = summary.uses_remaining(),
            "marks applied"
        );
        host.emit(Notification::MarksApplied(summary.clone()));
        Ok(summary)
    }

    /// Write one mark and its indicator, or neither.
    fn place_mark<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        token: &Token,
        potency: DieExpression,
        host: &H,
    ) -> QuarryResult<Placement> {
        let guard = self.store.target(&token.id);
        if guard.get(&caster.id)?.is_some() {
            debug!(caster = %caster.id, target_id = %token.id, "already marked, skipping");
            return Ok(Placement::AlreadyMarked);
        }

        guard.insert(
            &caster.id,
            Mark {
                potency,
                applied_at: host.now(),
                caster_id: caster.id.clone(),
                caster_name: caster.name.clone(),
            },
        )?;

        if let Err(err) = self.ensure_indicator(&caster.id, &caster.name, &token.id, host) {
            if let Err(rollback) = guard.remove(&caster.id) {
                error!(target_id = %token.id, error = %rollback, "mark rollback failed");
            }
            return Err(err.into());
        }

        Ok(Placement::Marked)
    }

    fn ensure_indicator<H: Indicators + ?Sized>(
        &self,
        caster: &EntityId,
        caster_name: &str,
        target: &EntityId,
        host: &H,
    ) -> Result<(), crate::error::HostError> {
        let existing = host
            .mark_indicators(target)?
            .into_iter()
            .any(|indicator| &indicator.origin == caster);
        if !existing {
            host.create_indicator(
                target,
                &IndicatorSpec {
                    icon: self.settings.mark_indicator_icon.clone(),
                    origin: caster.clone(),
                    label: format!("Marked by {caster_name}"),
                },
            )?;
        }
        Ok(())
    }

    /// Delete `caster`'s mark and indicator on the guarded target.
    ///
    /// The common exit of every path that ends a mark. Both go or
    /// neither does: when the indicator cannot be removed the mark is
    /// written back.
    pub(crate) fn retire<H: Host + ?Sized>(
        &self,
        guard: &TargetGuard<'_, A>,
        caster: &EntityId,
        host: &H,
    ) -> QuarryResult<Option<Mark>> {
        let removed = guard.remove(caster)?;
        if let Err(err) = remove_indicators_from(host, guard.target(), Some(caster)) {
            if let Some(mark) = removed {
                self.reinstate(guard, caster, mark, host);
            }
            return Err(err.into());
        }
        Ok(removed)
    }

    /// Put a retired mark and its indicator back after a later step failed.
    ///
    /// Rollback failures are logged; the caller reports the original error.
    pub(crate) fn reinstate<H: Host + ?Sized>(
        &self,
        guard: &TargetGuard<'_, A>,
        caster: &EntityId,
        mark: Mark,
        host: &H,
    ) {
        let name = mark.caster_name.clone();
        if let Err(err) = guard.insert(caster, mark) {
            error!(target_id = %guard.target(), caster = %caster, error = %err, "mark restore failed");
            return;
        }
        match self.ensure_indicator(caster, &name, guard.target(), host) {
            Ok(()) => warn!(target_id = %guard.target(), caster = %caster, "mark restored after failed step"),
            Err(err) => error!(target_id = %guard.target(), caster = %caster, error = %err, "indicator restore failed"),
        }
    }

    /// Remove `caster`'s mark from `target` on request.
    pub fn remove_mark<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        target: &Token,
        host: &H,
    ) -> QuarryResult<()> {
        let guard = self.store.target(&target.id);
        if guard.get(&caster.id)?.is_none() {
            return Err(QuarryError::NoActiveMark {
                caster: caster.id.clone(),
                target: target.id.clone(),
            });
        }
        self.retire(&guard, &caster.id, host)?;

        info!(caster = %caster.id, target_id = %target.id, "mark removed");
        host.emit(Notification::MarkRemoved {
            caster: caster_ref(caster),
            target: TargetRef::from(target),
        });
        Ok(())
    }

    /// Bonus damage `caster` deals to `target`, if it holds a mark there.
    pub fn bonus_damage(
        &self,
        caster: &EntityId,
        target: &EntityId,
    ) -> QuarryResult<Option<BonusDamage>> {
        Ok(self.store.get(target, caster)?.map(|mark| BonusDamage {
            potency: mark.potency,
            damage_type: self.settings.damage_type,
        }))
    }

    /// Roll the bonus damage for a confirmed hit.
    pub fn roll_bonus_damage<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        target: &Token,
        host: &H,
    ) -> QuarryResult<BonusRoll> {
        let bonus = self.bonus_damage(&caster.id, &target.id)?.ok_or_else(|| {
            QuarryError::NoActiveMark {
                caster: caster.id.clone(),
                target: target.id.clone(),
            }
        })?;
        let total = host.roll(&bonus.potency)?;

        let roll = BonusRoll {
            caster: caster_ref(caster),
            target: TargetRef::from(target),
            bonus,
            total,
        };
        host.emit(Notification::BonusDamage(roll.clone()));
        Ok(roll)
    }

    /// Allowance, usage and held marks of `caster`.
    pub fn status<H: Host + ?Sized>(&self, caster: &Caster, host: &H) -> QuarryResult<CasterStatus> {
        let allowance = Allowance::for_caster(caster);
        let uses_consumed = self.store.uses_consumed(&caster.id)?;

        let mut seen = BTreeSet::new();
        let mut marks = Vec::new();
        for token in host.tokens() {
            if !seen.insert(token.id.clone()) {
                continue;
            }
            if let Some(mark) = self.store.get(&token.id, &caster.id)? {
                marks.push(HeldMark {
                    target: TargetRef::from(&token),
                    potency: mark.potency,
                });
            }
        }

        Ok(CasterStatus {
            caster: caster_ref(caster),
            potency: allowance.potency,
            damage_type: self.settings.damage_type,
            capacity: allowance.capacity,
            uses_consumed,
            uses_max: allowance.uses_per_period,
            marks,
        })
    }

    /// Convert a failed action into a user-visible notification.
    pub fn report_failure<H: Host + ?Sized>(&self, err: &QuarryError, host: &H) {
        let severity = err.severity();
        match severity {
            Severity::Warning => warn!(error = %err, "action refused"),
            Severity::Error => error!(error = %err, "action failed"),
        }
        host.emit(Notification::Failure {
            severity,
            message: err.to_string(),
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
