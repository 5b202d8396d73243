//! # Unleash Resolver
//!
//! Consumes an existing mark to produce exactly one aspect:
//!
//! ```text
//! Marked ──► Detonation   ─┐
//!        ──► Sight        ─┼──► mark + indicator deleted ──► Unmarked
//!        ──► Regeneration ─┘
//! ```
//!
//! The whole sequence runs inside the target's critical section, so a
//! second Unleash or removal racing on the same pair finds no mark and
//! fails with `NoActiveMark`:
//!
//! 1. read the mark and roll, building the report without touching the host
//! 2. delete the mark and its indicator together
//! 3. commit the buff or heal; if that fails, restore the mark
//!
//! A mark is therefore never consumed without its effect, and an effect
//! is never applied while the mark survives.

use crate::attributes::AttributeStore;
use crate::engine::{TargetRef, Tracker};
use crate::error::{HostError, QuarryError, QuarryResult};
use crate::host::{Buff, Host, SIGHT_ICON, Skill};
use crate::notice::Notification;
use crate::primitives::{
    Caster, DETONATION_RADIUS, DieExpression, SIGHT_DURATION_SECS, Token,
};
use crate::settings::DamageType;
use crate::spatial::tokens_within;
use crate::store::Mark;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

/// The three ways to consume a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aspect {
    Detonation,
    Sight,
    Regeneration,
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detonation => "detonation",
            Self::Sight => "sight",
            Self::Regeneration => "regeneration",
        })
    }
}

impl FromStr for Aspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detonation" => Ok(Self::Detonation),
            "sight" => Ok(Self::Sight),
            "regeneration" => Ok(Self::Regeneration),
            other => Err(format!("unknown aspect: {other}")),
        }
    }
}

// =============================================================================
// REPORTS
// =============================================================================

/// One token caught in a Detonation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetonationHit {
    pub target: TargetRef,
    pub amount: u32,
}

/// Outcome of a Detonation. Applying the damage is left to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetonationReport {
    pub caster: TargetRef,
    pub target: TargetRef,
    pub potency: DieExpression,
    pub total: u32,
    pub damage_type: DamageType,
    /// Radius in distance units.
    pub radius: u32,
    pub hits: Vec<DetonationHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightReport {
    pub caster: TargetRef,
    pub target: TargetRef,
    pub buff: Buff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub caster: TargetRef,
    pub target: TargetRef,
    pub potency: DieExpression,
    pub rolled: u32,
    pub healed: i64,
    pub vitality_after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "aspect", rename_all = "lowercase")]
pub enum UnleashReport {
    Detonation(DetonationReport),
    Sight(SightReport),
    Regeneration(RegenerationReport),
}

impl UnleashReport {
    #[must_use]
    pub fn aspect(&self) -> Aspect {
        match self {
            Self::Detonation(_) => Aspect::Detonation,
            Self::Sight(_) => Aspect::Sight,
            Self::Regeneration(_) => Aspect::Regeneration,
        }
    }
}

impl fmt::Display for UnleashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detonation(report) => {
                write!(
                    f,
                    "{} unleashes Detonation on {}: {} ({}) {} to all within {} units",
                    report.caster.name,
                    report.target.name,
                    report.total,
                    report.potency,
                    report.damage_type,
                    report.radius
                )?;
                for hit in &report.hits {
                    write!(f, "; {} takes {}", hit.target.name, hit.amount)?;
                }
                Ok(())
            }
            Self::Sight(report) => write!(
                f,
                "{} unleashes Sight on {} ({} seconds)",
                report.caster.name, report.target.name, report.buff.duration_secs
            ),
            Self::Regeneration(report) => write!(
                f,
                "{} unleashes Regeneration (heals {})",
                report.caster.name, report.healed
            ),
        }
    }
}

fn caster_ref(caster: &Caster) -> TargetRef {
    TargetRef {
        id: caster.id.clone(),
        name: caster.name.clone(),
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

impl<A: AttributeStore> Tracker<A> {
    /// Consume `caster`'s mark on `target` with `aspect`.
    ///
    /// Without a mark nothing happens and `NoActiveMark` is returned.
    /// A failed effect leaves the mark in place.
    pub fn unleash<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        target: &Token,
        aspect: Aspect,
        host: &H,
    ) -> QuarryResult<UnleashReport> {
        let guard = self.store().target(&target.id);
        let mark = guard
            .get(&caster.id)?
            .ok_or_else(|| QuarryError::NoActiveMark {
                caster: caster.id.clone(),
                target: target.id.clone(),
            })?;

        let report = match aspect {
            Aspect::Detonation => self.detonate(caster, target, &mark, host)?,
            Aspect::Sight => Self::sight(caster, target),
            Aspect::Regeneration => Self::regenerate(caster, target, &mark, host)?,
        };

        self.retire(&guard, &caster.id, host)?;
        if let Err(err) = Self::commit(caster, &report, host) {
            error!(caster = %caster.id, target_id = %target.id, aspect = %aspect, error = %err, "effect failed, restoring mark");
            self.reinstate(&guard, &caster.id, mark, host);
            return Err(err.into());
        }

        info!(caster = %caster.id, target_id = %target.id, aspect = %aspect, "mark unleashed");
        host.emit(Notification::Unleashed(report.clone()));
        Ok(report)
    }

    /// Unleash with the aspect picked in a prompt; `None` means the
    /// prompt was closed, which cancels before anything is read.
    pub fn unleash_choice<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        target: &Token,
        choice: Option<Aspect>,
        host: &H,
    ) -> QuarryResult<UnleashReport> {
        let aspect = choice.ok_or(QuarryError::Cancelled)?;
        self.unleash(caster, target, aspect, host)
    }

    fn detonate<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        target: &Token,
        mark: &Mark,
        host: &H,
    ) -> QuarryResult<UnleashReport> {
        let tokens = host.tokens();
        let own_disposition = host.token_of(&caster.id).map(|token| token.disposition);
        let friendly_fire = self.settings().detonation_friendly_fire;

        let total = host.roll(&mark.potency)?;
        let hits = tokens_within(&tokens, target.center, DETONATION_RADIUS, host.grid())
            .filter(|token| friendly_fire || Some(token.disposition) != own_disposition)
            .map(|token| DetonationHit {
                target: TargetRef::from(token),
                amount: total,
            })
            .collect();

        Ok(UnleashReport::Detonation(DetonationReport {
            caster: caster_ref(caster),
            target: TargetRef::from(target),
            potency: mark.potency,
            total,
            damage_type: self.settings().damage_type,
            radius: DETONATION_RADIUS,
            hits,
        }))
    }

    fn sight(caster: &Caster, target: &Token) -> UnleashReport {
        let buff = Buff {
            name: "Unleash: Sight (Perception/Survival Advantage)".to_string(),
            icon: SIGHT_ICON.to_string(),
            origin: caster.id.clone(),
            source_target: target.id.clone(),
            duration_secs: SIGHT_DURATION_SECS,
            advantage_on: vec![Skill::Perception, Skill::Survival],
        };

        UnleashReport::Sight(SightReport {
            caster: caster_ref(caster),
            target: TargetRef::from(target),
            buff,
        })
    }

    fn regenerate<H: Host + ?Sized>(
        caster: &Caster,
        target: &Token,
        mark: &Mark,
        host: &H,
    ) -> QuarryResult<UnleashReport> {
        let rolled = host.roll(&mark.potency)?;
        let healed = (i64::from(caster.mental_modifier) + i64::from(rolled)).max(1);
        let vitality_after = caster.vitality.healed_by(healed);

        Ok(UnleashReport::Regeneration(RegenerationReport {
            caster: caster_ref(caster),
            target: TargetRef::from(target),
            potency: mark.potency,
            rolled,
            healed,
            vitality_after,
        }))
    }

    /// Apply the host side of a computed effect. Detonation only reports.
    fn commit<H: Host + ?Sized>(
        caster: &Caster,
        report: &UnleashReport,
        host: &H,
    ) -> Result<(), HostError> {
        match report {
            UnleashReport::Detonation(_) => Ok(()),
            // The caster is buffed, not the marked target
            UnleashReport::Sight(sight) => host.grant_buff(&caster.id, &sight.buff),
            UnleashReport::Regeneration(regen) => {
                host.set_vitality(&caster.id, regen.vitality_after)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::MemoryAttributes;
    use crate::primitives::{Disposition, Point};
    use crate::settings::Settings;
    use crate::spatial::GridScale;
    use crate::store::MARKS_KEY;
    use crate::test_support::{FakeHost, FlakyAttributes, goblin, ranger};

    fn tracker_with(settings: Settings) -> Tracker<MemoryAttributes> {
        Tracker::new(MemoryAttributes::new(), settings)
    }

    fn marked_setup(host: &FakeHost, caster: &Caster, tracker: &Tracker<MemoryAttributes>) -> Token {
        let target = host.place(goblin("g1", 500, 500));
        tracker.apply_marks(caster, &[target.clone()], host).unwrap();
        target
    }

    #[test]
    fn detonation_hits_everything_in_range() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new()
            .with_grid(GridScale::new(50, 5))
            .with_rolls([4]);
        let caster = ranger(1);
        let target = marked_setup(&host, &caster, &tracker);
        host.place(goblin("near", 580, 560));
        host.place(goblin("far", 700, 500));

        let report = tracker
            .unleash(&caster, &target, Aspect::Detonation, &host)
            .unwrap();

        let UnleashReport::Detonation(report) = report else {
            panic!("expected detonation");
        };
        assert_eq!(report.total, 4);
        assert_eq!(report.damage_type, DamageType::Force);
        let hit: Vec<&str> = report.hits.iter().map(|h| h.target.id.as_str()).collect();
        assert_eq!(hit, vec!["g1", "near"]);
        assert!(report.hits.iter().all(|h| h.amount == 4));
        assert!(tracker.store().get(&target.id, &caster.id).unwrap().is_none());
        assert!(host.indicators_on(&target.id).is_empty());
        // Damage is reported, never applied
        assert!(host.buffs_of(&caster.id).is_empty());
        assert_eq!(host.vitality_of(&caster.id), None);
        assert_eq!(host.vitality_of(&target.id), None);
    }

    #[test]
    fn detonation_spares_allies_without_friendly_fire() {
        let settings = Settings {
            detonation_friendly_fire: false,
            damage_type: DamageType::Thunder,
            ..Settings::default()
        };
        let tracker = tracker_with(settings);
        let host = FakeHost::new()
            .with_grid(GridScale::new(50, 5))
            .with_rolls([3]);
        let caster = ranger(1);
        host.place(Token::new(
            caster.id.as_str(),
            "Ranger",
            Point::new(540, 500),
            Disposition::Friendly,
        ));
        host.place(Token::new("ally", "Ally", Point::new(520, 500), Disposition::Friendly));
        let target = marked_setup(&host, &caster, &tracker);

        let UnleashReport::Detonation(report) = tracker
            .unleash(&caster, &target, Aspect::Detonation, &host)
            .unwrap()
        else {
            panic!("expected detonation");
        };

        let hit: Vec<&str> = report.hits.iter().map(|h| h.target.id.as_str()).collect();
        assert_eq!(hit, vec!["g1"]);
        assert_eq!(report.damage_type, DamageType::Thunder);
    }

    #[test]
    fn sight_buffs_the_caster_only() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(3);
        let target = marked_setup(&host, &caster, &tracker);

        tracker.unleash(&caster, &target, Aspect::Sight, &host).unwrap();

        let buffs = host.buffs_of(&caster.id);
        assert_eq!(buffs.len(), 1);
        assert_eq!(buffs[0].duration_secs, 60);
        assert_eq!(buffs[0].advantage_on, vec![Skill::Perception, Skill::Survival]);
        assert!(host.buffs_of(&target.id).is_empty());
        assert!(tracker.store().get(&target.id, &caster.id).unwrap().is_none());
    }

    #[test]
    fn regeneration_heals_at_least_one() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new().with_rolls([1]);
        let caster = ranger(1).with_abilities(4, -3).with_vitality(5, 20);
        let target = marked_setup(&host, &caster, &tracker);

        let UnleashReport::Regeneration(report) = tracker
            .unleash(&caster, &target, Aspect::Regeneration, &host)
            .unwrap()
        else {
            panic!("expected regeneration");
        };

        assert_eq!(report.healed, 1);
        assert_eq!(report.vitality_after, 6);
        assert_eq!(host.vitality_of(&caster.id), Some(6));
        assert!(host.buffs_of(&caster.id).is_empty());
        assert!(host.buffs_of(&target.id).is_empty());
    }

    #[test]
    fn regeneration_never_exceeds_max() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new().with_rolls([6]);
        let caster = ranger(1).with_abilities(2, 3).with_vitality(18, 20);
        let target = marked_setup(&host, &caster, &tracker);

        let UnleashReport::Regeneration(report) = tracker
            .unleash(&caster, &target, Aspect::Regeneration, &host)
            .unwrap()
        else {
            panic!("expected regeneration");
        };

        assert_eq!(report.healed, 9);
        assert_eq!(report.vitality_after, 20);
    }

    #[test]
    fn second_unleash_finds_no_mark() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let target = marked_setup(&host, &caster, &tracker);

        assert!(tracker.unleash(&caster, &target, Aspect::Sight, &host).is_ok());
        let err = tracker
            .unleash(&caster, &target, Aspect::Sight, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::NoActiveMark { .. }));
        assert_eq!(host.buffs_of(&caster.id).len(), 1);
    }

    #[test]
    fn unmarked_target_has_no_effect() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new().with_rolls([6]);
        let caster = ranger(1).with_vitality(5, 20);
        let target = host.place(goblin("g1", 0, 0));

        let err = tracker
            .unleash(&caster, &target, Aspect::Regeneration, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::NoActiveMark { .. }));
        assert_eq!(host.vitality_of(&caster.id), None);
        assert!(host.notifications().is_empty());
    }

    #[test]
    fn failed_effect_keeps_the_mark() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let target = marked_setup(&host, &caster, &tracker);
        host.fail_dice();

        let err = tracker
            .unleash(&caster, &target, Aspect::Detonation, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::Host(_)));
        assert!(tracker.store().get(&target.id, &caster.id).unwrap().is_some());
        assert_eq!(host.indicators_on(&target.id).len(), 1);
    }

    #[test]
    fn failed_mark_delete_grants_nothing_and_retries_once() {
        let attributes = FlakyAttributes::failing_key(MARKS_KEY);
        attributes.set_failing(false);
        let tracker = Tracker::new(attributes, Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let target = host.place(goblin("g1", 500, 500));
        tracker.apply_marks(&caster, &[target.clone()], &host).unwrap();

        tracker.store().attributes().set_failing(true);
        let err = tracker
            .unleash(&caster, &target, Aspect::Sight, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::StoreWriteFailed(_)));
        assert!(host.buffs_of(&caster.id).is_empty());
        assert!(tracker.store().get(&target.id, &caster.id).unwrap().is_some());
        assert_eq!(host.indicators_on(&target.id).len(), 1);

        tracker.store().attributes().set_failing(false);
        tracker.unleash(&caster, &target, Aspect::Sight, &host).unwrap();
        let again = tracker.unleash(&caster, &target, Aspect::Sight, &host);

        assert!(matches!(again, Err(QuarryError::NoActiveMark { .. })));
        assert_eq!(host.buffs_of(&caster.id).len(), 1);
    }

    #[test]
    fn stuck_indicator_keeps_mark_and_withholds_effect() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let target = marked_setup(&host, &caster, &tracker);
        host.stick_indicators(true);

        let err = tracker
            .unleash(&caster, &target, Aspect::Sight, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::Host(_)));
        assert!(host.buffs_of(&caster.id).is_empty());
        assert!(tracker.store().get(&target.id, &caster.id).unwrap().is_some());
        assert_eq!(host.indicators_on(&target.id).len(), 1);

        host.stick_indicators(false);
        tracker.unleash(&caster, &target, Aspect::Sight, &host).unwrap();
        assert_eq!(host.buffs_of(&caster.id).len(), 1);
        assert!(host.indicators_on(&target.id).is_empty());
    }

    #[test]
    fn rejected_heal_restores_mark_and_indicator() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new().with_rolls([3]);
        let caster = ranger(1).with_vitality(5, 20);
        let target = marked_setup(&host, &caster, &tracker);
        host.fail_actors();

        let err = tracker
            .unleash(&caster, &target, Aspect::Regeneration, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::Host(_)));
        assert_eq!(host.vitality_of(&caster.id), None);
        let mark = tracker.store().get(&target.id, &caster.id).unwrap().unwrap();
        assert_eq!(mark.caster_name, caster.name);
        let indicators = host.indicators_on(&target.id);
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].origin, caster.id);
        assert!(
            !host
                .notifications()
                .iter()
                .any(|n| matches!(n, Notification::Unleashed(_)))
        );
    }

    #[test]
    fn closed_prompt_cancels() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let target = marked_setup(&host, &caster, &tracker);

        let err = tracker
            .unleash_choice(&caster, &target, None, &host)
            .unwrap_err();

        assert!(matches!(err, QuarryError::Cancelled));
        assert!(tracker.store().get(&target.id, &caster.id).unwrap().is_some());
    }

    #[test]
    fn racing_unleashes_resolve_once() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let target = marked_setup(&host, &caster, &tracker);

        let successes = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        tracker
                            .unleash(&caster, &target, Aspect::Sight, &host)
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(successes, 1);
        assert_eq!(host.buffs_of(&caster.id).len(), 1);
    }

    #[test]
    fn applies_racing_unleash_and_removal_lose_no_mark() {
        let tracker = tracker_with(Settings::default());
        let host = FakeHost::new();
        let caster = ranger(1);
        let scout = Caster::new("scout", "Scout", 1);
        let target = marked_setup(&host, &caster, &tracker);
        tracker.apply_marks(&scout, &[target.clone()], &host).unwrap();
        let hunters: Vec<Caster> = (0..8)
            .map(|i| Caster::new(format!("hunter-{i}"), format!("Hunter {i}"), 1))
            .collect();

        let (tracker, host, target) = (&tracker, &host, &target);
        std::thread::scope(|scope| {
            for hunter in &hunters {
                scope.spawn(move || {
                    tracker
                        .apply_marks(hunter, std::slice::from_ref(target), host)
                        .unwrap()
                });
            }
            scope.spawn(|| {
                tracker
                    .unleash(&caster, target, Aspect::Sight, host)
                    .unwrap()
            });
            scope.spawn(|| tracker.remove_mark(&scout, target, host).unwrap());
        });

        let marks = tracker.store().marks_on(&target.id).unwrap();
        assert_eq!(marks.len(), hunters.len());
        assert!(hunters.iter().all(|hunter| marks.contains(&hunter.id)));
        assert!(!marks.contains(&caster.id));
        assert!(!marks.contains(&scout.id));

        let indicators = host.indicators_on(&target.id);
        assert_eq!(indicators.len(), hunters.len());
        assert!(indicators.iter().all(|i| marks.contains(&i.origin)));
        assert_eq!(host.buffs_of(&caster.id).len(), 1);
    }

    #[test]
    fn aspect_parses() {
        assert_eq!("Detonation".parse::<Aspect>(), Ok(Aspect::Detonation));
        assert!("fireball".parse::<Aspect>().is_err());
    }
}
