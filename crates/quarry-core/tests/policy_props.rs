//! Property tests for the resource policy and apply accounting.

#![allow(clippy::unwrap_used, clippy::panic)]

use proptest::prelude::*;
use quarry_core::{
    Actors, Buff, Caster, Clock, Dice, DieExpression, Disposition, EntityId, GridScale,
    HostError, Indicator, IndicatorHandle, IndicatorSpec, Indicators, MemoryAttributes, Notifier,
    Notification, Point, QuarryError, Scene, Settings, Timestamp, Token, Tracker, capacity,
    potency, uses_per_period,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

// =============================================================================
// MINIMAL HOST
// =============================================================================

/// Scene of fixed tokens; indicators kept in memory, dice always max.
struct Table {
    tokens: Vec<Token>,
    indicators: Mutex<BTreeMap<EntityId, Vec<Indicator>>>,
}

impl Table {
    fn with_goblins(n: usize) -> Self {
        let tokens = (0..n)
            .map(|i| {
                Token::new(
                    format!("g{i}"),
                    format!("Goblin {i}"),
                    Point::new(i as i64 * 100, 0),
                    Disposition::Hostile,
                )
            })
            .collect();
        Self {
            tokens,
            indicators: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Scene for Table {
    fn tokens(&self) -> Vec<Token> {
        self.tokens.clone()
    }

    fn grid(&self) -> GridScale {
        GridScale::default()
    }
}

impl Indicators for Table {
    fn create_indicator(
        &self,
        target: &EntityId,
        spec: &IndicatorSpec,
    ) -> Result<IndicatorHandle, HostError> {
        let handle = IndicatorHandle(format!("{target}/{}", spec.origin));
        self.indicators
            .lock()
            .unwrap()
            .entry(target.clone())
            .or_default()
            .push(Indicator {
                handle: handle.clone(),
                origin: spec.origin.clone(),
                label: spec.label.clone(),
            });
        Ok(handle)
    }

    fn remove_indicator(&self, handle: &IndicatorHandle) -> Result<(), HostError> {
        for list in self.indicators.lock().unwrap().values_mut() {
            list.retain(|i| &i.handle != handle);
        }
        Ok(())
    }

    fn mark_indicators(&self, target: &EntityId) -> Result<Vec<Indicator>, HostError> {
        Ok(self
            .indicators
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default())
    }
}

impl Dice for Table {
    fn roll(&self, expr: &DieExpression) -> Result<u32, HostError> {
        Ok(expr.max_total())
    }
}

impl Notifier for Table {
    fn emit(&self, _notification: Notification) {}
}

impl Actors for Table {
    fn set_vitality(&self, _actor: &EntityId, _value: i64) -> Result<(), HostError> {
        Ok(())
    }

    fn grant_buff(&self, _actor: &EntityId, _buff: &Buff) -> Result<(), HostError> {
        Ok(())
    }
}

impl Clock for Table {
    fn now(&self) -> Timestamp {
        Timestamp(0)
    }
}

// =============================================================================
// POLICY PROPERTIES
// =============================================================================

proptest! {
    /// Potency never weakens as level grows
    #[test]
    fn potency_is_monotonic(level in 0u32..40) {
        let here = potency(level);
        let next = potency(level + 1);
        prop_assert!(next.max_total() >= here.max_total());
        prop_assert!(next.min_total() >= here.min_total());
    }

    /// Capacity never shrinks and stays within 1..=3
    #[test]
    fn capacity_is_monotonic_and_bounded(level in 0u32..40) {
        let here = capacity(level);
        prop_assert!((1..=3).contains(&here));
        prop_assert!(capacity(level + 1) >= here);
    }

    /// Uses per period are the ability sum floored at zero
    #[test]
    fn uses_are_floored_sum(prof in -10i32..10, modifier in -10i32..10) {
        let expected = (prof + modifier).max(0) as u32;
        prop_assert_eq!(uses_per_period(prof, modifier), expected);
    }
}

// =============================================================================
// APPLY ACCOUNTING
// =============================================================================

proptest! {
    /// One action marks min(capacity, candidates) and spends one use
    #[test]
    fn apply_marks_up_to_capacity(level in 1u32..20, candidates in 1usize..6) {
        let table = Table::with_goblins(candidates);
        let tracker = Tracker::new(MemoryAttributes::new(), Settings::default());
        let caster = Caster::new("ranger", "Ranger", level).with_abilities(2, 1);

        let summary = tracker.apply_marks(&caster, &table.tokens, &table).unwrap();

        let expected = capacity(level).min(candidates);
        prop_assert_eq!(summary.marked.len(), expected);
        prop_assert_eq!(summary.not_selected.len(), candidates - expected);
        prop_assert_eq!(tracker.store().uses_consumed(&caster.id).unwrap(), 1);
        prop_assert_eq!(summary.potency, potency(level));
    }

    /// A caster never holds more marks than its capacity, however often it applies
    #[test]
    fn marks_never_exceed_capacity(level in 1u32..20, rounds in 1usize..6) {
        let table = Table::with_goblins(4);
        let tracker = Tracker::new(MemoryAttributes::new(), Settings::default());
        let caster = Caster::new("ranger", "Ranger", level).with_abilities(4, 4);

        for round in 0..rounds {
            let start = round % table.tokens.len();
            let order: Vec<Token> = table.tokens[start..]
                .iter()
                .chain(&table.tokens[..start])
                .cloned()
                .collect();
            match tracker.apply_marks(&caster, &order, &table) {
                Ok(_) | Err(QuarryError::NoCapacity { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let ids: Vec<EntityId> = table.tokens.iter().map(|t| t.id.clone()).collect();
        let held = tracker.store().count_for_caster(&caster.id, &ids).unwrap();
        prop_assert!(held <= capacity(level));
    }
}

#[test]
fn spent_caster_cannot_apply() {
    let table = Table::with_goblins(1);
    let tracker = Tracker::new(MemoryAttributes::new(), Settings::default());
    let caster = Caster::new("ranger", "Ranger", 1).with_abilities(0, 0);

    let err = tracker
        .apply_marks(&caster, &table.tokens, &table)
        .unwrap_err();

    assert!(matches!(err, QuarryError::NoUsesRemaining { used: 0, max: 0 }));
    assert!(tracker.store().marks_on(&table.tokens[0].id).unwrap().is_empty());
}
