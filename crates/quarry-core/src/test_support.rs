//! In-memory host and flaky storage used by unit tests.

#![allow(clippy::unwrap_used)]

use crate::attributes::{AttributeStore, MemoryAttributes};
use crate::error::{HostError, StoreError};
use crate::host::{
    Actors, Buff, Clock, Dice, Indicator, IndicatorHandle, IndicatorSpec, Indicators, Notifier,
    Scene,
};
use crate::notice::Notification;
use crate::primitives::{Caster, DieExpression, Disposition, EntityId, Point, Timestamp, Token};
use crate::spatial::GridScale;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A hostile token.
pub fn goblin(id: &str, x: i64, y: i64) -> Token {
    Token::new(id, format!("Goblin {id}"), Point::new(x, y), Disposition::Hostile)
}

/// The default test caster: proficiency 2, modifier 1, three uses.
pub fn ranger(level: u32) -> Caster {
    Caster::new("ranger", "Ranger", level)
        .with_abilities(2, 1)
        .with_vitality(10, 20)
}

#[derive(Default)]
pub struct FakeHost {
    tokens: Mutex<Vec<Token>>,
    grid: Mutex<GridScale>,
    indicators: Mutex<BTreeMap<EntityId, Vec<Indicator>>>,
    failing_indicators: Mutex<BTreeSet<EntityId>>,
    stuck_indicators: AtomicBool,
    actors_broken: AtomicBool,
    rolls: Mutex<VecDeque<u32>>,
    dice_broken: AtomicBool,
    buffs: Mutex<BTreeMap<EntityId, Vec<Buff>>>,
    vitality: Mutex<BTreeMap<EntityId, i64>>,
    notifications: Mutex<Vec<Notification>>,
    next_handle: AtomicU64,
    ticks: AtomicU64,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue dice results. Once drained, rolls return the maximum.
    pub fn with_rolls(self, rolls: impl IntoIterator<Item = u32>) -> Self {
        self.rolls.lock().unwrap().extend(rolls);
        self
    }

    pub fn with_grid(self, grid: GridScale) -> Self {
        *self.grid.lock().unwrap() = grid;
        self
    }

    pub fn place(&self, token: Token) -> Token {
        self.tokens.lock().unwrap().push(token.clone());
        token
    }

    pub fn fail_indicators_on(&self, target: &EntityId) {
        self.failing_indicators.lock().unwrap().insert(target.clone());
    }

    /// Make indicator removal fail everywhere while `stuck` holds.
    pub fn stick_indicators(&self, stuck: bool) {
        self.stuck_indicators.store(stuck, Ordering::SeqCst);
    }

    /// Make buff grants and vitality writes fail.
    pub fn fail_actors(&self) {
        self.actors_broken.store(true, Ordering::SeqCst);
    }

    pub fn fail_dice(&self) {
        self.dice_broken.store(true, Ordering::SeqCst);
    }

    pub fn indicators_on(&self, target: &EntityId) -> Vec<Indicator> {
        self.indicators
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    pub fn buffs_of(&self, actor: &EntityId) -> Vec<Buff> {
        self.buffs
            .lock()
            .unwrap()
            .get(actor)
            .cloned()
            .unwrap_or_default()
    }

    pub fn vitality_of(&self, actor: &EntityId) -> Option<i64> {
        self.vitality.lock().unwrap().get(actor).copied()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl Scene for FakeHost {
    fn tokens(&self) -> Vec<Token> {
        self.tokens.lock().unwrap().clone()
    }

    fn grid(&self) -> GridScale {
        *self.grid.lock().unwrap()
    }
}

impl Indicators for FakeHost {
    fn create_indicator(
        &self,
        target: &EntityId,
        spec: &IndicatorSpec,
    ) -> Result<IndicatorHandle, HostError> {
        if self.failing_indicators.lock().unwrap().contains(target) {
            return Err(HostError::new(format!("cannot draw on {target}")));
        }
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = IndicatorHandle(format!("ind-{n}"));
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
        if self.stuck_indicators.load(Ordering::SeqCst) {
            return Err(HostError::new(format!("cannot erase {}", handle.0)));
        }
        for list in self.indicators.lock().unwrap().values_mut() {
            list.retain(|indicator| &indicator.handle != handle);
        }
        Ok(())
    }

    fn mark_indicators(&self, target: &EntityId) -> Result<Vec<Indicator>, HostError> {
        Ok(self.indicators_on(target))
    }
}

impl Dice for FakeHost {
    fn roll(&self, expr: &DieExpression) -> Result<u32, HostError> {
        if self.dice_broken.load(Ordering::SeqCst) {
            return Err(HostError::new("dice unavailable"));
        }
        Ok(self
            .rolls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| expr.max_total()))
    }
}

impl Notifier for FakeHost {
    fn emit(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

impl Actors for FakeHost {
    fn set_vitality(&self, actor: &EntityId, value: i64) -> Result<(), HostError> {
        if self.actors_broken.load(Ordering::SeqCst) {
            return Err(HostError::new(format!("{actor} is locked")));
        }
        self.vitality.lock().unwrap().insert(actor.clone(), value);
        Ok(())
    }

    fn grant_buff(&self, actor: &EntityId, buff: &Buff) -> Result<(), HostError> {
        if self.actors_broken.load(Ordering::SeqCst) {
            return Err(HostError::new(format!("{actor} is locked")));
        }
        self.buffs
            .lock()
            .unwrap()
            .entry(actor.clone())
            .or_default()
            .push(buff.clone());
        Ok(())
    }
}

impl Clock for FakeHost {
    fn now(&self) -> Timestamp {
        Timestamp(1_000 + self.ticks.fetch_add(1, Ordering::SeqCst))
    }
}

/// Memory attributes that refuse writes and deletes on one key while
/// failing. Starts out failing.
pub struct FlakyAttributes {
    inner: MemoryAttributes,
    failing_key: &'static str,
    failing: AtomicBool,
}

impl FlakyAttributes {
    pub fn failing_key(key: &'static str) -> Self {
        Self {
            inner: MemoryAttributes::new(),
            failing_key: key,
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if key == self.failing_key && self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("write to {key} rejected")));
        }
        Ok(())
    }
}

impl AttributeStore for FlakyAttributes {
    fn get_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_attribute(entity, namespace, key)
    }

    fn set_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set_attribute(entity, namespace, key, value)
    }

    fn delete_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.delete_attribute(entity, namespace, key)
    }
}
