//! # Mark Store
//!
//! Durable per-target, per-caster mark state, plus the caster's use
//! counter, persisted through an [`AttributeStore`].
//!
//! ## Layout
//!
//! - Target entity, key `marks`: the target's [`MarkMap`], keyed by
//!   caster id. Stored on the target because several casters may mark
//!   the same target independently.
//! - Caster entity, key `uses`: apply actions consumed this period.
//!
//! ## Serialization of read-modify-write
//!
//! Every mutation of a mark map is get → mutate → write back. Two
//! interleaved sequences on one target would lose an entry, so all
//! access goes through a [`TargetGuard`] holding that target's lock for
//! the whole sequence. Use counters get the same treatment through
//! [`CasterGuard`]. Caster locks and target locks live in separate
//! tables and are always taken caster-first.

use crate::attributes::{AttributeStore, NAMESPACE};
use crate::error::{QuarryError, QuarryResult, StoreError};
use crate::primitives::{DieExpression, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Attribute key of the mark map on a target.
pub const MARKS_KEY: &str = "marks";

/// Attribute key of the use counter on a caster.
pub const USES_KEY: &str = "uses";

/// Number of lock stripes per lock table.
const LOCK_STRIPES: usize = 64;

// =============================================================================
// MARK
// =============================================================================

/// One caster's mark on one target. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    /// Damage die, fixed from the caster's level at application time.
    pub potency: DieExpression,
    pub applied_at: Timestamp,
    pub caster_id: EntityId,
    pub caster_name: String,
}

// =============================================================================
// MARK MAP
// =============================================================================

/// All marks carried by one target, keyed by caster.
///
/// On the wire this is a sequence of `(caster, mark)` entries, so a
/// corrupted payload holding two entries for one caster stays
/// observable when decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkMap {
    entries: BTreeMap<EntityId, Mark>,
}

/// Result of decoding a stored mark map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMarks {
    pub map: MarkMap,
    /// Casters that appeared more than once in the payload.
    pub duplicates: Vec<EntityId>,
}

impl MarkMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, caster: &EntityId) -> Option<&Mark> {
        self.entries.get(caster)
    }

    pub fn insert(&mut self, caster: EntityId, mark: Mark) -> Option<Mark> {
        self.entries.insert(caster, mark)
    }

    pub fn remove(&mut self, caster: &EntityId) -> Option<Mark> {
        self.entries.remove(caster)
    }

    #[must_use]
    pub fn contains(&self, caster: &EntityId) -> bool {
        self.entries.contains_key(caster)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in caster order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Mark)> {
        self.entries.iter()
    }

    /// Casters holding a mark on this target.
    pub fn casters(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    /// Encode as a postcard sequence of entries.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let entries: Vec<(&EntityId, &Mark)> = self.entries.iter().collect();
        Ok(postcard::to_allocvec(&entries)?)
    }

    /// Decode a postcard sequence of entries.
    ///
    /// Duplicate casters collapse to the most recently applied entry;
    /// on equal timestamps the later entry wins.
    pub fn decode(bytes: &[u8]) -> Result<DecodedMarks, StoreError> {
        let raw: Vec<(EntityId, Mark)> = postcard::from_bytes(bytes)?;
        let mut map = Self::new();
        let mut duplicates = Vec::new();

        for (caster, mark) in raw {
            match map.entries.get(&caster) {
                Some(existing) => {
                    duplicates.push(caster.clone());
                    if mark.applied_at >= existing.applied_at {
                        map.entries.insert(caster, mark);
                    }
                }
                None => {
                    map.entries.insert(caster, mark);
                }
            }
        }

        Ok(DecodedMarks { map, duplicates })
    }
}

// =============================================================================
// LOCKS
// =============================================================================

/// Fixed table of mutexes; an entity id always maps to the same stripe.
#[derive(Debug)]
struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, id: &EntityId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// MARK STORE
// =============================================================================

/// Mark and use-counter persistence over an attribute store.
#[derive(Debug)]
pub struct MarkStore<A> {
    attributes: A,
    target_locks: StripedLocks,
    caster_locks: StripedLocks,
}

impl<A: AttributeStore> MarkStore<A> {
    pub fn new(attributes: A) -> Self {
        Self {
            attributes,
            target_locks: StripedLocks::new(LOCK_STRIPES),
            caster_locks: StripedLocks::new(LOCK_STRIPES),
        }
    }

    /// The underlying attribute store.
    pub fn attributes(&self) -> &A {
        &self.attributes
    }

    /// Enter the critical section of one target.
    pub fn target(&self, target: &EntityId) -> TargetGuard<'_, A> {
        let lock = self.target_locks.lock(target);
        TargetGuard {
            attributes: &self.attributes,
            target: target.clone(),
            _lock: lock,
        }
    }

    /// Enter the critical section of one caster's counter.
    pub fn caster(&self, caster: &EntityId) -> CasterGuard<'_, A> {
        let lock = self.caster_locks.lock(caster);
        CasterGuard {
            attributes: &self.attributes,
            caster: caster.clone(),
            _lock: lock,
        }
    }

    /// The mark `caster` holds on `target`, if any.
    pub fn get(&self, target: &EntityId, caster: &EntityId) -> QuarryResult<Option<Mark>> {
        self.target(target).get(caster)
    }

    /// Write `caster`'s mark on `target`, replacing any previous one.
    pub fn set(&self, target: &EntityId, caster: &EntityId, mark: Mark) -> QuarryResult<()> {
        self.target(target).insert(caster, mark)
    }

    /// Remove `caster`'s mark from `target`, returning it.
    pub fn delete(&self, target: &EntityId, caster: &EntityId) -> QuarryResult<Option<Mark>> {
        self.target(target).remove(caster)
    }

    /// Every mark on `target`.
    pub fn marks_on(&self, target: &EntityId) -> QuarryResult<MarkMap> {
        self.target(target).all()
    }

    /// How many of `targets` carry a mark from `caster`.
    pub fn count_for_caster<'t>(
        &self,
        caster: &EntityId,
        targets: impl IntoIterator<Item = &'t EntityId>,
    ) -> QuarryResult<usize> {
        let mut count = 0usize;
        for target in targets {
            if self.get(target, caster)?.is_some() {
                count = count.saturating_add(1);
            }
        }
        Ok(count)
    }

    /// Uses `caster` has consumed this period.
    pub fn uses_consumed(&self, caster: &EntityId) -> QuarryResult<u32> {
        self.caster(caster).uses_consumed()
    }
}

// =============================================================================
// GUARDS
// =============================================================================

/// Exclusive access to one target's mark map.
pub struct TargetGuard<'a, A> {
    attributes: &'a A,
    target: EntityId,
    _lock: MutexGuard<'a, ()>,
}

impl<A: AttributeStore> TargetGuard<'_, A> {
    pub fn target(&self) -> &EntityId {
        &self.target
    }

    /// Read the map, healing duplicated entries in place.
    fn load(&self) -> QuarryResult<MarkMap> {
        let bytes = self
            .attributes
            .get_attribute(&self.target, NAMESPACE, MARKS_KEY)
            .map_err(QuarryError::StoreReadFailed)?;
        let Some(bytes) = bytes else {
            return Ok(MarkMap::new());
        };

        let decoded = MarkMap::decode(&bytes).map_err(|err| QuarryError::CorruptState {
            target: self.target.clone(),
            reason: err.to_string(),
        })?;

        if !decoded.duplicates.is_empty() {
            warn!(
                target_id = %self.target,
                duplicates = ?decoded.duplicates,
                "CorruptState: duplicate marks for one caster, keeping most recent"
            );
            self.save(&decoded.map)?;
        }

        Ok(decoded.map)
    }

    fn save(&self, map: &MarkMap) -> QuarryResult<()> {
        let result = if map.is_empty() {
            self.attributes
                .delete_attribute(&self.target, NAMESPACE, MARKS_KEY)
        } else {
            map.encode().and_then(|bytes| {
                self.attributes
                    .set_attribute(&self.target, NAMESPACE, MARKS_KEY, &bytes)
            })
        };
        result.map_err(QuarryError::StoreWriteFailed)
    }

    pub fn get(&self, caster: &EntityId) -> QuarryResult<Option<Mark>> {
        Ok(self.load()?.remove(caster))
    }

    pub fn insert(&self, caster: &EntityId, mark: Mark) -> QuarryResult<()> {
        let mut map = self.load()?;
        map.insert(caster.clone(), mark);
        self.save(&map)?;
        debug!(target_id = %self.target, caster = %caster, "mark written");
        Ok(())
    }

    pub fn remove(&self, caster: &EntityId) -> QuarryResult<Option<Mark>> {
        let mut map = self.load()?;
        let removed = map.remove(caster);
        if removed.is_some() {
            self.save(&map)?;
            debug!(target_id = %self.target, caster = %caster, "mark deleted");
        }
        Ok(removed)
    }

    pub fn all(&self) -> QuarryResult<MarkMap> {
        self.load()
    }

    /// Remove every mark on the target, returning what was there.
    pub fn clear(&self) -> QuarryResult<MarkMap> {
        let map = self.load()?;
        if !map.is_empty() {
            self.save(&MarkMap::new())?;
        }
        Ok(map)
    }
}

/// Exclusive access to one caster's use counter.
pub struct CasterGuard<'a, A> {
    attributes: &'a A,
    caster: EntityId,
    _lock: MutexGuard<'a, ()>,
}

impl<A: AttributeStore> CasterGuard<'_, A> {
    pub fn caster(&self) -> &EntityId {
        &self.caster
    }

    fn counter(&self) -> QuarryResult<Option<u32>> {
        let bytes = self
            .attributes
            .get_attribute(&self.caster, NAMESPACE, USES_KEY)
            .map_err(QuarryError::StoreReadFailed)?;
        bytes
            .map(|bytes| postcard::from_bytes::<u32>(&bytes))
            .transpose()
            .map_err(|err| QuarryError::CorruptState {
                target: self.caster.clone(),
                reason: err.to_string(),
            })
    }

    /// True when a counter has been written this period.
    pub fn has_counter(&self) -> QuarryResult<bool> {
        Ok(self.counter()?.is_some())
    }

    /// Consumed uses; an absent counter reads as zero.
    pub fn uses_consumed(&self) -> QuarryResult<u32> {
        Ok(self.counter()?.unwrap_or(0))
    }

    pub fn set_uses(&self, uses: u32) -> QuarryResult<()> {
        postcard::to_allocvec(&uses)
            .map_err(StoreError::from)
            .and_then(|bytes| {
                self.attributes
                    .set_attribute(&self.caster, NAMESPACE, USES_KEY, &bytes)
            })
            .map_err(QuarryError::StoreWriteFailed)
    }

    /// Drop the counter back to absent.
    pub fn reset(&self) -> QuarryResult<()> {
        self.attributes
            .delete_attribute(&self.caster, NAMESPACE, USES_KEY)
            .map_err(QuarryError::StoreWriteFailed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
