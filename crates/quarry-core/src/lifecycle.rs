//! # Lifecycle Reactor
//!
//! Bulk cleanup driven by host events:
//!
//! - A caster's full recovery resets its uses and ends every mark
//!   placed *by* that caster.
//! - A target dropping to exactly zero vitality ends every mark placed
//!   *on* it, whoever placed it.
//!
//! Host events reach the reactor through an [`EventBus`] that keeps
//! handlers per event kind.

use crate::attributes::AttributeStore;
use crate::engine::{TargetRef, Tracker, scene_entities};
use crate::error::{QuarryError, QuarryResult};
use crate::host::{Host, remove_indicators_from};
use crate::notice::Notification;
use crate::primitives::{Caster, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Length of a recovery period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryKind {
    Short,
    Long,
}

/// Events raised by the host that the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Recovery { caster: Caster, kind: RecoveryKind },
    /// `value` is `None` when the host could not read the new vitality.
    VitalityChanged {
        target: EntityId,
        value: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Recovery,
    VitalityChanged,
}

impl HostEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Recovery { .. } => EventKind::Recovery,
            Self::VitalityChanged { .. } => EventKind::VitalityChanged,
        }
    }
}

type Handler = Box<dyn Fn(&HostEvent) -> QuarryResult<()> + Send + Sync>;

/// Handlers registered per event kind, run in registration order.
#[derive(Default)]
pub struct EventBus {
    handlers: BTreeMap<EventKind, Vec<Handler>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&HostEvent) -> QuarryResult<()> + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Number of handlers listening for `kind`.
    #[must_use]
    pub fn handlers_for(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Run every handler for the event's kind. A failing handler does not
    /// stop the ones after it; all failures are returned.
    pub fn dispatch(&self, event: &HostEvent) -> Vec<QuarryError> {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            debug!(kind = ?event.kind(), "no handlers registered");
            return Vec::new();
        };
        handlers
            .iter()
            .filter_map(|handler| handler(event).err())
            .collect()
    }
}

impl<A: AttributeStore> Tracker<A> {
    /// Reset `caster`'s uses and end every mark it placed on the scene.
    ///
    /// Returns how many marks were ended. Short recoveries and casters
    /// with neither a counter nor marks are left untouched. The counter
    /// is reset only after every mark is gone, so a failed recovery can
    /// simply be raised again.
    pub fn on_caster_recovery<H: Host + ?Sized>(
        &self,
        caster: &Caster,
        kind: RecoveryKind,
        host: &H,
    ) -> QuarryResult<usize> {
        if kind == RecoveryKind::Short {
            debug!(caster = %caster.id, "short recovery ignored");
            return Ok(0);
        }

        let counter = self.store().caster(&caster.id);
        let targets = scene_entities(host);
        let held = self.store().count_for_caster(&caster.id, &targets)?;
        if !counter.has_counter()? && held == 0 {
            return Ok(0);
        }

        let mut cleared = 0usize;
        for target in &targets {
            let guard = self.store().target(target);
            if self.retire(&guard, &caster.id, host)?.is_some() {
                cleared = cleared.saturating_add(1);
            }
        }
        counter.reset()?;

        info!(caster = %caster.id, cleared, "caster recovered");
        host.emit(Notification::Recovered {
            caster: TargetRef {
                id: caster.id.clone(),
                name: caster.name.clone(),
            },
            cleared,
        });
        Ok(cleared)
    }

    /// End every mark on `target` once its vitality reaches exactly zero.
    pub fn on_target_vitality_changed<H: Host + ?Sized>(
        &self,
        target: &EntityId,
        value: Option<i64>,
        host: &H,
    ) -> QuarryResult<usize> {
        if value != Some(0) {
            return Ok(0);
        }

        let guard = self.store().target(target);
        let marks = guard.clear()?;
        if let Err(err) = remove_indicators_from(host, target, None) {
            for (caster, mark) in marks.iter() {
                self.reinstate(&guard, caster, mark.clone(), host);
            }
            return Err(err.into());
        }
        let cleared = marks.len();

        if cleared > 0 {
            info!(target_id = %target, cleared, "target down, marks cleared");
            host.emit(Notification::TargetDown {
                target: target.clone(),
                cleared,
            });
        }
        Ok(cleared)
    }

    /// Route recovery and vitality events from `bus` to this tracker.
    ///
    /// Failures are reported through the host before being handed back
    /// to the dispatcher.
    pub fn subscribe<H>(self: &Arc<Self>, host: Arc<H>, bus: &mut EventBus)
    where
        A: 'static,
        H: Host + Send + Sync + 'static,
    {
        let tracker = Arc::clone(self);
        let recovery_host = Arc::clone(&host);
        bus.register(EventKind::Recovery, move |event| {
            let HostEvent::Recovery { caster, kind } = event else {
                return Ok(());
            };
            tracker
                .on_caster_recovery(caster, *kind, recovery_host.as_ref())
                .map(drop)
                .inspect_err(|err| tracker.report_failure(err, recovery_host.as_ref()))
        });

        let tracker = Arc::clone(self);
        bus.register(EventKind::VitalityChanged, move |event| {
            let HostEvent::VitalityChanged { target, value } = event else {
                return Ok(());
            };
            tracker
                .on_target_vitality_changed(target, *value, host.as_ref())
                .map(drop)
                .inspect_err(|err| tracker.report_failure(err, host.as_ref()))
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
