//! # CLI Host
//!
//! Plays the hosting application for the engine:
//!
//! - Scene: tokens, grid and caster sheets from a JSON file
//! - Indicators, buffs and vitality: JSON values in the shared redb
//!   file, under namespaces of their own
//! - Dice: ChaCha8 generator, seeded on request
//! - Notifications: buffered until the command prints them

use crate::error::CliError;
use quarry_core::{
    Actors, AttributeStore, Buff, Caster, Clock, Dice, DieExpression, EntityId, GridScale,
    HostError, Indicator, IndicatorHandle, IndicatorSpec, Indicators, Notification, Notifier,
    RedbAttributes, Scene, StoreError, Timestamp, Token,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Namespace for indicators drawn on tokens.
pub const INDICATOR_NAMESPACE: &str = "host.indicators";
/// Namespace for actor state changed by the engine.
pub const ACTOR_NAMESPACE: &str = "host.actors";

const INDICATORS_KEY: &str = "list";
const VITALITY_KEY: &str = "vitality";
const BUFFS_KEY: &str = "buffs";

/// Contents of a scene file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneFile {
    pub grid: GridScale,
    pub tokens: Vec<Token>,
    /// Character sheets of the actors that may cast.
    pub casters: Vec<Caster>,
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| CliError::json(path, e))
    }
}

pub struct CliHost {
    scene: SceneFile,
    attributes: Arc<RedbAttributes>,
    rng: Mutex<ChaCha8Rng>,
    outbox: Mutex<Vec<Notification>>,
}

impl CliHost {
    pub fn new(scene: SceneFile, attributes: Arc<RedbAttributes>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::random()),
        };
        Self {
            scene,
            attributes,
            rng: Mutex::new(rng),
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// The caster sheet for `id`, with any vitality recorded since.
    pub fn caster(&self, id: &str) -> Result<Caster, CliError> {
        let mut caster = self
            .scene
            .casters
            .iter()
            .find(|caster| caster.id.as_str() == id)
            .cloned()
            .ok_or_else(|| CliError::UnknownEntity {
                kind: "caster",
                id: id.to_string(),
            })?;
        if let Some(current) = self.vitality(&caster.id)? {
            caster.vitality.current = current;
        }
        Ok(caster)
    }

    pub fn token(&self, id: &str) -> Result<Token, CliError> {
        self.token_of(&EntityId::new(id))
            .ok_or_else(|| CliError::UnknownEntity {
                kind: "token",
                id: id.to_string(),
            })
    }

    pub fn vitality(&self, actor: &EntityId) -> Result<Option<i64>, StoreError> {
        self.read_json(actor, ACTOR_NAMESPACE, VITALITY_KEY)
    }

    pub fn buffs(&self, actor: &EntityId) -> Result<Vec<Buff>, StoreError> {
        Ok(self
            .read_json(actor, ACTOR_NAMESPACE, BUFFS_KEY)?
            .unwrap_or_default())
    }

    pub fn indicators(&self, target: &EntityId) -> Result<Vec<Indicator>, StoreError> {
        Ok(self
            .read_json(target, INDICATOR_NAMESPACE, INDICATORS_KEY)?
            .unwrap_or_default())
    }

    /// Take every notification emitted so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.attributes
            .get_attribute(entity, namespace, key)?
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Backend(e.to_string()))
            })
            .transpose()
    }

    fn write_json<T: Serialize>(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.attributes.set_attribute(entity, namespace, key, &bytes)
    }

    fn save_indicators(&self, target: &EntityId, list: &[Indicator]) -> Result<(), StoreError> {
        if list.is_empty() {
            self.attributes
                .delete_attribute(target, INDICATOR_NAMESPACE, INDICATORS_KEY)
        } else {
            self.write_json(target, INDICATOR_NAMESPACE, INDICATORS_KEY, &list)
        }
    }
}

fn host_error(err: StoreError) -> HostError {
    HostError::new(err.to_string())
}

impl Scene for CliHost {
    fn tokens(&self) -> Vec<Token> {
        self.scene.tokens.clone()
    }

    fn grid(&self) -> GridScale {
        self.scene.grid
    }
}

/// Handles read `<target>/<serial>` so removal can find the target.
impl Indicators for CliHost {
    fn create_indicator(
        &self,
        target: &EntityId,
        spec: &IndicatorSpec,
    ) -> Result<IndicatorHandle, HostError> {
        let mut list = self.indicators(target).map_err(host_error)?;
        let serial = list
            .iter()
            .filter_map(|i| i.handle.0.rsplit_once('/'))
            .filter_map(|(_, n)| n.parse::<u64>().ok())
            .max()
            .map_or(1, |n| n.saturating_add(1));
        let handle = IndicatorHandle(format!("{target}/{serial}"));
        list.push(Indicator {
            handle: handle.clone(),
            origin: spec.origin.clone(),
            label: spec.label.clone(),
        });
        self.save_indicators(target, &list).map_err(host_error)?;
        debug!(target_id = %target, handle = %handle.0, icon = %spec.icon, "indicator drawn");
        Ok(handle)
    }

    fn remove_indicator(&self, handle: &IndicatorHandle) -> Result<(), HostError> {
        let Some((target, _)) = handle.0.rsplit_once('/') else {
            return Err(HostError::new(format!("malformed indicator handle {}", handle.0)));
        };
        let target = EntityId::new(target);
        let mut list = self.indicators(&target).map_err(host_error)?;
        list.retain(|i| &i.handle != handle);
        self.save_indicators(&target, &list).map_err(host_error)
    }

    fn mark_indicators(&self, target: &EntityId) -> Result<Vec<Indicator>, HostError> {
        self.indicators(target).map_err(host_error)
    }
}

impl Dice for CliHost {
    fn roll(&self, expr: &DieExpression) -> Result<u32, HostError> {
        if expr.sides == 0 {
            return Err(HostError::new(format!("cannot roll {expr}")));
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let total: u32 = (0..expr.count)
            .map(|_| rng.gen_range(1..=u32::from(expr.sides)))
            .sum();
        debug!(expr = %expr, total, "rolled");
        Ok(total)
    }
}

impl Notifier for CliHost {
    fn emit(&self, notification: Notification) {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

impl Actors for CliHost {
    fn set_vitality(&self, actor: &EntityId, value: i64) -> Result<(), HostError> {
        self.write_json(actor, ACTOR_NAMESPACE, VITALITY_KEY, &value)
            .map_err(host_error)
    }

    fn grant_buff(&self, actor: &EntityId, buff: &Buff) -> Result<(), HostError> {
        let mut buffs = self.buffs(actor).map_err(host_error)?;
        buffs.push(buff.clone());
        self.write_json(actor, ACTOR_NAMESPACE, BUFFS_KEY, &buffs)
            .map_err(host_error)
    }
}

impl Clock for CliHost {
    /// Wall clock in milliseconds; saturates rather than wrapping.
    fn now(&self) -> Timestamp {
        Timestamp(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        )
    }
}
