//! # CLI Commands
//!
//! One function per subcommand. Each opens a [`Session`] over the
//! database and scene, runs one engine operation, then prints what the
//! engine reported: notifications as text, or the operation's result
//! as JSON with `--json`.

use crate::config::load_settings;
use crate::error::CliError;
use crate::host::{CliHost, SceneFile};
use quarry_core::{
    Actors, ApplySummary, Aspect, BonusRoll, CasterStatus, EntityId, EventBus, HostEvent,
    NoticeRecord, Notification, Notifier, QuarryError, RecoveryKind, RedbAttributes, Tracker,
    UnleashReport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Where a session reads its state from.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub db: PathBuf,
    pub scene: PathBuf,
    pub config: Option<PathBuf>,
    /// Fixed dice seed; entropy when absent.
    pub seed: Option<u64>,
}

/// Engine and host wired over one database.
pub struct Session {
    tracker: Arc<Tracker<Arc<RedbAttributes>>>,
    host: Arc<CliHost>,
    bus: EventBus,
}

impl Session {
    pub fn open(paths: &SessionPaths) -> Result<Self, CliError> {
        let settings = load_settings(paths.config.as_deref())?;
        let scene = SceneFile::load(&paths.scene)?;
        let attributes = Arc::new(RedbAttributes::open(&paths.db)?);

        let host = Arc::new(CliHost::new(scene, Arc::clone(&attributes), paths.seed));
        let tracker = Arc::new(Tracker::new(attributes, settings));
        let mut bus = EventBus::new();
        tracker.subscribe(Arc::clone(&host), &mut bus);

        Ok(Self { tracker, host, bus })
    }

    pub fn tracker(&self) -> &Tracker<Arc<RedbAttributes>> {
        &self.tracker
    }

    pub fn host(&self) -> &CliHost {
        &self.host
    }

    /// Run an engine action, turning a failure into a notification.
    fn act<T>(
        &self,
        action: impl FnOnce(&Tracker<Arc<RedbAttributes>>, &CliHost) -> Result<T, QuarryError>,
    ) -> Result<T, CliError> {
        action(self.tracker.as_ref(), self.host.as_ref()).map_err(|err| {
            self.tracker.report_failure(&err, self.host.as_ref());
            CliError::from(err)
        })
    }

    /// Deliver a host event; handlers report their own failures.
    fn dispatch(&self, event: &HostEvent) -> Result<(), CliError> {
        match self.bus.dispatch(event).into_iter().next() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Print `value` as JSON, or the pending notifications as text.
fn report<T: Serialize>(session: &Session, value: &T, json: bool) -> Result<(), CliError> {
    let notices = session.host.drain();
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print_notices(&notices);
    }
    Ok(())
}

fn print_notices(notices: &[Notification]) {
    for notice in notices {
        let record = NoticeRecord::from(notice);
        println!("[{}] {}", record.level, record.message);
    }
}

/// Print notifications left behind by a failed command.
pub fn flush_failures(session: &Session, json: bool) {
    let notices = session.host.drain();
    if json {
        let records: Vec<NoticeRecord> = notices.iter().map(NoticeRecord::from).collect();
        match serde_json::to_string_pretty(&records) {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(error = %err, "could not encode notifications"),
        }
    } else {
        print_notices(&notices);
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Create the database file.
pub fn cmd_init(db: &Path, force: bool) -> Result<(), CliError> {
    if db.exists() {
        if !force {
            return Err(CliError::AlreadyExists(db.to_path_buf()));
        }
        std::fs::remove_file(db).map_err(|e| CliError::io(db, e))?;
    }
    RedbAttributes::create(db)?;
    info!(path = %db.display(), "database initialized");
    println!("Initialized quarry database at {}", db.display());
    Ok(())
}

/// Mark targets, in the order given.
pub fn cmd_apply(
    session: &Session,
    caster: &str,
    targets: &[String],
    json: bool,
) -> Result<ApplySummary, CliError> {
    let caster = session.host.caster(caster)?;
    let tokens = targets
        .iter()
        .map(|id| session.host.token(id))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = session.act(|tracker, host| tracker.apply_marks(&caster, &tokens, host));
    // A partial batch still printed what it marked
    if let Err(CliError::Quarry(QuarryError::PartialApply { summary, .. })) = &summary {
        session.host.emit(Notification::MarksApplied(summary.as_ref().clone()));
    }
    let summary = summary?;
    report(session, &summary, json)?;
    Ok(summary)
}

pub fn cmd_unleash(
    session: &Session,
    caster: &str,
    target: &str,
    aspect: Aspect,
    json: bool,
) -> Result<UnleashReport, CliError> {
    let caster = session.host.caster(caster)?;
    let target = session.host.token(target)?;

    let outcome = session.act(|tracker, host| tracker.unleash(&caster, &target, aspect, host))?;
    report(session, &outcome, json)?;
    Ok(outcome)
}

pub fn cmd_remove(
    session: &Session,
    caster: &str,
    target: &str,
    json: bool,
) -> Result<(), CliError> {
    let caster = session.host.caster(caster)?;
    let target = session.host.token(target)?;

    session.act(|tracker, host| tracker.remove_mark(&caster, &target, host))?;
    report(session, &serde_json::json!({ "removed": target.id }), json)
}

/// Raise a recovery event for `caster`.
pub fn cmd_rest(session: &Session, caster: &str, short: bool, json: bool) -> Result<(), CliError> {
    let caster = session.host.caster(caster)?;
    let kind = if short {
        RecoveryKind::Short
    } else {
        RecoveryKind::Long
    };
    let id = caster.id.clone();

    session.dispatch(&HostEvent::Recovery { caster, kind })?;
    report(session, &serde_json::json!({ "caster": id, "kind": kind }), json)
}

/// Record a new vitality for `target` and raise the change event.
pub fn cmd_vitality(session: &Session, target: &str, value: i64, json: bool) -> Result<(), CliError> {
    let target = EntityId::new(target);
    session
        .host
        .set_vitality(&target, value)
        .map_err(QuarryError::from)?;

    session.dispatch(&HostEvent::VitalityChanged {
        target: target.clone(),
        value: Some(value),
    })?;
    report(session, &serde_json::json!({ "target": target, "vitality": value }), json)
}

/// Roll mark bonus damage for a confirmed hit.
pub fn cmd_bonus(
    session: &Session,
    caster: &str,
    target: &str,
    json: bool,
) -> Result<BonusRoll, CliError> {
    let caster = session.host.caster(caster)?;
    let target = session.host.token(target)?;

    let roll = session.act(|tracker, host| tracker.roll_bonus_damage(&caster, &target, host))?;
    report(session, &roll, json)?;
    Ok(roll)
}

pub fn cmd_status(session: &Session, caster: &str, json: bool) -> Result<CasterStatus, CliError> {
    let caster = session.host.caster(caster)?;
    let status = session.act(|tracker, host| tracker.status(&caster, host))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(status);
    }

    println!("Caster: {} (level {})", status.caster.name, caster.level);
    println!("Potency: {} {}", status.potency, status.damage_type);
    println!("Capacity: {}", status.capacity);
    println!(
        "Uses: {}/{} ({} remaining)",
        status.uses_consumed,
        status.uses_max,
        status.uses_remaining()
    );
    if status.marks.is_empty() {
        println!("Marks: none");
    } else {
        println!("Marks:");
        for held in &status.marks {
            println!("  - {} ({})", held.target.name, held.potency);
        }
    }
    Ok(status)
}
