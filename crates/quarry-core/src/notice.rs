//! # Notifications
//!
//! Structured events the engine hands to the host's notifier. The host
//! decides how to render them; `Display` gives a plain-text fallback.

use crate::engine::{ApplySummary, BonusRoll, TargetRef};
use crate::error::Severity;
use crate::primitives::EntityId;
use crate::unleash::UnleashReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a notification should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// An event worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    MarksApplied(ApplySummary),
    Unleashed(UnleashReport),
    MarkRemoved {
        caster: TargetRef,
        target: TargetRef,
    },
    BonusDamage(BonusRoll),
    /// A caster recovered: uses reset and own marks cleared.
    Recovered {
        caster: TargetRef,
        cleared: usize,
    },
    /// A target dropped to zero vitality and lost every mark.
    TargetDown {
        target: EntityId,
        cleared: usize,
    },
    Failure {
        severity: Severity,
        message: String,
    },
}

impl Notification {
    #[must_use]
    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::Failure {
                severity: Severity::Warning,
                ..
            } => NoticeLevel::Warning,
            Self::Failure {
                severity: Severity::Error,
                ..
            } => NoticeLevel::Error,
            _ => NoticeLevel::Info,
        }
    }
}

fn names(targets: &[TargetRef]) -> String {
    targets
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarksApplied(summary) => {
                write!(
                    f,
                    "{} applies Mark ({}, {}) to: {}",
                    summary.caster.name,
                    summary.potency,
                    summary.damage_type,
                    if summary.marked.is_empty() {
                        "(no new targets)".to_string()
                    } else {
                        names(&summary.marked)
                    }
                )?;
                if !summary.skipped.is_empty() {
                    write!(f, " [already marked: {}]", names(&summary.skipped))?;
                }
                write!(
                    f,
                    ". Uses remaining: {}/{}. Capacity: {} -> {}",
                    summary.uses_remaining(),
                    summary.uses_max,
                    summary.slots_before,
                    summary.slots_after
                )
            }
            Self::Unleashed(report) => write!(f, "{report}"),
            Self::MarkRemoved { target, .. } => write!(f, "Removed mark from {}.", target.name),
            Self::BonusDamage(roll) => write!(
                f,
                "Mark bonus: {} {} to {} (rolled {})",
                roll.bonus.potency, roll.bonus.damage_type, roll.target.name, roll.total
            ),
            Self::Recovered { caster, cleared } => write!(
                f,
                "{}: marks cleared ({}) and uses reset.",
                caster.name, cleared
            ),
            Self::TargetDown { target, cleared } => {
                write!(f, "{target} is down; {cleared} mark(s) ended.")
            }
            Self::Failure { message, .. } => f.write_str(message),
        }
    }
}

/// Wire form of a notification for hosts that forward JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeRecord {
    pub level: String,
    pub message: String,
}

impl From<&Notification> for NoticeRecord {
    fn from(notification: &Notification) -> Self {
        let level = match notification.level() {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        Self {
            level: level.to_string(),
            message: notification.to_string(),
        }
    }
}
