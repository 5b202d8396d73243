//! # Settings
//!
//! World-level options recognised by the engine. Deserialized with
//! camelCase keys; any missing key takes its default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default icon for mark indicators.
pub const DEFAULT_INDICATOR_ICON: &str = "icons/svg/target.svg";

/// Damage type dealt by mark bonus damage and Detonation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    #[default]
    Force,
    Necrotic,
    Radiant,
    Psychic,
    Thunder,
}

impl DamageType {
    pub const ALL: [Self; 5] = [
        Self::Force,
        Self::Necrotic,
        Self::Radiant,
        Self::Psychic,
        Self::Thunder,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Force => "force",
            Self::Necrotic => "necrotic",
            Self::Radiant => "radiant",
            Self::Psychic => "psychic",
            Self::Thunder => "thunder",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DamageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown damage type: {s}"))
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Icon path shown on marked targets.
    pub mark_indicator_icon: String,
    /// Damage type for bonus damage and Detonation.
    pub damage_type: DamageType,
    /// When off, Detonation skips tokens sharing the caster's disposition.
    pub detonation_friendly_fire: bool,
    /// Governs the legacy feature swap, which lives outside this engine.
    pub auto_replace_legacy_feature: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mark_indicator_icon: DEFAULT_INDICATOR_ICON.to_string(),
            damage_type: DamageType::default(),
            detonation_friendly_fire: true,
            auto_replace_legacy_feature: true,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
