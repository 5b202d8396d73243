//! Engine settings from an optional JSON file.
//!
//! Keys are camelCase and every key is optional:
//!
//! ```json
//! { "damageType": "radiant", "detonationFriendlyFire": false }
//! ```

use crate::error::CliError;
use quarry_core::Settings;
use std::path::Path;
use tracing::debug;

/// Read settings from `path`, or the defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    let settings: Settings = serde_json::from_str(&raw).map_err(|e| CliError::json(path, e))?;
    debug!(path = %path.display(), damage_type = %settings.damage_type, "settings loaded");
    Ok(settings)
}
