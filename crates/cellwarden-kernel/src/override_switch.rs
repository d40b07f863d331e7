//! [`OverrideSwitch`] – operator kill switch.
//!
//! Presence of a designated marker file on the host pauses all mutating
//! actions until the file is removed. The control loop checks the switch
//! first thing every cycle and skips straight to its sleep when engaged –
//! no telemetry fetch, no decision request, no action.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Checks for the manual-override marker file.
pub struct OverrideSwitch {
    marker: PathBuf,
}

impl OverrideSwitch {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// `true` while the operator has the system paused.
    pub fn is_engaged(&self) -> bool {
        let engaged = self.marker.exists();
        if engaged {
            warn!(marker = %self.marker.display(), "manual override engaged; pausing actions");
        }
        engaged
    }

    /// Path of the marker file being watched.
    pub fn marker(&self) -> &Path {
        &self.marker
    }
}
