use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of entries retained in the dashboard log tail. Oldest
/// entries are evicted first once the tail is full.
pub const LOG_TAIL_CAPACITY: usize = 100;

/// Radio access technology reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RadioTech {
    Lte,
    Nr5g,
}

impl fmt::Display for RadioTech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioTech::Lte => write!(f, "LTE"),
            RadioTech::Nr5g => write!(f, "NR5G"),
        }
    }
}

/// Connection mode of the serving cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Lte,
    Nr5g,
    Unknown,
    Error,
}

/// One row of a network scan: a cell observed on a specific band.
///
/// Band and technology together form a natural key within a single scan;
/// the same pair may recur across scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub rat: RadioTech,
    pub band: u16,
    /// Reference signal received power, dBm.
    pub rsrp: i32,
    /// Reference signal received quality, dB.
    pub rsrq: i32,
    /// Signal-to-interference-plus-noise ratio, dB.
    pub sinr: i32,
}

/// Whether carrier-aggregation output carried any band detail.
///
/// `NoBandInfo` means the modem answered but no band marker was found
/// (connected without detail); `NotApplicable` means the modem produced no
/// output at all. The decision service is told which of the two happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandAvailability {
    Detected,
    NoBandInfo,
    NotApplicable,
}

/// Normalized radio telemetry for one polling cycle.
///
/// When `parse_error` is set every other field is unreliable and must not
/// drive an action; callers fall back to the no-data default (`Wait`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub mode: Mode,
    /// Primary serving band, e.g. `"B3"` (LTE) or `"N78"` (NR5G).
    pub primary_band: Option<String>,
    pub rsrp: Option<i32>,
    pub rsrq: Option<i32>,
    pub sinr: Option<i32>,
    /// Every band observed in a scan, blacklisted ones included. Kept for
    /// diagnostics; the `active_*` fields below are the filtered view.
    pub scan_entries: Vec<ScanEntry>,
    /// LTE bands currently active, blacklisted bands excluded.
    pub active_lte_bands: BTreeSet<u16>,
    /// Active NR5G band, blacklisted bands excluded.
    pub active_nr_band: Option<u16>,
    pub band_info: BandAvailability,
    pub timestamp: DateTime<Utc>,
    pub parse_error: Option<String>,
}

impl TelemetrySnapshot {
    /// An empty snapshot with nothing observed yet.
    pub fn empty() -> Self {
        Self {
            mode: Mode::Unknown,
            primary_band: None,
            rsrp: None,
            rsrq: None,
            sinr: None,
            scan_entries: Vec::new(),
            active_lte_bands: BTreeSet::new(),
            active_nr_band: None,
            band_info: BandAvailability::NotApplicable,
            timestamp: Utc::now(),
            parse_error: None,
        }
    }

    /// A snapshot carrying only a parse error.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            mode: Mode::Error,
            parse_error: Some(reason.into()),
            ..Self::empty()
        }
    }

    /// `true` when the telemetry may drive a decision.
    pub fn is_reliable(&self) -> bool {
        self.parse_error.is_none()
    }

    /// Structural equality ignoring the capture timestamp.
    pub fn same_reading(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.primary_band == other.primary_band
            && self.rsrp == other.rsrp
            && self.rsrq == other.rsrq
            && self.sinr == other.sinr
            && self.scan_entries == other.scan_entries
            && self.active_lte_bands == other.active_lte_bands
            && self.active_nr_band == other.active_nr_band
            && self.band_info == other.band_info
            && self.parse_error == other.parse_error
    }
}

/// Corrective action decoded from the decision service's reply.
///
/// Exactly one variant is active per cycle. `cellwarden-runtime` decodes
/// the free-text reply into this enum and the executor translates it into
/// AT commands, so unhandled variants are a compile error rather than a
/// runtime fallthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum ActionCommand {
    /// Do nothing this cycle; re-evaluate after the given pause.
    Wait { minutes: u32 },
    /// Soft-restart the modem.
    RestartModem,
    /// Restore the default band allow-lists, then restart.
    ResetBands,
    /// Lock the modem to the given bands for one technology.
    SetBands { tech: RadioTech, bands: Vec<u16> },
    /// Tear the interface down, run a full network scan, bring it back up.
    FullScan,
    /// Unrecognized decision text, preserved verbatim for diagnosis.
    Unknown { raw: String },
}

impl ActionCommand {
    /// `true` for actions that change modem state and count against the
    /// hourly budget. `Wait` does nothing; `Unknown` is never executed.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            ActionCommand::Wait { .. } | ActionCommand::Unknown { .. }
        )
    }

    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ActionCommand::Wait { .. } => "WAIT",
            ActionCommand::RestartModem => "RESTART_MODEM",
            ActionCommand::ResetBands => "RESET_BANDS",
            ActionCommand::SetBands { tech: RadioTech::Lte, .. } => "SET_LTE_BANDS",
            ActionCommand::SetBands { tech: RadioTech::Nr5g, .. } => "SET_NR5G_BANDS",
            ActionCommand::FullScan => "FULL_SCAN",
            ActionCommand::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// Record of an admitted mutating action, consumed by the rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: ActionCommand,
}

/// Severity of a dashboard log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One line of the bounded dashboard log tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// The most recent decision exchange: the prompt sent and the raw reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionActivity {
    pub prompt: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Display-safe subset of the configuration. Credentials never appear here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub router_host: String,
    pub decision_model: String,
    pub poll_interval_s: u64,
    pub max_actions_per_hour: u32,
}

/// Immutable state published once per cycle and read by the dashboard.
///
/// The control loop owns a working copy, appends to the tail via
/// [`DashboardSnapshot::push_log`], and publishes a complete clone — readers
/// never observe fields from two different cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub telemetry: Option<TelemetrySnapshot>,
    pub decision: Option<DecisionActivity>,
    pub log_tail: VecDeque<LogEntry>,
    pub settings: DisplaySettings,
}

impl DashboardSnapshot {
    pub fn new(settings: DisplaySettings) -> Self {
        Self {
            telemetry: None,
            decision: None,
            log_tail: VecDeque::with_capacity(LOG_TAIL_CAPACITY),
            settings,
        }
    }

    /// Append a log line, evicting the oldest once the tail holds
    /// [`LOG_TAIL_CAPACITY`] entries.
    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        while self.log_tail.len() >= LOG_TAIL_CAPACITY {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(LogEntry::new(level, message));
    }
}

/// Static per-technology band policy: bands that must never be locked onto,
/// and the allow-lists `RESET_BANDS` restores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPlan {
    pub lte_blocked: BTreeSet<u16>,
    pub nr5g_blocked: BTreeSet<u16>,
    pub lte_defaults: Vec<u16>,
    pub nr5g_defaults: Vec<u16>,
}

impl Default for BandPlan {
    fn default() -> Self {
        Self {
            lte_blocked: BTreeSet::from([28]),
            nr5g_blocked: BTreeSet::from([28, 78]),
            lte_defaults: vec![1, 3, 7, 8, 20, 38, 40],
            nr5g_defaults: vec![1, 3, 7, 8, 20, 38, 40, 77],
        }
    }
}

impl BandPlan {
    pub fn is_blocked(&self, tech: RadioTech, band: u16) -> bool {
        match tech {
            RadioTech::Lte => self.lte_blocked.contains(&band),
            RadioTech::Nr5g => self.nr5g_blocked.contains(&band),
        }
    }

    /// The subset of `bands` that is blacklisted for `tech`.
    pub fn blocked_in(&self, tech: RadioTech, bands: &[u16]) -> Vec<u16> {
        bands
            .iter()
            .copied()
            .filter(|b| self.is_blocked(tech, *b))
            .collect()
    }
}

/// Global error type spanning transport, parsing, decision, and governance
/// failures. Each stage of a cycle maps its local error into one of these
/// variants; the loop boundary catches them all and enters the fault backoff.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("telemetry parse error: {0}")]
    Parse(String),

    #[error("decision service error: {0}")]
    Decision(String),

    #[error("hourly action budget exhausted (cap {cap})")]
    RateLimited { cap: u32 },

    #[error("policy violation in {rule}: {details}")]
    Policy { rule: String, details: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel error: {0}")]
    Channel(String),
}
