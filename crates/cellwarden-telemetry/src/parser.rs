//! [`TelemetryParser`] – positional parsing of modem command output.
//!
//! Three source formats are understood:
//!
//! | Format | Command | Shape |
//! |---|---|---|
//! | [`SourceFormat::ServingCell`] | `AT+QENG="servingcell"` | one comma-delimited record |
//! | [`SourceFormat::AggregatedCa`] | `AT+QCAINFO` | multiline, one carrier per line |
//! | [`SourceFormat::BandScan`] | `AT+QSCAN=3,1` | multiline, one cell per line |
//!
//! Field offsets differ between firmware revisions and technologies, so they
//! are kept as data ([`ServingCellOffsets`]) rather than inline literals.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use cellwarden_types::{
    BandAvailability, BandPlan, Mode, RadioTech, ScanEntry, TelemetrySnapshot,
};

// ────────────────────────────────────────────────────────────────────────────
// Offset tables
// ────────────────────────────────────────────────────────────────────────────

/// Zero-based comma-field index of the technology token in a serving-cell
/// record, e.g. `"LTE"` in
/// `+QENG: "servingcell","NOCONN","LTE","FDD",262,01,…`.
const SERVING_CELL_TECH_FIELD: usize = 2;

/// Positional field offsets within one serving-cell record.
///
/// NR5G records carry one extra leading field, shifting every offset by one
/// position relative to LTE.
struct ServingCellOffsets {
    band: usize,
    rsrp: usize,
    rsrq: usize,
    sinr: usize,
}

const LTE_OFFSETS: ServingCellOffsets = ServingCellOffsets {
    band: 9,
    rsrp: 12,
    rsrq: 13,
    sinr: 14,
};

const NR5G_OFFSETS: ServingCellOffsets = ServingCellOffsets {
    band: 10,
    rsrp: 13,
    rsrq: 14,
    sinr: 15,
};

/// Line marker of a scan result row.
const SCAN_MARKER: &str = "+QSCAN:";

/// Band markers inside an aggregated-CA dump, e.g. `"LTE BAND 3"`.
const CA_LTE_MARKER: &str = "LTE BAND ";
const CA_NR5G_MARKER: &str = "NR5G BAND ";

/// Offsets of the trailing scan-row fields, counted from the end of the
/// line. Leading field counts vary across firmware, the tail does not.
const SCAN_TAIL_FIELDS: usize = 5;
const SCAN_RSRP_FROM_END: usize = 4;
const SCAN_RSRQ_FROM_END: usize = 3;
const SCAN_SINR_FROM_END: usize = 2;
const SCAN_BAND_FROM_END: usize = 1;

// ────────────────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────────────────

/// Which command's output is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    ServingCell,
    AggregatedCa,
    BandScan,
}

/// Converts raw command output into a [`TelemetrySnapshot`].
///
/// Holds the [`BandPlan`] so that blacklisted bands can be excluded from the
/// reported `active_*` fields. Scan entries always retain every observed
/// band for diagnostics.
pub struct TelemetryParser {
    plan: BandPlan,
}

impl TelemetryParser {
    pub fn new(plan: BandPlan) -> Self {
        Self { plan }
    }

    /// Parse `raw` according to `format`. Infallible: conversion failures
    /// are recorded in the returned snapshot's `parse_error`.
    pub fn parse(&self, raw: &str, format: SourceFormat) -> TelemetrySnapshot {
        match format {
            SourceFormat::ServingCell => self.parse_serving_cell(raw),
            SourceFormat::AggregatedCa => self.parse_aggregated_ca(raw),
            SourceFormat::BandScan => self.parse_band_scan(raw),
        }
    }

    // ── ServingCell ─────────────────────────────────────────────────────────

    fn parse_serving_cell(&self, raw: &str) -> TelemetrySnapshot {
        let parts: Vec<&str> = raw.trim().split(',').collect();

        let tech = match parts.get(SERVING_CELL_TECH_FIELD) {
            Some(field) => match unquote(field) {
                "LTE" => RadioTech::Lte,
                "NR5G" => RadioTech::Nr5g,
                _ => return TelemetrySnapshot::error("unsupported or unknown mode"),
            },
            None => return TelemetrySnapshot::error("unsupported or unknown mode"),
        };

        let offsets = match tech {
            RadioTech::Lte => &LTE_OFFSETS,
            RadioTech::Nr5g => &NR5G_OFFSETS,
        };

        let band: u16 = match field_as(&parts, offsets.band) {
            Some(v) => v,
            None => return TelemetrySnapshot::error("parse failure"),
        };
        let (rsrp, rsrq, sinr) = match (
            field_as::<i32>(&parts, offsets.rsrp),
            field_as::<i32>(&parts, offsets.rsrq),
            field_as::<i32>(&parts, offsets.sinr),
        ) {
            (Some(p), Some(q), Some(s)) => (p, q, s),
            _ => return TelemetrySnapshot::error("parse failure"),
        };

        let prefix = match tech {
            RadioTech::Lte => 'B',
            RadioTech::Nr5g => 'N',
        };

        let mut snap = TelemetrySnapshot::empty();
        snap.mode = match tech {
            RadioTech::Lte => Mode::Lte,
            RadioTech::Nr5g => Mode::Nr5g,
        };
        snap.primary_band = Some(format!("{prefix}{band}"));
        snap.rsrp = Some(rsrp);
        snap.rsrq = Some(rsrq);
        snap.sinr = Some(sinr);
        snap.band_info = BandAvailability::Detected;
        snap
    }

    // ── AggregatedCa ────────────────────────────────────────────────────────

    /// Parse an `AT+QCAINFO` dump. Every line is scanned for an LTE and an
    /// NR5G band marker independently. LTE bands merge into a set; for NR5G
    /// the last matching line wins – the device reports a single NR carrier
    /// and later lines reflect the more current state.
    fn parse_aggregated_ca(&self, raw: &str) -> TelemetrySnapshot {
        let mut snap = TelemetrySnapshot::empty();

        if raw.trim().is_empty() {
            // The modem produced no output at all: no connection to report.
            snap.band_info = BandAvailability::NotApplicable;
            return snap;
        }

        let mut lte_bands: BTreeSet<u16> = BTreeSet::new();
        let mut nr_band: Option<u16> = None;

        for line in raw.lines() {
            if let Some(band) = extract_band_after(line, CA_LTE_MARKER) {
                lte_bands.insert(band);
            }
            if let Some(band) = extract_band_after(line, CA_NR5G_MARKER) {
                nr_band = Some(band);
            }
        }

        if lte_bands.is_empty() && nr_band.is_none() {
            // Connected, but the dump carried no band detail.
            snap.band_info = BandAvailability::NoBandInfo;
            return snap;
        }

        snap.band_info = BandAvailability::Detected;
        snap.active_lte_bands = lte_bands
            .into_iter()
            .filter(|b| !self.plan.is_blocked(RadioTech::Lte, *b))
            .collect();
        snap.active_nr_band =
            nr_band.filter(|b| !self.plan.is_blocked(RadioTech::Nr5g, *b));
        snap
    }

    // ── BandScan ────────────────────────────────────────────────────────────

    /// Parse `AT+QSCAN=3,1` output. Rows without the scan marker, or whose
    /// trailing fields fail numeric conversion, are skipped without
    /// aborting the remaining rows.
    fn parse_band_scan(&self, raw: &str) -> TelemetrySnapshot {
        let mut snap = TelemetrySnapshot::empty();

        if raw.trim().is_empty() {
            snap.band_info = BandAvailability::NotApplicable;
            return snap;
        }

        let mut entries: Vec<ScanEntry> = Vec::new();
        for line in raw.lines() {
            match parse_scan_line(line) {
                Some(entry) => entries.push(entry),
                None => {
                    if line.contains(SCAN_MARKER) {
                        debug!(line, "skipping malformed scan row");
                    }
                }
            }
        }

        if entries.is_empty() {
            snap.band_info = BandAvailability::NoBandInfo;
            return snap;
        }

        snap.active_lte_bands = entries
            .iter()
            .filter(|e| e.rat == RadioTech::Lte)
            .map(|e| e.band)
            .filter(|b| !self.plan.is_blocked(RadioTech::Lte, *b))
            .collect();
        snap.active_nr_band = entries
            .iter()
            .filter(|e| e.rat == RadioTech::Nr5g)
            .map(|e| e.band)
            .next_back()
            .filter(|b| !self.plan.is_blocked(RadioTech::Nr5g, *b));
        snap.band_info = BandAvailability::Detected;
        snap.scan_entries = entries;
        snap
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Field helpers
// ────────────────────────────────────────────────────────────────────────────

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Fetch field `idx` and convert it, `None` on absence or bad digits.
fn field_as<T: std::str::FromStr>(parts: &[&str], idx: usize) -> Option<T> {
    parts.get(idx).and_then(|f| unquote(f).parse::<T>().ok())
}

/// Extract the band number that immediately follows `marker` in `line`,
/// e.g. `extract_band_after(r#"…,"LTE BAND 3",…"#, "LTE BAND ")` → `Some(3)`.
fn extract_band_after(line: &str, marker: &str) -> Option<u16> {
    let rest = &line[line.find(marker)? + marker.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        warn!(line, marker, "band marker present but no band number followed");
        return None;
    }
    digits.parse().ok()
}

/// Parse one scan row into a [`ScanEntry`], `None` when the row is not a
/// scan result or any trailing field is non-numeric.
fn parse_scan_line(line: &str) -> Option<ScanEntry> {
    if !line.contains(SCAN_MARKER) {
        return None;
    }
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < SCAN_TAIL_FIELDS + 1 {
        return None;
    }

    // The technology token sits in the fixed leading field, quoted, right
    // after the marker: `+QSCAN: "LTE",…`.
    let head = parts[0];
    let rat = if head.contains("\"LTE\"") {
        RadioTech::Lte
    } else if head.contains("\"NR5G\"") {
        RadioTech::Nr5g
    } else {
        return None;
    };

    let n = parts.len();
    Some(ScanEntry {
        rat,
        rsrp: field_as(&parts, n - SCAN_RSRP_FROM_END)?,
        rsrq: field_as(&parts, n - SCAN_RSRQ_FROM_END)?,
        sinr: field_as(&parts, n - SCAN_SINR_FROM_END)?,
        band: field_as(&parts, n - SCAN_BAND_FROM_END)?,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
