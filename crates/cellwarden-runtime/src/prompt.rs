//! Prompt construction for the decision service.
//!
//! The standing instructions live in `decision_prompt.txt` (compiled in via
//! `include_str!`); [`PromptBuilder::build`] substitutes the current
//! telemetry and the forbidden-band lists into the template. Blacklisted
//! bands are excluded from the rendered telemetry as well – the decision
//! service should never even see them as an option. Steering is advisory;
//! the executor's blacklist rule does the enforcing.

use std::fmt::Write;

use cellwarden_types::{BandAvailability, BandPlan, Mode, TelemetrySnapshot};

/// Standing decision instructions, action grammar included.
const PROMPT_TEMPLATE: &str = include_str!("decision_prompt.txt");

/// Renders one [`TelemetrySnapshot`] into the decision prompt.
pub struct PromptBuilder {
    plan: BandPlan,
}

impl PromptBuilder {
    pub fn new(plan: BandPlan) -> Self {
        Self { plan }
    }

    pub fn build(&self, snapshot: &TelemetrySnapshot) -> String {
        PROMPT_TEMPLATE
            .replace("{lte_blocked}", &join(self.plan.lte_blocked.iter()))
            .replace("{nr5g_blocked}", &join(self.plan.nr5g_blocked.iter()))
            .replace("{telemetry}", &self.render_telemetry(snapshot))
    }

    fn render_telemetry(&self, snap: &TelemetrySnapshot) -> String {
        let mut out = String::new();

        let mode = match snap.mode {
            Mode::Lte => "LTE",
            Mode::Nr5g => "NR5G",
            Mode::Unknown => "unknown",
            Mode::Error => "error",
        };
        let _ = writeln!(out, "Mode: {mode}");

        if let Some(band) = &snap.primary_band {
            let _ = writeln!(out, "Primary band: {band}");
        }
        if let (Some(rsrp), Some(rsrq), Some(sinr)) = (snap.rsrp, snap.rsrq, snap.sinr) {
            let _ = writeln!(
                out,
                "RSRP: {rsrp} dBm / RSRQ: {rsrq} dB / SINR: {sinr} dB"
            );
        }

        match snap.band_info {
            BandAvailability::Detected => {
                if !snap.active_lte_bands.is_empty() {
                    let _ = writeln!(
                        out,
                        "Active LTE bands: {}",
                        join(snap.active_lte_bands.iter())
                    );
                }
                if let Some(nr) = snap.active_nr_band {
                    let _ = writeln!(out, "Active NR5G band: {nr}");
                }
            }
            BandAvailability::NoBandInfo => {
                let _ = writeln!(out, "Aggregated bands: no band info");
            }
            BandAvailability::NotApplicable => {
                let _ = writeln!(out, "Aggregated bands: not applicable");
            }
        }

        // Scan rows, minus anything forbidden: the decision context never
        // offers a blacklisted band.
        let visible: Vec<String> = snap
            .scan_entries
            .iter()
            .filter(|e| !self.plan.is_blocked(e.rat, e.band))
            .map(|e| {
                format!(
                    "  {} band {}: RSRP {} dBm, RSRQ {} dB, SINR {} dB",
                    e.rat, e.band, e.rsrp, e.rsrq, e.sinr
                )
            })
            .collect();
        if !visible.is_empty() {
            let _ = writeln!(out, "Scan results:");
            for line in visible {
                let _ = writeln!(out, "{line}");
            }
        }

        out
    }
}

fn join<'a>(bands: impl Iterator<Item = &'a u16>) -> String {
    bands
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(":")
}
