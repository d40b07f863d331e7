//! `cellwarden-telemetry` – AT-command output → normalized telemetry.
//!
//! The single entry point is [`TelemetryParser::parse`], which converts the
//! raw text a router returns for one command into a
//! [`TelemetrySnapshot`][cellwarden_types::TelemetrySnapshot]. The caller
//! names the [`SourceFormat`] it expects; adding support for new firmware
//! output means adding a format here, never touching call sites.
//!
//! Parsing never panics and never returns `Err` – malformed input lands in
//! the snapshot's `parse_error` field so the control loop can fall back to
//! its no-data default.

pub mod parser;

pub use parser::{SourceFormat, TelemetryParser};
