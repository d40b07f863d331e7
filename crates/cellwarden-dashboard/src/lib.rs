//! `cellwarden-dashboard` – The Read-Only Status Web UI
//!
//! Boots a lightweight HTTP + WebSocket server that:
//!
//! 1. **Serves** the embedded single-page status UI at every plain HTTP
//!    path, and the current [`DashboardSnapshot`][cellwarden_types::DashboardSnapshot]
//!    as JSON at `/api/state`.
//! 2. **Streams** snapshot JSON to every connected WebSocket client on a
//!    fixed refresh interval.
//!
//! There are no mutation endpoints: inbound WebSocket messages are
//! discarded. Pausing the watchdog is done with the manual-override marker
//! file on the host, never through the dashboard.

pub mod server;

pub use server::{DEFAULT_PORT, DashboardServer};
