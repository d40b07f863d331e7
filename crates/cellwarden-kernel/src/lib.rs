//! `cellwarden-kernel` – Governance & Safety
//!
//! The parts of the watchdog that say *no*. Nothing here talks to the modem
//! or the decision service; these components only admit, reject, or pause
//! what the runtime wants to do.
//!
//! # Modules
//!
//! - [`rate_limiter`] – [`RateLimiter`][rate_limiter::RateLimiter]:
//!   sliding one-hour admission window bounding how many mutating actions
//!   may run per hour.
//! - [`verifier`] – [`ActionVerifier`][verifier::ActionVerifier]:
//!   a rule engine validating every [`ActionCommand`][cellwarden_types::ActionCommand]
//!   before transmission; ships with [`BlacklistRule`][verifier::BlacklistRule],
//!   the last line of defense against locking onto a forbidden band.
//! - [`override_switch`] – [`OverrideSwitch`][override_switch::OverrideSwitch]:
//!   operator kill switch; while the marker file exists all mutating
//!   actions are suspended.

pub mod override_switch;
pub mod rate_limiter;
pub mod verifier;

pub use override_switch::OverrideSwitch;
pub use rate_limiter::RateLimiter;
pub use verifier::{ActionVerifier, BlacklistRule, Rule};
