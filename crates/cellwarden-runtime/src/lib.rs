//! `cellwarden-runtime` – The Decision/Action Engine
//!
//! The execution engine that turns raw modem telemetry into governed
//! corrective actions, one polling cycle at a time.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]:
//!   the cycle orchestrator (override check → rate-limit check → telemetry
//!   fetch → decision request → enforce & execute → publish → sleep), with
//!   fault containment at the loop boundary.
//! - [`grammar`] – [`decode`][grammar::decode]:
//!   free-text decisions → the closed
//!   [`ActionCommand`][cellwarden_types::ActionCommand] enum, with the
//!   `Wait(5)` fail-safe for absent decisions.
//! - [`executor`] – [`ActionExecutor`][executor::ActionExecutor]:
//!   actions → literal AT command sequences via the transport, with the
//!   kernel's blacklist rule enforced before transmission.
//! - [`decision`] – [`DecisionClient`][decision::DecisionClient]:
//!   Ollama `/api/generate` client behind the
//!   [`DecisionService`][decision::DecisionService] seam.
//! - [`prompt`] – [`PromptBuilder`][prompt::PromptBuilder]:
//!   telemetry → decision prompt, blacklisted bands excluded from the
//!   decision context.
//! - [`observability`] – [`init_tracing`][observability::init_tracing]:
//!   `tracing` subscriber with optional OTLP span export.

pub mod control_loop;
pub mod decision;
pub mod executor;
pub mod grammar;
pub mod observability;
pub mod prompt;

pub use control_loop::{ControlLoop, ControlLoopConfig, CycleOutcome};
pub use decision::{DecisionClient, DecisionError, DecisionService};
pub use executor::{ActionExecutor, ExecutionOutcome};
pub use grammar::decode;
pub use observability::{TracerProviderGuard, init_tracing};
pub use prompt::PromptBuilder;
