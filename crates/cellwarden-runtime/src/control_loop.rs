//! [`ControlLoop`] – the polling cycle orchestrator.
//!
//! Each cycle walks a fixed stage sequence:
//!
//! ```text
//! Idle → CheckOverride → CheckRateLimit → FetchTelemetry → RequestDecision
//!      → EnforceAndExecute → PublishState → Sleep → Idle
//! ```
//!
//! with any unhandled stage fault diverting to `FaultSleep` (a longer fixed
//! backoff) before the next attempt. Each stage reports an explicit result
//! value; the only `?`-propagation reaching [`ControlLoop::run`] is the
//! single [`WardenError`] fault type, so the process never dies on one bad
//! cycle.
//!
//! # Safety valves
//!
//! * **Manual override** – when the operator's marker file exists the cycle
//!   publishes a single "paused" log line and does nothing else: no
//!   telemetry fetch, no decision request, no action.
//! * **Rate limiting** – mutating actions pass through the kernel's sliding
//!   window; a denied action is dropped and logged, never executed.
//! * **No-data fallback** – unreliable telemetry suppresses the decision
//!   request entirely and the cycle proceeds as if the decision were
//!   absent, which the grammar decodes to `Wait(5)`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use cellwarden_kernel::{OverrideSwitch, RateLimiter};
use cellwarden_state::StateStore;
use cellwarden_telemetry::{SourceFormat, TelemetryParser};
use cellwarden_transport::Transport;
use cellwarden_types::{
    ActionCommand, ActionLogEntry, BandPlan, DashboardSnapshot, DecisionActivity, LogLevel,
    TelemetrySnapshot, WardenError,
};

use crate::decision::DecisionService;
use crate::executor::{ActionExecutor, CMD_CA_INFO, CMD_SERVING_CELL, ExecutionOutcome};
use crate::grammar;
use crate::prompt::PromptBuilder;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ControlLoop`].
pub struct ControlLoopConfig {
    /// Pause between successful cycles.
    pub poll_interval: Duration,
    /// Pause after a faulted cycle.
    pub fault_backoff: Duration,
    /// Hourly cap on mutating actions.
    pub max_actions_per_hour: u32,
    /// Marker file that pauses all mutating actions while present.
    pub override_marker: std::path::PathBuf,
    /// Band blacklist and reset defaults.
    pub plan: BandPlan,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            fault_backoff: Duration::from_secs(60),
            max_actions_per_hour: 10,
            override_marker: std::path::PathBuf::from("/tmp/cellwarden-override"),
            plan: BandPlan::default(),
        }
    }
}

/// How one cycle ended.
#[derive(Debug, PartialEq)]
pub enum CycleOutcome {
    /// Manual override engaged; nothing was fetched or executed.
    Paused,
    /// Hourly budget already spent; nothing was fetched or executed.
    RateLimited,
    /// The full stage sequence ran.
    Completed {
        action: ActionCommand,
        /// `None` when the rate limiter dropped the action.
        execution: Option<ExecutionOutcome>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every subsystem needed to run polling cycles until cancelled.
pub struct ControlLoop {
    parser: TelemetryParser,
    prompt: PromptBuilder,
    executor: ActionExecutor,
    limiter: RateLimiter,
    override_switch: OverrideSwitch,
    transport: Arc<dyn Transport>,
    decision: Arc<dyn DecisionService>,
    store: StateStore,
    /// Working copy of the published state; mutated freely during a cycle
    /// and published wholesale at the end.
    working: DashboardSnapshot,
    /// Audit trail of admitted mutating actions.
    action_history: Vec<ActionLogEntry>,
    poll_interval: Duration,
    fault_backoff: Duration,
}

impl ControlLoop {
    pub fn new(
        config: ControlLoopConfig,
        transport: Arc<dyn Transport>,
        decision: Arc<dyn DecisionService>,
        store: StateStore,
    ) -> Self {
        let working = store.read();
        Self {
            parser: TelemetryParser::new(config.plan.clone()),
            prompt: PromptBuilder::new(config.plan.clone()),
            executor: ActionExecutor::new(config.plan),
            limiter: RateLimiter::new(config.max_actions_per_hour),
            override_switch: OverrideSwitch::new(config.override_marker),
            transport,
            decision,
            store,
            working,
            action_history: Vec::new(),
            poll_interval: config.poll_interval,
            fault_backoff: config.fault_backoff,
        }
    }

    /// Admitted mutating actions, oldest first.
    pub fn action_history(&self) -> &[ActionLogEntry] {
        &self.action_history
    }

    /// Run cycles until `shutdown` is set. Termination is at cycle
    /// granularity: an action already handed to the transport completes.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!("control loop started");
        while !shutdown.load(Ordering::SeqCst) {
            let delay = match self.cycle().await {
                Ok(outcome) => {
                    debug!(?outcome, "cycle complete");
                    self.poll_interval
                }
                Err(e) => {
                    // FaultSleep: anything a stage could not handle lands
                    // here; log loudly, back off, try again.
                    error!(error = %e, "cycle fault; entering extended backoff");
                    self.working
                        .push_log(LogLevel::Error, format!("cycle fault: {e}"));
                    self.publish();
                    self.fault_backoff
                }
            };
            tokio::time::sleep(delay).await;
        }
        info!("control loop stopped");
    }

    /// Drive one full cycle: CheckOverride through PublishState.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, WardenError> {
        // ── CheckOverride ─────────────────────────────────────────────────────
        if self.override_switch.is_engaged() {
            self.working.push_log(
                LogLevel::Warning,
                "paused: manual override marker present",
            );
            self.publish();
            return Ok(CycleOutcome::Paused);
        }

        // ── CheckRateLimit ────────────────────────────────────────────────────
        if self.limiter.exhausted(Utc::now()) {
            let cap = self.limiter.cap();
            warn!(cap, "hourly action limit already reached; skipping cycle");
            self.working.push_log(
                LogLevel::Warning,
                format!("action limit reached ({cap}/hour); pausing"),
            );
            self.publish();
            return Ok(CycleOutcome::RateLimited);
        }

        // ── FetchTelemetry ────────────────────────────────────────────────────
        let telemetry = self.fetch_telemetry().await?;

        // ── RequestDecision ───────────────────────────────────────────────────
        let decision_text = match &telemetry.parse_error {
            None => self.request_decision(&telemetry).await,
            Some(reason) => {
                // Unreliable telemetry must not drive an action; proceed as
                // if the decision were absent.
                warn!(reason = %reason, "telemetry unreliable; skipping decision request");
                self.working.push_log(
                    LogLevel::Warning,
                    format!("telemetry unreliable ({reason}); falling back to WAIT"),
                );
                String::new()
            }
        };

        // ── EnforceAndExecute ─────────────────────────────────────────────────
        let action = grammar::decode(&decision_text);
        let execution = self.enforce_and_execute(&action).await;

        // ── PublishState ──────────────────────────────────────────────────────
        self.working.telemetry = Some(telemetry);
        self.publish();

        Ok(CycleOutcome::Completed { action, execution })
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Read the serving cell, then enrich with aggregated-CA band info.
    /// The serving-cell fetch is load-bearing; the CA fetch is best-effort.
    async fn fetch_telemetry(&mut self) -> Result<TelemetrySnapshot, WardenError> {
        let serving = self
            .transport
            .execute(CMD_SERVING_CELL)
            .await
            .map_err(|e| WardenError::Transport(e.to_string()))?;
        let mut snap = self
            .parser
            .parse(&serving.stdout, SourceFormat::ServingCell);

        if snap.is_reliable() {
            match self.transport.execute(CMD_CA_INFO).await {
                Ok(out) => {
                    let ca = self.parser.parse(&out.stdout, SourceFormat::AggregatedCa);
                    snap.active_lte_bands = ca.active_lte_bands;
                    snap.active_nr_band = ca.active_nr_band;
                    snap.band_info = ca.band_info;
                }
                Err(e) => {
                    warn!(error = %e, "aggregated CA fetch failed; continuing without band detail");
                }
            }
        }
        Ok(snap)
    }

    /// Build the prompt and ask the decision service. Any failure falls
    /// back to the empty decision, which decodes to `Wait(5)`.
    async fn request_decision(&mut self, telemetry: &TelemetrySnapshot) -> String {
        let prompt = self.prompt.build(telemetry);
        match self.decision.infer(&prompt).await {
            Ok(text) => {
                info!(decision = %text, "decision received");
                self.working
                    .push_log(LogLevel::Info, format!("decision: {text}"));
                self.working.decision = Some(DecisionActivity {
                    prompt,
                    response: text.clone(),
                    timestamp: Utc::now(),
                });
                text
            }
            Err(e) => {
                warn!(error = %e, "decision service failed; falling back to WAIT");
                self.working.push_log(
                    LogLevel::Warning,
                    format!("decision service unavailable ({e}); falling back to WAIT"),
                );
                self.working.decision = Some(DecisionActivity {
                    prompt,
                    response: String::new(),
                    timestamp: Utc::now(),
                });
                String::new()
            }
        }
    }

    /// Gate mutating actions through the rate limiter, then execute.
    async fn enforce_and_execute(&mut self, action: &ActionCommand) -> Option<ExecutionOutcome> {
        if action.is_mutating() {
            let now = Utc::now();
            if !self.limiter.admit(now) {
                warn!(action = action.label(), "rate limit denied action; dropping");
                self.working.push_log(
                    LogLevel::Warning,
                    format!("rate limit denied {}; action dropped", action.label()),
                );
                return None;
            }
            self.limiter.record(now);
            self.action_history.push(ActionLogEntry {
                timestamp: now,
                command: action.clone(),
            });
        }

        let outcome = self
            .executor
            .execute(action, self.transport.as_ref())
            .await;
        let level = match (&outcome, action) {
            (ExecutionOutcome::Rejected(_), _) => LogLevel::Warning,
            (_, ActionCommand::Unknown { .. }) => LogLevel::Warning,
            _ => LogLevel::Info,
        };
        self.working
            .push_log(level, format!("{}: {}", action.label(), outcome.detail()));
        Some(outcome)
    }

    fn publish(&self) {
        self.store.publish(self.working.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cellwarden_transport::{CommandOutput, TransportError};
    use cellwarden_types::{DisplaySettings, Mode};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use crate::decision::DecisionError;
    use crate::executor::CMD_RESTART_MODEM;

    const LTE_SERVING: &str = r#"+QENG: "servingcell","NOCONN","LTE","FDD",262,01,9F8B018,300,1275,3,5,5,-96,-12,11,18,-"#;

    /// Answers the serving-cell and CA fetches from a script, records
    /// every command.
    struct ScriptedTransport {
        serving_reply: String,
        calls: Mutex<Vec<String>>,
        fail_serving: bool,
    }

    impl ScriptedTransport {
        fn with_serving(reply: &str) -> Self {
            Self {
                serving_reply: reply.to_string(),
                calls: Mutex::new(Vec::new()),
                fail_serving: false,
            }
        }

        fn failing() -> Self {
            Self {
                serving_reply: String::new(),
                calls: Mutex::new(Vec::new()),
                fail_serving: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
            self.calls.lock().unwrap().push(command.to_string());
            if self.fail_serving {
                return Err(TransportError::Connect("scripted outage".into()));
            }
            let stdout = if command == CMD_SERVING_CELL {
                self.serving_reply.clone()
            } else {
                String::new()
            };
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            })
        }
    }

    /// Returns a fixed reply (or error), counting invocations.
    struct ScriptedDecision {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedDecision {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DecisionService for ScriptedDecision {
        async fn infer(&self, _prompt: &str) -> Result<String, DecisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(DecisionError::BadResponse("scripted failure".into())),
            }
        }
    }

    fn make_loop(
        transport: Arc<ScriptedTransport>,
        decision: Arc<ScriptedDecision>,
        cap: u32,
        marker: std::path::PathBuf,
    ) -> (ControlLoop, StateStore) {
        let store = StateStore::new(DisplaySettings {
            router_host: "192.168.1.1".into(),
            decision_model: "llama3".into(),
            poll_interval_s: 60,
            max_actions_per_hour: cap,
        });
        let config = ControlLoopConfig {
            poll_interval: Duration::from_millis(1),
            fault_backoff: Duration::from_millis(1),
            max_actions_per_hour: cap,
            override_marker: marker,
            plan: BandPlan::default(),
        };
        let control = ControlLoop::new(config, transport, decision, store.clone());
        (control, store)
    }

    fn absent_marker(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("override.lock")
    }

    #[tokio::test]
    async fn full_cycle_publishes_parsed_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_serving(LTE_SERVING));
        let decision = Arc::new(ScriptedDecision::replying("WAIT:5"));
        let (mut control, store) =
            make_loop(transport.clone(), decision.clone(), 10, absent_marker(&dir));

        let outcome = control.cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert_eq!(decision.call_count(), 1);

        let snap = store.read();
        let telemetry = snap.telemetry.expect("telemetry published");
        assert_eq!(telemetry.mode, Mode::Lte);
        assert_eq!(telemetry.primary_band.as_deref(), Some("B3"));
        assert_eq!(telemetry.rsrp, Some(-96));
        assert_eq!(telemetry.rsrq, Some(-12));
        assert_eq!(telemetry.sinr, Some(11));
        let activity = snap.decision.expect("decision activity published");
        assert_eq!(activity.response, "WAIT:5");
    }

    #[tokio::test]
    async fn override_marker_pauses_everything() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("override.lock");
        std::fs::write(&marker, b"").unwrap();

        let transport = Arc::new(ScriptedTransport::with_serving(LTE_SERVING));
        let decision = Arc::new(ScriptedDecision::replying("RESTART_MODEM"));
        let (mut control, store) = make_loop(transport.clone(), decision.clone(), 10, marker);

        let outcome = control.cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Paused);

        // No telemetry fetch, no decision request, no action.
        assert!(transport.calls().is_empty());
        assert_eq!(decision.call_count(), 0);

        // The published tail gained exactly one "paused" entry.
        let snap = store.read();
        assert_eq!(snap.log_tail.len(), 1);
        assert!(snap.log_tail[0].message.contains("paused"));
    }

    #[tokio::test]
    async fn parse_error_suppresses_decision_and_falls_back_to_wait() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_serving("gibberish"));
        let decision = Arc::new(ScriptedDecision::replying("RESTART_MODEM"));
        let (mut control, store) =
            make_loop(transport, decision.clone(), 10, absent_marker(&dir));

        let outcome = control.cycle().await.unwrap();
        assert_eq!(decision.call_count(), 0, "decision request must be skipped");
        assert!(matches!(
            outcome,
            CycleOutcome::Completed {
                action: ActionCommand::Wait { minutes: 5 },
                ..
            }
        ));
        let telemetry = store.read().telemetry.unwrap();
        assert!(telemetry.parse_error.is_some());
    }

    #[tokio::test]
    async fn failed_decision_falls_back_to_wait_without_consuming_budget() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_serving(LTE_SERVING));
        let decision = Arc::new(ScriptedDecision::failing());
        let (mut control, _store) =
            make_loop(transport, decision.clone(), 10, absent_marker(&dir));

        let outcome = control.cycle().await.unwrap();
        assert_eq!(decision.call_count(), 1);
        assert!(matches!(
            outcome,
            CycleOutcome::Completed {
                action: ActionCommand::Wait { minutes: 5 },
                ..
            }
        ));
        // Wait never reaches the limiter's timestamp sequence.
        assert!(control.action_history().is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_skips_the_cycle_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_serving(LTE_SERVING));
        let decision = Arc::new(ScriptedDecision::replying("RESTART_MODEM"));
        let (mut control, store) =
            make_loop(transport.clone(), decision.clone(), 0, absent_marker(&dir));

        let outcome = control.cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::RateLimited);
        assert!(transport.calls().is_empty());
        assert_eq!(decision.call_count(), 0);
        assert!(
            store
                .read()
                .log_tail
                .iter()
                .any(|l| l.message.contains("action limit reached"))
        );
    }

    #[tokio::test]
    async fn mutating_action_is_executed_and_recorded_once_admitted() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_serving(LTE_SERVING));
        let decision = Arc::new(ScriptedDecision::replying("RESTART_MODEM"));
        let (mut control, _store) =
            make_loop(transport.clone(), decision, 10, absent_marker(&dir));

        let outcome = control.cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Completed {
                action: ActionCommand::RestartModem,
                execution: Some(ExecutionOutcome::Dispatched(_)),
            }
        ));
        assert!(
            transport
                .calls()
                .iter()
                .any(|c| c == CMD_RESTART_MODEM)
        );
        assert_eq!(control.action_history().len(), 1);
        assert_eq!(
            control.action_history()[0].command,
            ActionCommand::RestartModem
        );
    }

    #[tokio::test]
    async fn second_action_over_cap_is_dropped_not_executed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_serving(LTE_SERVING));
        let decision = Arc::new(ScriptedDecision::replying("RESTART_MODEM"));
        let (mut control, _store) =
            make_loop(transport.clone(), decision, 1, absent_marker(&dir));

        let first = control.cycle().await.unwrap();
        assert!(matches!(
            first,
            CycleOutcome::Completed {
                execution: Some(_),
                ..
            }
        ));

        // Budget spent: the pre-check short-circuits the next cycle.
        let second = control.cycle().await.unwrap();
        assert_eq!(second, CycleOutcome::RateLimited);

        let restarts = transport
            .calls()
            .iter()
            .filter(|c| *c == CMD_RESTART_MODEM)
            .count();
        assert_eq!(restarts, 1);
    }

    #[tokio::test]
    async fn transport_outage_is_a_cycle_fault() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::failing());
        let decision = Arc::new(ScriptedDecision::replying("WAIT"));
        let (mut control, _store) = make_loop(transport, decision, 10, absent_marker(&dir));

        let result = control.cycle().await;
        assert!(matches!(result, Err(WardenError::Transport(_))));
    }
}
