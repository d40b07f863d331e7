//! [`ActionExecutor`] – tagged actions → AT command sequences.
//!
//! The exhaustive match over [`ActionCommand`] is the single place where
//! decisions become modem commands. AT invocations are preserved literally
//! (the router's `gsmctl` wrapper is picky about formatting) and every
//! `SetBands` passes the kernel's [`ActionVerifier`] before anything is
//! transmitted – the prompt already steers the decision service away from
//! blacklisted bands, but the executor is the last line of defense.
//!
//! Transport failures are logged and never fatal: the cycle goes on to
//! publish whatever telemetry and logs it has.

use std::time::Duration;

use tracing::{error, info, warn};

use cellwarden_kernel::{ActionVerifier, BlacklistRule};
use cellwarden_transport::Transport;
use cellwarden_types::{ActionCommand, BandPlan, RadioTech};

// ────────────────────────────────────────────────────────────────────────────
// Command strings
// ────────────────────────────────────────────────────────────────────────────

pub const CMD_SERVING_CELL: &str = r#"gsmctl -A 'AT+QENG="servingcell"'"#;
pub const CMD_CA_INFO: &str = "gsmctl -A 'AT+QCAINFO'";
pub const CMD_RESTART_MODEM: &str = "gsmctl -A 'AT+CFUN=1,1'";
pub const CMD_FULL_SCAN: &str = "gsmctl -A 'AT+QSCAN=3,1'";
pub const CMD_IFACE_DOWN: &str = "ubus call network.interface.mobile down";
pub const CMD_IFACE_UP: &str = "ubus call network.interface.mobile up";

/// `AT+QNWPREFCFG="lte_band",1:3:7` wrapped for the router shell.
fn band_lock_command(tech: RadioTech, bands: &[u16]) -> String {
    let key = match tech {
        RadioTech::Lte => "lte_band",
        RadioTech::Nr5g => "nr5g_band",
    };
    let list = bands
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(":");
    format!(r#"gsmctl -A 'AT+QNWPREFCFG="{key}",{list}'"#)
}

/// How long to let the interface settle between scan steps.
const DEFAULT_SCAN_SETTLE: Duration = Duration::from_secs(5);

// ────────────────────────────────────────────────────────────────────────────
// Outcome
// ────────────────────────────────────────────────────────────────────────────

/// What happened to one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Commands were sent to the modem.
    Dispatched(String),
    /// Nothing was sent and nothing needed to be (e.g. `Wait`), or the
    /// transport failed and the action was abandoned.
    Noop(String),
    /// The action was refused by policy before transmission.
    Rejected(String),
}

impl ExecutionOutcome {
    pub fn detail(&self) -> &str {
        match self {
            ExecutionOutcome::Dispatched(d)
            | ExecutionOutcome::Noop(d)
            | ExecutionOutcome::Rejected(d) => d,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ActionExecutor
// ────────────────────────────────────────────────────────────────────────────

/// Maps a tagged action to concrete commands against the transport.
pub struct ActionExecutor {
    verifier: ActionVerifier,
    plan: BandPlan,
    scan_settle: Duration,
}

impl ActionExecutor {
    pub fn new(plan: BandPlan) -> Self {
        let mut verifier = ActionVerifier::new();
        verifier.add_rule(Box::new(BlacklistRule::new(plan.clone())));
        Self {
            verifier,
            plan,
            scan_settle: DEFAULT_SCAN_SETTLE,
        }
    }

    /// Shorten the scan settle delay (tests).
    pub fn with_scan_settle(mut self, settle: Duration) -> Self {
        self.scan_settle = settle;
        self
    }

    /// Execute one action. Never returns an error – governance shows up as
    /// [`ExecutionOutcome::Rejected`], transport trouble as a logged
    /// [`ExecutionOutcome::Noop`].
    pub async fn execute(
        &self,
        action: &ActionCommand,
        transport: &dyn Transport,
    ) -> ExecutionOutcome {
        match action {
            ActionCommand::Wait { minutes } => {
                info!(minutes, "decision is WAIT; nothing to execute");
                ExecutionOutcome::Noop(format!("wait {minutes} min"))
            }

            ActionCommand::RestartModem => {
                if run(transport, CMD_RESTART_MODEM).await {
                    ExecutionOutcome::Dispatched("modem soft-restart issued".into())
                } else {
                    ExecutionOutcome::Noop("modem restart failed in transport".into())
                }
            }

            ActionCommand::ResetBands => {
                let lte = band_lock_command(RadioTech::Lte, &self.plan.lte_defaults);
                let nr = band_lock_command(RadioTech::Nr5g, &self.plan.nr5g_defaults);
                let mut any = run(transport, &lte).await;
                any |= run(transport, &nr).await;
                // Band preferences only take effect after a modem restart.
                any |= run(transport, CMD_RESTART_MODEM).await;
                if any {
                    ExecutionOutcome::Dispatched("default band allow-lists restored".into())
                } else {
                    ExecutionOutcome::Noop("band reset failed in transport".into())
                }
            }

            ActionCommand::SetBands { tech, bands } => {
                if let Err(e) = self.verifier.verify(action) {
                    warn!(%tech, ?bands, error = %e, "band lock refused by policy");
                    return ExecutionOutcome::Rejected(e.to_string());
                }
                let cmd = band_lock_command(*tech, bands);
                if run(transport, &cmd).await {
                    ExecutionOutcome::Dispatched(format!("{tech} locked to bands {bands:?}"))
                } else {
                    ExecutionOutcome::Noop("band lock failed in transport".into())
                }
            }

            ActionCommand::FullScan => {
                // A scan drops connectivity, so the interface is parked
                // first and restored afterwards regardless of the scan's
                // own outcome. One action for the rate limiter, three
                // transport calls on the wire.
                run(transport, CMD_IFACE_DOWN).await;
                tokio::time::sleep(self.scan_settle).await;
                match transport.execute(CMD_FULL_SCAN).await {
                    Ok(out) => info!(result = %out.stdout, "full scan complete"),
                    Err(e) => error!(error = %e, "full scan failed in transport"),
                }
                run(transport, CMD_IFACE_UP).await;
                ExecutionOutcome::Dispatched("full network scan executed".into())
            }

            ActionCommand::Unknown { raw } => {
                warn!(raw = %raw, "unknown or incomplete decision; not executing");
                ExecutionOutcome::Noop(format!("unrecognized decision: {raw}"))
            }
        }
    }
}

/// Run one command, logging instead of propagating failures. Returns
/// `true` when the command reached the router.
async fn run(transport: &dyn Transport, command: &str) -> bool {
    match transport.execute(command).await {
        Ok(out) => {
            if out.has_error() {
                warn!(command, stderr = %out.stderr, "remote command reported errors");
            } else {
                info!(command, "remote command executed");
            }
            true
        }
        Err(e) => {
            error!(command, error = %e, "transport failure");
            false
        }
    }
}
