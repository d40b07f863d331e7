//! `cellwarden` – autonomous remediation daemon for a cellular router.
//!
//! The binary:
//!
//! 1. Loads (or creates) `~/.cellwarden/config.toml` and applies
//!    `CELLWARDEN_*` environment overrides.
//! 2. Probes the decision service and reports available models.
//! 3. Starts the read-only dashboard server.
//! 4. Runs the control loop until **Ctrl-C** flips the shutdown flag; an
//!    action already dispatched to the router completes before exit.

mod config;
mod probe;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use cellwarden_dashboard::DashboardServer;
use cellwarden_runtime::{ControlLoop, ControlLoopConfig, DecisionClient, init_tracing};
use cellwarden_state::StateStore;
use cellwarden_transport::SshTransport;
use cellwarden_types::BandPlan;

fn main() {
    // Structured logging first; the tracing guard must outlive the runtime.
    // (The OTLP exporter is initialised before the Tokio runtime exists.)
    let _guard = init_tracing("cellwarden");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  No config found – defaults written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Could not write default config".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    info!(config = ?cfg, "configuration resolved");

    // ── Decision-service probe ────────────────────────────────────────────
    print!("\n  Probing decision service at {} … ", cfg.decision.url.dimmed());
    match probe::fetch_models(&cfg.decision.url) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            if !models.iter().any(|m| m.name.starts_with(&cfg.decision.model)) {
                println!(
                    "  {} configured model '{}' not found on the server",
                    "warning:".yellow(),
                    cfg.decision.model
                );
            }
        }
        Err(reason) => {
            println!("{}", "offline".yellow());
            println!("  {reason}");
            println!("  The loop will fall back to WAIT until the service responds.");
        }
    }

    // ── Shutdown flag + Ctrl-C handler ────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C received – finishing the current cycle …".yellow().bold());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop with SIGTERM instead");
    }

    // ── Wiring ────────────────────────────────────────────────────────────
    let store = StateStore::new(cfg.display_settings());

    let mut transport =
        SshTransport::new(&cfg.router.host, &cfg.router.user).with_port(cfg.router.port);
    if !cfg.router.password.is_empty() {
        transport = transport.with_password(&cfg.router.password);
    }

    let decision = DecisionClient::new(&cfg.decision.url, &cfg.decision.model)
        .with_timeout(Duration::from_secs(cfg.decision.request_timeout_s));

    let loop_config = ControlLoopConfig {
        poll_interval: Duration::from_secs(cfg.watchdog.poll_interval_s),
        fault_backoff: Duration::from_secs(cfg.watchdog.fault_backoff_s),
        max_actions_per_hour: cfg.watchdog.max_actions_per_hour,
        override_marker: cfg.watchdog.override_marker.clone(),
        plan: BandPlan::default(),
    };
    let mut control = ControlLoop::new(
        loop_config,
        Arc::new(transport),
        Arc::new(decision),
        store.clone(),
    );

    println!(
        "\n  Dashboard on {}  ·  polling every {}s  ·  override marker {}\n",
        format!("http://localhost:{}", cfg.dashboard.port).bold(),
        cfg.watchdog.poll_interval_s,
        cfg.watchdog.override_marker.display()
    );

    // The runtime starts only after tracing/OTel are initialised.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build Tokio runtime");

    runtime.block_on(async {
        let dashboard = DashboardServer::new(store.clone()).with_port(cfg.dashboard.port);
        tokio::spawn(async move {
            if let Err(e) = dashboard.run().await {
                warn!(error = %e, "dashboard server exited");
            }
        });

        control.run(shutdown).await;
    });

    println!("{}", "  ✓ Cellwarden stopped.".green());
}

fn print_banner() {
    println!();
    println!("  {}", "CELLWARDEN".bold());
    println!("  {}", "autonomous cellular modem watchdog".dimmed());
    println!();
}
