//! Configuration vault – reads/writes `~/.cellwarden/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use cellwarden_types::DisplaySettings;

/// `[router]` – how to reach the device.
#[derive(Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_router_host")]
    pub host: String,
    #[serde(default = "default_router_user")]
    pub user: String,
    /// SSH password. Stored as plain text – users should rely on the
    /// restrictive file permissions applied by [`save`]. Empty means
    /// key-based authentication.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default = "default_router_port")]
    pub port: u16,
}

impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("port", &self.port)
            .finish()
    }
}

/// `[decision]` – the model server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_decision_url")]
    pub url: String,
    #[serde(default = "default_decision_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
}

/// `[watchdog]` – loop cadence and governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: u64,
    #[serde(default = "default_max_actions_per_hour")]
    pub max_actions_per_hour: u32,
    #[serde(default = "default_override_marker")]
    pub override_marker: PathBuf,
    #[serde(default = "default_fault_backoff_s")]
    pub fault_backoff_s: u64,
}

/// `[dashboard]` – the read-only web UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

/// Persisted configuration stored in `~/.cellwarden/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

fn default_router_host() -> String {
    "192.168.1.1".to_string()
}
fn default_router_user() -> String {
    "root".to_string()
}
fn default_router_port() -> u16 {
    22
}
fn default_decision_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_decision_model() -> String {
    "llama3".to_string()
}
fn default_request_timeout_s() -> u64 {
    30
}
fn default_poll_interval_s() -> u64 {
    60
}
fn default_max_actions_per_hour() -> u32 {
    10
}
fn default_override_marker() -> PathBuf {
    PathBuf::from("/tmp/cellwarden-override")
}
fn default_fault_backoff_s() -> u64 {
    60
}
fn default_dashboard_port() -> u16 {
    8080
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: default_router_host(),
            user: default_router_user(),
            password: String::new(),
            port: default_router_port(),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            url: default_decision_url(),
            model: default_decision_model(),
            request_timeout_s: default_request_timeout_s(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: default_poll_interval_s(),
            max_actions_per_hour: default_max_actions_per_hour(),
            override_marker: default_override_marker(),
            fault_backoff_s: default_fault_backoff_s(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: default_dashboard_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            decision: DecisionConfig::default(),
            watchdog: WatchdogConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Config {
    /// The display-safe subset shown on the dashboard. Credentials are
    /// deliberately not representable here.
    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            router_host: self.router.host.clone(),
            decision_model: self.decision.model.clone(),
            poll_interval_s: self.watchdog.poll_interval_s,
            max_actions_per_hour: self.watchdog.max_actions_per_hour,
        }
    }
}

/// Return the path to `~/.cellwarden/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cellwarden").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `CELLWARDEN_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `CELLWARDEN_ROUTER_HOST` | `router.host` |
/// | `CELLWARDEN_ROUTER_PASSWORD` | `router.password` |
/// | `CELLWARDEN_DECISION_URL` | `decision.url` |
/// | `CELLWARDEN_MODEL` | `decision.model` |
/// | `CELLWARDEN_DASHBOARD_PORT` | `dashboard.port` |
/// | `CELLWARDEN_OVERRIDE_MARKER` | `watchdog.override_marker` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CELLWARDEN_ROUTER_HOST") {
        cfg.router.host = v;
    }
    if let Ok(v) = std::env::var("CELLWARDEN_ROUTER_PASSWORD") {
        cfg.router.password = v;
    }
    if let Ok(v) = std::env::var("CELLWARDEN_DECISION_URL") {
        cfg.decision.url = v;
    }
    if let Ok(v) = std::env::var("CELLWARDEN_MODEL") {
        cfg.decision.model = v;
    }
    if let Ok(v) = std::env::var("CELLWARDEN_DASHBOARD_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.dashboard.port = port;
    }
    if let Ok(v) = std::env::var("CELLWARDEN_OVERRIDE_MARKER") {
        cfg.watchdog.override_marker = PathBuf::from(v);
    }
}

/// Save the config to disk, creating `~/.cellwarden/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // The config may hold the router password: owner-only access.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_router_password() {
        let mut cfg = Config::default();
        cfg.router.password = "hunter2".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(
            !debug_str.contains("hunter2"),
            "password must not appear in debug output"
        );
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn debug_shows_not_set_for_empty_password() {
        let cfg = Config::default();
        let debug_str = format!("{:?}", cfg);
        assert!(debug_str.contains("<not set>"));
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.router.host, "192.168.1.1");
        assert_eq!(loaded.router.port, 22);
        assert_eq!(loaded.decision.model, "llama3");
        assert_eq!(loaded.watchdog.max_actions_per_hour, 10);
        assert_eq!(loaded.dashboard.port, 8080);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[router]\nhost = \"10.0.0.1\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.router.host, "10.0.0.1");
        assert_eq!(loaded.router.user, "root");
        assert_eq!(loaded.watchdog.poll_interval_s, 60);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");
        let dir_mode = fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn config_path_points_to_cellwarden_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".cellwarden"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_router_host() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("CELLWARDEN_ROUTER_HOST", "router.lan") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.router.host, "router.lan");
        unsafe { std::env::remove_var("CELLWARDEN_ROUTER_HOST") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_port() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("CELLWARDEN_DASHBOARD_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.dashboard.port, default_dashboard_port());
        unsafe { std::env::remove_var("CELLWARDEN_DASHBOARD_PORT") };
    }

    #[test]
    fn display_settings_exclude_credentials() {
        let mut cfg = Config::default();
        cfg.router.password = "hunter2".to_string();
        let settings = cfg.display_settings();
        let json = format!("{settings:?}");
        assert!(!json.contains("hunter2"));
        assert_eq!(settings.router_host, cfg.router.host);
        assert_eq!(settings.max_actions_per_hour, 10);
    }
}
