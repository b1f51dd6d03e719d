//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Surface Sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub canvas: CanvasConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Where the canvas server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    #[serde(default = "default_live_path")]
    pub live_path: String,

    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_snapshot_path() -> String {
    "/api/canvas".into()
}

fn default_live_path() -> String {
    "/ws/canvas".into()
}

fn default_callback_path() -> String {
    "/api/canvas/callback".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            snapshot_path: default_snapshot_path(),
            live_path: default_live_path(),
            callback_path: default_callback_path(),
        }
    }
}

impl ServerConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn join(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// REST endpoint returning the full surface list.
    pub fn snapshot_url(&self) -> String {
        self.join(&self.snapshot_path)
    }

    /// REST endpoint accepting interaction callbacks.
    pub fn callback_url(&self) -> String {
        self.join(&self.callback_path)
    }

    /// Live channel URL: same host, scheme upgraded to ws/wss.
    pub fn live_url(&self) -> String {
        let http = self.join(&self.live_path);
        if let Some(rest) = http.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            http
        }
    }
}

/// Transport Manager timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Delay before retrying the live channel.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Interval between pulls once degraded.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive live-channel failures before falling back to polling.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Timeout for a single snapshot pull.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            failure_threshold: default_failure_threshold(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TransportConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Reconciler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfig {
    /// How long a removed surface stays visible as an exiting ghost.
    #[serde(default = "default_exit_duration_ms")]
    pub exit_duration_ms: u64,
}

fn default_exit_duration_ms() -> u64 {
    350
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            exit_duration_ms: default_exit_duration_ms(),
        }
    }
}

impl CanvasConfig {
    pub fn exit_duration(&self) -> Duration {
        Duration::from_millis(self.exit_duration_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "surface_sync_transport=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        json5::from_str(&substituted)
            .map_err(|e| crate::error::SurfaceSyncError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Non-fatal problems worth reporting at startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let base = &self.server.base_url;
        if !base.starts_with("http://") && !base.starts_with("https://") {
            warnings.push(format!("server.baseUrl '{base}' is not an http(s) URL"));
        }
        if self.transport.failure_threshold == 0 {
            warnings.push(
                "transport.failureThreshold is 0; the live channel will be abandoned after its first failure"
                    .into(),
            );
        }
        if self.transport.poll_interval_ms == 0 {
            warnings.push("transport.pollIntervalMs is 0; polling will spin".into());
        }
        if self.transport.reconnect_delay_ms == 0 {
            warnings.push("transport.reconnectDelayMs is 0; reconnects will not back off".into());
        }

        warnings
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".surface_sync")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, unique variable name
        unsafe { std::env::set_var("TEST_SS_BASE", "https://canvas.example") };
        let result = substitute_env_vars(r#"{"baseUrl": "${TEST_SS_BASE}"}"#);
        assert!(result.contains("https://canvas.example"));
        unsafe { std::env::remove_var("TEST_SS_BASE") };
    }

    #[test]
    fn test_env_var_missing() {
        let result = substitute_env_vars(r#"{"key": "${NONEXISTENT_VAR_SS_TEST}"}"#);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transport.reconnect_delay_ms, 5000);
        assert_eq!(config.transport.poll_interval_ms, 10_000);
        assert_eq!(config.transport.failure_threshold, 3);
        assert_eq!(config.canvas.exit_duration_ms, 350);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_derived_urls() {
        let server = ServerConfig::with_base_url("http://localhost:8000/");
        assert_eq!(server.snapshot_url(), "http://localhost:8000/api/canvas");
        assert_eq!(server.live_url(), "ws://localhost:8000/ws/canvas");
        assert_eq!(server.callback_url(), "http://localhost:8000/api/canvas/callback");

        let secure = ServerConfig::with_base_url("https://leo.example");
        assert_eq!(secure.live_url(), "wss://leo.example/ws/canvas");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_load_json5_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are fine
                server: { baseUrl: "http://10.0.0.2:9000" },
                transport: { pollIntervalMs: 2500 },
                logging: { format: "json" },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.base_url, "http://10.0.0.2:9000");
        assert_eq!(config.server.live_path, "/ws/canvas");
        assert_eq!(config.transport.poll_interval_ms, 2500);
        assert_eq!(config.transport.failure_threshold, 3);
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "json");
        assert_eq!(logging.output, "stderr");
    }

    #[test]
    fn test_load_invalid_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ server: ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, crate::error::SurfaceSyncError::Config(_)));
    }

    #[test]
    fn test_validate_warns() {
        let mut config = Config::default();
        config.server.base_url = "ftp://nope".into();
        config.transport.failure_threshold = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("ftp://nope"));
    }
}
