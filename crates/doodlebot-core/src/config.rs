//! Configuration loading and validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level doodlebot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token_env: Option<String>,
    /// Optional list of allowed user IDs. Empty = allow all.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Long-poll timeout for getUpdates, in seconds (default: 30).
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_token_env: None,
            allowed_users: Vec::new(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}

impl TelegramConfig {
    /// Resolve the bot token: `bot_token` first, then `bot_token_env`,
    /// then the plain `BOT_TOKEN` environment variable.
    pub fn resolve_bot_token(&self) -> Option<String> {
        resolve_secret_field(&self.bot_token, &self.bot_token_env).or_else(|| {
            std::env::var("BOT_TOKEN")
                .ok()
                .filter(|v| !v.is_empty())
        })
    }
}

/// Headless-browser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Path to Chrome/Chromium binary (auto-detected if omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,

    /// Run in headless mode (default: true).
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Navigation timeout in ms (default: 60000).
    #[serde(default = "default_nav_timeout")]
    pub nav_timeout_ms: u64,

    /// Total time to wait for the canvas target to appear, in ms (default: 30000).
    #[serde(default = "default_selector_wait")]
    pub selector_wait_ms: u64,

    /// Delay between canvas target probes, in ms (default: 500).
    #[serde(default = "default_selector_poll")]
    pub selector_poll_ms: u64,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            nav_timeout_ms: default_nav_timeout(),
            selector_wait_ms: default_selector_wait(),
            selector_poll_ms: default_selector_poll(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

impl BrowserConfig {
    /// Chrome binary path with `~` expanded.
    pub fn chrome_path(&self) -> Option<PathBuf> {
        self.chrome_path
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

fn default_true() -> bool {
    true
}

fn default_nav_timeout() -> u64 {
    60_000
}

fn default_selector_wait() -> u64 {
    30_000
}

fn default_selector_poll() -> u64 {
    500
}

fn default_viewport_width() -> u32 {
    1200
}

fn default_viewport_height() -> u32 {
    800
}

/// Canvas target and control-surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// CSS selector of the canvas element to operate on.
    #[serde(default = "default_canvas_selector")]
    pub selector: String,

    /// Host substrings a target URL must match on attach. Empty = any host.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Tool name -> CSS selector of the page control standing in for it.
    #[serde(default = "default_tools")]
    pub tools: HashMap<String, String>,

    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            selector: default_canvas_selector(),
            allowed_hosts: Vec::new(),
            tools: default_tools(),
            capture: CaptureConfig::default(),
        }
    }
}

fn default_canvas_selector() -> String {
    ".main-canvas".into()
}

fn default_tools() -> HashMap<String, String> {
    [
        ("brush", ".tool-brush"),
        ("eraser", ".tool-eraser"),
        ("palette", ".tool-palette"),
        ("undo", ".tool-undo"),
        ("redo", ".tool-redo"),
        ("clear", ".tool-clear"),
        ("layers", ".tool-layers"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Capture recompression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bounding box the captured image is resized to fit within (default: 1280).
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// JPEG quality, 1-100 (default: 85).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_max_dimension() -> u32 {
    1280
}

fn default_jpeg_quality() -> u8 {
    85
}

/// Liveness endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: None,
        }
    }
}

fn default_server_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "doodlebot_browser=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
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

        let raw = std::fs::read_to_string(path).map_err(crate::error::DoodleBotError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::DoodleBotError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn telegram_config(&self) -> TelegramConfig {
        self.telegram.clone().unwrap_or_default()
    }

    pub fn browser_config(&self) -> BrowserConfig {
        self.browser.clone().unwrap_or_default()
    }

    pub fn canvas_config(&self) -> CanvasConfig {
        self.canvas.clone().unwrap_or_default()
    }

    pub fn server_port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_server_port)
    }

    pub fn server_bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.telegram_config().resolve_bot_token().is_none() {
            warnings.push(
                "No Telegram bot token configured (telegram.bot_token or BOT_TOKEN)".to_string(),
            );
        }

        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
        }

        let capture = self.canvas_config().capture;
        if capture.jpeg_quality == 0 || capture.jpeg_quality > 100 {
            errors.push(format!(
                "canvas.capture.jpeg_quality must be 1-100, got {}",
                capture.jpeg_quality
            ));
        }
        if capture.max_dimension == 0 {
            errors.push("canvas.capture.max_dimension cannot be 0".to_string());
        }

        (warnings, errors)
    }
}

/// Base directory for doodlebot data: `~/.doodlebot/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".doodlebot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_DB_KEY", "tok-test-123") };
        let input = r#"{"key": "${TEST_DB_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("tok-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_DB_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_DB_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#)); // empty string
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_port(), 3000);
        assert_eq!(config.server_bind(), "0.0.0.0");
        assert_eq!(config.canvas_config().selector, ".main-canvas");
        assert_eq!(config.browser_config().nav_timeout_ms, 60_000);
        assert_eq!(config.canvas_config().capture.jpeg_quality, 85);
    }

    #[test]
    fn test_default_tools_table() {
        let tools = default_tools();
        assert_eq!(tools.get("brush").map(String::as_str), Some(".tool-brush"));
        assert!(tools.contains_key("undo"));
        assert!(tools.contains_key("layers"));
    }

    #[test]
    fn test_telegram_resolve_bot_token() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_DB_TG_TOKEN", "bot-token-123") };
        let tg = TelegramConfig {
            bot_token: None,
            bot_token_env: Some("TEST_DB_TG_TOKEN".into()),
            ..TelegramConfig::default()
        };
        assert_eq!(tg.resolve_bot_token(), Some("bot-token-123".into()));
        unsafe { std::env::remove_var("TEST_DB_TG_TOKEN") };
    }

    #[test]
    fn test_direct_token_takes_priority() {
        let tg = TelegramConfig {
            bot_token: Some("direct".into()),
            bot_token_env: Some("UNSET_DB_VAR".into()),
            ..TelegramConfig::default()
        };
        assert_eq!(tg.resolve_bot_token(), Some("direct".into()));
    }

    #[test]
    fn test_config_json5_sections() {
        let json_str = r##"{
            canvas: {
                selector: "#board",
                allowed_hosts: ["doodlegator"],
            },
            server: { port: 8080 },
        }"##;
        let config: Config = json5::from_str(json_str).unwrap();
        let canvas = config.canvas_config();
        assert_eq!(canvas.selector, "#board");
        assert_eq!(canvas.allowed_hosts, vec!["doodlegator".to_string()]);
        // Unspecified sub-sections fall back to serde defaults
        assert_eq!(canvas.capture.max_dimension, 1280);
        assert_eq!(config.server_port(), 8080);
    }

    #[test]
    fn test_validate_missing_token_warns() {
        let config = Config::default();
        let (warnings, _errors) = config.validate();
        assert!(
            warnings.iter().any(|w| w.contains("token")),
            "Expected a warning about the missing bot token, got: {warnings:?}"
        );
    }

    #[test]
    fn test_validate_bad_quality_errors() {
        let mut config = Config::default();
        config.canvas = Some(CanvasConfig {
            capture: CaptureConfig {
                jpeg_quality: 0,
                ..CaptureConfig::default()
            },
            ..CanvasConfig::default()
        });
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("jpeg_quality")));
    }
}
