//! Runtime configuration.
//!
//! Values come from built-in defaults, an optional YAML file named by
//! `PAGEFLOW_CONFIG`, then individual `PAGEFLOW_*` environment overrides.

use crate::driver::WindowSize;
use crate::result::{PageflowError, PageflowResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for element waits (10 seconds)
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval for element waits (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default number of attempts when typing into an element
pub const DEFAULT_TEXT_ENTRY_ATTEMPTS: u32 = 5;

/// Pause between typing attempts (200ms)
pub const DEFAULT_TEXT_ENTRY_RETRY_MS: u64 = 200;

/// Default browser window size
pub const DEFAULT_WINDOW: WindowSize = WindowSize {
    width: 1300,
    height: 1080,
};

/// Environment variable naming a YAML config file
pub const CONFIG_FILE_ENV: &str = "PAGEFLOW_CONFIG";

/// Pageflow configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageflowConfig {
    /// Timeout for element waits
    pub element_timeout_ms: u64,
    /// Polling interval for element waits
    pub poll_interval_ms: u64,
    /// Attempts made by `enter_text`
    pub text_entry_attempts: u32,
    /// Pause between `enter_text` attempts
    pub text_entry_retry_ms: u64,
    /// Browser window size
    pub window: WindowSize,
    /// Default driver name
    pub driver: String,
    /// Remote WebDriver endpoint
    pub webdriver_url: String,
    /// Run browsers without a visible window
    pub headless: bool,
    /// Directory for failure snapshots (home directory when unset)
    pub snapshot_dir: Option<PathBuf>,
    /// X display browsers are started on, e.g. `:99`
    pub display: Option<String>,
    /// IMAP server host
    pub imap_host: String,
    /// IMAP server port
    pub imap_port: u16,
}

impl Default for PageflowConfig {
    fn default() -> Self {
        Self {
            element_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            text_entry_attempts: DEFAULT_TEXT_ENTRY_ATTEMPTS,
            text_entry_retry_ms: DEFAULT_TEXT_ENTRY_RETRY_MS,
            window: DEFAULT_WINDOW,
            driver: "firefox".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            headless: false,
            snapshot_dir: None,
            display: None,
            imap_host: "imap.gmail.com".to_string(),
            imap_port: 993,
        }
    }
}

impl PageflowConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then `PAGEFLOW_CONFIG` file, then environment overrides
    pub fn load() -> PageflowResult<Self> {
        let base = match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a YAML config file
    pub fn from_yaml_file(path: &Path) -> PageflowResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse YAML config text
    pub fn from_yaml_str(text: &str) -> PageflowResult<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Apply `PAGEFLOW_*` overrides from a lookup function
    pub fn with_env_overrides<F>(mut self, lookup: F) -> PageflowResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PAGEFLOW_ELEMENT_TIMEOUT_MS") {
            self.element_timeout_ms = parse_var("PAGEFLOW_ELEMENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("PAGEFLOW_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_var("PAGEFLOW_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("PAGEFLOW_DRIVER") {
            self.driver = v;
        }
        if let Some(v) = lookup("PAGEFLOW_WEBDRIVER_URL") {
            self.webdriver_url = v;
        }
        if let Some(v) = lookup("PAGEFLOW_HEADLESS") {
            self.headless = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("PAGEFLOW_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PAGEFLOW_WINDOW_WIDTH") {
            self.window.width = parse_var("PAGEFLOW_WINDOW_WIDTH", &v)?;
        }
        if let Some(v) = lookup("PAGEFLOW_WINDOW_HEIGHT") {
            self.window.height = parse_var("PAGEFLOW_WINDOW_HEIGHT", &v)?;
        }
        Ok(self)
    }

    /// Set element timeout
    #[must_use]
    pub const fn with_element_timeout(mut self, timeout_ms: u64) -> Self {
        self.element_timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set text entry pause
    #[must_use]
    pub const fn with_text_entry_retry(mut self, retry_ms: u64) -> Self {
        self.text_entry_retry_ms = retry_ms;
        self
    }

    /// Set window size
    #[must_use]
    pub const fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window = WindowSize { width, height };
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set X display
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Set snapshot directory
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Element timeout as Duration
    #[must_use]
    pub const fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    /// Directory snapshots are written to
    #[must_use]
    pub fn resolved_snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> PageflowResult<T> {
    value.trim().parse().map_err(|_| PageflowError::Config {
        message: format!("{key} has invalid value \"{value}\""),
    })
}
