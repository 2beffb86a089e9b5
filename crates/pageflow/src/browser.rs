//! Browser lifecycle for tests.
//!
//! [`BrowserHarness`] starts browsers through a [`DriverLauncher`], keeps
//! every one it started, and closes them all (last first) on cleanup.
//! [`VirtualDisplay`] runs an Xvfb server for machines without a screen.

use crate::config::PageflowConfig;
use crate::driver::{DriverKind, MockDriver, WebDriver, WindowSize};
use crate::page::Session;
use crate::registry::Registry;
use crate::result::{PageflowError, PageflowResult};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Starts a browser of a given kind
#[async_trait]
pub trait DriverLauncher: Send + Sync + fmt::Debug {
    /// Launch a browser configured by `config`
    async fn launch(
        &self,
        kind: DriverKind,
        config: &PageflowConfig,
    ) -> PageflowResult<Arc<dyn WebDriver>>;
}

// ============================================================================
// Launchers
// ============================================================================

/// Launcher handing out [`MockDriver`]s
#[derive(Debug, Default)]
pub struct MockLauncher {
    start_url: Option<String>,
    launched: Mutex<Vec<(DriverKind, Arc<MockDriver>)>>,
}

impl MockLauncher {
    /// Create a mock launcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start every mock browser at `url`
    #[must_use]
    pub fn at(url: impl Into<String>) -> Self {
        Self {
            start_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Drivers launched so far, oldest first
    #[must_use]
    pub fn launched(&self) -> Vec<Arc<MockDriver>> {
        self.lock().iter().map(|(_, d)| Arc::clone(d)).collect()
    }

    /// Kinds launched so far, oldest first
    #[must_use]
    pub fn kinds(&self) -> Vec<DriverKind> {
        self.lock().iter().map(|(k, _)| *k).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(DriverKind, Arc<MockDriver>)>> {
        self.launched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DriverLauncher for MockLauncher {
    async fn launch(
        &self,
        kind: DriverKind,
        _config: &PageflowConfig,
    ) -> PageflowResult<Arc<dyn WebDriver>> {
        let driver = Arc::new(
            self.start_url
                .as_ref()
                .map_or_else(MockDriver::new, MockDriver::at),
        );
        self.lock().push((kind, Arc::clone(&driver)));
        Ok(driver)
    }
}

/// Launcher connecting to a W3C WebDriver server
#[cfg(feature = "webdriver")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteLauncher;

#[cfg(feature = "webdriver")]
#[async_trait]
impl DriverLauncher for RemoteLauncher {
    async fn launch(
        &self,
        kind: DriverKind,
        config: &PageflowConfig,
    ) -> PageflowResult<Arc<dyn WebDriver>> {
        let driver = crate::webdriver::RemoteDriver::connect(kind, config).await?;
        Ok(Arc::new(driver))
    }
}

/// Launcher starting Chromium over CDP
#[cfg(feature = "browser")]
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

#[cfg(feature = "browser")]
#[async_trait]
impl DriverLauncher for CdpLauncher {
    async fn launch(
        &self,
        kind: DriverKind,
        config: &PageflowConfig,
    ) -> PageflowResult<Arc<dyn WebDriver>> {
        if kind == DriverKind::Firefox {
            return Err(PageflowError::UnsupportedDriver {
                name: kind.to_string(),
                supported: "chrome, chromium".to_string(),
            });
        }
        let driver = crate::cdp::CdpDriver::launch(config).await?;
        Ok(Arc::new(driver))
    }
}

// ============================================================================
// Virtual display
// ============================================================================

/// An Xvfb server browsers can render into
#[derive(Debug)]
pub struct VirtualDisplay {
    child: tokio::process::Child,
    display: String,
}

/// First display number without an X lock file in `lock_dir`
#[must_use]
pub fn free_display_number(lock_dir: &Path) -> u32 {
    (99..1000)
        .find(|n| !lock_dir.join(format!(".X{n}-lock")).exists())
        .unwrap_or(99)
}

impl VirtualDisplay {
    /// Start Xvfb on the first free display
    pub async fn start(size: WindowSize) -> PageflowResult<Self> {
        Self::start_on(free_display_number(Path::new("/tmp")), size).await
    }

    /// Start Xvfb on display `:number`
    pub async fn start_on(number: u32, size: WindowSize) -> PageflowResult<Self> {
        let name = format!(":{number}");
        let screen = format!("{}x{}x24", size.width, size.height);
        let mut child = tokio::process::Command::new("Xvfb")
            .arg(&name)
            .args(["-screen", "0", &screen, "-nolisten", "tcp"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PageflowError::DisplayError {
                message: format!("cannot start Xvfb: {e}"),
            })?;

        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Some(status) = child.try_wait()? {
            return Err(PageflowError::DisplayError {
                message: format!("Xvfb on {name} exited with {status}"),
            });
        }
        info!(display = %name, %screen, "virtual display started");
        Ok(Self { child, display: name })
    }

    /// Value for `DISPLAY`
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Stop the server
    pub async fn stop(mut self) -> PageflowResult<()> {
        debug!(display = %self.display, "stopping virtual display");
        self.child
            .kill()
            .await
            .map_err(|e| PageflowError::DisplayError {
                message: e.to_string(),
            })
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Browsers started for one test
#[derive(Debug)]
pub struct BrowserHarness {
    launcher: Arc<dyn DriverLauncher>,
    config: PageflowConfig,
    browsers: Vec<Arc<dyn WebDriver>>,
    display: Option<VirtualDisplay>,
}

impl BrowserHarness {
    /// Create a harness
    #[must_use]
    pub fn new(launcher: Arc<dyn DriverLauncher>, config: PageflowConfig) -> Self {
        Self {
            launcher,
            config,
            browsers: Vec::new(),
            display: None,
        }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &PageflowConfig {
        &self.config
    }

    /// Start a browser by name (`firefox`, `chrome`, `chromium`)
    ///
    /// The window is sized to the configured dimensions. An unknown name
    /// fails with [`PageflowError::UnsupportedDriver`] and starts nothing.
    pub async fn start_browser(&mut self, driver_name: &str) -> PageflowResult<Arc<dyn WebDriver>> {
        let kind: DriverKind = driver_name.parse()?;
        let driver = self.launcher.launch(kind, &self.config).await?;
        driver.set_window_size(self.config.window).await?;
        self.browsers.push(Arc::clone(&driver));
        info!(%kind, count = self.browsers.len(), "browser started");
        Ok(driver)
    }

    /// Start the configured default browser
    pub async fn start_default_browser(&mut self) -> PageflowResult<Arc<dyn WebDriver>> {
        let name = self.config.driver.clone();
        self.start_browser(&name).await
    }

    /// Start a browser inside a virtual display, starting the display once
    pub async fn start_headless_browser(
        &mut self,
        driver_name: &str,
    ) -> PageflowResult<Arc<dyn WebDriver>> {
        if self.display.is_none() {
            let display = VirtualDisplay::start(self.config.window).await?;
            self.config.display = Some(display.display().to_string());
            self.display = Some(display);
        }
        self.start_browser(driver_name).await
    }

    /// Last browser started
    pub fn browser(&self) -> PageflowResult<Arc<dyn WebDriver>> {
        self.browsers.last().cloned().ok_or(PageflowError::NoBrowser)
    }

    /// Every browser started, oldest first
    #[must_use]
    pub fn browsers(&self) -> &[Arc<dyn WebDriver>] {
        &self.browsers
    }

    /// True when browsers run without a visible window
    #[must_use]
    pub const fn is_headless(&self) -> bool {
        self.display.is_some() || self.config.headless
    }

    /// Page object session over the last browser
    pub fn session(&self, registry: Arc<Registry>) -> PageflowResult<Session> {
        Ok(Session::new(
            self.browser()?,
            registry,
            Arc::new(self.config.clone()),
        ))
    }

    /// Close every browser, newest first, then stop the display
    ///
    /// Keeps going past failures and returns the first one.
    pub async fn cleanup(&mut self) -> PageflowResult<()> {
        let mut first_error = None;
        while let Some(browser) = self.browsers.pop() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "browser did not close");
                first_error.get_or_insert(e);
            }
        }
        if let Some(display) = self.display.take() {
            if let Err(e) = display.stop().await {
                warn!(error = %e, "virtual display did not stop");
                first_error.get_or_insert(e);
            }
            self.config.display = None;
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn harness() -> (Arc<MockLauncher>, BrowserHarness) {
        let launcher = Arc::new(MockLauncher::new());
        let harness = BrowserHarness::new(launcher.clone(), PageflowConfig::new());
        (launcher, harness)
    }

    mod harness_tests {
        use super::*;

        #[tokio::test]
        async fn test_start_browser_sizes_window() {
            let (launcher, mut harness) = harness();
            let _ = harness.start_browser("Firefox").await.unwrap();

            let driver = &launcher.launched()[0];
            assert_eq!(driver.history(), vec!["set_window_size:1300x1080".to_string()]);
            assert_eq!(launcher.kinds(), vec![DriverKind::Firefox]);
        }

        #[tokio::test]
        async fn test_unknown_driver_starts_nothing() {
            let (launcher, mut harness) = harness();
            let err = harness.start_browser("NoReal").await.unwrap_err();

            assert!(err.to_string().contains("Choose from: firefox, chrome, chromium"));
            assert!(launcher.launched().is_empty());
            assert!(matches!(harness.browser(), Err(PageflowError::NoBrowser)));
        }

        #[tokio::test]
        async fn test_browser_is_last_started() {
            let (_, mut harness) = harness();
            let _ = harness.start_browser("firefox").await.unwrap();
            let second = harness.start_browser("chrome").await.unwrap();

            assert!(Arc::ptr_eq(&harness.browser().unwrap(), &second));
            assert_eq!(harness.browsers().len(), 2);
        }

        #[tokio::test]
        async fn test_cleanup_closes_all_and_reports_first_error() {
            let (launcher, mut harness) = harness();
            for name in ["firefox", "chrome", "chromium"] {
                let _ = harness.start_browser(name).await.unwrap();
            }
            let drivers = launcher.launched();
            drivers[1].fail_close("already gone");

            let err = harness.cleanup().await.unwrap_err();
            assert_eq!(err.to_string(), "Driver error: already gone");
            assert!(drivers[0].is_closed());
            assert!(drivers[2].is_closed());
            assert!(harness.browsers().is_empty());
            assert!(harness.cleanup().await.is_ok());
        }

        #[tokio::test]
        async fn test_session_uses_last_browser() {
            let launcher = Arc::new(MockLauncher::at("https://site.test/"));
            let mut harness = BrowserHarness::new(launcher, PageflowConfig::new());
            assert!(harness.session(Arc::new(Registry::new())).is_err());

            let _ = harness.start_default_browser().await.unwrap();
            let session = harness.session(Arc::new(Registry::new())).unwrap();
            assert_eq!(session.location().await.unwrap(), "https://site.test/");
        }

        #[test]
        fn test_is_headless_follows_config() {
            let launcher = Arc::new(MockLauncher::new());
            let harness = BrowserHarness::new(launcher, PageflowConfig::new().with_headless(true));
            assert!(harness.is_headless());
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_free_display_skips_locked() {
            let dir = tempfile::tempdir().unwrap();
            assert_eq!(free_display_number(dir.path()), 99);

            std::fs::write(dir.path().join(".X99-lock"), "").unwrap();
            std::fs::write(dir.path().join(".X100-lock"), "").unwrap();
            assert_eq!(free_display_number(dir.path()), 101);
        }

        #[tokio::test]
        async fn test_start_reports_display_or_missing_xvfb() {
            let number = free_display_number(Path::new("/tmp"));
            match VirtualDisplay::start_on(number, WindowSize::new(800, 600)).await {
                Ok(display) => {
                    assert_eq!(display.display(), format!(":{number}"));
                    display.stop().await.unwrap();
                }
                Err(e) => assert!(matches!(e, PageflowError::DisplayError { .. }), "{e}"),
            }
        }
    }
}
