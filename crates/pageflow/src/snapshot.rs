//! Screenshots of every open browser when a test fails.
//!
//! Each browser is captured one viewport at a time, scrolling down the
//! body, into `<dir>/<test_id>_browser-<idx>_page-<i>.png`.
//!
//! ## Example
//!
//! ```ignore
//! snapshot_on_error(&mut harness, "login_rejects_bad_password", |h| {
//!     Box::pin(async move {
//!         let session = h.session(registry)?;
//!         let login = session.open::<LoginPage>().await?;
//!         login.assert_text_in_page("Wrong password").await
//!     })
//! })
//! .await?;
//! ```

use crate::browser::BrowserHarness;
use crate::driver::WebDriver;
use crate::locator::Selector;
use crate::result::{PageflowError, PageflowResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pause after scrolling so the page can repaint
const SCROLL_SETTLE: Duration = Duration::from_millis(200);

/// Most viewports captured per browser
pub const MAX_SNAPSHOT_PAGES: u32 = 25;

/// Snapshot file name for one viewport of one browser
#[must_use]
pub fn snapshot_file_name(test_id: &str, browser: usize, page: u32) -> String {
    format!("{test_id}_browser-{browser}_page-{page}.png")
}

/// Number of viewports needed to cover the body, 0 when unknown,
/// at most [`MAX_SNAPSHOT_PAGES`]
async fn page_count(driver: &dyn WebDriver) -> PageflowResult<(u32, u32)> {
    let body = driver
        .find(None, &Selector::css("body"))
        .await?
        .ok_or_else(|| PageflowError::NoSuchElement {
            selector: "body".to_string(),
        })?;
    let body_height = driver.element_height(&body).await?;
    let window_height = driver.window_size().await?.height;
    if window_height == 0 {
        return Ok((0, 0));
    }
    // NaN survives the clamp and casts to 0
    let pages = (body_height / f64::from(window_height))
        .ceil()
        .clamp(0.0, f64::from(MAX_SNAPSHOT_PAGES)) as u32;
    Ok((pages, window_height))
}

/// Capture every viewport of every browser into `dir`
///
/// Failures are logged and skipped. Returns the files written.
pub async fn capture(browsers: &[Arc<dyn WebDriver>], dir: &Path, test_id: &str) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for (idx, browser) in browsers.iter().enumerate() {
        let (pages, window_height) = match page_count(browser.as_ref()).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(browser = idx, error = %e, "cannot measure page, skipping snapshot");
                (0, 0)
            }
        };

        for i in 0..pages {
            let y = u64::from(i) * u64::from(window_height);
            if let Err(e) = browser.execute(&format!("window.scrollTo(0,{y})")).await {
                warn!(browser = idx, page = i, error = %e, "scroll failed");
            }
            tokio::time::sleep(SCROLL_SETTLE).await;

            let path = dir.join(snapshot_file_name(test_id, idx, i));
            match browser.screenshot().await {
                Ok(png) => match tokio::fs::write(&path, png).await {
                    Ok(()) => written.push(path),
                    Err(e) => warn!(path = %path.display(), error = %e, "cannot write snapshot"),
                },
                Err(e) => warn!(browser = idx, page = i, error = %e, "screenshot failed"),
            }
        }
    }
    written
}

/// Run a test body, capturing every browser if it fails or panics
///
/// The original failure is always passed on: an `Err` is returned as is
/// and a panic is resumed after the snapshots are written.
pub async fn snapshot_on_error<T, F>(
    harness: &mut BrowserHarness,
    test_id: &str,
    body: F,
) -> PageflowResult<T>
where
    F: for<'a> FnOnce(&'a mut BrowserHarness) -> BoxFuture<'a, PageflowResult<T>>,
{
    let dir = harness.config().resolved_snapshot_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let outcome = match AssertUnwindSafe(body(harness)).catch_unwind().await {
        Ok(Ok(value)) => return Ok(value),
        failed => failed,
    };

    let written = capture(harness.browsers(), &dir, test_id).await;
    info!(test_id, count = written.len(), dir = %dir.display(), "failure snapshots written");

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::browser::MockLauncher;
    use crate::config::PageflowConfig;
    use crate::driver::MockDriver;

    fn harness(dir: &Path) -> (Arc<MockLauncher>, BrowserHarness) {
        let launcher = Arc::new(MockLauncher::at("https://site.test/"));
        let config = PageflowConfig::new().with_snapshot_dir(dir);
        (launcher.clone(), BrowserHarness::new(launcher, config))
    }

    fn pngs(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    mod capture_tests {
        use super::*;

        #[tokio::test]
        async fn test_scrolls_one_viewport_at_a_time() {
            let dir = tempfile::tempdir().unwrap();
            let driver = Arc::new(MockDriver::new());
            driver.set_body_height(2500.0);
            let browsers: Vec<Arc<dyn WebDriver>> = vec![driver.clone()];

            let written = capture(&browsers, dir.path(), "t").await;

            assert_eq!(written.len(), 3);
            assert!(driver.was_called("execute:window.scrollTo(0,2160)"));
            assert_eq!(driver.call_count("screenshot"), 3);
        }

        #[tokio::test]
        async fn test_page_count_is_capped() {
            let driver = MockDriver::new();
            driver.set_body_height(f64::INFINITY);
            let (pages, _) = page_count(&driver).await.unwrap();
            assert_eq!(pages, MAX_SNAPSHOT_PAGES);

            driver.set_body_height(f64::NAN);
            let (pages, _) = page_count(&driver).await.unwrap();
            assert_eq!(pages, 0);
        }

        #[tokio::test]
        async fn test_missing_body_skips_browser() {
            let dir = tempfile::tempdir().unwrap();
            let driver = Arc::new(MockDriver::new());
            driver.detach(&driver.body());
            let browsers: Vec<Arc<dyn WebDriver>> = vec![driver.clone()];

            assert!(capture(&browsers, dir.path(), "t").await.is_empty());
            assert!(!driver.was_called("screenshot"));
        }

        #[test]
        fn test_file_name() {
            assert_eq!(snapshot_file_name("suite.case", 1, 0), "suite.case_browser-1_page-0.png");
        }
    }

    mod snapshot_on_error_tests {
        use super::*;

        #[tokio::test]
        async fn test_success_takes_no_snapshots() {
            let dir = tempfile::tempdir().unwrap();
            let (launcher, mut harness) = harness(dir.path());

            let value = snapshot_on_error(&mut harness, "ok", |h| {
                Box::pin(async move {
                    let _ = h.start_browser("firefox").await?;
                    Ok(42)
                })
            })
            .await
            .unwrap();

            assert_eq!(value, 42);
            assert!(!launcher.launched()[0].was_called("screenshot"));
            assert!(pngs(dir.path()).is_empty());
        }

        #[tokio::test]
        async fn test_error_snapshots_every_browser_and_is_returned() {
            let dir = tempfile::tempdir().unwrap();
            let (_, mut harness) = harness(dir.path());

            let err = snapshot_on_error(&mut harness, "case", |h| {
                Box::pin(async move {
                    let _ = h.start_browser("firefox").await?;
                    let _ = h.start_browser("chrome").await?;
                    Err::<(), _>(PageflowError::assertion("nope"))
                })
            })
            .await
            .unwrap_err();

            assert_eq!(err.to_string(), "Assertion failed: nope");
            assert_eq!(
                pngs(dir.path()),
                vec!["case_browser-0_page-0.png", "case_browser-1_page-0.png"]
            );
        }

        #[tokio::test]
        async fn test_panic_is_resumed_after_snapshots() {
            let dir = tempfile::tempdir().unwrap();
            let (_, mut harness) = harness(dir.path());

            let outcome = AssertUnwindSafe(snapshot_on_error(&mut harness, "boom", |h| {
                Box::pin(async move {
                    let _ = h.start_browser("firefox").await?;
                    if h.browsers().len() == 1 {
                        panic!("boom");
                    }
                    Ok(())
                })
            }))
            .catch_unwind()
            .await;

            assert!(outcome.is_err());
            assert_eq!(pngs(dir.path()), vec!["boom_browser-0_page-0.png"]);
        }

        #[tokio::test]
        async fn test_creates_snapshot_dir() {
            let root = tempfile::tempdir().unwrap();
            let dir = root.path().join("nested").join("shots");
            let (_, mut harness) = harness(&dir);

            let _ = snapshot_on_error(&mut harness, "t", |_| Box::pin(async { Ok(()) })).await;
            assert!(dir.is_dir());
        }
    }
}
