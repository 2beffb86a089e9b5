//! W3C WebDriver client (`webdriver` feature).
//!
//! Talks to geckodriver or chromedriver through fantoccini. Remote element
//! references are kept in a table and handed out as opaque ids.

#![allow(clippy::cast_possible_truncation)]

use crate::config::PageflowConfig;
use crate::driver::{DriverKind, ElementHandle, WebDriver, WindowSize};
use crate::locator::Selector;
use crate::result::{PageflowError, PageflowResult};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Browser session on a remote WebDriver server
#[derive(Debug)]
pub struct RemoteDriver {
    client: Client,
    kind: DriverKind,
    elements: Mutex<HashMap<String, Element>>,
}

/// Capabilities selecting the browser and its headless flag
#[must_use]
pub fn capabilities(kind: DriverKind, config: &PageflowConfig) -> Map<String, Value> {
    let mut caps = Map::new();
    let WindowSize { width, height } = config.window;
    match kind {
        DriverKind::Firefox => {
            let mut args = vec![format!("--width={width}"), format!("--height={height}")];
            if config.headless {
                args.push("--headless".to_string());
            }
            let mut options = json!({ "args": args });
            if let Some(ref display) = config.display {
                options["env"] = json!({ "DISPLAY": display });
            }
            let _ = caps.insert("browserName".to_string(), json!("firefox"));
            let _ = caps.insert("moz:firefoxOptions".to_string(), options);
        }
        DriverKind::Chrome | DriverKind::Chromium => {
            let mut args = vec![
                "--no-sandbox".to_string(),
                format!("--window-size={width},{height}"),
            ];
            if config.headless {
                args.push("--headless=new".to_string());
                args.push("--disable-gpu".to_string());
                args.push("--disable-dev-shm-usage".to_string());
            }
            if let Some(ref display) = config.display {
                args.push(format!("--display={display}"));
            }
            let _ = caps.insert("browserName".to_string(), json!("chrome"));
            let _ = caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Css(s) | Selector::TagName(s) => Locator::Css(s),
        Selector::LinkText(s) => Locator::LinkText(s),
        Selector::XPath(s) => Locator::XPath(s),
    }
}

fn is_status(e: &CmdError, status: ErrorStatus) -> bool {
    matches!(e, CmdError::Standard(w) if w.error == status)
}

fn map_element_error(e: CmdError, element: &ElementHandle) -> PageflowError {
    if is_status(&e, ErrorStatus::StaleElementReference) {
        PageflowError::StaleElement {
            id: element.id.clone(),
        }
    } else if is_status(&e, ErrorStatus::InvalidElementState) {
        PageflowError::InvalidElementState {
            message: e.to_string(),
        }
    } else {
        PageflowError::driver(e.to_string())
    }
}

impl RemoteDriver {
    /// Start a browser session on the configured WebDriver endpoint
    pub async fn connect(kind: DriverKind, config: &PageflowConfig) -> PageflowResult<Self> {
        debug!(url = %config.webdriver_url, %kind, "connecting to webdriver");
        let client = ClientBuilder::native()
            .capabilities(capabilities(kind, config))
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| PageflowError::driver(format!("{}: {e}", config.webdriver_url)))?;
        info!(%kind, headless = config.headless, "webdriver session started");
        Ok(Self {
            client,
            kind,
            elements: Mutex::new(HashMap::new()),
        })
    }

    /// Browser this session drives
    #[must_use]
    pub const fn kind(&self) -> DriverKind {
        self.kind
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Element>> {
        self.elements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, element: Element) -> ElementHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let _ = self.table().insert(id.clone(), element);
        ElementHandle::new(id)
    }

    fn element(&self, handle: &ElementHandle) -> PageflowResult<Element> {
        self.table()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| PageflowError::StaleElement {
                id: handle.id.clone(),
            })
    }
}

#[async_trait]
impl WebDriver for RemoteDriver {
    async fn goto(&self, url: &str) -> PageflowResult<()> {
        self.client
            .goto(url)
            .await
            .map_err(|e| PageflowError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        // Old references cannot survive a new document
        self.table().clear();
        Ok(())
    }

    async fn current_url(&self) -> PageflowResult<String> {
        let url = self
            .client
            .current_url()
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn find(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Option<ElementHandle>> {
        let found = match scope {
            Some(handle) => self
                .element(handle)?
                .find(locator(selector))
                .await
                .map_err(|e| (e, Some(handle))),
            None => self.client.find(locator(selector)).await.map_err(|e| (e, None)),
        };
        match found {
            Ok(element) => Ok(Some(self.remember(element))),
            Err((e, _)) if e.is_miss() => Ok(None),
            Err((e, Some(handle))) => Err(map_element_error(e, handle)),
            Err((e, None)) => Err(PageflowError::driver(e.to_string())),
        }
    }

    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Vec<ElementHandle>> {
        let found = match scope {
            Some(handle) => self
                .element(handle)?
                .find_all(locator(selector))
                .await
                .map_err(|e| map_element_error(e, handle))?,
            None => self
                .client
                .find_all(locator(selector))
                .await
                .map_err(|e| PageflowError::driver(e.to_string()))?,
        };
        Ok(found.into_iter().map(|e| self.remember(e)).collect())
    }

    async fn click(&self, element: &ElementHandle) -> PageflowResult<()> {
        self.element(element)?
            .click()
            .await
            .map_err(|e| map_element_error(e, element))
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> PageflowResult<()> {
        self.element(element)?
            .send_keys(text)
            .await
            .map_err(|e| map_element_error(e, element))
    }

    async fn clear(&self, element: &ElementHandle) -> PageflowResult<()> {
        self.element(element)?
            .clear()
            .await
            .map_err(|e| map_element_error(e, element))
    }

    async fn text(&self, element: &ElementHandle) -> PageflowResult<String> {
        self.element(element)?
            .text()
            .await
            .map_err(|e| map_element_error(e, element))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> PageflowResult<Option<String>> {
        let remote = self.element(element)?;
        let result = if name == "value" {
            remote.prop(name).await
        } else {
            remote.attr(name).await
        };
        result.map_err(|e| map_element_error(e, element))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> PageflowResult<bool> {
        self.element(element)?
            .is_displayed()
            .await
            .map_err(|e| map_element_error(e, element))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> PageflowResult<bool> {
        self.element(element)?
            .is_enabled()
            .await
            .map_err(|e| map_element_error(e, element))
    }

    async fn select_by_visible_text(
        &self,
        element: &ElementHandle,
        text: &str,
    ) -> PageflowResult<()> {
        match self.element(element)?.select_by_label(text).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_miss() => Err(PageflowError::NoSuchElement {
                selector: format!("option with text \"{text}\""),
            }),
            Err(e) => Err(map_element_error(e, element)),
        }
    }

    async fn element_height(&self, element: &ElementHandle) -> PageflowResult<f64> {
        let (_, _, _, height) = self
            .element(element)?
            .rectangle()
            .await
            .map_err(|e| map_element_error(e, element))?;
        Ok(height)
    }

    async fn window_size(&self) -> PageflowResult<WindowSize> {
        let (width, height) = self
            .client
            .get_window_size()
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        Ok(WindowSize::new(width as u32, height as u32))
    }

    async fn set_window_size(&self, size: WindowSize) -> PageflowResult<()> {
        self.client
            .set_window_size(size.width, size.height)
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))
    }

    async fn execute(&self, script: &str) -> PageflowResult<Value> {
        self.client
            .execute(script, Vec::new())
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))
    }

    async fn screenshot(&self) -> PageflowResult<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .map_err(|e| PageflowError::ScreenshotError {
                message: e.to_string(),
            })
    }

    async fn close(&self) -> PageflowResult<()> {
        self.table().clear();
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firefox_capabilities() {
        let config = PageflowConfig::new().with_headless(true);
        let caps = capabilities(DriverKind::Firefox, &config);
        let args = caps["moz:firefoxOptions"]["args"].as_array().cloned().unwrap_or_default();
        assert!(args.contains(&json!("--headless")));
        assert!(args.contains(&json!("--width=1300")));
    }

    #[test]
    fn test_display_is_forwarded() {
        let config = PageflowConfig::new().with_display(":99");
        let firefox = capabilities(DriverKind::Firefox, &config);
        assert_eq!(firefox["moz:firefoxOptions"]["env"]["DISPLAY"], json!(":99"));

        let chrome = capabilities(DriverKind::Chrome, &config);
        let args = chrome["goog:chromeOptions"]["args"].as_array().cloned().unwrap_or_default();
        assert!(args.contains(&json!("--display=:99")));
    }

    #[test]
    fn test_chrome_capabilities_headed() {
        let config = PageflowConfig::new().with_window(800, 600);
        let caps = capabilities(DriverKind::Chromium, &config);
        assert_eq!(caps["browserName"], json!("chrome"));
        let args = caps["goog:chromeOptions"]["args"].as_array().cloned().unwrap_or_default();
        assert!(args.contains(&json!("--window-size=800,600")));
        assert!(!args.iter().any(|a| a.as_str().is_some_and(|s| s.starts_with("--headless"))));
    }

    #[test]
    fn test_tag_name_maps_to_css() {
        let selector = Selector::tag_name("button");
        assert!(matches!(locator(&selector), Locator::Css("button")));
    }
}
