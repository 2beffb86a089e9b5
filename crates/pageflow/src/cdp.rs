//! Chromium over CDP (`browser` feature).
//!
//! Elements live in a page-side table (`window.__pf`) keyed by handle id.
//! A navigation replaces `window`, so every handle from the previous
//! document turns stale, as with a WebDriver server.

#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::config::PageflowConfig;
use crate::driver::{ElementHandle, WebDriver, WindowSize};
use crate::locator::{js_string, Selector};
use crate::result::{PageflowError, PageflowResult};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const STALE: &str = "__pageflow_stale__";
const INVALID: &str = "__pageflow_invalid__";
const MISSING: &str = "__pageflow_missing__";

/// Chromium driven through the DevTools protocol
#[derive(Debug)]
pub struct CdpDriver {
    browser: Mutex<CdpBrowser>,
    page: CdpPage,
    handler: tokio::task::JoinHandle<()>,
}

impl CdpDriver {
    /// Launch Chromium sized and headed per `config`
    pub async fn launch(config: &PageflowConfig) -> PageflowResult<Self> {
        let mut builder = CdpConfig::builder()
            .window_size(config.window.width, config.window.height)
            .no_sandbox();
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref display) = config.display {
            builder = builder.arg(format!("--display={display}"));
        }
        let cdp_config = builder.build().map_err(PageflowError::driver)?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        debug!(headless = config.headless, "chromium launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
        })
    }

    async fn eval(&self, script: String) -> PageflowResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Run `body` with `el` bound to the handle's element
    async fn eval_on(&self, element: &ElementHandle, body: &str) -> PageflowResult<Value> {
        let script = format!(
            "(() => {{ const el = window.__pf && window.__pf.els[{id}]; \
             if (!el || !el.isConnected) return {stale}; {body} }})()",
            id = js_string(&element.id),
            stale = js_string(STALE),
        );
        match self.eval(script).await? {
            Value::String(s) if s == STALE => Err(PageflowError::StaleElement {
                id: element.id.clone(),
            }),
            value => Ok(value),
        }
    }

    async fn lookup(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
        all: bool,
    ) -> PageflowResult<Vec<ElementHandle>> {
        let root = scope.map_or_else(
            || "document".to_string(),
            |s| format!("pf.els[{}]", js_string(&s.id)),
        );
        let found = if all {
            selector.to_query_all("root")
        } else {
            format!("[{}].filter(Boolean)", selector.to_query("root"))
        };
        let script = format!(
            "(() => {{ const pf = window.__pf || (window.__pf = {{ seq: 0, els: {{}} }}); \
             const root = {root}; if (!root || !root.isConnected) return {stale}; \
             return {found}.map(el => {{ const id = 'pf-' + (++pf.seq); pf.els[id] = el; return id; }}); }})()",
            stale = js_string(STALE),
        );
        match self.eval(script).await? {
            Value::Array(ids) => Ok(ids
                .iter()
                .filter_map(Value::as_str)
                .map(ElementHandle::new)
                .collect()),
            Value::String(s) if s == STALE => Err(PageflowError::StaleElement {
                id: scope.map(|s| s.id.clone()).unwrap_or_default(),
            }),
            other => Err(PageflowError::driver(format!("unexpected lookup result {other}"))),
        }
    }
}

impl Drop for CdpDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl WebDriver for CdpDriver {
    async fn goto(&self, url: &str) -> PageflowResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PageflowError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> PageflowResult<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn find(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Option<ElementHandle>> {
        Ok(self.lookup(scope, selector, false).await?.into_iter().next())
    }

    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Vec<ElementHandle>> {
        self.lookup(scope, selector, true).await
    }

    async fn click(&self, element: &ElementHandle) -> PageflowResult<()> {
        let _ = self
            .eval_on(element, "el.scrollIntoView({block: 'center'}); el.click(); return null;")
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> PageflowResult<()> {
        let _ = self.eval_on(element, "el.focus(); return null;").await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> PageflowResult<()> {
        let body = format!(
            "if (!('value' in el) || el.readOnly || el.disabled) return {invalid}; \
             el.value = ''; el.dispatchEvent(new Event('input', {{bubbles: true}})); return null;",
            invalid = js_string(INVALID),
        );
        match self.eval_on(element, &body).await? {
            Value::String(s) if s == INVALID => Err(PageflowError::InvalidElementState {
                message: format!("element {element} is not user editable"),
            }),
            _ => Ok(()),
        }
    }

    async fn text(&self, element: &ElementHandle) -> PageflowResult<String> {
        let value = self.eval_on(element, "return el.innerText || '';").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> PageflowResult<Option<String>> {
        let body = format!(
            "const n = {name}; const v = (n === 'value' && 'value' in el) ? el.value : el.getAttribute(n); \
             return v === undefined ? null : v;",
            name = js_string(name),
        );
        Ok(self
            .eval_on(element, &body)
            .await?
            .as_str()
            .map(str::to_string))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> PageflowResult<bool> {
        let value = self
            .eval_on(
                element,
                "const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
                 return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0' \
                 && (r.width > 0 || r.height > 0);",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> PageflowResult<bool> {
        let value = self.eval_on(element, "return !el.disabled;").await?;
        Ok(value.as_bool().unwrap_or(true))
    }

    async fn select_by_visible_text(
        &self,
        element: &ElementHandle,
        text: &str,
    ) -> PageflowResult<()> {
        let body = format!(
            "const o = Array.from(el.options || []).find(o => o.text.trim() === {text}); \
             if (!o) return {missing}; el.value = o.value; o.selected = true; \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return null;",
            text = js_string(text),
            missing = js_string(MISSING),
        );
        match self.eval_on(element, &body).await? {
            Value::String(s) if s == MISSING => Err(PageflowError::NoSuchElement {
                selector: format!("option with text \"{text}\""),
            }),
            _ => Ok(()),
        }
    }

    async fn element_height(&self, element: &ElementHandle) -> PageflowResult<f64> {
        let value = self
            .eval_on(element, "return el.getBoundingClientRect().height;")
            .await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn window_size(&self) -> PageflowResult<WindowSize> {
        let value = self
            .eval("[window.innerWidth, window.innerHeight]".to_string())
            .await?;
        let dim = |i: usize| value.get(i).and_then(Value::as_u64).unwrap_or(0) as u32;
        Ok(WindowSize::new(dim(0), dim(1)))
    }

    async fn set_window_size(&self, size: WindowSize) -> PageflowResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(size.width))
            .height(i64::from(size.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(PageflowError::driver)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| PageflowError::driver(e.to_string()))?;
        Ok(())
    }

    async fn execute(&self, script: &str) -> PageflowResult<Value> {
        self.eval(format!("(() => {{ {script} }})()")).await
    }

    async fn screenshot(&self) -> PageflowResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let screenshot = self
            .page
            .execute(params)
            .await
            .map_err(|e| PageflowError::ScreenshotError {
                message: e.to_string(),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(|e| PageflowError::ScreenshotError {
                message: e.to_string(),
            })
    }

    async fn close(&self) -> PageflowResult<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "chromium did not close cleanly");
            return Err(PageflowError::driver(e.to_string()));
        }
        let _ = browser.wait().await;
        Ok(())
    }
}
