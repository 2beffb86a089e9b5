//! WebDriver - Abstract Browser Automation Trait
//!
//! Every page and component talks to the browser through [`WebDriver`].
//! Backends:
//!
//! - [`MockDriver`] - in-memory element tree for unit tests
//! - `RemoteDriver` - W3C WebDriver via fantoccini (`webdriver` feature)
//! - `CdpDriver` - Chromium over CDP via chromiumoxide (`browser` feature)
//!
//! All methods take `&self` so one driver can be shared as
//! `Arc<dyn WebDriver>` by a page and every component spawned from it.

use crate::locator::Selector;
use crate::result::{PageflowError, PageflowResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Element handle for DOM interactions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Backend-specific identifier
    pub id: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Browser window dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl WindowSize {
    /// Create a window size
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Browsers a launcher knows how to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverKind {
    /// Mozilla Firefox (geckodriver)
    Firefox,
    /// Google Chrome (chromedriver)
    Chrome,
    /// Chromium (chromedriver or CDP)
    Chromium,
}

impl DriverKind {
    /// All supported kinds
    pub const ALL: [Self; 3] = [Self::Firefox, Self::Chrome, Self::Chromium];

    /// Canonical lowercase name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Firefox => "firefox",
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
        }
    }

    /// Comma separated list of supported names
    #[must_use]
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(DriverKind::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = PageflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firefox" | "gecko" => Ok(Self::Firefox),
            "chrome" => Ok(Self::Chrome),
            "chromium" => Ok(Self::Chromium),
            _ => Err(PageflowError::UnsupportedDriver {
                name: s.to_string(),
                supported: Self::supported(),
            }),
        }
    }
}

/// Abstract driver trait for browser automation
///
/// `scope` arguments restrict lookups to descendants of an element;
/// `None` searches the whole document. Using a handle whose node has been
/// detached returns [`PageflowError::StaleElement`].
#[async_trait]
pub trait WebDriver: Send + Sync + fmt::Debug {
    /// Navigate to URL
    async fn goto(&self, url: &str) -> PageflowResult<()>;

    /// Get current URL
    async fn current_url(&self) -> PageflowResult<String>;

    /// First element matching `selector`
    async fn find(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Option<ElementHandle>>;

    /// Every element matching `selector`
    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Vec<ElementHandle>>;

    /// Click element
    async fn click(&self, element: &ElementHandle) -> PageflowResult<()>;

    /// Type text into element
    async fn send_keys(&self, element: &ElementHandle, text: &str) -> PageflowResult<()>;

    /// Clear an editable element
    async fn clear(&self, element: &ElementHandle) -> PageflowResult<()>;

    /// Visible text of element
    async fn text(&self, element: &ElementHandle) -> PageflowResult<String>;

    /// Attribute (or `value` property) of element
    async fn attribute(&self, element: &ElementHandle, name: &str)
        -> PageflowResult<Option<String>>;

    /// Whether element is rendered
    async fn is_displayed(&self, element: &ElementHandle) -> PageflowResult<bool>;

    /// Whether element accepts interaction
    async fn is_enabled(&self, element: &ElementHandle) -> PageflowResult<bool>;

    /// Choose the `<option>` of a `<select>` whose label equals `text`
    async fn select_by_visible_text(&self, element: &ElementHandle, text: &str)
        -> PageflowResult<()>;

    /// Rendered height of element in CSS pixels
    async fn element_height(&self, element: &ElementHandle) -> PageflowResult<f64>;

    /// Current window size
    async fn window_size(&self) -> PageflowResult<WindowSize>;

    /// Resize window
    async fn set_window_size(&self, size: WindowSize) -> PageflowResult<()>;

    /// Execute a JavaScript function body in page context
    ///
    /// Use `return` to hand a value back.
    async fn execute(&self, script: &str) -> PageflowResult<serde_json::Value>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> PageflowResult<Vec<u8>>;

    /// Close the browser
    async fn close(&self) -> PageflowResult<()>;
}

// ============================================================================
// Mock driver
// ============================================================================

/// Side effect applied when a mock element is clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    /// Change the current URL
    Navigate(String),
    /// Make an element displayed
    Show(ElementHandle),
    /// Hide an element
    Hide(ElementHandle),
    /// Detach an element and its subtree
    Remove(ElementHandle),
}

/// Blueprint for an element in a [`MockDriver`] tree
#[derive(Debug, Clone)]
pub struct MockElement {
    tag: String,
    selectors: Vec<String>,
    text: String,
    value: Option<String>,
    attributes: HashMap<String, String>,
    options: Vec<String>,
    displayed: bool,
    enabled: bool,
    clearable: bool,
    dropped_keystrokes: u32,
    detach_on_type: bool,
    height: f64,
    on_click: Vec<ClickEffect>,
}

impl MockElement {
    /// Create an element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            selectors: Vec::new(),
            text: String::new(),
            value: None,
            attributes: HashMap::new(),
            options: Vec::new(),
            displayed: true,
            enabled: true,
            clearable: true,
            dropped_keystrokes: 0,
            detach_on_type: false,
            height: 20.0,
            on_click: Vec::new(),
        }
    }

    /// CSS or XPath selector this element answers to
    #[must_use]
    pub fn matching(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    /// Visible text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Initial input value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// `<option>` labels of a select element
    #[must_use]
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Start hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Start disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Reject `clear` with an invalid state error
    #[must_use]
    pub const fn not_clearable(mut self) -> Self {
        self.clearable = false;
        self
    }

    /// Lose the final keystroke of the next `n` `send_keys` calls
    #[must_use]
    pub const fn flaky_typing(mut self, n: u32) -> Self {
        self.dropped_keystrokes = n;
        self
    }

    /// Detach from the tree once typed into, as a re-rendering input does
    #[must_use]
    pub const fn detach_on_type(mut self) -> Self {
        self.detach_on_type = true;
        self
    }

    /// Rendered height
    #[must_use]
    pub const fn height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    /// Effect applied on click
    #[must_use]
    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Css(s) => self.tag == *s || self.selectors.iter().any(|m| m == s),
            Selector::XPath(s) => self.selectors.iter().any(|m| m == s),
            Selector::TagName(t) => self.tag.eq_ignore_ascii_case(t),
            Selector::LinkText(t) => self.tag == "a" && self.text.trim() == t,
        }
    }
}

#[derive(Debug)]
struct MockNode {
    handle: ElementHandle,
    parent: Option<usize>,
    attached: bool,
    element: MockElement,
}

#[derive(Debug)]
struct MockState {
    url: String,
    nodes: Vec<MockNode>,
    window: WindowSize,
    screenshot: Vec<u8>,
    history: Vec<String>,
    closed: bool,
    close_error: Option<String>,
}

impl MockState {
    fn index(&self, handle: &ElementHandle) -> PageflowResult<usize> {
        self.nodes
            .iter()
            .position(|n| n.handle == *handle && n.attached)
            .ok_or_else(|| PageflowError::StaleElement {
                id: handle.id.clone(),
            })
    }

    fn node_mut(&mut self, handle: &ElementHandle) -> PageflowResult<&mut MockNode> {
        let idx = self.index(handle)?;
        Ok(&mut self.nodes[idx])
    }

    fn node(&self, handle: &ElementHandle) -> PageflowResult<&MockNode> {
        let idx = self.index(handle)?;
        Ok(&self.nodes[idx])
    }

    fn is_descendant(&self, mut idx: usize, ancestor: usize) -> bool {
        while let Some(parent) = self.nodes[idx].parent {
            if parent == ancestor {
                return true;
            }
            idx = parent;
        }
        false
    }

    fn matching(&self, scope: Option<&ElementHandle>, selector: &Selector) -> PageflowResult<Vec<ElementHandle>> {
        let root = scope.map(|s| self.index(s)).transpose()?;
        Ok(self
            .nodes
            .iter()
            .enumerate()
            .filter(|(idx, node)| {
                node.attached
                    && root.map_or(true, |r| self.is_descendant(*idx, r))
                    && node.element.matches(selector)
            })
            .map(|(_, node)| node.handle.clone())
            .collect())
    }

    fn detach(&mut self, idx: usize) {
        self.nodes[idx].attached = false;
        let children: Vec<usize> = (0..self.nodes.len())
            .filter(|i| self.nodes[*i].parent == Some(idx) && self.nodes[*i].attached)
            .collect();
        for child in children {
            self.detach(child);
        }
    }
}

/// Mock driver for unit testing
///
/// Holds a small element tree rooted at `body`. Elements only match the
/// selectors they were declared with; nothing is parsed.
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal PNG signature returned by default screenshots
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

impl MockDriver {
    /// Create new mock driver at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        let body = MockNode {
            handle: ElementHandle::new("body"),
            parent: None,
            attached: true,
            element: MockElement::new("body").height(1000.0),
        };
        Self {
            state: Mutex::new(MockState {
                url: "about:blank".to_string(),
                nodes: vec![body],
                window: crate::config::DEFAULT_WINDOW,
                screenshot: PNG_MAGIC.to_vec(),
                history: Vec::new(),
                closed: false,
                close_error: None,
            }),
        }
    }

    /// Create a mock driver already at `url`
    #[must_use]
    pub fn at(url: impl Into<String>) -> Self {
        let driver = Self::new();
        driver.set_current_url(url);
        driver
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) {
        self.lock().history.push(call);
    }

    /// Handle of the `body` element
    #[must_use]
    pub fn body(&self) -> ElementHandle {
        ElementHandle::new("body")
    }

    /// Add an element under `body`
    pub fn add(&self, element: MockElement) -> ElementHandle {
        self.add_child(&self.body(), element)
    }

    /// Add an element under `parent`
    pub fn add_child(&self, parent: &ElementHandle, element: MockElement) -> ElementHandle {
        let mut state = self.lock();
        let parent_idx = state.nodes.iter().position(|n| n.handle == *parent);
        let handle = ElementHandle::new(format!("el-{}", state.nodes.len()));
        state.nodes.push(MockNode {
            handle: handle.clone(),
            parent: parent_idx,
            attached: true,
            element,
        });
        handle
    }

    /// Change the current URL without recording a navigation
    pub fn set_current_url(&self, url: impl Into<String>) {
        self.lock().url = url.into();
    }

    /// Show or hide an element
    pub fn set_displayed(&self, handle: &ElementHandle, displayed: bool) {
        if let Ok(node) = self.lock().node_mut(handle) {
            node.element.displayed = displayed;
        }
    }

    /// Replace an element's text
    pub fn set_text(&self, handle: &ElementHandle, text: impl Into<String>) {
        if let Ok(node) = self.lock().node_mut(handle) {
            node.element.text = text.into();
        }
    }

    /// Set the height of `body`
    pub fn set_body_height(&self, height: f64) {
        let body = self.body();
        if let Ok(node) = self.lock().node_mut(&body) {
            node.element.height = height;
        }
    }

    /// Set screenshot bytes
    pub fn set_screenshot(&self, data: Vec<u8>) {
        self.lock().screenshot = data;
    }

    /// Detach an element and its subtree, making handles stale
    pub fn detach(&self, handle: &ElementHandle) {
        let mut state = self.lock();
        if let Ok(idx) = state.index(handle) {
            state.detach(idx);
        }
    }

    /// Current input value of an element
    #[must_use]
    pub fn value_of(&self, handle: &ElementHandle) -> Option<String> {
        self.lock()
            .node(handle)
            .ok()
            .and_then(|n| n.element.value.clone())
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.lock().history.iter().any(|c| c.starts_with(method))
    }

    /// Number of recorded calls starting with `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    /// Whether `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Make `close` fail with a driver error
    pub fn fail_close(&self, message: impl Into<String>) {
        self.lock().close_error = Some(message.into());
    }
}

#[async_trait]
impl WebDriver for MockDriver {
    async fn goto(&self, url: &str) -> PageflowResult<()> {
        let mut state = self.lock();
        state.history.push(format!("goto:{url}"));
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> PageflowResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn find(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Option<ElementHandle>> {
        Ok(self.lock().matching(scope, selector)?.into_iter().next())
    }

    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        selector: &Selector,
    ) -> PageflowResult<Vec<ElementHandle>> {
        self.lock().matching(scope, selector)
    }

    async fn click(&self, element: &ElementHandle) -> PageflowResult<()> {
        let mut state = self.lock();
        let effects = state.node(element)?.element.on_click.clone();
        state.history.push(format!("click:{element}"));
        for effect in effects {
            match effect {
                ClickEffect::Navigate(url) => state.url = url,
                ClickEffect::Show(h) => {
                    if let Ok(node) = state.node_mut(&h) {
                        node.element.displayed = true;
                    }
                }
                ClickEffect::Hide(h) => {
                    if let Ok(node) = state.node_mut(&h) {
                        node.element.displayed = false;
                    }
                }
                ClickEffect::Remove(h) => {
                    if let Ok(idx) = state.index(&h) {
                        state.detach(idx);
                    }
                }
            }
        }
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> PageflowResult<()> {
        let mut state = self.lock();
        state.history.push(format!("send_keys:{element}:{text}"));
        let idx = state.index(element)?;
        let node = &mut state.nodes[idx];
        let mut typed = text.to_string();
        if node.element.dropped_keystrokes > 0 {
            node.element.dropped_keystrokes -= 1;
            let _ = typed.pop();
        }
        node.element
            .value
            .get_or_insert_with(String::new)
            .push_str(&typed);
        if node.element.detach_on_type {
            state.detach(idx);
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> PageflowResult<()> {
        let mut state = self.lock();
        state.history.push(format!("clear:{element}"));
        let node = state.node_mut(element)?;
        if !node.element.clearable {
            return Err(PageflowError::InvalidElementState {
                message: format!("element {element} is not user editable"),
            });
        }
        node.element.value = Some(String::new());
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> PageflowResult<String> {
        Ok(self.lock().node(element)?.element.text.clone())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> PageflowResult<Option<String>> {
        let state = self.lock();
        let node = state.node(element)?;
        if name == "value" {
            return Ok(node.element.value.clone());
        }
        Ok(node.element.attributes.get(name).cloned())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> PageflowResult<bool> {
        Ok(self.lock().node(element)?.element.displayed)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> PageflowResult<bool> {
        Ok(self.lock().node(element)?.element.enabled)
    }

    async fn select_by_visible_text(
        &self,
        element: &ElementHandle,
        text: &str,
    ) -> PageflowResult<()> {
        let mut state = self.lock();
        state.history.push(format!("select:{element}:{text}"));
        let node = state.node_mut(element)?;
        if !node.element.options.iter().any(|o| o == text) {
            return Err(PageflowError::NoSuchElement {
                selector: format!("option with text \"{text}\""),
            });
        }
        node.element.value = Some(text.to_string());
        Ok(())
    }

    async fn element_height(&self, element: &ElementHandle) -> PageflowResult<f64> {
        Ok(self.lock().node(element)?.element.height)
    }

    async fn window_size(&self) -> PageflowResult<WindowSize> {
        Ok(self.lock().window)
    }

    async fn set_window_size(&self, size: WindowSize) -> PageflowResult<()> {
        let mut state = self.lock();
        state
            .history
            .push(format!("set_window_size:{}x{}", size.width, size.height));
        state.window = size;
        Ok(())
    }

    async fn execute(&self, script: &str) -> PageflowResult<serde_json::Value> {
        self.record(format!("execute:{script}"));
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self) -> PageflowResult<Vec<u8>> {
        let mut state = self.lock();
        state.history.push("screenshot".to_string());
        Ok(state.screenshot.clone())
    }

    async fn close(&self) -> PageflowResult<()> {
        let mut state = self.lock();
        state.history.push("close".to_string());
        if let Some(message) = state.close_error.clone() {
            return Err(PageflowError::driver(message));
        }
        state.closed = true;
        Ok(())
    }
}
