//! Page Objects and Components
//!
//! A [`Page`] is a whole document reached by URL; a [`Component`] is a
//! fragment of it located by CSS selector. Both deref to [`Scope`], which
//! carries every action. Clicking returns a [`Navigation`] telling the
//! caller which page object now owns the browser.
//!
//! ## Example
//!
//! ```ignore
//! #[derive(Page)]
//! #[page(url = "https://site.test/login")]
//! struct LoginPage(Page);
//!
//! #[derive(Page)]
//! #[page(url = "https://site.test/home")]
//! struct HomePage(Page);
//!
//! let mut registry = Registry::new();
//! registry.register_page::<LoginPage>().register_page::<HomePage>();
//! let session = Session::new(driver, Arc::new(registry), Arc::new(config));
//!
//! let login = session.open::<LoginPage>().await?;
//! login.enter_text("input[name=username]", "ada").await?;
//! let home: HomePage = login.click("button[type=submit]").await?.into_page()?;
//! ```

use crate::config::PageflowConfig;
use crate::driver::{ElementHandle, WebDriver};
use crate::expectations;
use crate::locator::Selector;
use crate::registry::{short_type_name, Registration, Registry, UrlMatcher};
use crate::result::{PageflowError, PageflowResult};
use crate::wait::{Wait, WaitOptions};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A page type registered by URL
pub trait PageObject: Sized + 'static {
    /// URL or URL pattern owned by this page
    const URL: &'static str;

    /// Wrap a loaded page
    fn from_page(page: Page) -> Self;

    /// The wrapped page
    fn page(&self) -> &Page;
}

/// A component type registered by CSS selector
pub trait ComponentObject: Sized + 'static {
    /// Selector locating this component
    const SELECTOR: &'static str;

    /// Wrap a located component
    fn from_component(component: Component) -> Self;

    /// The wrapped component
    fn component(&self) -> &Component;
}

// =============================================================================
// SESSION
// =============================================================================

/// Driver, registry and configuration shared by every page object
#[derive(Debug, Clone)]
pub struct Session {
    driver: Arc<dyn WebDriver>,
    registry: Arc<Registry>,
    config: Arc<PageflowConfig>,
}

impl Session {
    /// Create a session
    #[must_use]
    pub fn new(
        driver: Arc<dyn WebDriver>,
        registry: Arc<Registry>,
        config: Arc<PageflowConfig>,
    ) -> Self {
        Self {
            driver,
            registry,
            config,
        }
    }

    /// Underlying driver
    #[must_use]
    pub fn driver(&self) -> &dyn WebDriver {
        self.driver.as_ref()
    }

    /// Shared driver handle
    #[must_use]
    pub fn driver_arc(&self) -> Arc<dyn WebDriver> {
        Arc::clone(&self.driver)
    }

    /// Page and component registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &PageflowConfig {
        &self.config
    }

    /// Element waiter configured from the session
    #[must_use]
    pub fn waiter(&self) -> Wait {
        Wait::new(WaitOptions::from_config(&self.config))
    }

    /// Current URL without its query string
    pub async fn location(&self) -> PageflowResult<String> {
        let url = self.driver.current_url().await?;
        Ok(strip_query(&url).to_string())
    }

    /// Open the page `T` at its registered URL
    ///
    /// Fails with [`PageflowError::NavigationError`] when `T::URL` is a
    /// pattern; use [`Session::open_at`] for those.
    pub async fn open<T: PageObject>(&self) -> PageflowResult<T> {
        if !UrlMatcher::new(T::URL).is_concrete() {
            return Err(PageflowError::NavigationError {
                url: T::URL.to_string(),
                message: format!(
                    "{} has a URL pattern, open it with a concrete URL",
                    short_type_name::<T>()
                ),
            });
        }
        self.open_at::<T>(T::URL).await
    }

    /// Open the page `T` at a concrete `url`
    pub async fn open_at<T: PageObject>(&self, url: &str) -> PageflowResult<T> {
        let page = Page::load(self.clone(), url, Some(Registration::page::<T>())).await?;
        Ok(T::from_page(page))
    }

    /// Open `url` as whichever page is registered for it
    pub async fn open_url(&self, url: &str) -> PageflowResult<Page> {
        let registration = self.registry.resolve_url(strip_query(url)).cloned();
        Page::load(self.clone(), url, registration).await
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Same document, ignoring query, fragment and a trailing `/`
fn same_location(a: &str, b: &str) -> bool {
    strip_query(a).trim_end_matches('/') == strip_query(b).trim_end_matches('/')
}

// =============================================================================
// SCOPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Anchor {
    Page,
    Component(String),
}

/// What a click acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The scope's own element
    Root,
    /// First element matching a selector within the scope
    Selector(Selector),
    /// An element already located
    Element(ElementHandle),
    /// A component, located by its selector within the scope
    Component(String),
}

impl From<&str> for Target {
    fn from(css: &str) -> Self {
        Self::Selector(Selector::css(css))
    }
}

impl From<String> for Target {
    fn from(css: String) -> Self {
        Self::Selector(Selector::Css(css))
    }
}

impl From<Selector> for Target {
    fn from(selector: Selector) -> Self {
        Self::Selector(selector)
    }
}

impl From<ElementHandle> for Target {
    fn from(element: ElementHandle) -> Self {
        Self::Element(element)
    }
}

impl From<&Component> for Target {
    fn from(component: &Component) -> Self {
        Self::Component(component.selector().to_string())
    }
}

/// Action surface shared by pages and components
#[derive(Debug, Clone)]
pub struct Scope {
    session: Session,
    root: ElementHandle,
    page_url: String,
    registration: Option<Registration>,
    anchor: Anchor,
}

impl Scope {
    /// Session this scope belongs to
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Underlying driver
    #[must_use]
    pub fn driver(&self) -> &dyn WebDriver {
        self.session.driver()
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &PageflowConfig {
        self.session.config()
    }

    /// Element this scope wraps (`body` for pages)
    #[must_use]
    pub const fn root(&self) -> &ElementHandle {
        &self.root
    }

    /// URL of the owning page
    #[must_use]
    pub fn url(&self) -> &str {
        &self.page_url
    }

    /// Registration, if the type is registered
    #[must_use]
    pub const fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// True if this scope was built for the type `T`
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.registration.as_ref().is_some_and(Registration::is::<T>)
    }

    /// Display name, e.g. `LoginPage` or `DynamicComponent(selector="#x")`
    #[must_use]
    pub fn name(&self) -> String {
        match (&self.anchor, &self.registration) {
            (_, Some(registration)) => registration.to_string(),
            (Anchor::Page, None) => format!("Page(url=\"{}\")", self.page_url),
            (Anchor::Component(selector), None) => anonymous_name(selector),
        }
    }

    /// Pages search the whole document, components their own subtree
    fn search_root(&self) -> Option<&ElementHandle> {
        match self.anchor {
            Anchor::Page => None,
            Anchor::Component(_) => Some(&self.root),
        }
    }

    // -------------------------------------------------------------------------
    // Components
    // -------------------------------------------------------------------------

    /// Component for `selector`, registered or anonymous
    ///
    /// The component is looked up in the whole document. Fails with
    /// [`PageflowError::ComponentMissing`] if it does not appear in time.
    pub async fn get_component(&self, selector: &str) -> PageflowResult<Component> {
        let registration = self.session.registry().resolve_selector(selector).cloned();
        if registration.is_none() {
            debug!(selector, "no registered component, using a dynamic one");
        }
        self.locate_component(selector, registration).await
    }

    /// Typed component `T`
    pub async fn component<T: ComponentObject>(&self) -> PageflowResult<T> {
        let component = self
            .locate_component(T::SELECTOR, Some(Registration::component::<T>()))
            .await?;
        Ok(T::from_component(component))
    }

    async fn locate_component(
        &self,
        selector: &str,
        registration: Option<Registration>,
    ) -> PageflowResult<Component> {
        let css = Selector::css(selector);
        let driver = self.driver();
        let element = self
            .session
            .waiter()
            .until(&format!("No element found with selector \"{selector}\"."), || {
                expectations::presence_of(driver, None, &css)
            })
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PageflowError::ComponentMissing {
                        component: registration
                            .as_ref()
                            .map_or_else(|| anonymous_name(selector), ToString::to_string),
                    }
                } else {
                    e
                }
            })?;
        Ok(self.child(selector, element, registration))
    }

    /// Every component matching `selector` within this scope
    ///
    /// Returns an empty list when none appear in time.
    pub async fn get_components(&self, selector: &str) -> PageflowResult<Vec<Component>> {
        let registration = self.session.registry().resolve_selector(selector).cloned();
        match self.get_elements(selector).await {
            Ok(elements) => Ok(elements
                .into_iter()
                .map(|element| self.child(selector, element, registration.clone()))
                .collect()),
            Err(e) if e.is_timeout() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Every typed component `T` within this scope
    pub async fn components<T: ComponentObject>(&self) -> PageflowResult<Vec<T>> {
        let registration = Registration::component::<T>();
        match self.get_elements(T::SELECTOR).await {
            Ok(elements) => Ok(elements
                .into_iter()
                .map(|element| {
                    T::from_component(self.child(T::SELECTOR, element, Some(registration.clone())))
                })
                .collect()),
            Err(e) if e.is_timeout() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn child(
        &self,
        selector: &str,
        element: ElementHandle,
        registration: Option<Registration>,
    ) -> Component {
        Component {
            scope: Self {
                session: self.session.clone(),
                root: element,
                page_url: self.page_url.clone(),
                registration,
                anchor: Anchor::Component(selector.to_string()),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Elements
    // -------------------------------------------------------------------------

    /// Wait for an element to be present
    pub async fn get_element(&self, selector: impl Into<Selector>) -> PageflowResult<ElementHandle> {
        let selector = selector.into();
        let (driver, root) = (self.driver(), self.search_root());
        self.session
            .waiter()
            .until(
                &format!("No element found with selector \"{}\".", selector.value()),
                || expectations::presence_of(driver, root, &selector),
            )
            .await
    }

    /// Wait for an element to be present and displayed
    pub async fn get_visible_element(
        &self,
        selector: impl Into<Selector>,
    ) -> PageflowResult<ElementHandle> {
        let selector = selector.into();
        let (driver, root) = (self.driver(), self.search_root());
        self.session
            .waiter()
            .until(
                &format!("No visible element found with selector \"{}\".", selector.value()),
                || expectations::visibility_of(driver, root, &selector),
            )
            .await
    }

    /// Wait for a link with exactly this text
    pub async fn get_element_by_link_text(&self, link_text: &str) -> PageflowResult<ElementHandle> {
        let selector = Selector::link_text(link_text);
        let (driver, root) = (self.driver(), self.search_root());
        self.session
            .waiter()
            .until(&format!("No link with text \"{link_text}\"."), || {
                expectations::presence_of(driver, root, &selector)
            })
            .await
    }

    /// Wait for at least one matching element and return them all
    pub async fn get_elements(
        &self,
        selector: impl Into<Selector>,
    ) -> PageflowResult<Vec<ElementHandle>> {
        let selector = selector.into();
        let (driver, root) = (self.driver(), self.search_root());
        self.session
            .waiter()
            .until(
                &format!("No elements found with selector \"{}\".", selector.value()),
                || expectations::presence_of_all(driver, root, &selector),
            )
            .await
    }

    /// Attribute of the scope's own element
    pub async fn get_attribute(&self, name: &str) -> PageflowResult<Option<String>> {
        self.driver().attribute(&self.root, name).await
    }

    /// Text of the scope's own element
    pub async fn text(&self) -> PageflowResult<String> {
        self.driver().text(&self.root).await
    }

    /// Current URL without its query string
    pub async fn location(&self) -> PageflowResult<String> {
        self.session.location().await
    }

    // -------------------------------------------------------------------------
    // Assertions
    // -------------------------------------------------------------------------

    /// Wait until no visible element matches `selector`
    pub async fn wait_for_invisibility(&self, selector: impl Into<Selector>) -> PageflowResult<()> {
        self.assert_element_invisible(selector).await
    }

    /// Wait until no visible element matches `selector`
    pub async fn assert_element_invisible(
        &self,
        selector: impl Into<Selector>,
    ) -> PageflowResult<()> {
        let selector = selector.into();
        let (driver, root) = (self.driver(), self.search_root());
        self.session
            .waiter()
            .until(
                &format!("Element with selector \"{}\" is still visible.", selector.value()),
                || expectations::invisibility_of(driver, root, &selector),
            )
            .await
    }

    /// Wait until the element matching `selector` contains `text`
    pub async fn assert_text_in_element(&self, selector: &str, text: &str) -> PageflowResult<()> {
        let css = Selector::css(selector);
        let (driver, root) = (self.driver(), self.search_root());
        let result = self
            .session
            .waiter()
            .until(&format!("\"{text}\" not found"), || {
                expectations::text_in_element(driver, root, &css, text)
            })
            .await;
        match result {
            Err(PageflowError::Timeout { ms, .. }) => {
                let current = match driver.find(root, &css).await {
                    Ok(Some(element)) => driver.text(&element).await.unwrap_or_default(),
                    _ => String::new(),
                };
                Err(PageflowError::Timeout {
                    ms,
                    message: format!("\"{text}\" not found in \"{current}\""),
                })
            }
            other => other,
        }
    }

    /// Wait until this scope's element contains `text`
    pub async fn wait_for_text(&self, text: &str) -> PageflowResult<()> {
        let driver = self.driver();
        self.session
            .waiter()
            .until(&format!("\"{text}\" not present in {}", self.name()), || {
                expectations::text_in_component(driver, &self.root, text)
            })
            .await
    }

    /// Wait until this scope's element is displayed and enabled
    pub async fn wait_until_clickable(&self) -> PageflowResult<()> {
        let driver = self.driver();
        self.session
            .waiter()
            .until(&format!("{} is not clickable", self.name()), || {
                expectations::component_clickable(driver, &self.root)
            })
            .await
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Click `target` and resolve where the browser ended up
    pub async fn click(&self, target: impl Into<Target>) -> PageflowResult<Navigation> {
        let element = self.resolve_target(target.into()).await?;
        self.click_element(&element, None).await
    }

    /// Click `target`, expecting it to open the component at `opens`
    pub async fn click_and_open(
        &self,
        target: impl Into<Target>,
        opens: &str,
    ) -> PageflowResult<Navigation> {
        let element = self.resolve_target(target.into()).await?;
        self.click_element(&element, Some(opens)).await
    }

    /// Click the link with exactly this text
    pub async fn click_link(&self, link_text: &str, opens: Option<&str>) -> PageflowResult<Navigation> {
        let element = self.get_element_by_link_text(link_text).await?;
        self.click_element(&element, opens).await
    }

    /// Click the first displayed button whose text equals `button_text`
    pub async fn click_button(
        &self,
        button_text: &str,
        opens: Option<&str>,
    ) -> PageflowResult<Navigation> {
        let driver = self.driver();
        for button in driver
            .find_all(self.search_root(), &Selector::tag_name("button"))
            .await?
        {
            if driver.text(&button).await? == button_text && driver.is_displayed(&button).await? {
                return self.click_element(&button, opens).await;
            }
        }
        Err(PageflowError::assertion(format!(
            "Could not find a button with the text '{button_text}'"
        )))
    }

    async fn resolve_target(&self, target: Target) -> PageflowResult<ElementHandle> {
        match target {
            Target::Root => Ok(self.root.clone()),
            Target::Element(element) => Ok(element),
            Target::Selector(selector) => self.get_element(selector).await,
            Target::Component(selector) => self.get_element(Selector::Css(selector)).await,
        }
    }

    async fn click_element(
        &self,
        element: &ElementHandle,
        opens: Option<&str>,
    ) -> PageflowResult<Navigation> {
        self.driver().click(element).await?;

        if let Some(selector) = opens {
            let component = self.get_component(selector).await?;
            debug!(component = %component.name(), "click opened component");
            return Ok(Navigation::Component(component));
        }

        let location = self.location().await?;
        if !same_location(&self.page_url, &location) {
            if let Some(registration) = self.session.registry().resolve_url(&location).cloned() {
                info!(from = %self.page_url, to = %location, page = registration.name(), "navigated");
                let page = Page::load(self.session.clone(), &location, Some(registration)).await?;
                return Ok(Navigation::Page(page));
            }
            debug!(%location, "no page registered for location");
        }
        Ok(Navigation::Stay)
    }

    /// Choose the option labelled `option_text` in a `<select>`
    pub async fn select_option(&self, selector: &str, option_text: &str) -> PageflowResult<()> {
        let element = self.get_element(selector).await?;
        self.driver()
            .select_by_visible_text(&element, option_text)
            .await
    }

    /// Type `text` into the visible element at `selector`, verifying it landed
    ///
    /// Keystrokes are occasionally lost by browsers, so the value is read
    /// back and typing is retried after clearing. An element that cannot be
    /// cleared, or that goes stale after typing, is taken as accepting the
    /// text.
    pub async fn enter_text(&self, selector: &str, text: &str) -> PageflowResult<()> {
        let element = self.get_visible_element(selector).await?;
        let driver = self.driver();
        let config = self.config();

        for attempt in 1..=config.text_entry_attempts {
            driver.send_keys(&element, text).await?;

            let in_place = match read_value(driver, &element).await {
                Ok(value) => value,
                Err(e) if e.is_stale() => return Ok(()),
                Err(e) => return Err(e),
            };
            if in_place == text {
                return Ok(());
            }
            debug!(attempt, selector, expected = text, actual = %in_place, "text entry mismatch");

            if let Err(e) = driver.clear(&element).await {
                debug!(selector, error = %e, "element cannot be cleared");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(config.text_entry_retry_ms)).await;
        }

        Err(PageflowError::TextEntryFailed {
            text: text.to_string(),
        })
    }
}

async fn read_value(driver: &dyn WebDriver, element: &ElementHandle) -> PageflowResult<String> {
    match driver.attribute(element, "value").await? {
        Some(value) if !value.is_empty() => Ok(value),
        _ => driver.text(element).await,
    }
}

fn anonymous_name(selector: &str) -> String {
    format!("DynamicComponent(selector=\"{selector}\")")
}

// =============================================================================
// PAGE & COMPONENT
// =============================================================================

/// A loaded page
#[derive(Debug, Clone)]
pub struct Page {
    scope: Scope,
}

impl Page {
    /// Navigate to `url` unless already there, then wait for `body`
    pub(crate) async fn load(
        session: Session,
        url: &str,
        registration: Option<Registration>,
    ) -> PageflowResult<Self> {
        if session.location().await? != url {
            debug!(url, "navigating");
            session.driver().goto(url).await?;
        }

        let body = Selector::css("body");
        let driver = session.driver();
        let root = session
            .waiter()
            .until("No element found with selector \"body\".", || {
                expectations::presence_of(driver, None, &body)
            })
            .await?;

        Ok(Self {
            scope: Scope {
                session,
                root,
                page_url: url.to_string(),
                registration,
                anchor: Anchor::Page,
            },
        })
    }

    /// Wait until the page body contains `text`
    pub async fn assert_text_in_page(&self, text: &str) -> PageflowResult<()> {
        self.assert_text_in_element("body", text).await
    }
}

impl Deref for Page {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        &self.scope
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A located page fragment
#[derive(Debug, Clone)]
pub struct Component {
    scope: Scope,
}

impl Component {
    /// Selector the component was located with
    #[must_use]
    pub fn selector(&self) -> &str {
        match &self.scope.anchor {
            Anchor::Component(selector) => selector,
            Anchor::Page => "body",
        }
    }

    /// True if the component has no registered type
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.scope.registration.is_none()
    }
}

impl Deref for Component {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        &self.scope
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// =============================================================================
// NAVIGATION
// =============================================================================

/// Outcome of a click
#[derive(Debug, Clone)]
pub enum Navigation {
    /// The same page object still owns the browser
    Stay,
    /// The browser moved to a registered page
    Page(Page),
    /// The click opened a component
    Component(Component),
}

impl Navigation {
    /// True when the click did not change page object
    #[must_use]
    pub const fn is_stay(&self) -> bool {
        matches!(self, Self::Stay)
    }

    /// True when the click landed on page `T`
    #[must_use]
    pub fn is_page<T: PageObject>(&self) -> bool {
        matches!(self, Self::Page(page) if page.is::<T>())
    }

    /// True when the click opened component `T`
    #[must_use]
    pub fn is_component<T: ComponentObject>(&self) -> bool {
        matches!(self, Self::Component(component) if component.is::<T>())
    }

    /// Short description of the outcome
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Stay => "no navigation".to_string(),
            Self::Page(page) => page.name(),
            Self::Component(component) => component.name(),
        }
    }

    /// The page `T`, or [`PageflowError::UnexpectedPage`]
    pub fn into_page<T: PageObject>(self) -> PageflowResult<T> {
        match self {
            Self::Page(page) if page.is::<T>() => Ok(T::from_page(page)),
            other => Err(PageflowError::UnexpectedPage {
                expected: short_type_name::<T>().to_string(),
                actual: other.describe(),
            }),
        }
    }

    /// The component `T`, or [`PageflowError::UnexpectedComponent`]
    pub fn into_component<T: ComponentObject>(self) -> PageflowResult<T> {
        match self {
            Self::Component(component) if component.is::<T>() => Ok(T::from_component(component)),
            other => Err(PageflowError::UnexpectedComponent {
                expected: short_type_name::<T>().to_string(),
                actual: other.describe(),
            }),
        }
    }

    /// Any component, registered or anonymous
    #[must_use]
    pub fn component(self) -> Option<Component> {
        match self {
            Self::Component(component) => Some(component),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{ClickEffect, MockDriver, MockElement};

    #[derive(Debug)]
    struct SearchPage(Page);

    impl PageObject for SearchPage {
        const URL: &'static str = "https://site.test/search";
        fn from_page(page: Page) -> Self {
            Self(page)
        }
        fn page(&self) -> &Page {
            &self.0
        }
    }

    #[derive(Debug)]
    struct HomePage(Page);

    impl PageObject for HomePage {
        const URL: &'static str = "https://site.test";
        fn from_page(page: Page) -> Self {
            Self(page)
        }
        fn page(&self) -> &Page {
            &self.0
        }
    }

    #[derive(Debug)]
    struct ResultPage(Page);

    impl PageObject for ResultPage {
        const URL: &'static str = "https://site.test/results/:query";
        fn from_page(page: Page) -> Self {
            Self(page)
        }
        fn page(&self) -> &Page {
            &self.0
        }
    }

    #[derive(Debug)]
    struct Dialog(Component);

    impl ComponentObject for Dialog {
        const SELECTOR: &'static str = "#dialog";
        fn from_component(component: Component) -> Self {
            Self(component)
        }
        fn component(&self) -> &Component {
            &self.0
        }
    }

    fn fast_config() -> PageflowConfig {
        PageflowConfig::new()
            .with_element_timeout(40)
            .with_poll_interval(5)
            .with_text_entry_retry(1)
    }

    fn session(driver: &Arc<MockDriver>) -> Session {
        let mut registry = Registry::new();
        registry
            .register_page::<HomePage>()
            .register_page::<SearchPage>()
            .register_page::<ResultPage>()
            .register_component::<Dialog>();
        let driver: Arc<dyn WebDriver> = driver.clone();
        Session::new(driver, Arc::new(registry), Arc::new(fast_config()))
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn test_open_navigates_once() {
            let driver = Arc::new(MockDriver::new());
            let session = session(&driver);

            let page = session.open::<SearchPage>().await.unwrap();
            assert_eq!(page.page().url(), "https://site.test/search");
            assert!(page.page().is::<SearchPage>());
            assert_eq!(driver.call_count("goto"), 1);

            let _ = session.open::<SearchPage>().await.unwrap();
            assert_eq!(driver.call_count("goto"), 1);
        }

        #[tokio::test]
        async fn test_open_pattern_requires_url() {
            let driver = Arc::new(MockDriver::new());
            let err = session(&driver).open::<ResultPage>().await.unwrap_err();
            assert!(matches!(err, PageflowError::NavigationError { .. }));

            let page = session(&driver)
                .open_at::<ResultPage>("https://site.test/results/rust")
                .await
                .unwrap();
            assert!(page.page().is::<ResultPage>());
        }

        #[tokio::test]
        async fn test_open_url_resolves_registration() {
            let driver = Arc::new(MockDriver::new());
            let page = session(&driver)
                .open_url("https://site.test/results/rust")
                .await
                .unwrap();
            assert_eq!(page.name(), "ResultPage(url=\"https://site.test/results/:query\")");

            let unknown = session(&driver)
                .open_url("https://site.test/about")
                .await
                .unwrap();
            assert_eq!(unknown.name(), "Page(url=\"https://site.test/about\")");
        }

        #[tokio::test]
        async fn test_location_strips_query() {
            let driver = Arc::new(MockDriver::at("https://site.test/search?q=rust#top"));
            let location = session(&driver).location().await.unwrap();
            assert_eq!(location, "https://site.test/search");
        }
    }

    mod component_tests {
        use super::*;

        #[tokio::test]
        async fn test_registered_and_anonymous_components() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(MockElement::new("div").matching("#dialog"));
            let _ = driver.add(MockElement::new("aside").matching(".sidebar"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let dialog = page.page().get_component("#dialog").await.unwrap();
            assert!(dialog.is::<Dialog>());
            assert!(!dialog.is_anonymous());

            let sidebar = page.page().get_component(".sidebar").await.unwrap();
            assert!(sidebar.is_anonymous());
            assert_eq!(sidebar.to_string(), "DynamicComponent(selector=\".sidebar\")");
            assert_eq!(sidebar.url(), "https://site.test/search");
        }

        #[tokio::test]
        async fn test_missing_component() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let err = page.page().get_component(".ghost").await.unwrap_err();
            assert_eq!(
                err.to_string(),
                "DynamicComponent(selector=\".ghost\") could not be found in page"
            );

            let err = page.page().component::<Dialog>().await.unwrap_err();
            assert_eq!(
                err.to_string(),
                "Dialog(selector=\"#dialog\") could not be found in page"
            );
        }

        #[tokio::test]
        async fn test_get_components_scoped_and_empty_on_timeout() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let list = driver.add(MockElement::new("ul").matching("ul.results"));
            let _ = driver.add_child(&list, MockElement::new("li").text("one"));
            let _ = driver.add_child(&list, MockElement::new("li").text("two"));
            let _ = driver.add(MockElement::new("li").text("outside"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let results = page.page().get_component("ul.results").await.unwrap();
            let items = results.get_components("li").await.unwrap();
            assert_eq!(items.len(), 2);
            assert_eq!(items[1].text().await.unwrap(), "two");

            assert!(results.get_components(".none").await.unwrap().is_empty());
            assert!(results.components::<Dialog>().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_component_waits() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(MockElement::new("div").matching("#dialog").text("Saved!"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();
            let dialog: Dialog = page.page().component().await.unwrap();

            dialog.component().wait_for_text("Saved").await.unwrap();
            dialog.component().wait_until_clickable().await.unwrap();
            assert!(dialog
                .component()
                .wait_for_text("Failed")
                .await
                .unwrap_err()
                .is_timeout());
        }
    }

    mod assertion_tests {
        use super::*;

        #[tokio::test]
        async fn test_assert_text_in_element_reports_current_text() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(MockElement::new("h1").text("Search"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            page.page().assert_text_in_element("h1", "Sea").await.unwrap();
            let err = page
                .page()
                .assert_text_in_element("h1", "Results")
                .await
                .unwrap_err();
            match err {
                PageflowError::Timeout { message, .. } => {
                    assert_eq!(message, "\"Results\" not found in \"Search\"");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_assert_text_in_page() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            driver.set_text(&driver.body(), "Welcome to search");
            let page = session(&driver).open::<SearchPage>().await.unwrap();
            page.page().assert_text_in_page("Welcome").await.unwrap();
        }

        #[tokio::test]
        async fn test_invisibility() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let spinner = driver.add(MockElement::new("div").matching(".spinner"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            assert!(page
                .page()
                .assert_element_invisible(".spinner")
                .await
                .unwrap_err()
                .is_timeout());
            driver.set_displayed(&spinner, false);
            page.page().wait_for_invisibility(".spinner").await.unwrap();
        }
    }

    mod click_tests {
        use super::*;

        #[tokio::test]
        async fn test_click_navigates_to_registered_page() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(
                MockElement::new("button")
                    .matching("#go")
                    .on_click(ClickEffect::Navigate(
                        "https://site.test/results/rust?page=1".into(),
                    )),
            );
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let nav = page.page().click("#go").await.unwrap();
            assert!(nav.is_page::<ResultPage>());
            let results: ResultPage = nav.into_page().unwrap();
            assert_eq!(results.page().url(), "https://site.test/results/rust");
            assert_eq!(driver.call_count("goto"), 0);
        }

        #[tokio::test]
        async fn test_click_to_unregistered_location_stays() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(
                MockElement::new("a")
                    .text("About")
                    .on_click(ClickEffect::Navigate("https://site.test/about".into())),
            );
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let nav = page.page().click_link("About", None).await.unwrap();
            assert!(nav.is_stay());
            let err = nav.into_page::<ResultPage>().unwrap_err();
            assert!(matches!(err, PageflowError::UnexpectedPage { .. }));
        }

        #[tokio::test]
        async fn test_click_to_fragment_stays() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(
                MockElement::new("a")
                    .text("Top")
                    .on_click(ClickEffect::Navigate("https://site.test/search#top".into())),
            );
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let nav = page.page().click_link("Top", None).await.unwrap();
            assert!(nav.is_stay(), "{}", nav.describe());
        }

        #[tokio::test]
        async fn test_noop_click_on_root_page_stays() {
            let driver = Arc::new(MockDriver::at("https://site.test"));
            let button = driver.add(MockElement::new("button").matching("#noop"));
            let home = session(&driver).open::<HomePage>().await.unwrap();
            driver.set_current_url("https://site.test/");

            let nav = home.page().click("#noop").await.unwrap();
            assert!(nav.is_stay(), "{}", nav.describe());
            assert!(driver.was_called(&format!("click:{button}")));
        }

        #[test]
        fn test_same_location_normalizes() {
            assert!(same_location("https://site.test", "https://site.test/"));
            assert!(same_location("https://site.test/a?x=1", "https://site.test/a#top"));
            assert!(!same_location("https://site.test/a", "https://site.test/b"));
        }

        #[tokio::test]
        async fn test_click_opens_component() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let dialog = driver.add(MockElement::new("div").matching("#dialog").hidden());
            let _ = driver.add(
                MockElement::new("button")
                    .text("Open")
                    .on_click(ClickEffect::Show(dialog)),
            );
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let nav = page.page().click_button("Open", Some("#dialog")).await.unwrap();
            assert!(nav.is_component::<Dialog>());
            let _: Dialog = nav.into_component().unwrap();
        }

        #[tokio::test]
        async fn test_click_button_skips_hidden_and_reports_missing() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(MockElement::new("button").text("Save").hidden());
            let visible = driver.add(MockElement::new("button").text("Save"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let nav = page.page().click_button("Save", None).await.unwrap();
            assert!(nav.is_stay());
            assert_eq!(driver.history().last().unwrap(), &format!("click:{visible}"));

            let err = page.page().click_button("Delete", None).await.unwrap_err();
            assert_eq!(
                err.to_string(),
                "Assertion failed: Could not find a button with the text 'Delete'"
            );
        }

        #[tokio::test]
        async fn test_click_component_root() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let card = driver.add(MockElement::new("div").matching(".card"));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let component = page.page().get_component(".card").await.unwrap();
            let nav = component.click(Target::Root).await.unwrap();
            assert!(nav.is_stay());
            assert!(driver.was_called(&format!("click:{card}")));
        }
    }

    mod enter_text_tests {
        use super::*;

        #[tokio::test]
        async fn test_retries_until_value_matches() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let input = driver.add(MockElement::new("input").matching("#q").flaky_typing(2));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            page.page().enter_text("#q", "rust").await.unwrap();
            assert_eq!(driver.value_of(&input), Some("rust".to_string()));
            assert_eq!(driver.call_count("send_keys"), 3);
            assert_eq!(driver.call_count("clear"), 2);
        }

        #[tokio::test]
        async fn test_gives_up_after_attempts() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(MockElement::new("input").matching("#q").flaky_typing(50));
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            let err = page.page().enter_text("#q", "rust").await.unwrap_err();
            assert_eq!(err.to_string(), "Unable to correctly type \"rust\"");
            assert_eq!(driver.call_count("send_keys"), 5);
        }

        #[tokio::test]
        async fn test_uncleared_element_is_accepted() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(
                MockElement::new("div")
                    .matching("#editor")
                    .flaky_typing(1)
                    .not_clearable(),
            );
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            page.page().enter_text("#editor", "rust").await.unwrap();
            assert_eq!(driver.call_count("send_keys"), 1);
        }

        #[tokio::test]
        async fn test_stale_after_typing_is_accepted() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let _ = driver.add(MockElement::new("input").matching("#q").detach_on_type());
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            page.page().enter_text("#q", "rust").await.unwrap();
            assert_eq!(driver.call_count("send_keys"), 1);
            assert_eq!(driver.call_count("clear"), 0);
        }

        #[tokio::test]
        async fn test_select_option() {
            let driver = Arc::new(MockDriver::at("https://site.test/search"));
            let select = driver.add(
                MockElement::new("select")
                    .matching("#lang")
                    .options(["Rust", "Go"]),
            );
            let page = session(&driver).open::<SearchPage>().await.unwrap();

            page.page().select_option("#lang", "Rust").await.unwrap();
            assert_eq!(driver.value_of(&select), Some("Rust".to_string()));
        }
    }
}
