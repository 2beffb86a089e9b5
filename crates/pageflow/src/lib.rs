//! Pageflow: Page Objects and Navigation for WebDriver Functional Tests
//!
//! Test authors describe pages by URL and page fragments by CSS selector.
//! Every action waits for its element, and every click reports which page
//! object owns the browser afterwards, so a test reads as a walk through
//! the site.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      PAGEFLOW Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌──────────────────┐       │
//! │   │ Page /     │    │ Registry   │    │ WebDriver        │       │
//! │   │ Component  │───►│ URL → Page │    │ (fantoccini,     │       │
//! │   │ objects    │    │ CSS → Comp │    │  chromiumoxide,  │       │
//! │   └─────┬──────┘    └─────▲──────┘    │  mock)           │       │
//! │         │   click()       │ resolve   └────────▲─────────┘       │
//! │         └────────► Navigation ◄────────────────┘                 │
//! │                                                                  │
//! │   BrowserHarness · snapshot_on_error · retry/ignore · Gmail IMAP │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pageflow::prelude::*;
//!
//! #[derive(Page)]
//! #[page(url = "https://site.test/")]
//! struct HomePage(Page);
//!
//! #[derive(Page)]
//! #[page(url = "https://site.test/cool-page")]
//! struct CoolPage(Page);
//!
//! let mut registry = Registry::new();
//! registry.register_page::<HomePage>().register_page::<CoolPage>();
//!
//! let mut harness = BrowserHarness::new(Arc::new(RemoteLauncher), PageflowConfig::load()?);
//! harness.start_default_browser().await?;
//! let session = harness.session(Arc::new(registry))?;
//!
//! let home = session.open::<HomePage>().await?;
//! let cool: CoolPage = home.click("a[href='/cool-page']").await?.into_page()?;
//! cool.assert_text_in_page("So cool").await?;
//! harness.cleanup().await?;
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod browser;
mod config;
mod driver;
mod email;
mod flow;
mod locator;
mod page;
mod registry;
mod result;
mod snapshot;
mod wait;

/// One-shot element probes polled by page actions
pub mod expectations;

/// Log subscriber setup (`tracing-subscriber`)
pub mod logging;

/// Chromium over the DevTools protocol
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod cdp;

/// Remote W3C WebDriver sessions
#[cfg(feature = "webdriver")]
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod webdriver;

#[cfg(feature = "browser")]
pub use browser::CdpLauncher;
#[cfg(feature = "webdriver")]
pub use browser::RemoteLauncher;
pub use browser::{free_display_number, BrowserHarness, DriverLauncher, MockLauncher, VirtualDisplay};
pub use config::{
    PageflowConfig, CONFIG_FILE_ENV, DEFAULT_ELEMENT_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_TEXT_ENTRY_ATTEMPTS, DEFAULT_TEXT_ENTRY_RETRY_MS, DEFAULT_WINDOW,
};
pub use driver::{
    ClickEffect, DriverKind, ElementHandle, MockDriver, MockElement, WebDriver, WindowSize,
};
#[cfg(feature = "email")]
pub use email::TlsImapConnector;
pub use email::{
    email_bodies, search_criteria, EmailMessage, GmailImapClient, ImapConnection, ImapConnector,
    ImapSession, MockImapConnector, INBOX,
};
pub use flow::{ignore, ignore_async, retry, retry_async, DEFAULT_ATTEMPTS};
pub use locator::{js_string, Selector};
pub use page::{
    Component, ComponentObject, Navigation, Page, PageObject, Scope, Session, Target,
};
pub use registry::{Registration, RegistrationKind, Registry, UrlMatcher};
pub use result::{PageflowError, PageflowResult};
pub use snapshot::{capture, snapshot_file_name, snapshot_on_error, MAX_SNAPSHOT_PAGES};
pub use wait::{Wait, WaitOptions, WaitResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::browser::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::email::*;
    pub use super::flow::*;
    pub use super::locator::*;
    pub use super::page::*;
    pub use super::registry::*;
    pub use super::result::*;
    pub use super::snapshot::*;
    pub use super::wait::*;
    #[cfg(feature = "derive")]
    pub use pageflow_derive::{pageflow_test, Component, Page};
    pub use std::sync::Arc;
}

// Re-export derive macros when the `derive` feature is enabled
#[cfg(feature = "derive")]
pub use pageflow_derive::{pageflow_test, Component, Page};
