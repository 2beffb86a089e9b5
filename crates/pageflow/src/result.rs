//! Result and error types for Pageflow.

use thiserror::Error;

/// Result type for Pageflow operations
pub type PageflowResult<T> = Result<T, PageflowError>;

/// Errors that can occur in Pageflow
#[derive(Debug, Error)]
pub enum PageflowError {
    /// No element matched the selector
    #[error("No element found with selector \"{selector}\"")]
    NoSuchElement {
        /// Selector that failed to match
        selector: String,
    },

    /// Element handle refers to a node that is no longer attached
    #[error("Stale element reference: {id}")]
    StaleElement {
        /// Handle id
        id: String,
    },

    /// Element exists but cannot take the requested action
    #[error("Invalid element state: {message}")]
    InvalidElementState {
        /// Error message
        message: String,
    },

    /// A wait condition did not become true in time
    #[error("Timed out after {ms}ms: {message}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// What was being waited for
        message: String,
    },

    /// A component could not be located in the page
    #[error("{component} could not be found in page")]
    ComponentMissing {
        /// Component display name
        component: String,
    },

    /// Navigation produced a different page than requested
    #[error("Expected page {expected}, got {actual}")]
    UnexpectedPage {
        /// Requested page type
        expected: String,
        /// Page (or outcome) actually produced
        actual: String,
    },

    /// Navigation produced a different component than requested
    #[error("Expected component {expected}, got {actual}")]
    UnexpectedComponent {
        /// Requested component type
        expected: String,
        /// Component (or outcome) actually produced
        actual: String,
    },

    /// Assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Text could not be typed reliably into an element
    #[error("Unable to correctly type \"{text}\"")]
    TextEntryFailed {
        /// Text that was being entered
        text: String,
    },

    /// Unknown driver name
    #[error("No such driver \"{name}\". Choose from: {supported}")]
    UnsupportedDriver {
        /// Requested driver
        name: String,
        /// Comma separated supported drivers
        supported: String,
    },

    /// A browser was requested before one was started
    #[error("You need to start a browser before you access it")]
    NoBrowser,

    /// Driver backend failure
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    ScreenshotError {
        /// Error message
        message: String,
    },

    /// Virtual display error
    #[error("Virtual display failed: {message}")]
    DisplayError {
        /// Error message
        message: String,
    },

    /// IMAP or message parsing error
    #[error("Email error: {message}")]
    Email {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PageflowError {
    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create an email error
    #[must_use]
    pub fn email(message: impl Into<String>) -> Self {
        Self::Email {
            message: message.into(),
        }
    }

    /// Create an assertion error
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// True for a missing element
    #[must_use]
    pub const fn is_no_such_element(&self) -> bool {
        matches!(self, Self::NoSuchElement { .. })
    }

    /// True for a detached element handle
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// True for an expired wait
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Errors a wait loop polls through instead of failing on
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.is_no_such_element() || self.is_stale()
    }
}
