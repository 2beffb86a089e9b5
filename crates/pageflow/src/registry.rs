//! Page and component registry.
//!
//! Pages are keyed by URL (literal or pattern), components by selector.
//! Navigation resolution asks the registry which page type owns the
//! browser's new location; component lookup asks which component type owns
//! a selector. Selectors with no registration become anonymous components.

use crate::page::{ComponentObject, PageObject};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// What a registration describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationKind {
    /// A whole page, keyed by URL
    Page,
    /// A page fragment, keyed by selector
    Component,
}

/// A registered page or component type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    name: &'static str,
    type_id: TypeId,
    key: String,
    kind: RegistrationKind,
}

impl Registration {
    /// Registration for a page type
    #[must_use]
    pub fn page<T: PageObject>() -> Self {
        Self {
            name: short_type_name::<T>(),
            type_id: TypeId::of::<T>(),
            key: T::URL.to_string(),
            kind: RegistrationKind::Page,
        }
    }

    /// Registration for a component type
    #[must_use]
    pub fn component<T: ComponentObject>() -> Self {
        Self {
            name: short_type_name::<T>(),
            type_id: TypeId::of::<T>(),
            key: T::SELECTOR.to_string(),
            kind: RegistrationKind::Component,
        }
    }

    /// Type name without module path
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// URL or selector the type is registered under
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Page or component
    #[must_use]
    pub const fn kind(&self) -> RegistrationKind {
        self.kind
    }

    /// True if this registration belongs to `T`
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegistrationKind::Page => write!(f, "{}(url=\"{}\")", self.name, self.key),
            RegistrationKind::Component => write!(f, "{}(selector=\"{}\")", self.name, self.key),
        }
    }
}

pub(crate) fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Page object registry mapping URLs and selectors to types
#[derive(Debug, Default, Clone)]
pub struct Registry {
    pages: Vec<(UrlMatcher, Registration)>,
    components: HashMap<String, Registration>,
}

impl Registry {
    /// Create a new registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page type under `T::URL`
    ///
    /// A later registration for the same URL replaces the earlier one.
    /// Types with an empty URL are not registered.
    pub fn register_page<T: PageObject>(&mut self) -> &mut Self {
        let registration = Registration::page::<T>();
        if registration.key.is_empty() {
            debug!(page = registration.name, "page has no url, not registered");
            return self;
        }
        let matcher = UrlMatcher::new(&registration.key);
        if let Some(slot) = self
            .pages
            .iter_mut()
            .find(|(_, existing)| existing.key == registration.key)
        {
            warn!(url = %registration.key, old = slot.1.name, new = registration.name, "page url re-registered");
            *slot = (matcher, registration);
        } else {
            debug!(url = %registration.key, page = registration.name, "registered page");
            self.pages.push((matcher, registration));
        }
        self
    }

    /// Register a component type under `T::SELECTOR`
    ///
    /// A later registration for the same selector replaces the earlier one.
    /// Types with an empty selector are not registered.
    pub fn register_component<T: ComponentObject>(&mut self) -> &mut Self {
        let registration = Registration::component::<T>();
        if registration.key.is_empty() {
            debug!(component = registration.name, "component has no selector, not registered");
            return self;
        }
        if let Some(old) = self
            .components
            .insert(registration.key.clone(), registration.clone())
        {
            warn!(selector = %registration.key, old = old.name, new = registration.name, "component selector re-registered");
        } else {
            debug!(selector = %registration.key, component = registration.name, "registered component");
        }
        self
    }

    /// Page type owning `location`
    ///
    /// An exact URL match wins; otherwise the first pattern (in
    /// registration order) that matches.
    #[must_use]
    pub fn resolve_url(&self, location: &str) -> Option<&Registration> {
        self.pages
            .iter()
            .find(|(_, r)| r.key == location)
            .or_else(|| self.pages.iter().find(|(m, _)| m.matches(location)))
            .map(|(_, r)| r)
    }

    /// Component type registered for exactly `selector`
    #[must_use]
    pub fn resolve_selector(&self, selector: &str) -> Option<&Registration> {
        self.components.get(selector)
    }

    /// URL matcher of a registered page
    #[must_use]
    pub fn matcher_for(&self, registration: &Registration) -> Option<&UrlMatcher> {
        self.pages
            .iter()
            .find(|(_, r)| r == registration)
            .map(|(m, _)| m)
    }

    /// Number of registered pages
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of registered components
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

/// URL pattern matcher for page objects
///
/// Patterns are absolute (`https://host/users/:id`) or relative
/// (`/users/*`). The origin of an absolute pattern must match literally; a
/// relative pattern matches any origin. Query strings are ignored.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: String,
    origin: Option<String>,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

/// Split a URL into origin and path, dropping query and fragment
fn split_url(url: &str) -> (Option<&str>, &str) {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    match url.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match url[after..].find('/') {
                Some(path_start) => {
                    let (origin, path) = url.split_at(after + path_start);
                    (Some(origin), path)
                }
                None => (Some(url), ""),
            }
        }
        None => (None, url),
    }
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl UrlMatcher {
    /// Create a new URL matcher from a pattern
    ///
    /// Path segments support:
    /// - Literal segments: `/login`
    /// - Wildcards: `/users/*`
    /// - Named parameters: `/users/:id`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let (origin, path) = split_url(pattern);
        let segments = path_segments(path)
            .into_iter()
            .map(|s| {
                if s == "*" {
                    UrlSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    UrlSegment::Parameter(name.to_string())
                } else {
                    UrlSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            origin: origin.map(str::to_string),
            segments,
        }
    }

    /// Check if a URL matches the pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let (origin, path) = split_url(url);
        if let Some(ref expected) = self.origin {
            if origin != Some(expected.as_str()) {
                return false;
            }
        }

        let url_segments = path_segments(path);

        // Wildcards and parameters each consume exactly one segment
        if url_segments.len() != self.segments.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(&url_segments)
            .all(|(segment, actual)| match segment {
                UrlSegment::Literal(lit) => lit == actual,
                UrlSegment::Wildcard | UrlSegment::Parameter(_) => true,
            })
    }

    /// Extract parameters from a URL
    #[must_use]
    pub fn extract_params(&self, url: &str) -> HashMap<String, String> {
        let (_, path) = split_url(url);
        self.segments
            .iter()
            .zip(path_segments(path))
            .filter_map(|(segment, value)| match segment {
                UrlSegment::Parameter(name) => Some((name.clone(), value.to_string())),
                _ => None,
            })
            .collect()
    }

    /// True when the pattern can be navigated to as-is
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.origin.is_some() && self.segments.iter().all(|s| matches!(s, UrlSegment::Literal(_)))
    }

    /// Pattern as registered
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
