//! One-shot probes for [`Wait`](crate::wait::Wait).
//!
//! Each probe asks the driver once and answers `Some` when its condition
//! holds. `scope` restricts lookups to descendants of an element.

use crate::driver::{ElementHandle, WebDriver};
use crate::locator::Selector;
use crate::result::PageflowResult;

/// Element is present in the DOM
pub async fn presence_of(
    driver: &dyn WebDriver,
    scope: Option<&ElementHandle>,
    selector: &Selector,
) -> PageflowResult<Option<ElementHandle>> {
    driver.find(scope, selector).await
}

/// Element is present and displayed
pub async fn visibility_of(
    driver: &dyn WebDriver,
    scope: Option<&ElementHandle>,
    selector: &Selector,
) -> PageflowResult<Option<ElementHandle>> {
    match driver.find(scope, selector).await? {
        Some(element) if driver.is_displayed(&element).await? => Ok(Some(element)),
        _ => Ok(None),
    }
}

/// At least one element matches
pub async fn presence_of_all(
    driver: &dyn WebDriver,
    scope: Option<&ElementHandle>,
    selector: &Selector,
) -> PageflowResult<Option<Vec<ElementHandle>>> {
    let elements = driver.find_all(scope, selector).await?;
    Ok((!elements.is_empty()).then_some(elements))
}

/// Text of the matched element contains `text`
pub async fn text_in_element(
    driver: &dyn WebDriver,
    scope: Option<&ElementHandle>,
    selector: &Selector,
    text: &str,
) -> PageflowResult<Option<()>> {
    match driver.find(scope, selector).await? {
        Some(element) => Ok(driver.text(&element).await?.contains(text).then_some(())),
        None => Ok(None),
    }
}

/// Element is absent, hidden or detached
pub async fn invisibility_of(
    driver: &dyn WebDriver,
    scope: Option<&ElementHandle>,
    selector: &Selector,
) -> PageflowResult<Option<()>> {
    let Some(element) = driver.find(scope, selector).await? else {
        return Ok(Some(()));
    };
    match driver.is_displayed(&element).await {
        Ok(displayed) => Ok((!displayed).then_some(())),
        Err(e) if e.is_stale() || e.is_no_such_element() => Ok(Some(())),
        Err(e) => Err(e),
    }
}

/// Text of an already located component contains `text`
///
/// A detached component answers `None` rather than failing.
pub async fn text_in_component(
    driver: &dyn WebDriver,
    element: &ElementHandle,
    text: &str,
) -> PageflowResult<Option<()>> {
    match driver.text(element).await {
        Ok(current) => Ok(current.contains(text).then_some(())),
        Err(e) if e.is_stale() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Component is displayed and enabled
///
/// A detached component answers `None` rather than failing.
pub async fn component_clickable(
    driver: &dyn WebDriver,
    element: &ElementHandle,
) -> PageflowResult<Option<()>> {
    let state = async {
        Ok::<_, crate::result::PageflowError>(
            driver.is_displayed(element).await? && driver.is_enabled(element).await?,
        )
    };
    match state.await {
        Ok(clickable) => Ok(clickable.then_some(())),
        Err(e) if e.is_stale() => Ok(None),
        Err(e) => Err(e),
    }
}
