//! Browser session abstraction.
//!
//! Defines the [`BrowserSession`] and [`SessionFactory`] traits that
//! abstract over the browser backend (chromiumoxide-driven Chromium, a
//! remote CDP endpoint, or the in-memory fixture backend used in tests).
//! Tab and element handles are explicit values threaded through every
//! operation so ownership and required cleanup stay visible at the call
//! sites, instead of living as ambient driver state.

pub mod chromium;
pub mod fixture;

use crate::config::CrawlConfig;
use crate::error::Lookup;
use crate::selector::Locator;
use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Bounded wait budgets a session applies to DOM-condition waits.
///
/// The defaults mirror interactive browsing against real sites; the
/// fixture backend shrinks them to keep tests fast.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudgets {
    /// Implicit wait applied when a selector doesn't match yet.
    pub element: Duration,
    /// Wait for the popup-close element to appear.
    pub popup: Duration,
    /// Wait for load-more clickability and staleness.
    pub load_more: Duration,
}

impl Default for WaitBudgets {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(15),
            popup: Duration::from_secs(10),
            load_more: Duration::from_secs(5),
        }
    }
}

/// Poll interval for a bounded wait, scaled down for short budgets.
fn poll_interval(timeout: Duration) -> Duration {
    (timeout / 10).clamp(Duration::from_millis(10), Duration::from_millis(250))
}

/// Handle of one browser tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u32);

/// Handle of one located element, valid for the session that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// The DOM context a lookup is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    /// The whole document of the current tab.
    Page,
    /// A single previously-located element.
    Element(ElementId),
}

/// One live browser, exclusively owned by one crawl invocation.
///
/// All navigation acts on the "current" tab. Lookups return `Ok(None)` /
/// empty vectors for missing elements — absence is data. `Err` means the
/// browser itself failed (connection lost, tab gone, protocol error).
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate the current tab and wait for the document to load.
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn current_url(&mut self) -> Result<String>;
    fn current_tab(&self) -> TabId;
    async fn tab_ids(&mut self) -> Result<Vec<TabId>>;
    /// Open a new tab, navigate it, and make it current.
    async fn open_tab(&mut self, url: &str) -> Result<TabId>;
    async fn switch_to(&mut self, tab: TabId) -> Result<()>;
    async fn close_tab(&mut self, tab: TabId) -> Result<()>;
    /// Step one entry back through the current tab's history.
    async fn back(&mut self) -> Result<()>;

    async fn find(&mut self, scope: Scope, locator: &Locator) -> Result<Option<ElementId>>;
    async fn find_all(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementId>>;
    /// Visible text of an element; empty when the element has none.
    async fn text(&mut self, el: ElementId) -> Result<String>;
    async fn attribute(&mut self, el: ElementId, name: &str) -> Result<Option<String>>;
    async fn click(&mut self, el: ElementId) -> Result<()>;
    async fn scroll_into_view(&mut self, el: ElementId) -> Result<()>;
    /// Whether the element is still attached to its document.
    async fn is_attached(&mut self, el: ElementId) -> Result<bool>;
    /// Whether the element is attached and has a clickable point.
    async fn is_clickable(&mut self, el: ElementId) -> Result<bool>;

    /// The wait budgets this session applies.
    fn waits(&self) -> WaitBudgets {
        WaitBudgets::default()
    }

    /// Release the browser. Must be called on every exit path; backends
    /// also terminate the process on drop as a last resort.
    async fn quit(self: Box<Self>) -> Result<()>;
}

/// Builds one browser session per crawl invocation.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self, config: &CrawlConfig) -> Result<Box<dyn BrowserSession>>;
}

/// Wait (bounded) for a locator to match an element.
pub async fn wait_for_present(
    session: &mut dyn BrowserSession,
    scope: Scope,
    locator: &Locator,
    timeout: Duration,
) -> Lookup<ElementId> {
    let deadline = Instant::now() + timeout;
    loop {
        match session.find(scope, locator).await {
            Ok(Some(el)) => return Lookup::Found(el),
            Ok(None) => {}
            Err(e) => return Lookup::Failed(e),
        }
        if Instant::now() >= deadline {
            return Lookup::NotFound;
        }
        tokio::time::sleep(poll_interval(timeout)).await;
    }
}

/// Wait (bounded) for a locator to match a clickable element.
pub async fn wait_for_clickable(
    session: &mut dyn BrowserSession,
    locator: &Locator,
    timeout: Duration,
) -> Lookup<ElementId> {
    let deadline = Instant::now() + timeout;
    loop {
        match session.find(Scope::Page, locator).await {
            Ok(Some(el)) => match session.is_clickable(el).await {
                Ok(true) => return Lookup::Found(el),
                Ok(false) => {}
                Err(e) => return Lookup::Failed(e),
            },
            Ok(None) => {}
            Err(e) => return Lookup::Failed(e),
        }
        if Instant::now() >= deadline {
            return Lookup::NotFound;
        }
        tokio::time::sleep(poll_interval(timeout)).await;
    }
}

/// Wait (bounded, best-effort) for an element to go stale after a page
/// mutation. Returns whether staleness was observed within the budget.
pub async fn wait_for_stale(
    session: &mut dyn BrowserSession,
    el: ElementId,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match session.is_attached(el).await {
            Ok(false) | Err(_) => return true,
            Ok(true) => {}
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll_interval(timeout)).await;
    }
}

/// Text of the first element matching an optional locator.
///
/// Returns `None` when no selector is configured, nothing matches, or
/// the lookup fails — callers pick their own default.
pub async fn try_find_text(
    session: &mut dyn BrowserSession,
    scope: Scope,
    locator: Option<&Locator>,
) -> Option<String> {
    let locator = locator?;
    match session.find(scope, locator).await {
        Ok(Some(el)) => session.text(el).await.ok(),
        _ => None,
    }
}

/// Like [`try_find_text`] but defaulting to the empty string.
pub async fn find_text(
    session: &mut dyn BrowserSession,
    scope: Scope,
    locator: Option<&Locator>,
) -> String {
    try_find_text(session, scope, locator)
        .await
        .unwrap_or_default()
}
