//! In-memory browser backend for exercising the crawl state machine.
//!
//! Serves preloaded HTML documents keyed by URL, parsed with `scraper`,
//! with scripted click behavior: a click on an element (keyed by its
//! `id` attribute) consumes the next effect registered for that key.
//! Document swaps bump a per-tab generation counter, so previously
//! located elements go stale exactly as they would in a real browser.
//!
//! Used by the integration tests and by dry runs against saved pages;
//! no browser process is involved.

use super::{BrowserSession, ElementId, Scope, SessionFactory, TabId, WaitBudgets};
use crate::config::CrawlConfig;
use crate::selector::Locator;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// What a scripted click does. Effects for a key are consumed in order;
/// once exhausted, further clicks succeed without side effects.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Replace the document served at `url`; tabs showing it reload.
    SwapDocument { url: String, html: String },
    /// Navigate the current tab, pushing a history entry.
    Navigate(String),
    /// The click fails at the browser level.
    Fail(String),
    /// Nothing happens.
    Noop,
}

/// Observations recorded by fixture sessions, shared with the factory.
#[derive(Debug, Default)]
pub struct FixtureReport {
    /// How many sessions were released.
    pub quit_count: u32,
    /// Open tab count at the moment of the last quit.
    pub final_tab_count: usize,
    /// Clicks per element key.
    pub clicks: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
struct TabState {
    id: TabId,
    url: String,
    history: Vec<String>,
    generation: u32,
}

#[derive(Debug, Clone)]
struct FxElement {
    tab: TabId,
    generation: u32,
    text: String,
    attrs: HashMap<String, String>,
    html: String,
}

/// An in-memory browser session over preloaded documents.
#[derive(Clone)]
pub struct FixtureSession {
    docs: HashMap<String, String>,
    effects: HashMap<String, VecDeque<ClickEffect>>,
    nav_failures: HashSet<String>,
    waits: WaitBudgets,
    report: Arc<Mutex<FixtureReport>>,
    tabs: Vec<TabState>,
    current: usize,
    elements: HashMap<ElementId, FxElement>,
    next_element: u64,
    next_tab: u32,
}

impl FixtureSession {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::default()
    }

    fn current_state(&self) -> &TabState {
        &self.tabs[self.current]
    }

    fn tab_index(&self, tab: TabId) -> Result<usize> {
        self.tabs
            .iter()
            .position(|t| t.id == tab)
            .ok_or_else(|| anyhow!("unknown tab {tab:?}"))
    }

    fn element(&self, id: ElementId) -> Result<&FxElement> {
        self.elements
            .get(&id)
            .ok_or_else(|| anyhow!("unknown element {id:?}"))
    }

    fn attached(&self, el: &FxElement) -> bool {
        self.tabs
            .iter()
            .any(|t| t.id == el.tab && t.generation == el.generation)
    }

    fn navigate_current(&mut self, url: &str, push_history: bool) -> Result<()> {
        if self.nav_failures.contains(url) {
            bail!("navigation to {url} refused by fixture");
        }
        if !self.docs.contains_key(url) {
            bail!("no document served at {url}");
        }
        let tab = &mut self.tabs[self.current];
        if push_history {
            let old = std::mem::replace(&mut tab.url, url.to_string());
            tab.history.push(old);
        } else {
            tab.url = url.to_string();
        }
        tab.generation += 1;
        Ok(())
    }

    fn capture(el: &ElementRef<'_>, tab: TabId, generation: u32) -> FxElement {
        let text = el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let attrs = el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FxElement {
            tab,
            generation,
            text,
            attrs,
            html: el.html(),
        }
    }

    /// Locate matches in the scope's document. XPath has no fixture
    /// support; such locators simply never match.
    fn locate(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementId>> {
        let Some(css) = locator.as_css() else {
            debug!("fixture backend ignores xpath locator {:?}", locator.value);
            return Ok(Vec::new());
        };
        let selector = Selector::parse(&css)
            .map_err(|e| anyhow!("invalid selector {css:?}: {e}"))?;

        let captured: Vec<FxElement> = match scope {
            Scope::Page => {
                let tab = self.current_state().clone();
                let html = self.docs.get(&tab.url).cloned().unwrap_or_default();
                let doc = Html::parse_document(&html);
                doc.select(&selector)
                    .map(|el| Self::capture(&el, tab.id, tab.generation))
                    .collect()
            }
            Scope::Element(id) => {
                let scope_el = self.element(id)?.clone();
                if !self.attached(&scope_el) {
                    bail!("stale element reference");
                }
                let doc = Html::parse_fragment(&scope_el.html);
                doc.select(&selector)
                    .map(|el| Self::capture(&el, scope_el.tab, scope_el.generation))
                    .collect()
            }
        };

        Ok(captured
            .into_iter()
            .map(|el| {
                let id = ElementId(self.next_element);
                self.next_element += 1;
                self.elements.insert(id, el);
                id
            })
            .collect())
    }

    fn element_key(el: &FxElement) -> String {
        el.attrs
            .get("id")
            .cloned()
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

#[async_trait]
impl BrowserSession for FixtureSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.navigate_current(url, true)
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current_state().url.clone())
    }

    fn current_tab(&self) -> TabId {
        self.current_state().id
    }

    async fn tab_ids(&mut self) -> Result<Vec<TabId>> {
        Ok(self.tabs.iter().map(|t| t.id).collect())
    }

    async fn open_tab(&mut self, url: &str) -> Result<TabId> {
        let id = TabId(self.next_tab);
        self.next_tab += 1;
        // the tab exists even when its first navigation fails, exactly
        // like a real browser; restoration has to clean it up
        self.tabs.push(TabState {
            id,
            url: "about:blank".to_string(),
            history: Vec::new(),
            generation: 0,
        });
        self.current = self.tabs.len() - 1;
        self.navigate_current(url, false)?;
        Ok(id)
    }

    async fn switch_to(&mut self, tab: TabId) -> Result<()> {
        self.current = self.tab_index(tab)?;
        Ok(())
    }

    async fn close_tab(&mut self, tab: TabId) -> Result<()> {
        let idx = self.tab_index(tab)?;
        self.tabs.remove(idx);
        if self.tabs.is_empty() {
            bail!("closed the last tab");
        }
        if self.current >= self.tabs.len() {
            self.current = self.tabs.len() - 1;
        }
        Ok(())
    }

    async fn back(&mut self) -> Result<()> {
        let tab = &mut self.tabs[self.current];
        if let Some(previous) = tab.history.pop() {
            tab.url = previous;
            tab.generation += 1;
        }
        Ok(())
    }

    async fn find(&mut self, scope: Scope, locator: &Locator) -> Result<Option<ElementId>> {
        let mut found = self.locate(scope, locator)?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.remove(0)))
        }
    }

    async fn find_all(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementId>> {
        self.locate(scope, locator)
    }

    async fn text(&mut self, el: ElementId) -> Result<String> {
        let element = self.element(el)?;
        if !self.attached(element) {
            bail!("stale element reference");
        }
        Ok(element.text.clone())
    }

    async fn attribute(&mut self, el: ElementId, name: &str) -> Result<Option<String>> {
        Ok(self.element(el)?.attrs.get(name).cloned())
    }

    async fn click(&mut self, el: ElementId) -> Result<()> {
        let element = self.element(el)?.clone();
        if !self.attached(&element) {
            bail!("stale element reference");
        }
        let key = Self::element_key(&element);
        {
            let mut report = self.report.lock().expect("fixture report poisoned");
            *report.clicks.entry(key.clone()).or_insert(0) += 1;
        }
        let effect = self
            .effects
            .get_mut(&key)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ClickEffect::Noop);
        match effect {
            ClickEffect::SwapDocument { url, html } => {
                self.docs.insert(url.clone(), html);
                for tab in &mut self.tabs {
                    if tab.url == url {
                        tab.generation += 1;
                    }
                }
                Ok(())
            }
            ClickEffect::Navigate(url) => self.navigate_current(&url, true),
            ClickEffect::Fail(reason) => bail!("click on {key} failed: {reason}"),
            ClickEffect::Noop => Ok(()),
        }
    }

    async fn scroll_into_view(&mut self, _el: ElementId) -> Result<()> {
        Ok(())
    }

    async fn is_attached(&mut self, el: ElementId) -> Result<bool> {
        let element = self.element(el)?;
        Ok(self.attached(element))
    }

    async fn is_clickable(&mut self, el: ElementId) -> Result<bool> {
        self.is_attached(el).await
    }

    fn waits(&self) -> WaitBudgets {
        self.waits
    }

    async fn quit(self: Box<Self>) -> Result<()> {
        let mut report = self.report.lock().expect("fixture report poisoned");
        report.quit_count += 1;
        report.final_tab_count = self.tabs.len();
        Ok(())
    }
}

/// Builder for a fixture session prototype.
#[derive(Clone)]
pub struct FixtureBuilder {
    docs: HashMap<String, String>,
    effects: HashMap<String, VecDeque<ClickEffect>>,
    nav_failures: HashSet<String>,
    waits: WaitBudgets,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            docs: HashMap::new(),
            effects: HashMap::new(),
            nav_failures: HashSet::new(),
            waits: WaitBudgets {
                element: Duration::from_millis(60),
                popup: Duration::from_millis(60),
                load_more: Duration::from_millis(60),
            },
        }
    }
}

impl FixtureBuilder {
    /// Serve `html` at `url`.
    pub fn doc(mut self, url: &str, html: &str) -> Self {
        self.docs.insert(url.to_string(), html.to_string());
        self
    }

    /// Append a click effect for elements whose `id` attribute is `key`.
    pub fn on_click(mut self, key: &str, effect: ClickEffect) -> Self {
        self.effects.entry(key.to_string()).or_default().push_back(effect);
        self
    }

    /// Make every navigation to `url` fail.
    pub fn fail_navigation(mut self, url: &str) -> Self {
        self.nav_failures.insert(url.to_string());
        self
    }

    pub fn waits(mut self, waits: WaitBudgets) -> Self {
        self.waits = waits;
        self
    }

    /// Finish into a factory that clones a fresh session per launch.
    pub fn into_factory(self) -> FixtureFactory {
        FixtureFactory {
            prototype: FixtureSession {
                docs: self.docs,
                effects: self.effects,
                nav_failures: self.nav_failures,
                waits: self.waits,
                report: Arc::new(Mutex::new(FixtureReport::default())),
                tabs: vec![TabState {
                    id: TabId(1),
                    url: "about:blank".to_string(),
                    history: Vec::new(),
                    generation: 0,
                }],
                current: 0,
                elements: HashMap::new(),
                next_element: 1,
                next_tab: 2,
            },
        }
    }
}

/// Hands out clones of a prototype fixture session; all sessions share
/// one [`FixtureReport`].
pub struct FixtureFactory {
    prototype: FixtureSession,
}

impl FixtureFactory {
    pub fn report(&self) -> Arc<Mutex<FixtureReport>> {
        Arc::clone(&self.prototype.report)
    }

    /// A standalone session clone, for tests driving one directly.
    pub fn session(&self) -> FixtureSession {
        self.prototype.clone()
    }
}

#[async_trait]
impl SessionFactory for FixtureFactory {
    async fn launch(&self, _config: &CrawlConfig) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(self.prototype.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::find_text;

    const INDEX: &str = r#"<html><body>
        <h1 id="headline">Fixture Daily</h1>
        <a class="story" href="https://fixture.test/a1">First</a>
        <a class="story" href="https://fixture.test/a2">Second</a>
    </body></html>"#;

    fn session() -> FixtureSession {
        let factory = FixtureSession::builder()
            .doc("https://fixture.test/", INDEX)
            .into_factory();
        factory.session()
    }

    #[tokio::test]
    async fn test_find_and_text() {
        let mut s = session();
        s.goto("https://fixture.test/").await.unwrap();

        let loc = Locator::parse("id: headline").unwrap();
        let el = s.find(Scope::Page, &loc).await.unwrap().unwrap();
        assert_eq!(s.text(el).await.unwrap(), "Fixture Daily");

        let links = Locator::parse("class: story").unwrap();
        let all = s.find_all(Scope::Page, &links).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            s.attribute(all[0], "href").await.unwrap().as_deref(),
            Some("https://fixture.test/a1")
        );
    }

    #[tokio::test]
    async fn test_missing_element_is_none() {
        let mut s = session();
        s.goto("https://fixture.test/").await.unwrap();
        let loc = Locator::parse("css: .no-such-thing").unwrap();
        assert!(s.find(Scope::Page, &loc).await.unwrap().is_none());
        assert_eq!(
            find_text(&mut s, Scope::Page, Some(&loc)).await,
            ""
        );
    }

    #[tokio::test]
    async fn test_navigation_failure() {
        let factory = FixtureSession::builder()
            .doc("https://fixture.test/", INDEX)
            .fail_navigation("https://fixture.test/broken")
            .into_factory();
        let mut s = factory.session();
        assert!(s.goto("https://fixture.test/broken").await.is_err());
        assert!(s.goto("https://fixture.test/unknown").await.is_err());
        assert!(s.goto("https://fixture.test/").await.is_ok());
    }

    #[tokio::test]
    async fn test_swap_document_goes_stale() {
        let factory = FixtureSession::builder()
            .doc("https://fixture.test/", INDEX)
            .on_click(
                "headline",
                ClickEffect::SwapDocument {
                    url: "https://fixture.test/".to_string(),
                    html: "<html><body><p>gone</p></body></html>".to_string(),
                },
            )
            .into_factory();
        let mut s = factory.session();
        s.goto("https://fixture.test/").await.unwrap();

        let loc = Locator::parse("id: headline").unwrap();
        let el = s.find(Scope::Page, &loc).await.unwrap().unwrap();
        assert!(s.is_attached(el).await.unwrap());
        s.click(el).await.unwrap();
        assert!(!s.is_attached(el).await.unwrap());
        // second click on the stale handle fails like a real browser
        assert!(s.click(el).await.is_err());
    }

    #[tokio::test]
    async fn test_tab_lifecycle_and_history() {
        let factory = FixtureSession::builder()
            .doc("https://fixture.test/", INDEX)
            .doc("https://fixture.test/a1", "<html><body><h2>A1</h2></body></html>")
            .into_factory();
        let mut s = factory.session();
        s.goto("https://fixture.test/").await.unwrap();
        let title_tab = s.current_tab();

        let article_tab = s.open_tab("https://fixture.test/a1").await.unwrap();
        assert_eq!(s.current_tab(), article_tab);
        assert_eq!(s.tab_ids().await.unwrap().len(), 2);

        s.close_tab(article_tab).await.unwrap();
        s.switch_to(title_tab).await.unwrap();
        assert_eq!(s.tab_ids().await.unwrap().len(), 1);
        assert_eq!(
            s.current_url().await.unwrap(),
            "https://fixture.test/"
        );
    }
}
