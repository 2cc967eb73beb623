//! Chromium-based browser session using chromiumoxide.
//!
//! Supports two backends: a locally launched headless Chromium and an
//! already-running browser reached over its CDP endpoint (`driver:
//! "remote"`). Tab handles map to chromiumoxide `Page`s; element handles
//! map to located `Element`s, which go stale naturally when their
//! document mutates.

use super::{BrowserSession, ElementId, Scope, SessionFactory, TabId};
use crate::config::{CrawlConfig, DriverKind};
use crate::selector::Locator;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hard ceiling on a single page load.
const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// SOCKS proxy of a locally running Tor service.
const TOR_PROXY: &str = "socks5://127.0.0.1:9050";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. ARGUS_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("ARGUS_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.argus/chromium/
    if let Some(home) = dirs::home_dir() {
        let local = home.join(".argus/chromium/chrome");
        if local.exists() {
            return Some(local);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Builds one Chromium session per crawl invocation.
pub struct ChromiumFactory;

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn launch(&self, config: &CrawlConfig) -> Result<Box<dyn BrowserSession>> {
        if config.tor {
            ensure_tor().await;
        }

        let (browser, mut handler) = match &config.driver {
            DriverKind::Chromium => {
                let chrome_path =
                    find_chromium().context("Chromium not found. Run `argus doctor`.")?;

                let mut builder = BrowserConfig::builder()
                    .chrome_executable(chrome_path)
                    .arg("--headless=new")
                    .arg("--disable-gpu")
                    .arg("--no-sandbox")
                    .arg("--disable-dev-shm-usage")
                    .arg("--disable-extensions")
                    .arg("--ignore-certificate-errors")
                    .arg("--incognito");

                if let Some(ua) = &config.user_agent {
                    builder = builder.arg(format!("--user-agent={ua}"));
                }
                // exactly one of three proxy policies: Tor, explicit, none
                if config.tor {
                    builder = builder.arg(format!("--proxy-server={TOR_PROXY}"));
                } else if let Some(proxy) = &config.proxy {
                    builder = builder.arg(format!("--proxy-server={proxy}"));
                }

                let cfg = builder
                    .build()
                    .map_err(|e| anyhow!("failed to build browser config: {e}"))?;
                Browser::launch(cfg)
                    .await
                    .context("failed to launch Chromium")?
            }
            DriverKind::Remote { cdp_url } => Browser::connect(cdp_url.clone())
                .await
                .with_context(|| format!("failed to connect to browser at {cdp_url}"))?,
        };

        // Drain CDP events for the lifetime of the session.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create initial tab")?;

        let title_tab = TabId(1);
        let mut tabs = HashMap::new();
        tabs.insert(title_tab, page);

        debug!("chromium session initialized");
        Ok(Box::new(ChromiumSession {
            browser,
            handler: handler_task,
            tabs,
            order: vec![title_tab],
            current: title_tab,
            elements: HashMap::new(),
            next_tab: 2,
            next_element: 1,
            xq_gen: 0,
        }))
    }
}

/// Launch a local Tor service and give it a moment to bootstrap.
///
/// Failure to spawn is logged, not fatal — Tor may already be running as
/// a system service, and the proxy argument is set either way.
async fn ensure_tor() {
    match std::process::Command::new("tor").spawn() {
        Ok(_) => tokio::time::sleep(Duration::from_secs(3)).await,
        Err(e) => warn!("could not spawn tor, assuming it is already running: {e}"),
    }
}

/// A live Chromium session with explicit tab and element bookkeeping.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    tabs: HashMap<TabId, Page>,
    order: Vec<TabId>,
    current: TabId,
    elements: HashMap<ElementId, Element>,
    next_tab: u32,
    next_element: u64,
    /// Generation counter for XPath match tagging.
    xq_gen: u64,
}

impl ChromiumSession {
    fn page(&self, tab: TabId) -> Result<&Page> {
        self.tabs.get(&tab).ok_or_else(|| anyhow!("unknown tab {tab:?}"))
    }

    fn current_page(&self) -> Result<&Page> {
        self.page(self.current)
    }

    fn element(&self, id: ElementId) -> Result<&Element> {
        self.elements
            .get(&id)
            .ok_or_else(|| anyhow!("unknown element {id:?}"))
    }

    fn register(&mut self, el: Element) -> ElementId {
        let id = ElementId(self.next_element);
        self.next_element += 1;
        self.elements.insert(id, el);
        id
    }

    async fn locate(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementId>> {
        let found = match locator.as_css() {
            Some(css) => match scope {
                Scope::Page => self.current_page()?.find_elements(css).await?,
                Scope::Element(id) => self.element(id)?.find_elements(css).await?,
            },
            None => self.locate_xpath(scope, &locator.value).await?,
        };
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    /// Locate XPath matches by tagging them with a per-query attribute
    /// from inside the page, then collecting the tagged nodes over CSS.
    async fn locate_xpath(&mut self, scope: Scope, xpath: &str) -> Result<Vec<Element>> {
        self.xq_gen += 1;
        let gen = self.xq_gen;
        let quoted = serde_json::to_string(xpath)?;

        match scope {
            Scope::Page => {
                let script = format!(
                    r#"(() => {{
                        const res = document.evaluate({quoted}, document, null,
                            XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                        for (let i = 0; i < res.snapshotLength; i++) {{
                            const node = res.snapshotItem(i);
                            if (node.setAttribute) node.setAttribute("data-argus-xq", "{gen}");
                        }}
                        return res.snapshotLength;
                    }})()"#
                );
                self.current_page()?.evaluate(script).await?;
            }
            Scope::Element(id) => {
                let func = format!(
                    r#"function() {{
                        const res = document.evaluate({quoted}, this, null,
                            XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                        for (let i = 0; i < res.snapshotLength; i++) {{
                            const node = res.snapshotItem(i);
                            if (node.setAttribute) node.setAttribute("data-argus-xq", "{gen}");
                        }}
                        return res.snapshotLength;
                    }}"#
                );
                self.element(id)?.call_js_fn(func, false).await?;
            }
        }

        let tagged = self
            .current_page()?
            .find_elements(format!("[data-argus-xq=\"{gen}\"]"))
            .await?;
        Ok(tagged)
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let page = self.current_page()?;
        tokio::time::timeout(PAGE_LOAD_TIMEOUT, async {
            page.goto(url).await?;
            // document-ready may already have fired for fast loads
            let _ = page.wait_for_navigation().await;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .map_err(|_| anyhow!("navigation to {url} timed out"))??;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self.current_page()?.url().await?;
        url.ok_or_else(|| anyhow!("current tab has no URL"))
    }

    fn current_tab(&self) -> TabId {
        self.current
    }

    async fn tab_ids(&mut self) -> Result<Vec<TabId>> {
        Ok(self.order.clone())
    }

    async fn open_tab(&mut self, url: &str) -> Result<TabId> {
        let page = tokio::time::timeout(PAGE_LOAD_TIMEOUT, self.browser.new_page(url))
            .await
            .map_err(|_| anyhow!("opening tab for {url} timed out"))??;
        let _ = tokio::time::timeout(PAGE_LOAD_TIMEOUT, page.wait_for_navigation()).await;

        let id = TabId(self.next_tab);
        self.next_tab += 1;
        self.tabs.insert(id, page);
        self.order.push(id);
        self.current = id;
        Ok(id)
    }

    async fn switch_to(&mut self, tab: TabId) -> Result<()> {
        if !self.tabs.contains_key(&tab) {
            bail!("unknown tab {tab:?}");
        }
        self.current = tab;
        Ok(())
    }

    async fn close_tab(&mut self, tab: TabId) -> Result<()> {
        let page = self
            .tabs
            .remove(&tab)
            .ok_or_else(|| anyhow!("unknown tab {tab:?}"))?;
        self.order.retain(|t| *t != tab);
        page.close().await?;
        if self.current == tab {
            self.current = *self
                .order
                .last()
                .ok_or_else(|| anyhow!("closed the last tab"))?;
        }
        Ok(())
    }

    async fn back(&mut self) -> Result<()> {
        self.current_page()?
            .evaluate("(() => { history.back(); return true; })()")
            .await?;
        Ok(())
    }

    async fn find(&mut self, scope: Scope, locator: &Locator) -> Result<Option<ElementId>> {
        let mut found = self.locate(scope, locator).await?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.remove(0)))
        }
    }

    async fn find_all(&mut self, scope: Scope, locator: &Locator) -> Result<Vec<ElementId>> {
        self.locate(scope, locator).await
    }

    async fn text(&mut self, el: ElementId) -> Result<String> {
        let text = self.element(el)?.inner_text().await?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&mut self, el: ElementId, name: &str) -> Result<Option<String>> {
        Ok(self.element(el)?.attribute(name).await?)
    }

    async fn click(&mut self, el: ElementId) -> Result<()> {
        self.element(el)?.click().await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, el: ElementId) -> Result<()> {
        self.element(el)?.scroll_into_view().await?;
        Ok(())
    }

    async fn is_attached(&mut self, el: ElementId) -> Result<bool> {
        Ok(self.element(el)?.description().await.is_ok())
    }

    async fn is_clickable(&mut self, el: ElementId) -> Result<bool> {
        Ok(self.element(el)?.clickable_point().await.is_ok())
    }

    async fn quit(mut self: Box<Self>) -> Result<()> {
        self.elements.clear();
        self.tabs.clear();
        if let Err(e) = self.browser.close().await {
            debug!("browser close failed, relying on process teardown: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Scope;
    use crate::config::SourceParams;

    fn chromium_config(target: &str) -> CrawlConfig {
        CrawlConfig::resolve(&SourceParams {
            target: target.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_navigate_and_extract() {
        let config = chromium_config("https://example.com");
        let mut session = ChromiumFactory
            .launch(&config)
            .await
            .expect("failed to launch session");

        session
            .goto("data:text/html,<h1 id=\"t\">Hello</h1><p class=\"body\">World</p>")
            .await
            .expect("navigation failed");

        let title = crate::browser::find_text(
            session.as_mut(),
            Scope::Page,
            Locator::parse("id: t").as_ref(),
        )
        .await;
        assert_eq!(title, "Hello");

        let body = crate::browser::find_text(
            session.as_mut(),
            Scope::Page,
            Locator::parse("class: body").as_ref(),
        )
        .await;
        assert_eq!(body, "World");

        session.quit().await.expect("quit failed");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_tab_bookkeeping() {
        let config = chromium_config("https://example.com");
        let mut session = ChromiumFactory.launch(&config).await.unwrap();
        let title_tab = session.current_tab();

        let second = session
            .open_tab("data:text/html,<p>article</p>")
            .await
            .unwrap();
        assert_ne!(second, title_tab);
        assert_eq!(session.tab_ids().await.unwrap().len(), 2);

        session.close_tab(second).await.unwrap();
        session.switch_to(title_tab).await.unwrap();
        assert_eq!(session.tab_ids().await.unwrap().len(), 1);
        assert_eq!(session.current_tab(), title_tab);

        session.quit().await.unwrap();
    }
}
