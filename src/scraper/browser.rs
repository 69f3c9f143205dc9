//! Page fetcher: one exclusively-owned browser session per scrape.

use crate::config::BrowserConfig;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Driver-level failures. Everything above the fetcher uses `anyhow`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("browser fault: {0}")]
    Driver(String),
}

async fn bounded<T, E, F>(limit: Duration, fut: F) -> Result<T, FetchError>
where
    E: Display,
    F: Future<Output = std::result::Result<T, E>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(FetchError::Driver(e.to_string())),
        Err(_) => Err(FetchError::Timeout(limit)),
    }
}

// ── Session traits ────────────────────────────────────────────────────────────

/// A live browser tab. Never shared between workers.
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url`, waiting at most the page-load timeout.
    async fn goto(&mut self, url: &str) -> Result<(), FetchError>;

    /// Reload the last requested URL.
    async fn refresh(&mut self) -> Result<(), FetchError>;

    /// Current rendered markup.
    async fn content(&mut self) -> Result<String, FetchError>;

    /// Click the first element matching `selector` until none is left or
    /// `limit` clicks were made. Returns the number of clicks.
    async fn click_all(&mut self, selector: &str, limit: usize) -> Result<usize, FetchError>;

    async fn run_script(&mut self, script: &str) -> Result<(), FetchError>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self);
}

/// Launches a fresh, private session for each scrape.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageSession>>;
}

// ── User agents ───────────────────────────────────────────────────────────────

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "X11; Linux x86_64",
    "Windows NT 10.0; WOW64",
    "X11; Ubuntu; Linux x86_64",
];

/// Rotating desktop user agents (Chrome and Firefox on Windows and Linux).
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let agents = (0..size)
            .map(|i| {
                let platform = PLATFORMS[i % PLATFORMS.len()];
                let version = 120 + (i / PLATFORMS.len() / 2) % 16;
                if (i / PLATFORMS.len()) % 2 == 0 {
                    format!(
                        "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/{version}.0.0.0 Safari/537.36"
                    )
                } else {
                    format!("Mozilla/5.0 ({platform}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0")
                }
            })
            .collect();
        Self { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn pick(&self) -> &str {
        &self.agents[rand::random_range(0..self.agents.len())]
    }
}

// ── Chromium over CDP ─────────────────────────────────────────────────────────

/// Per-session browser profile directory, removed when dropped. Sessions
/// abandoned by a panicking worker clean up through here too.
#[derive(Debug)]
pub struct ProfileDir(PathBuf);

impl ProfileDir {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.0) {
            Ok(()) => debug!("Removed browser profile {:?}", self.0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove browser profile {:?}: {}", self.0, e),
        }
    }
}

static SESSION_SEQ: AtomicUsize = AtomicUsize::new(0);

pub struct ChromeFactory {
    config: BrowserConfig,
    agents: UserAgentPool,
}

impl ChromeFactory {
    pub fn new(config: &BrowserConfig) -> Self {
        let agents = UserAgentPool::new(config.user_agent_pool_size);
        debug!("{} user agents in rotation", agents.len());
        Self { agents, config: config.clone() }
    }

    /// Each session gets its own profile so concurrent browsers never
    /// contend for the same lock files.
    fn profile_dir(&self) -> PathBuf {
        let root = self
            .config
            .driver_path
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        root.join(format!("title-harvest-{}-{}", std::process::id(), seq))
    }
}

#[async_trait]
impl SessionFactory for ChromeFactory {
    async fn launch(&self) -> Result<Box<dyn PageSession>> {
        let profile = self.profile_dir();
        let agent = self.agents.pick().to_string();

        let mut builder = CdpConfig::builder()
            .user_data_dir(&profile)
            .request_timeout(self.config.page_load_timeout())
            .arg(format!("--user-agent={agent}"))
            .arg(format!("--lang={}", self.config.language));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(bin) = &self.config.browser_binary_path {
            builder = builder.chrome_executable(bin);
        }
        let cdp_config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser config: {e}"))?;

        let profile = ProfileDir::new(profile);
        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .with_context(|| format!("Failed to launch browser (profile {:?})", profile.path()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler: {}", e);
                }
            }
        });

        debug!("Browser session launched (profile {:?})", profile.path());
        Ok(Box::new(ChromeSession {
            browser,
            handler: Some(handler),
            page: None,
            url: None,
            profile,
            load_timeout: self.config.page_load_timeout(),
            element_wait: self.config.element_wait(),
            closed: false,
        }))
    }
}

pub struct ChromeSession {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    url: Option<String>,
    profile: ProfileDir,
    load_timeout: Duration,
    element_wait: Duration,
    closed: bool,
}

impl ChromeSession {
    async fn page(&mut self) -> Result<Page, FetchError> {
        if let Some(page) = &self.page {
            return Ok(page.clone());
        }
        let page = bounded(self.load_timeout, self.browser.new_page("about:blank")).await?;
        self.page = Some(page.clone());
        Ok(page)
    }

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        let page = self.page().await?;
        bounded(self.load_timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        self.url = Some(url.to_string());
        self.navigate(url).await
    }

    async fn refresh(&mut self) -> Result<(), FetchError> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| FetchError::Driver("refresh before any navigation".into()))?;
        self.navigate(&url).await
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        let page = self.page().await?;
        bounded(self.element_wait.max(self.load_timeout), page.content()).await
    }

    async fn click_all(&mut self, selector: &str, limit: usize) -> Result<usize, FetchError> {
        let page = self.page().await?;
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; el.scrollIntoView(); el.click(); return true; }})()",
            js_string(selector)
        );

        let mut clicks = 0;
        while clicks < limit {
            let result = bounded(self.element_wait, page.evaluate(script.as_str())).await?;
            let clicked: bool = result.into_value().unwrap_or(false);
            if !clicked {
                break;
            }
            clicks += 1;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok(clicks)
    }

    async fn run_script(&mut self, script: &str) -> Result<(), FetchError> {
        let page = self.page().await?;
        bounded(self.element_wait, page.evaluate(script)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        let _ = timeout(Duration::from_secs(10), self.browser.wait()).await;
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            debug!("Session dropped without close {:?}", self.profile.path());
            handler.abort();
        }
    }
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
