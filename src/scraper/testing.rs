//! In-memory page sessions for exercising the retry controller, the scrape
//! jobs and the batch coordinator without a browser.

use super::browser::{FetchError, PageSession, SessionFactory};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type Response = Result<String, FetchError>;

/// A normal title page wrapping `body`.
pub fn ok_page(body: &str) -> String {
    format!(
        r#"<html><body><h1 data-testid="hero__pageTitle" class="hero__primary-text">Title</h1>{body}</body></html>"#
    )
}

/// A normal sub-page (awards, release info, credits) wrapping `body`.
pub fn sub_page(body: &str) -> String {
    format!(r#"<html><body><h1 class="ipc-title__text">Title</h1>{body}</body></html>"#)
}

/// Serves responses in order; the last one repeats forever.
pub struct ScriptedSession {
    script: VecDeque<Response>,
    current: Option<Response>,
    pub refreshes: usize,
    gotos: usize,
}

impl ScriptedSession {
    pub fn new(script: Vec<Response>) -> Self {
        Self { script: script.into(), current: None, refreshes: 0, gotos: 0 }
    }

    pub fn repeating(response: Response) -> Self {
        Self::new(vec![response])
    }

    pub fn loads(&self) -> usize {
        self.gotos + self.refreshes
    }

    fn advance(&mut self) {
        if self.script.len() > 1 {
            self.current = self.script.pop_front();
        } else {
            self.current = self.script.front().cloned();
        }
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn goto(&mut self, _url: &str) -> Result<(), FetchError> {
        self.gotos += 1;
        self.advance();
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), FetchError> {
        self.refreshes += 1;
        self.advance();
        Ok(())
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.current
            .clone()
            .unwrap_or_else(|| Err(FetchError::Driver("no page loaded".into())))
    }

    async fn click_all(&mut self, _selector: &str, _limit: usize) -> Result<usize, FetchError> {
        Ok(0)
    }

    async fn run_script(&mut self, _script: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

#[derive(Default)]
struct Routes {
    pages: HashMap<String, Vec<Response>>,
    panic_on: Vec<String>,
    dead: bool,
    visited: Vec<String>,
}

/// Launches sessions that answer by URL. URLs without a route get a 404 page.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    routes: Arc<Mutex<Routes>>,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, script: Vec<Response>) -> Self {
        self.routes.lock().unwrap().pages.insert(url.to_string(), script);
        self
    }

    /// Any navigation to a URL containing `needle` panics the worker.
    pub fn panic_on(self, needle: &str) -> Self {
        self.routes.lock().unwrap().panic_on.push(needle.to_string());
        self
    }

    /// Every launch fails, as when the browser binary is missing.
    pub fn unlaunchable(self) -> Self {
        self.routes.lock().unwrap().dead = true;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.routes.lock().unwrap().visited.clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn launch(&self) -> Result<Box<dyn PageSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.routes.lock().unwrap().dead {
            bail!("browser binary not found");
        }
        Ok(Box::new(RoutedSession {
            factory: self.clone(),
            inner: ScriptedSession::new(Vec::new()),
            closed: false,
        }))
    }
}

struct RoutedSession {
    factory: ScriptedFactory,
    inner: ScriptedSession,
    closed: bool,
}

#[async_trait]
impl PageSession for RoutedSession {
    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        let script = {
            let mut routes = self.factory.routes.lock().unwrap();
            routes.visited.push(url.to_string());
            if routes.panic_on.iter().any(|n| url.contains(n.as_str())) {
                drop(routes);
                panic!("scripted worker failure for {url}");
            }
            routes
                .pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| vec![Ok(sub_page_404())])
        };
        self.inner = ScriptedSession::new(script);
        self.inner.goto(url).await
    }

    async fn refresh(&mut self) -> Result<(), FetchError> {
        self.inner.refresh().await
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.inner.content().await
    }

    async fn click_all(&mut self, selector: &str, limit: usize) -> Result<usize, FetchError> {
        self.inner.click_all(selector, limit).await
    }

    async fn run_script(&mut self, script: &str) -> Result<(), FetchError> {
        self.inner.run_script(script).await
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.factory.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn sub_page_404() -> String {
    "<html><body><h1>404 Error</h1></body></html>".to_string()
}
