pub mod browser;
pub mod classifier;
pub mod cleaner;
pub mod parsers;
pub mod retry;
#[cfg(test)]
pub mod testing;

use crate::config::{AppConfig, SourceConfig};
use crate::models::{
    AwardSummaryRow, CreditRow, EntityId, FAILED, MainRow, NOT_FOUND, NewContentRow, ProviderRow, ReleaseRow,
};
use crate::storage::freshness::Freshness;
use crate::storage::{Category, CsvSink};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use self::browser::{PageSession, SessionFactory};
use self::classifier::Classifier;
use self::cleaner::platform_from_url;
use self::parsers::{
    CREDIT_SECTIONS, Extracted, award_event_ids, feed_exhausted, parse_award_page,
    parse_credits_page, parse_main_page, parse_provider_index, parse_release_page, parse_timeline,
    timeline_pending,
};
use self::retry::{PageState, RetryController, RetryPolicy};

const CONSENT_REJECT: &str = "button[data-testid='reject-button']";
const LOAD_MORE_LIMIT: usize = 20;
const INDEX_KEY: &str = "justwatch_href";
const SCROLL_DOWN: &str = "window.scrollBy(0, 1600);";
const REVEAL_ROWS: &str = "document.querySelectorAll('div.hidden-horizontal-scrollbar__items')\
     .forEach(c => { c.scrollLeft += 500; });";
const REVEAL_LIMIT: usize = 40;

/// What one per-title scrape left on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStatus {
    /// A recent file exists; no session was launched.
    Fresh,
    Saved,
    /// The page states it has nothing for this section.
    NoData,
    NotFound,
    /// Retries exhausted; a failure marker was written.
    GaveUp,
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrapeStatus::Fresh => "fresh",
            ScrapeStatus::Saved => "saved",
            ScrapeStatus::NoData => "no data",
            ScrapeStatus::NotFound => "not found",
            ScrapeStatus::GaveUp => "gave up",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailStatus {
    pub release: ScrapeStatus,
    pub credits: ScrapeStatus,
}

impl fmt::Display for DetailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "release {} | credits {}", self.release, self.credits)
    }
}

/// Outcome of loading one page, after consent and "load more" handling.
enum Loaded {
    Ready(String),
    NotFound,
    GaveUp,
}

fn base_url(s: &str) -> Result<Url> {
    let s = format!("{}/", s.trim_end_matches('/'));
    Url::parse(&s).with_context(|| format!("Invalid base URL {:?}", s))
}

// ── Scraper ───────────────────────────────────────────────────────────────────

/// Per-title and per-platform scrape jobs. Every job launches its own
/// session, closes it before returning, and persists what it found.
pub struct Scraper {
    factory: Arc<dyn SessionFactory>,
    titles: RetryController,
    feeds: RetryController,
    sink: CsvSink,
    freshness: Freshness,
    imdb: Url,
    justwatch: Url,
    sources: SourceConfig,
}

impl Scraper {
    pub fn new(factory: Arc<dyn SessionFactory>, config: &AppConfig) -> Result<Self> {
        let policy = RetryPolicy::from_config(&config.retry);
        let sink = CsvSink::new(&config.storage.output_dir);
        Ok(Self {
            factory,
            titles: RetryController::new(policy.clone(), Classifier::default()),
            feeds: RetryController::new(policy, Classifier::lenient()),
            freshness: Freshness::from_config(sink.root(), &config.pipeline),
            sink,
            imdb: base_url(&config.sources.imdb_base_url)?,
            justwatch: base_url(&config.sources.justwatch_base_url)?,
            sources: config.sources.clone(),
        })
    }

    pub fn sink(&self) -> &CsvSink {
        &self.sink
    }

    pub fn freshness(&self) -> &Freshness {
        &self.freshness
    }

    /// `{base}/title/{id}/{page}`; `page` is empty for the main page.
    pub fn title_url(&self, id: &EntityId, page: &str) -> Result<Url> {
        self.imdb
            .join(&format!("title/{}/{}", id, page))
            .with_context(|| format!("Bad title URL for {}", id))
    }

    pub fn provider_url(&self, platform: &str) -> Result<Url> {
        self.justwatch
            .join(&format!("us/provider/{}/new", platform))
            .with_context(|| format!("Bad provider URL for {}", platform))
    }

    /// Launch a session, retrying on the connectivity track. None once the
    /// track runs dry; callers then treat the page as given up.
    async fn launch(&self, label: &str) -> Option<Box<dyn PageSession>> {
        let mut delays = self.titles.policy.connectivity_delays();
        loop {
            let err = match self.factory.launch().await {
                Ok(session) => return Some(session),
                Err(e) => e,
            };
            let Some(delay) = delays.next() else {
                warn!("{}: browser would not start ({:#}). Skipping, please check later!", label, err);
                return None;
            };
            info!("### Browser launch failed for {} ({:#}). Pause {:?} ###", label, err, delay);
            sleep(delay).await;
        }
    }

    /// Load `url` through the retry controller and dismiss the consent banner.
    async fn load(
        &self,
        controller: &RetryController,
        session: &mut dyn PageSession,
        url: &Url,
        label: &str,
    ) -> Loaded {
        let report = controller.load(session, url.as_str(), label).await;
        match report.state {
            PageState::Ready(html) => {
                debug!("{} ready after {} backoffs", label, report.backoffs.len());
                Loaded::Ready(reread_after(session, CONSENT_REJECT, 1, html).await)
            }
            PageState::NotFound => Loaded::NotFound,
            PageState::GaveUp { .. } => Loaded::GaveUp,
        }
    }

    // ── Main page ─────────────────────────────────────────────────────────

    /// One main-page row. Not found and given up become marker rows.
    pub async fn scrape_main(&self, id: &EntityId) -> Result<MainRow> {
        let url = self.title_url(id, "")?;
        let label = format!("{id} main");
        let loaded = match self.launch(&label).await {
            Some(mut session) => {
                let loaded = self.load(&self.titles, session.as_mut(), &url, &label).await;
                session.close().await;
                loaded
            }
            None => Loaded::GaveUp,
        };

        match loaded {
            Loaded::Ready(html) => parse_main_page(&html, id),
            Loaded::NotFound => Ok(MainRow::not_found(id)),
            Loaded::GaveUp => Ok(MainRow::failed(id)),
        }
    }

    // ── Awards ────────────────────────────────────────────────────────────

    pub async fn save_awards(&self, id: &EntityId, today: NaiveDate) -> Result<ScrapeStatus> {
        let key = id.as_str();
        if self.freshness.is_fresh(key, Category::AwardGeneral, today)? {
            info!("A recent {} award file exists", id);
            return Ok(ScrapeStatus::Fresh);
        }

        let url = self.title_url(id, "awards/")?;
        let label = format!("{id} award");
        let loaded = match self.launch(&label).await {
            Some(mut session) => {
                let loaded = match self.load(&self.titles, session.as_mut(), &url, &label).await {
                    Loaded::Ready(html) => Loaded::Ready(expand_awards(session.as_mut(), html).await),
                    other => other,
                };
                session.close().await;
                loaded
            }
            None => Loaded::GaveUp,
        };

        let status = match loaded {
            Loaded::Ready(html) => match parse_award_page(&html)? {
                Extracted::Found(page) => {
                    self.sink.write(Category::AwardGeneral, key, today, &page.summary)?;
                    if !page.details.is_empty() {
                        self.sink.write(Category::AwardDetail, key, today, &page.details)?;
                    }
                    ScrapeStatus::Saved
                }
                Extracted::NoData => {
                    self.sink.write(Category::AwardGeneral, key, today, &[AwardSummaryRow::no_awards()])?;
                    ScrapeStatus::NoData
                }
            },
            Loaded::NotFound => {
                self.sink.write(Category::AwardGeneral, key, today, &[AwardSummaryRow::not_found()])?;
                ScrapeStatus::NotFound
            }
            Loaded::GaveUp => {
                self.sink
                    .write_failure(Category::AwardGeneral, key, today, &[AwardSummaryRow::failed()])?;
                ScrapeStatus::GaveUp
            }
        };
        info!("{} award: {}", id, status);
        Ok(status)
    }

    // ── Release info and company credits ──────────────────────────────────

    pub async fn save_details(&self, id: &EntityId, today: NaiveDate) -> Result<DetailStatus> {
        let release = self.save_release(id, today).await;
        let credits = self.save_credits(id, today).await;
        Ok(DetailStatus { release: release?, credits: credits? })
    }

    pub async fn save_release(&self, id: &EntityId, today: NaiveDate) -> Result<ScrapeStatus> {
        let key = id.as_str();
        if self.freshness.is_fresh(key, Category::Release, today)? {
            info!("A recent {} release file exists", id);
            return Ok(ScrapeStatus::Fresh);
        }

        let url = self.title_url(id, "releaseinfo/")?;
        let label = format!("{id} release");
        let loaded = match self.launch(&label).await {
            Some(mut session) => {
                let loaded = match self.load(&self.titles, session.as_mut(), &url, &label).await {
                    Loaded::Ready(html) => Loaded::Ready(
                        reread_after(session.as_mut(), &see_more("releases"), LOAD_MORE_LIMIT, html).await,
                    ),
                    other => other,
                };
                session.close().await;
                loaded
            }
            None => Loaded::GaveUp,
        };

        let (rows, status) = match loaded {
            Loaded::Ready(html) => match parse_release_page(&html)? {
                Extracted::Found(rows) => (rows, ScrapeStatus::Saved),
                Extracted::NoData => (vec![ReleaseRow::no_info()], ScrapeStatus::NoData),
            },
            Loaded::NotFound => (vec![ReleaseRow::not_found()], ScrapeStatus::NotFound),
            Loaded::GaveUp => {
                self.sink.write_failure(Category::Release, key, today, &[ReleaseRow::failed()])?;
                info!("{} release: {}", id, ScrapeStatus::GaveUp);
                return Ok(ScrapeStatus::GaveUp);
            }
        };
        self.sink.write(Category::Release, key, today, &rows)?;
        info!("{} release: {} ({} rows)", id, status, rows.len());
        Ok(status)
    }

    /// Distribution goes to its own file when present; every other section
    /// goes to the `pro` file, which is always written.
    pub async fn save_credits(&self, id: &EntityId, today: NaiveDate) -> Result<ScrapeStatus> {
        let key = id.as_str();
        if self.freshness.is_fresh(key, Category::Production, today)? {
            info!("A recent {} company credit file exists", id);
            return Ok(ScrapeStatus::Fresh);
        }

        let url = self.title_url(id, "companycredits/")?;
        let label = format!("{id} credits");
        let loaded = match self.launch(&label).await {
            Some(mut session) => {
                let loaded = match self.load(&self.titles, session.as_mut(), &url, &label).await {
                    Loaded::Ready(mut html) => {
                        for section in CREDIT_SECTIONS {
                            html = reread_after(session.as_mut(), &see_more(section), LOAD_MORE_LIMIT, html).await;
                        }
                        Loaded::Ready(html)
                    }
                    other => other,
                };
                session.close().await;
                loaded
            }
            None => Loaded::GaveUp,
        };

        let (other, status) = match loaded {
            Loaded::Ready(html) => match parse_credits_page(&html)? {
                Extracted::Found(credits) => {
                    if !credits.distribution.is_empty() {
                        self.sink.write(Category::Distribution, key, today, &credits.distribution)?;
                    }
                    let other = if credits.other.is_empty() {
                        vec![CreditRow::default()]
                    } else {
                        credits.other
                    };
                    (other, ScrapeStatus::Saved)
                }
                Extracted::NoData => (vec![CreditRow::no_info()], ScrapeStatus::NoData),
            },
            Loaded::NotFound => (vec![CreditRow::not_found()], ScrapeStatus::NotFound),
            Loaded::GaveUp => {
                self.sink.write_failure(Category::Production, key, today, &[CreditRow::failed()])?;
                info!("{} credits: {}", id, ScrapeStatus::GaveUp);
                return Ok(ScrapeStatus::GaveUp);
            }
        };
        self.sink.write(Category::Production, key, today, &other)?;
        info!("{} credits: {}", id, status);
        Ok(status)
    }

    // ── Streaming aggregator ──────────────────────────────────────────────

    /// Links to every provider's "new" feed. A recent index file is reused.
    pub async fn provider_index(&self, today: NaiveDate) -> Result<Vec<ProviderRow>> {
        if let Some(path) = self.freshness.latest(INDEX_KEY, Category::ProviderIndex, today)? {
            info!("Provider links already retrieved ({:?})", path);
            return self.sink.read(&path);
        }

        let own = self.provider_url(&self.sources.default_platform)?;
        let loaded = match self.launch("provider index").await {
            Some(mut session) => {
                let loaded = self.load(&self.feeds, session.as_mut(), &own, "provider index").await;
                session.close().await;
                loaded
            }
            None => Loaded::GaveUp,
        };

        let rows = match loaded {
            Loaded::Ready(html) => parse_provider_index(&html, &self.justwatch, &own)?,
            Loaded::NotFound => bail!("Provider index page {} not found", own),
            Loaded::GaveUp => bail!("Provider index page {} kept failing", own),
        };
        let path = self.sink.write(Category::ProviderIndex, INDEX_KEY, today, &rows)?;
        info!("{} provider links saved to {:?}", rows.len(), path);
        Ok(rows)
    }

    /// Titles new to one provider, from its timeline feed.
    pub async fn save_new_content(&self, feed: &str, today: NaiveDate) -> Result<ScrapeStatus> {
        let platform = platform_from_url(feed).with_context(|| format!("No platform in {:?}", feed))?;
        if self.freshness.is_fresh(&platform, Category::NewContent, today)? {
            info!("A recent new-content file for {} exists", platform);
            return Ok(ScrapeStatus::Fresh);
        }

        let url = Url::parse(feed).with_context(|| format!("Invalid feed URL {:?}", feed))?;
        let loaded = match self.launch(&platform).await {
            Some(mut session) => {
                let loaded = match self.load(&self.feeds, session.as_mut(), &url, &platform).await {
                    Loaded::Ready(html) => Loaded::Ready(self.scroll_feed(session.as_mut(), html).await),
                    other => other,
                };
                session.close().await;
                loaded
            }
            None => Loaded::GaveUp,
        };

        let status = match loaded {
            Loaded::Ready(html) => {
                let rows = parse_timeline(&html, &self.justwatch)?;
                self.sink.write(Category::NewContent, &platform, today, &rows)?;
                info!("{}: {} new titles saved", platform, rows.len());
                ScrapeStatus::Saved
            }
            Loaded::NotFound => {
                warn!("{}: feed not found", platform);
                let marker = NewContentRow { date: None, href: Some(NOT_FOUND.into()) };
                self.sink.write(Category::NewContent, &platform, today, &[marker])?;
                ScrapeStatus::NotFound
            }
            Loaded::GaveUp => {
                let marker = NewContentRow { date: None, href: Some(FAILED.into()) };
                self.sink.write_failure(Category::NewContent, &platform, today, &[marker])?;
                ScrapeStatus::GaveUp
            }
        };
        Ok(status)
    }

    /// Scroll the feed down until its end marker shows, then sideways until
    /// every day block has revealed all its titles.
    async fn scroll_feed(&self, session: &mut dyn PageSession, mut html: String) -> String {
        let pause = Duration::from_secs(self.sources.scroll_pause_secs);

        for _ in 0..self.sources.scroll_count {
            if feed_exhausted(&html) {
                debug!("Reached the end of the list");
                break;
            }
            if let Err(e) = session.run_script(SCROLL_DOWN).await {
                warn!("Scrolling stopped: {}", e);
                break;
            }
            sleep(pause).await;
            match session.content().await {
                Ok(next) => html = next,
                Err(e) => {
                    warn!("Feed content unavailable: {}", e);
                    return html;
                }
            }
        }

        for _ in 0..REVEAL_LIMIT {
            if !timeline_pending(&html) {
                break;
            }
            if session.run_script(REVEAL_ROWS).await.is_err() {
                break;
            }
            sleep(Duration::from_secs(1)).await;
            match session.content().await {
                Ok(next) => html = next,
                Err(_) => break,
            }
        }
        html
    }
}

/// Click every match of `selector` (up to `limit`) and re-read the page when
/// anything was clicked. Failures keep the markup already in hand.
async fn reread_after(session: &mut dyn PageSession, selector: &str, limit: usize, html: String) -> String {
    match session.click_all(selector, limit).await {
        Ok(0) => html,
        Ok(n) => {
            debug!("Clicked {} × {}", n, selector);
            session.content().await.unwrap_or(html)
        }
        Err(e) => {
            debug!("Could not click {}: {}", selector, e);
            html
        }
    }
}

fn see_more(section: &str) -> String {
    format!("div[data-testid='sub-section-{section}'] > ul > div > span[class*='single-page-see-more'] > button")
}

/// Open every award block's "load more" so all categories are counted.
async fn expand_awards(session: &mut dyn PageSession, mut html: String) -> String {
    let events = match award_event_ids(&html) {
        Ok(ids) => ids,
        Err(e) => {
            debug!("No award blocks to expand: {}", e);
            return html;
        }
    };
    for event in events {
        let button = format!("div[data-testid='sub-section-{event}'] > ul > div > span > button");
        html = reread_after(session, &button, LOAD_MORE_LIMIT, html).await;
    }
    html
}
