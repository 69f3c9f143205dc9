//! Error classifier: reads a fetched page's heading and decides whether the
//! page is usable, worth a retry, or a confirmed not-found.

use super::browser::FetchError;
use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Result of one fetch attempt, consumed immediately by the retry controller.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Ok(String),
    SoftError(String),
    ConnectivityError(String),
    NotFound,
}

/// The first `h1` of a page, reduced to what classification needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heading {
    pub text: String,
    pub testid: Option<String>,
    pub class: Option<String>,
    /// Set on the browser's own localized error pages.
    pub l10n_id: Option<String>,
}

impl Heading {
    pub fn from_html(html: &str) -> Option<Self> {
        let doc = Html::parse_document(html);
        let h1_sel = Selector::parse("h1").ok()?;
        let h1 = doc.select(&h1_sel).next()?;
        let attr = |name: &str| h1.value().attr(name).map(str::to_string);
        Some(Self {
            text: h1.text().collect::<String>().trim().to_string(),
            testid: attr("data-testid"),
            class: attr("class"),
            l10n_id: attr("data-l10n-id"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    /// Heading text of the site's own error page.
    pub sentinel: String,
    pub timeout_text: String,
    /// `data-testid`/`class` values carried by a real title heading.
    pub markers: Vec<String>,
    /// Without a heading the page is treated as not loaded.
    pub require_heading: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            sentinel: "Error".to_string(),
            timeout_text: "The connection has timed out".to_string(),
            markers: vec!["hero__pageTitle".to_string(), "ipc-title__text".to_string()],
            require_heading: true,
        }
    }
}

impl Classifier {
    /// For pages that may legitimately have no `h1` (the aggregator's feeds).
    pub fn lenient() -> Self {
        Self { require_heading: false, ..Self::default() }
    }

    pub fn classify(&self, fetched: Result<String, FetchError>) -> FetchOutcome {
        let html = match fetched {
            Ok(html) => html,
            Err(FetchError::Timeout(d)) => {
                warn!("Cannot load the page within {:?}", d);
                return FetchOutcome::ConnectivityError(format!("page load timed out after {d:?}"));
            }
            Err(FetchError::Driver(e)) => {
                warn!("Page could not be queried: {}", e);
                return FetchOutcome::SoftError(e);
            }
        };

        let Some(heading) = Heading::from_html(&html) else {
            if self.require_heading {
                return FetchOutcome::ConnectivityError("no heading rendered".to_string());
            }
            return FetchOutcome::Ok(html);
        };

        match self.judge(&heading) {
            Verdict::Ok => FetchOutcome::Ok(html),
            Verdict::Soft(reason) => FetchOutcome::SoftError(reason),
            Verdict::Connectivity(reason) => FetchOutcome::ConnectivityError(reason),
            Verdict::NotFound => FetchOutcome::NotFound,
        }
    }

    fn judge(&self, h: &Heading) -> Verdict {
        let marked = |v: &Option<String>| {
            v.as_deref()
                .is_some_and(|v| v.split_whitespace().any(|t| self.markers.iter().any(|m| m == t)))
        };
        if marked(&h.testid) || (marked(&h.class) && h.l10n_id.is_none()) {
            return Verdict::Ok;
        }

        if h.text == self.sentinel {
            debug!("'{}' was found", self.sentinel);
            return Verdict::Soft(format!("heading is {:?}", h.text));
        }

        if h.text == self.timeout_text {
            debug!("Connection error {:?} was found", h.l10n_id);
            return Verdict::Connectivity(h.text.clone());
        }

        if h.text.contains(&self.sentinel) && h.l10n_id.is_none() {
            if h.text.contains("404") {
                debug!("Not found: {:?}", h.text);
                return Verdict::NotFound;
            }
            return Verdict::Soft(format!("heading mentions {:?}: {:?}", self.sentinel, h.text));
        }

        Verdict::Ok
    }
}

enum Verdict {
    Ok,
    Soft(String),
    Connectivity(String),
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn page(h1: &str) -> Result<String, FetchError> {
        Ok(format!("<html><body>{h1}<p>body</p></body></html>"))
    }

    fn is_ok(o: &FetchOutcome) -> bool {
        matches!(o, FetchOutcome::Ok(_))
    }

    #[test]
    fn marker_attribute_wins_over_heading_text() {
        let c = Classifier::default();
        let o = c.classify(page(r#"<h1 data-testid="hero__pageTitle">Error</h1>"#));
        assert!(is_ok(&o));

        let o = c.classify(page(r#"<h1 class="ipc-title__text">Error</h1>"#));
        assert!(is_ok(&o));
    }

    #[test]
    fn class_marker_ignored_on_browser_error_page() {
        let c = Classifier::default();
        let o = c.classify(page(
            r#"<h1 class="ipc-title__text" data-l10n-id="netTimeout-title">The connection has timed out</h1>"#,
        ));
        assert!(matches!(o, FetchOutcome::ConnectivityError(_)));
    }

    #[test]
    fn exact_sentinel_is_soft_error() {
        let c = Classifier::default();
        assert!(matches!(c.classify(page("<h1>Error</h1>")), FetchOutcome::SoftError(_)));
    }

    #[test]
    fn timeout_heading_is_connectivity_error() {
        let c = Classifier::default();
        let o = c.classify(page("<h1>The connection has timed out</h1>"));
        assert!(matches!(o, FetchOutcome::ConnectivityError(_)));
    }

    #[test]
    fn sentinel_substring_splits_404_from_soft() {
        let c = Classifier::default();
        assert_eq!(c.classify(page("<h1>404 Error</h1>")), FetchOutcome::NotFound);
        assert!(matches!(
            c.classify(page("<h1>Error loading page</h1>")),
            FetchOutcome::SoftError(_)
        ));
    }

    #[test]
    fn fetch_failures_map_to_tracks() {
        let c = Classifier::default();
        let o = c.classify(Err(FetchError::Timeout(Duration::from_secs(50))));
        assert!(matches!(o, FetchOutcome::ConnectivityError(_)));

        let o = c.classify(Err(FetchError::Driver("stale element reference".into())));
        assert_eq!(o, FetchOutcome::SoftError("stale element reference".into()));
    }

    #[test]
    fn missing_heading_depends_on_strictness() {
        let html = || Ok("<html><body><div>loading</div></body></html>".to_string());
        assert!(matches!(
            Classifier::default().classify(html()),
            FetchOutcome::ConnectivityError(_)
        ));
        assert!(is_ok(&Classifier::lenient().classify(html())));
    }

    #[test]
    fn plain_heading_is_ok() {
        let c = Classifier::default();
        assert!(is_ok(&c.classify(page("<h1>Fleabag</h1>"))));
    }

    #[test]
    fn heading_extraction_reads_attributes() {
        let h = Heading::from_html(r#"<h1 data-testid="hero__pageTitle"> <span>Dune</span> </h1>"#)
            .unwrap();
        assert_eq!(h.text, "Dune");
        assert_eq!(h.testid.as_deref(), Some("hero__pageTitle"));
        assert!(h.l10n_id.is_none());
    }
}
