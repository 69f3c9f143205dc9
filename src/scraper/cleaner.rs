use regex::Regex;
use scraper::ElementRef;
use std::sync::OnceLock;

type Pattern = OnceLock<Option<Regex>>;

/// Compile `pattern` once into `cell`. None only if the pattern is invalid.
fn compiled(cell: &'static Pattern, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

// ── Text helpers ──────────────────────────────────────────────────────────────

/// Trim and collapse inner whitespace. Empty → None.
/// "  Warner   Bros. \n" → "Warner Bros."
pub fn clean_text(s: &str) -> Option<String> {
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() { None } else { Some(s) }
}

/// Visible text of an element, as one string.
pub fn element_text(el: ElementRef<'_>) -> Option<String> {
    clean_text(&el.text().collect::<String>())
}

/// Text nodes of an element, one per line, blanks dropped. Mirrors how the
/// browser renders a credit block: the name on one line, notes below.
pub fn element_lines(el: ElementRef<'_>) -> String {
    el.text()
        .filter_map(clean_text)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn first_word(s: &str) -> Option<String> {
    s.split_whitespace().next().map(str::to_string)
}

// ── Composite splitters ───────────────────────────────────────────────────────

/// `(primary, note, date)` parts of a credit or release block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub primary: Option<String>,
    pub note: Option<String>,
    pub date: Option<String>,
}

/// Release and non-distribution credit blocks:
///   "Italy\nSeptember 1, 2023\n(Venice Film Festival)"
///     → ("Italy", "Venice Film Festival", "September 1, 2023")
///   "Warner Bros.\n(presents)" → ("Warner Bros.", "presents", None)
pub fn split_credit_lines(s: &str) -> Split {
    let primary = s.lines().next().and_then(clean_text);

    static NOTE: Pattern = OnceLock::new();
    static DATE: Pattern = OnceLock::new();

    let note = compiled(&NOTE, r"\(([^)]+)\)")
        .and_then(|re| re.captures(s))
        .and_then(|c| c.get(1))
        .and_then(|m| clean_text(m.as_str()));

    let date = compiled(&DATE, r"([A-Za-z]+\s*\d*,\s\d{4})")
        .and_then(|re| re.captures(s))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Split { primary, note, date }
}

/// Distribution blocks carry `(country, year)(medium)` after the firm:
///   "Cinemundo\n(Portugal, 2024)(theatrical)"
///     → ("Cinemundo", "theatrical", "Portugal, 2024")
///   "Cinemundo\n(Portugal, 2024)" → ("Cinemundo", None, "Portugal, 2024")
///
/// The `date` slot holds the country and year.
pub fn split_distribution_lines(s: &str) -> Split {
    let mut lines = s.lines();
    let primary = lines.next().and_then(clean_text);
    let rest: String = lines.map(str::trim).collect();

    if rest.is_empty() {
        return Split { primary, ..Default::default() };
    }

    match rest.split_once(")(") {
        Some((country_yr, note)) => Split {
            primary,
            date: clean_text(country_yr.trim_start_matches('(')),
            note: clean_text(note.trim_end_matches(')')),
        },
        None => Split {
            primary,
            date: clean_text(rest.trim_matches(|c| c == '(' || c == ')')),
            note: None,
        },
    }
}

// ── Ids ───────────────────────────────────────────────────────────────────────

/// "/name/nm1297015/?ref_=ttawd" → "nm1297015"
pub fn person_id(href: &str) -> Option<String> {
    static RE: Pattern = OnceLock::new();
    let re = compiled(&RE, r"/(nm\d+)")?;
    Some(re.captures(href)?.get(1)?.as_str().to_string())
}

/// All `nm…`/`tt…` ids of a note's links, comma-joined. None without ids.
pub fn note_ids<'a>(hrefs: impl IntoIterator<Item = &'a str>) -> Option<String> {
    static RE: Pattern = OnceLock::new();
    let re = compiled(&RE, r"/([tn][tm]\d+)")?;
    let ids: Vec<&str> = hrefs
        .into_iter()
        .filter_map(|h| re.captures(h).and_then(|c| c.get(1)).map(|m| m.as_str()))
        .collect();
    if ids.is_empty() { None } else { Some(ids.join(",")) }
}

/// "/company/co0002663/?ref_=…" → "co0002663"
pub fn company_id(href: &str) -> Option<String> {
    static RE: Pattern = OnceLock::new();
    let re = compiled(&RE, r"/(co\d+)")?;
    Some(re.captures(href)?.get(1)?.as_str().to_string())
}

// ── Counts ────────────────────────────────────────────────────────────────────

/// Watchlist counter text → the count as shown.
/// "Added by 1.2M users" → "1.2M" | "Added by 532 users" → "532"
pub fn watchlist_count(s: &str) -> Option<String> {
    static RE: Pattern = OnceLock::new();
    let re = compiled(&RE, r"(\d[\d.,]*[KM]?)")?;
    Some(re.captures(s)?.get(1)?.as_str().to_string())
}

/// Sum of every number in a signpost such as "32 wins & 121 nominations".
pub fn sum_numbers(s: &str) -> usize {
    static RE: Pattern = OnceLock::new();
    let Some(re) = compiled(&RE, r"\d+") else { return 0 };
    re.find_iter(s).filter_map(|m| m.as_str().parse::<usize>().ok()).sum()
}

/// Platform slug of a provider feed URL.
/// "https://www.justwatch.com/us/provider/netflix/new" → "netflix"
pub fn platform_from_url(url: &str) -> Option<String> {
    static RE: Pattern = OnceLock::new();
    let re = compiled(&RE, r"/provider/([^/]+)/new")?;
    Some(re.captures(url)?.get(1)?.as_str().to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
