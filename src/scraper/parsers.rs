//! Field extractors: pure functions from rendered markup to typed rows.
//!
//! `Html` is not `Send`, so nothing here is async; callers pass the page
//! content string and get owned rows back.

use super::cleaner::{
    Split, clean_text, company_id, element_lines, element_text, first_word, note_ids, person_id,
    split_credit_lines, split_distribution_lines, sum_numbers, watchlist_count,
};
use crate::models::{
    AwardDetailRow, AwardSummaryRow, CompanyCredits, CreditRow, EntityId, MainRow, NewContentRow,
    ProviderRow, ReleaseRow,
};
use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

pub const NO_AWARDS_TEXT: &str = "It looks like we don't have any awards for this title yet.";
pub const NO_RELEASE_TEXT: &str = "It looks like we don't have any release date for this title yet.";
pub const NO_CREDITS_TEXT: &str = "It looks like we don't have any company credits for this title yet.";

/// Company credit sections, in the order they are visited and persisted.
pub const CREDIT_SECTIONS: &[&str] =
    &["production", "distribution", "specialEffects", "miscellaneous", "sales"];

const FEED_END_TEXTS: &[&str] = &["You've reached the end of the list!", "Sorry, nothing to see here!"];

/// A page either has the section or states it has none.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Found(T),
    NoData,
}

fn sel(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("selector {:?}: {:?}", s, e))
}

/// True when the page's visible text contains `notice`. Checked on text
/// rather than markup so entity-encoded apostrophes still match.
fn page_states(doc: &Html, notice: &str) -> bool {
    doc.root_element().text().collect::<String>().contains(notice)
}

fn child_divs<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "div")
}

fn next_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

// ── Awards ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwardPage {
    pub summary: Vec<AwardSummaryRow>,
    pub details: Vec<AwardDetailRow>,
}

/// Event ids of the award blocks, in page order.
pub fn award_event_ids(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let span_sel = sel("h3.ipc-title__text > span[id]")?;
    Ok(doc
        .select(&span_sel)
        .filter_map(|s| s.value().attr("id"))
        .map(str::to_string)
        .collect())
}

pub fn parse_award_page(html: &str) -> Result<Extracted<AwardPage>> {
    let doc = Html::parse_document(html);
    if page_states(&doc, NO_AWARDS_TEXT) {
        return Ok(Extracted::NoData);
    }

    let h3_sel = sel("h3.ipc-title__text")?;
    let span_sel = sel("span[id]")?;

    let mut summary = Vec::new();
    for h3 in doc.select(&h3_sel) {
        let Some(event_id) = h3.select(&span_sel).next().and_then(|s| s.value().attr("id")) else {
            continue;
        };
        let items = sel(&format!("div[data-testid='sub-section-{event_id}'] > ul > li"))?;
        summary.push(AwardSummaryRow {
            award_name: element_text(h3),
            award_id: Some(event_id.to_string()),
            num_category: Some(doc.select(&items).count().to_string()),
        });
    }

    let details = parse_award_details(&doc)?;
    debug!("{} awards, {} nomination rows", summary.len(), details.len());

    if summary.is_empty() {
        summary.push(AwardSummaryRow::default());
    }
    Ok(Extracted::Found(AwardPage { summary, details }))
}

fn parse_award_details(doc: &Html) -> Result<Vec<AwardDetailRow>> {
    let block_sel = sel("div.ipc-metadata-list-summary-item__tc")?;
    let person_sel = sel("a.ipc-metadata-list-summary-item__li--link")?;
    let nomination_sel = sel("a.ipc-metadata-list-summary-item__t")?;
    let alias_sel = sel("span.ipc-metadata-list-summary-item__tst")?;
    let category_sel = sel("span.awardCategoryName")?;
    let note_sel = sel("div.ipc-html-content-inner-div")?;
    let link_sel = sel("a[href]")?;
    let signpost_sel = sel("div[data-testid='awards-signpost']")?;

    // The signpost total bounds the blocks; anything past it is unrelated lists.
    let limit = doc
        .select(&signpost_sel)
        .next()
        .map(|s| sum_numbers(&s.text().collect::<String>()))
        .filter(|n| *n > 0)
        .unwrap_or(usize::MAX);

    let mut rows = Vec::new();
    for block in doc.select(&block_sel).take(limit) {
        let nomination_link = block.select(&nomination_sel).next();
        let nomination = nomination_link.and_then(|a| {
            let own: String = a.children().filter_map(|n| n.value().as_text()).map(|t| &**t).collect();
            clean_text(&own)
        });
        let award = block.select(&alias_sel).next().and_then(element_text);
        let category = block.select(&category_sel).next().and_then(element_text);

        let note_el = block.select(&note_sel).next();
        let note = note_el.and_then(element_text);
        let note_id = note_el.and_then(|n| note_ids(n.select(&link_sel).filter_map(|a| a.value().attr("href"))));

        let base = AwardDetailRow { award, nomination, category, note, note_id, ..Default::default() };

        let people: Vec<ElementRef> = block.select(&person_sel).collect();
        if people.is_empty() {
            rows.push(base);
            continue;
        }
        for p in people {
            rows.push(AwardDetailRow {
                person: element_text(p),
                person_id: p.value().attr("href").and_then(person_id),
                ..base.clone()
            });
        }
    }
    Ok(rows)
}

// ── Release info ──────────────────────────────────────────────────────────────

pub fn parse_release_page(html: &str) -> Result<Extracted<Vec<ReleaseRow>>> {
    let doc = Html::parse_document(html);
    if page_states(&doc, NO_RELEASE_TEXT) {
        return Ok(Extracted::NoData);
    }

    let mut rows: Vec<ReleaseRow> = sub_section(&doc, "releases")?
        .into_iter()
        .map(|(id, lines)| {
            let Split { primary, note, date } = split_credit_lines(&lines);
            ReleaseRow { country: primary, rel_id: id, date, location: note }
        })
        .collect();

    if rows.is_empty() {
        rows.push(ReleaseRow::default());
    }
    Ok(Extracted::Found(rows))
}

// ── Company credits ───────────────────────────────────────────────────────────

pub fn parse_credits_page(html: &str) -> Result<Extracted<CompanyCredits>> {
    let doc = Html::parse_document(html);
    if page_states(&doc, NO_CREDITS_TEXT) {
        return Ok(Extracted::NoData);
    }

    let mut credits = CompanyCredits::default();
    for section in CREDIT_SECTIONS {
        let blocks = sub_section(&doc, section)?;
        if blocks.is_empty() {
            debug!("No {} on the page", section);
            continue;
        }
        let distribution = *section == "distribution";
        for (id, lines) in blocks {
            let split =
                if distribution { split_distribution_lines(&lines) } else { split_credit_lines(&lines) };
            let row = CreditRow { firm: split.primary, firm_id: id, country_yr: split.date, note: split.note };
            if distribution {
                credits.distribution.push(row);
            } else {
                credits.other.push(row);
            }
        }
    }
    Ok(Extracted::Found(credits))
}

/// `(id, text lines)` of every item in `sub-section-{section}`. The id is the
/// item's own `id`, or the company id of its first link.
fn sub_section(doc: &Html, section: &str) -> Result<Vec<(Option<String>, String)>> {
    let item_sel = sel(&format!("div[data-testid='sub-section-{section}'] > ul > li"))?;
    let link_sel = sel("a[href]")?;

    Ok(doc
        .select(&item_sel)
        .map(|li| {
            let id = li.value().attr("id").map(str::to_string).or_else(|| {
                li.select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(company_id)
            });
            (id, element_lines(li))
        })
        .collect())
}

// ── Main page ─────────────────────────────────────────────────────────────────

const WATCH_LABELS: [&str; 3] = ["IN THEATERS", "STREAMING", "RENT/BUY"];

pub fn parse_main_page(html: &str, id: &EntityId) -> Result<MainRow> {
    let doc = Html::parse_document(html);

    if doc.select(&sel("h1[data-testid='hero__pageTitle']")?).next().is_none() {
        warn!("{}: no title heading on the main page", id);
        return Ok(MainRow::not_found(id));
    }

    let mut row = MainRow::empty(id);
    parse_watch_options(&doc, &mut row)?;

    row.num_watchlist = doc
        .select(&sel("div[data-testid='tm-box-wl-count']")?)
        .next()
        .and_then(|w| watchlist_count(&w.text().collect::<String>()));

    for score in doc.select(&sel("span.score")?) {
        let label = next_element(score).and_then(element_text);
        let value = element_text(score);
        match label.as_deref() {
            Some("User reviews") => row.num_review = value,
            Some("Critic reviews") => row.num_critic = value,
            Some("Metascore") => row.metascore = value,
            _ => {}
        }
    }

    let aria_count = |testid: &str| -> Result<Option<String>> {
        Ok(doc
            .select(&sel(&format!("a[data-testid='{testid}']"))?)
            .next()
            .and_then(|a| a.value().attr("aria-label"))
            .and_then(first_word))
    };
    row.num_video = aria_count("hero__video-link")?;
    row.num_photo = aria_count("hero__photo-link")?;

    row.origin = main_subsection(&doc, "details", "origin")?;
    row.language = main_subsection(&doc, "details", "languages")?;
    row.filming_loc = main_subsection(&doc, "details", "filminglocations")?;
    row.budget = main_subsection(&doc, "boxoffice", "budget")?;
    row.open_boxoffice_america = main_subsection(&doc, "boxoffice", "openingweekenddomestic")?;
    row.gross_boxoffice_america = main_subsection(&doc, "boxoffice", "grossdomestic")?;
    row.gross_boxoffice_world = main_subsection(&doc, "boxoffice", "cumulativeworldwidegross")?;
    row.color = main_subsection(&doc, "techspecs", "color")?;
    row.soundmix = main_subsection(&doc, "techspecs", "soundmix")?;
    row.aspect_ratio = main_subsection(&doc, "techspecs", "aspectratio")?;

    row.star = parse_stars(&doc)?;
    row.air_date = doc
        .select(&sel("ul.ipc-inline-list > li")?)
        .filter_map(element_text)
        .find(|t| t.contains("Episode aired"));

    Ok(row)
}

/// Watch-option groups: a label div (`STREAMING`), a detail div (season,
/// price or showtimes) and a provider link carrying an `aria-label`.
fn parse_watch_options(doc: &Html, row: &mut MainRow) -> Result<()> {
    let container_sel = sel("div[data-testid='tm-box-wb-overflow']")?;
    let Some(container) = doc.select(&container_sel).next() else {
        debug!("{}: no watch options", row.tconst);
        return Ok(());
    };
    let provider_sel = sel("a[aria-label]")?;

    for group in child_divs(container) {
        let mut divs = child_divs(group);
        let Some(label) = divs.next().and_then(element_text) else { continue };
        if !WATCH_LABELS.contains(&label.as_str()) {
            continue;
        }
        let detail = divs.next().and_then(element_text);
        let provider = group
            .select(&provider_sel)
            .next()
            .and_then(|a| a.value().attr("aria-label"))
            .map(str::to_string);

        match label.as_str() {
            "IN THEATERS" => {
                row.theater = detail;
                row.theater_provider = provider;
            }
            "STREAMING" => {
                row.season = detail;
                row.streaming_provider = provider;
            }
            _ => {
                row.price = detail;
                row.rent_provider = provider;
            }
        }
    }
    Ok(())
}

/// Items of `title-{section}-{sub}`, joined with "; ". Tech specs sometimes
/// use `title-techspec_{sub}` instead.
fn main_subsection(doc: &Html, section: &str, sub: &str) -> Result<Option<String>> {
    let block = format!("div[data-testid='title-{section}-section']");
    let leaf = if section == "boxoffice" { "" } else { " > a" };
    let primary = sel(&format!(
        "{block} li[data-testid='title-{section}-{sub}'] > div > ul > li{leaf}"
    ))?;

    let mut items: Vec<String> = doc.select(&primary).filter_map(element_text).collect();

    if items.is_empty() && section.len() > 1 {
        let singular = &section[..section.len() - 1];
        let leaf = if sub == "aspectratio" { "span" } else { "a" };
        let fallback = sel(&format!(
            "{block} li[data-testid='title-{singular}_{sub}'] > div > ul > li > {leaf}"
        ))?;
        items = doc.select(&fallback).filter_map(element_text).collect();
    }

    Ok(if items.is_empty() { None } else { Some(items.join("; ")) })
}

fn parse_stars(doc: &Html) -> Result<Option<String>> {
    let credit_sel = sel("li[data-testid='title-pc-principal-credit']")?;
    let label_sel = sel("a, span")?;
    let star_sel = sel("div > ul > li")?;

    for credit in doc.select(&credit_sel) {
        let is_stars = credit
            .select(&label_sel)
            .next()
            .and_then(element_text)
            .is_some_and(|t| t.contains("Stars"));
        if !is_stars {
            continue;
        }
        let stars: Vec<String> = credit.select(&star_sel).filter_map(element_text).collect();
        if !stars.is_empty() {
            return Ok(Some(stars.join("; ")));
        }
    }
    Ok(None)
}

// ── Streaming aggregator ──────────────────────────────────────────────────────

/// Links to every provider's feed, plus `own` (the page they were read from).
pub fn parse_provider_index(html: &str, base: &Url, own: &Url) -> Result<Vec<ProviderRow>> {
    let doc = Html::parse_document(html);
    let link_sel = sel("div.filter-bar-seo__provider-icon a[href]")?;

    let mut rows: Vec<ProviderRow> = doc
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|u| ProviderRow { href_justwatch: u.to_string() })
        .collect();
    rows.push(ProviderRow { href_justwatch: own.to_string() });
    Ok(rows)
}

/// One row per title per day block of a provider's "new" timeline.
pub fn parse_timeline(html: &str, base: &Url) -> Result<Vec<NewContentRow>> {
    let doc = Html::parse_document(html);
    let block_sel = sel("div[class*='timeline__timeframe']")?;
    let item_sel = sel("div.horizontal-title-list__item > a[href]")?;

    let mut rows = Vec::new();
    for block in doc.select(&block_sel) {
        let day = block
            .value()
            .attr("class")
            .and_then(|c| c.split_once("--"))
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(str::to_string);

        let before = rows.len();
        for a in block.select(&item_sel) {
            let href = a
                .value()
                .attr("href")
                .and_then(|h| base.join(h).ok())
                .map(|u| u.to_string());
            rows.push(NewContentRow { date: day.clone(), href });
        }
        debug!("{:?}: {} titles", day, rows.len() - before);
    }
    Ok(rows)
}

/// The feed shows its end-of-list marker.
pub fn feed_exhausted(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let Ok(h3_sel) = sel("h3") else { return false };
    doc.select(&h3_sel)
        .filter_map(element_text)
        .any(|t| FEED_END_TEXTS.iter().any(|end| t.contains(end)))
}

/// Some day block still shows its "scroll right" control.
pub fn timeline_pending(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let Ok(end_sel) = sel("span.hidden-horizontal-scrollbar__nav--end") else { return false };
    doc.select(&end_sel).next().is_some()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const AWARDS: &str = r#"
<html><body>
<h1 class="ipc-title__text">Poor Things</h1>
<div data-testid="awards-signpost">Won 4 Oscars. 2 wins &amp; 1 nomination total</div>
<section class="ipc-page-section ipc-page-section--base">
  <h3 class="ipc-title__text">Academy Awards, USA<span id="ev0000003"></span></h3>
  <div data-testid="sub-section-ev0000003"><ul>
    <li><div class="ipc-metadata-list-summary-item__tc">
      <a class="ipc-metadata-list-summary-item__t" href="/event/ev0000003/2024/1">2024 Winner <span class="ipc-metadata-list-summary-item__tst">Oscar</span></a>
      <ul>
        <li><span class="ipc-metadata-list-summary-item__li awardCategoryName">Best Actress</span></li>
        <li><a class="ipc-metadata-list-summary-item__li ipc-metadata-list-summary-item__li--link" href="/name/nm1297015/?ref_=ttawd">Emma Stone</a></li>
      </ul>
    </div></li>
    <li><div class="ipc-metadata-list-summary-item__tc">
      <a class="ipc-metadata-list-summary-item__t" href="/event/ev0000003/2024/1">2024 Winner <span class="ipc-metadata-list-summary-item__tst">Oscar</span></a>
      <ul>
        <li><span class="ipc-metadata-list-summary-item__li awardCategoryName">Best Makeup</span></li>
        <li><a class="ipc-metadata-list-summary-item__li ipc-metadata-list-summary-item__li--link" href="/name/nm0000001/">Nadia Stacey</a></li>
        <li><a class="ipc-metadata-list-summary-item__li ipc-metadata-list-summary-item__li--link" href="/name/nm0000002/">Mark Coulier</a></li>
      </ul>
    </div></li>
  </ul></div>
</section>
<section class="ipc-page-section ipc-page-section--base">
  <h3 class="ipc-title__text">Venice Film Festival<span id="ev0000681"></span></h3>
  <div data-testid="sub-section-ev0000681"><ul>
    <li><div class="ipc-metadata-list-summary-item__tc">
      <a class="ipc-metadata-list-summary-item__t" href="/event/ev0000681/2023/1">2023 Nominee <span class="ipc-metadata-list-summary-item__tst">Queer Lion</span></a>
      <div><span><div><div><div class="ipc-html-content-inner-div">Tied with <a href="/name/nm0402006/">Sandra Hüller</a> for <a href="/title/tt17009710/">Anatomy of a Fall</a></div></div></div></span></div>
    </div></li>
  </ul></div>
</section>
</body></html>"#;

    #[test]
    fn award_page_summary_and_details() {
        assert_eq!(award_event_ids(AWARDS).unwrap(), vec!["ev0000003", "ev0000681"]);

        let Extracted::Found(page) = parse_award_page(AWARDS).unwrap() else {
            panic!("expected award rows");
        };
        assert_eq!(page.summary.len(), 2);
        assert_eq!(page.summary[0].award_name.as_deref(), Some("Academy Awards, USA"));
        assert_eq!(page.summary[0].num_category.as_deref(), Some("2"));
        assert_eq!(page.summary[1].award_id.as_deref(), Some("ev0000681"));
        assert_eq!(page.summary[1].num_category.as_deref(), Some("1"));

        // one row per credited person, one null-person row without credits
        assert_eq!(page.details.len(), 4);
        let first = &page.details[0];
        assert_eq!(first.award.as_deref(), Some("Oscar"));
        assert_eq!(first.nomination.as_deref(), Some("2024 Winner"));
        assert_eq!(first.category.as_deref(), Some("Best Actress"));
        assert_eq!(first.person_id.as_deref(), Some("nm1297015"));
        assert_eq!(page.details[2].person.as_deref(), Some("Mark Coulier"));
        assert_eq!(page.details[2].category.as_deref(), Some("Best Makeup"));

        let tie = &page.details[3];
        assert_eq!(tie.person, None);
        assert_eq!(tie.note_id.as_deref(), Some("nm0402006,tt17009710"));
        assert!(tie.note.as_deref().is_some_and(|n| n.starts_with("Tied with Sandra Hüller")));
    }

    #[test]
    fn award_page_without_awards() {
        let html = "<h1 class=\"ipc-title__text\">X</h1><p>It looks like we don&#39;t have any awards for this title yet.</p>";
        assert_eq!(parse_award_page(html).unwrap(), Extracted::NoData);
    }

    #[test]
    fn release_rows_split_country_date_location() {
        let html = r#"<h1 class="ipc-title__text">Release info</h1>
<div data-testid="sub-section-releases"><ul>
  <li id="rdi0"><a href="/calendar/?region=it">Italy</a><ul><li><span>September 1, 2023</span></li><li><span>(Venice Film Festival)</span></li></ul></li>
  <li id="rdi1"><a href="/calendar/?region=us">United States</a><ul><li><span>December 8, 2023</span></li></ul></li>
</ul></div>"#;
        let Extracted::Found(rows) = parse_release_page(html).unwrap() else { panic!() };
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            ReleaseRow {
                country: Some("Italy".into()),
                rel_id: Some("rdi0".into()),
                date: Some("September 1, 2023".into()),
                location: Some("Venice Film Festival".into()),
            }
        );
        assert_eq!(rows[1].location, None);

        let empty = parse_release_page(&format!("<p>{NO_RELEASE_TEXT}</p>")).unwrap();
        assert_eq!(empty, Extracted::NoData);
    }

    #[test]
    fn missing_release_section_yields_one_null_row() {
        let Extracted::Found(rows) = parse_release_page("<h1>x</h1>").unwrap() else { panic!() };
        assert_eq!(rows, vec![ReleaseRow::default()]);
    }

    #[test]
    fn credits_split_distribution_from_the_rest() {
        let html = r#"
<div data-testid="sub-section-production"><ul>
  <li id="co0028932"><a href="/company/co0028932/">Searchlight Pictures</a><ul><li><span>(presents)</span></li></ul></li>
</ul></div>
<div data-testid="sub-section-distribution"><ul>
  <li id="co0112111"><a href="/company/co0112111/">Cinemundo</a><ul><li><span>(Portugal, 2024)</span><span>(theatrical)</span></li></ul></li>
</ul></div>
<div data-testid="sub-section-sales"><ul>
  <li><a href="/company/co0123456/?ref_=x">Film4</a></li>
</ul></div>"#;
        let Extracted::Found(c) = parse_credits_page(html).unwrap() else { panic!() };

        assert_eq!(c.distribution.len(), 1);
        assert_eq!(c.distribution[0].firm.as_deref(), Some("Cinemundo"));
        assert_eq!(c.distribution[0].country_yr.as_deref(), Some("Portugal, 2024"));
        assert_eq!(c.distribution[0].note.as_deref(), Some("theatrical"));

        assert_eq!(c.other.len(), 2);
        assert_eq!(c.other[0].note.as_deref(), Some("presents"));
        assert_eq!(c.other[1].firm_id.as_deref(), Some("co0123456"));

        let html = format!("<p>{NO_CREDITS_TEXT}</p>");
        assert_eq!(parse_credits_page(&html).unwrap(), Extracted::NoData);
    }

    const MAIN: &str = r#"
<html><body>
<h1 data-testid="hero__pageTitle">Fleabag</h1>
<div data-testid="tm-box-wb-overflow">
  <div><div>STREAMING</div><div><div><a aria-label="Watch on Prime Video">S1</a></div></div></div>
  <div><div>RENT/BUY</div><div><div><a aria-label="Buy on Apple TV">from $2.99</a></div></div></div>
</div>
<div data-testid="tm-box-wl-count">Added by 301K users</div>
<ul><li><span class="score">1.3K</span><span>User reviews</span></li>
    <li><span class="score">95</span><span>Critic reviews</span></li></ul>
<a data-testid="hero__video-link" aria-label="12 videos"></a>
<a data-testid="hero__photo-link" aria-label="99+ photos"></a>
<div data-testid="title-details-section"><ul>
  <li data-testid="title-details-origin"><span>Country of origin</span><div><ul><li><a>United Kingdom</a></li></ul></div></li>
  <li data-testid="title-details-languages"><span>Languages</span><div><ul><li><a>English</a></li><li><a>French</a></li></ul></div></li>
</ul></div>
<div data-testid="title-techspecs-section"><ul>
  <li data-testid="title-techspec_color"><span>Color</span><div><ul><li><a>Color</a></li></ul></div></li>
  <li data-testid="title-techspec_aspectratio"><span>Aspect ratio</span><div><ul><li><span>2.00 : 1</span></li></ul></div></li>
</ul></div>
<ul><li data-testid="title-pc-principal-credit"><a>Stars</a><div><ul><li><a>Phoebe Waller-Bridge</a></li><li><a>Sian Clifford</a></li></ul></div></li></ul>
</body></html>"#;

    #[test]
    fn main_page_fields() {
        let id = EntityId::from("tt5687612");
        let row = parse_main_page(MAIN, &id).unwrap();

        assert_eq!(row.tconst, "tt5687612");
        assert_eq!(row.season.as_deref(), Some("S1"));
        assert_eq!(row.streaming_provider.as_deref(), Some("Watch on Prime Video"));
        assert_eq!(row.price.as_deref(), Some("from $2.99"));
        assert_eq!(row.rent_provider.as_deref(), Some("Buy on Apple TV"));
        assert_eq!(row.theater, None);
        assert_eq!(row.num_watchlist.as_deref(), Some("301K"));
        assert_eq!(row.num_review.as_deref(), Some("1.3K"));
        assert_eq!(row.num_critic.as_deref(), Some("95"));
        assert_eq!(row.metascore, None);
        assert_eq!(row.num_video.as_deref(), Some("12"));
        assert_eq!(row.num_photo.as_deref(), Some("99+"));
        assert_eq!(row.origin.as_deref(), Some("United Kingdom"));
        assert_eq!(row.language.as_deref(), Some("English; French"));
        assert_eq!(row.color.as_deref(), Some("Color"));
        assert_eq!(row.aspect_ratio.as_deref(), Some("2.00 : 1"));
        assert_eq!(row.star.as_deref(), Some("Phoebe Waller-Bridge; Sian Clifford"));
        assert_eq!(row.budget, None);
        assert!(row.is_stream_available());
    }

    #[test]
    fn main_page_without_title_heading_is_not_found() {
        let id = EntityId::from("tt0000404");
        let row = parse_main_page("<h1>404 Error</h1>", &id).unwrap();
        assert_eq!(row, MainRow::not_found(&id));
    }

    #[test]
    fn main_page_without_watch_options_has_null_providers() {
        let id = EntityId::from("tt1");
        let row = parse_main_page(r#"<h1 data-testid="hero__pageTitle">X</h1>"#, &id).unwrap();
        assert_eq!(row, MainRow::empty(&id));
        assert!(!row.is_stream_available());
    }

    #[test]
    fn provider_index_resolves_links() {
        let base = Url::parse("https://www.justwatch.com").unwrap();
        let own = base.join("/us/provider/netflix/new").unwrap();
        let html = r#"
<div class="filter-bar-seo__provider-icon filter-bar-seo__provider-icon--provider"><a href="/us/provider/hulu/new"><img></a></div>
<div class="filter-bar-seo__provider-icon filter-bar-seo__provider-icon--provider"><a href="/us/provider/mubi/new"><img></a></div>"#;
        let rows = parse_provider_index(html, &base, &own).unwrap();
        let hrefs: Vec<&str> = rows.iter().map(|r| r.href_justwatch.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://www.justwatch.com/us/provider/hulu/new",
                "https://www.justwatch.com/us/provider/mubi/new",
                "https://www.justwatch.com/us/provider/netflix/new",
            ]
        );
    }

    #[test]
    fn timeline_rows_carry_block_date() {
        let base = Url::parse("https://www.justwatch.com").unwrap();
        let html = r#"
<div class="timeline__timeframe timeline__timeframe--2024-06-14">
  <div class="hidden-horizontal-scrollbar__items">
    <div class="horizontal-title-list__item"><a href="/us/movie/dune-part-two"></a></div>
    <div class="horizontal-title-list__item"><a href="/us/tv-show/fleabag"></a></div>
  </div>
</div>
<div class="timeline__timeframe timeline__timeframe--2024-06-13">
  <div class="hidden-horizontal-scrollbar__items">
    <div class="horizontal-title-list__item"><a href="/us/movie/poor-things"></a></div>
  </div>
</div>
<h3>You've reached the end of the list!</h3>"#;
        let rows = parse_timeline(html, &base).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date.as_deref(), Some("2024-06-14"));
        assert_eq!(rows[1].href.as_deref(), Some("https://www.justwatch.com/us/tv-show/fleabag"));
        assert_eq!(rows[2].date.as_deref(), Some("2024-06-13"));
        assert!(feed_exhausted(html));
        assert!(!feed_exhausted("<h3>Popular</h3>"));
        assert!(!timeline_pending(html));
        assert!(timeline_pending(
            r#"<div><span class="hidden-horizontal-scrollbar__nav hidden-horizontal-scrollbar__nav--end"></span></div>"#
        ));
    }
}
