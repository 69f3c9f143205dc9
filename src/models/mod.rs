use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Sentinels ─────────────────────────────────────────────────────────────────

/// Confirmed not-found page.
pub const NOT_FOUND: &str = "404";
/// The page itself says it holds no data for this section.
pub const NO_INFO: &str = "NoInfo";
/// Retries exhausted; the row is a marker for manual follow-up.
pub const FAILED: &str = "failed";

// ── Entity id ─────────────────────────────────────────────────────────────────

/// Stable title key (`tt…`). Episodes already carry their series' id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ── Row contract ──────────────────────────────────────────────────────────────

/// A typed CSV row. Every row carries every column, so a file can never have
/// ragged columns; "absent" is an explicit `None`.
pub trait Row: Serialize + DeserializeOwned + Send + 'static {
    const HEADERS: &'static [&'static str];
}

// ── Award page ────────────────────────────────────────────────────────────────

/// One award (event) on a title's award page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwardSummaryRow {
    pub award_name: Option<String>,
    pub award_id: Option<String>,
    pub num_category: Option<String>,
}

impl AwardSummaryRow {
    pub fn no_awards() -> Self {
        Self { num_category: Some("0".into()), ..Default::default() }
    }

    pub fn not_found() -> Self {
        Self { num_category: Some(NOT_FOUND.into()), ..Default::default() }
    }

    pub fn failed() -> Self {
        Self { num_category: Some(FAILED.into()), ..Default::default() }
    }
}

impl Row for AwardSummaryRow {
    const HEADERS: &'static [&'static str] = &["award_name", "award_id", "num_category"];
}

/// One nomination/win for one credited person (or none).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwardDetailRow {
    pub award: Option<String>,
    pub nomination: Option<String>,
    pub category: Option<String>,
    pub person: Option<String>,
    pub person_id: Option<String>,
    pub note: Option<String>,
    pub note_id: Option<String>,
}

impl Row for AwardDetailRow {
    const HEADERS: &'static [&'static str] = &[
        "award", "nomination", "category", "person", "person_id", "note", "note_id",
    ];
}

// ── Release info ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRow {
    pub country: Option<String>,
    pub rel_id: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
}

impl ReleaseRow {
    pub fn no_info() -> Self {
        Self { location: Some(NO_INFO.into()), ..Default::default() }
    }

    pub fn not_found() -> Self {
        Self::filled(NOT_FOUND)
    }

    pub fn failed() -> Self {
        Self::filled(FAILED)
    }

    fn filled(marker: &str) -> Self {
        Self {
            country: Some(marker.into()),
            rel_id: Some(marker.into()),
            date: Some(marker.into()),
            location: Some(marker.into()),
        }
    }
}

impl Row for ReleaseRow {
    const HEADERS: &'static [&'static str] = &["country", "rel_id", "date", "location"];
}

// ── Company credits ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditRow {
    pub firm: Option<String>,
    pub firm_id: Option<String>,
    pub country_yr: Option<String>,
    pub note: Option<String>,
}

impl CreditRow {
    pub fn no_info() -> Self {
        Self { note: Some(NO_INFO.into()), ..Default::default() }
    }

    pub fn not_found() -> Self {
        Self::filled(NOT_FOUND)
    }

    pub fn failed() -> Self {
        Self::filled(FAILED)
    }

    fn filled(marker: &str) -> Self {
        Self {
            firm: Some(marker.into()),
            firm_id: Some(marker.into()),
            country_yr: Some(marker.into()),
            note: Some(marker.into()),
        }
    }
}

impl Row for CreditRow {
    const HEADERS: &'static [&'static str] = &["firm", "firm_id", "country_yr", "note"];
}

/// Company credits of one title, split the way they are persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyCredits {
    pub distribution: Vec<CreditRow>,
    /// Production, special effects, miscellaneous and sales, in that order.
    pub other: Vec<CreditRow>,
}

// ── Main page ─────────────────────────────────────────────────────────────────

/// One title's main page, one row of a batch file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainRow {
    pub tconst: String,
    pub theater: Option<String>,
    pub price: Option<String>,
    pub season: Option<String>,
    pub theater_provider: Option<String>,
    pub streaming_provider: Option<String>,
    pub rent_provider: Option<String>,
    pub num_watchlist: Option<String>,
    pub num_review: Option<String>,
    pub num_critic: Option<String>,
    pub metascore: Option<String>,
    pub num_photo: Option<String>,
    pub num_video: Option<String>,
    pub origin: Option<String>,
    pub language: Option<String>,
    pub filming_loc: Option<String>,
    pub budget: Option<String>,
    pub open_boxoffice_america: Option<String>,
    pub gross_boxoffice_america: Option<String>,
    pub gross_boxoffice_world: Option<String>,
    pub color: Option<String>,
    pub soundmix: Option<String>,
    pub aspect_ratio: Option<String>,
    pub star: Option<String>,
    pub air_date: Option<String>,
}

impl MainRow {
    pub fn empty(id: &EntityId) -> Self {
        Self { tconst: id.to_string(), ..Default::default() }
    }

    pub fn not_found(id: &EntityId) -> Self {
        Self::with_watch_marker(id, NOT_FOUND)
    }

    pub fn failed(id: &EntityId) -> Self {
        Self::with_watch_marker(id, FAILED)
    }

    fn with_watch_marker(id: &EntityId, marker: &str) -> Self {
        let m = || Some(marker.to_string());
        Self {
            tconst: id.to_string(),
            theater: m(),
            price: m(),
            season: m(),
            theater_provider: m(),
            streaming_provider: m(),
            rent_provider: m(),
            ..Default::default()
        }
    }

    /// Whether the title may currently be watched online. A `404` provider is
    /// a confirmed absence; a `failed` one is unknown and counts as available.
    pub fn is_stream_available(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| s != NOT_FOUND);
        present(&self.streaming_provider) || present(&self.rent_provider)
    }
}

impl Row for MainRow {
    const HEADERS: &'static [&'static str] = &[
        "tconst", "theater", "price", "season", "theater_provider", "streaming_provider",
        "rent_provider", "num_watchlist", "num_review", "num_critic", "metascore",
        "num_photo", "num_video", "origin", "language", "filming_loc", "budget",
        "open_boxoffice_america", "gross_boxoffice_america", "gross_boxoffice_world",
        "color", "soundmix", "aspect_ratio", "star", "air_date",
    ];
}

// ── Streaming aggregator ──────────────────────────────────────────────────────

/// A title that appeared on a provider's catalogue on `date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContentRow {
    pub date: Option<String>,
    pub href: Option<String>,
}

impl Row for NewContentRow {
    const HEADERS: &'static [&'static str] = &["date", "href"];
}

/// Link to one provider's "new on …" page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRow {
    pub href_justwatch: String,
}

impl Row for ProviderRow {
    const HEADERS: &'static [&'static str] = &["href_justwatch"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_availability_treats_404_as_absent() {
        let id = EntityId::from("tt0000001");
        assert!(!MainRow::empty(&id).is_stream_available());
        assert!(!MainRow::not_found(&id).is_stream_available());
        assert!(MainRow::failed(&id).is_stream_available());

        let rent_only = MainRow {
            rent_provider: Some("Watch on Prime Video".into()),
            ..MainRow::empty(&id)
        };
        assert!(rent_only.is_stream_available());
    }

    #[test]
    fn headers_cover_every_main_field() {
        assert_eq!(MainRow::HEADERS.len(), 25);
        assert_eq!(MainRow::HEADERS[0], "tconst");
    }

    #[test]
    fn entity_id_is_trimmed() {
        assert_eq!(EntityId::new(" tt5687612 \n").as_str(), "tt5687612");
    }
}
