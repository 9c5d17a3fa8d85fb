use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Source of the room listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    SpareRoom,
    Gumtree,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::SpareRoom => "spareroom",
            Source::Gumtree => "gumtree",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contact phone as advertised. Stored as the number itself or `false`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phone {
    Number(String),
    #[default]
    None,
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phone::Number(number) => f.write_str(number),
            Phone::None => f.write_str("No"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhoneRepr {
    Number(String),
    Flag(bool),
}

impl Serialize for Phone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Phone::Number(number) => serializer.serialize_str(number),
            Phone::None => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for Phone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PhoneRepr::deserialize(deserializer)? {
            PhoneRepr::Number(number) if !number.trim().is_empty() => Phone::Number(number),
            PhoneRepr::Number(_) | PhoneRepr::Flag(_) => Phone::None,
        })
    }
}

/// Normalized room listing, shared by every source adapter.
///
/// Re-fetching a listing replaces the whole record; only `score` and
/// `is_new` are ever updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub id: String,
    pub source: Source,
    /// Configured area whose search produced this listing
    pub search_area: String,
    pub images: Vec<String>,
    /// Nearest station, matched case-insensitively against preferred areas
    pub station: String,
    /// Monthly rent of every advertised room
    pub prices: Vec<u32>,
    #[serde(default)]
    pub deposits: Vec<u32>,
    #[serde(default)]
    pub bills_included: bool,
    #[serde(default)]
    pub rooms_in_property: Option<u32>,
    #[serde(default)]
    pub housemate_count: Option<u32>,
    #[serde(default)]
    pub female_count: Option<u32>,
    #[serde(default)]
    pub male_count: Option<u32>,
    #[serde(default)]
    pub phone: Phone,
    /// Availability as advertised ("Now", "01 Mar 2015", ...)
    pub available_label: String,
    pub available: NaiveDateTime,
    pub is_new: bool,
    #[serde(default)]
    pub score: Option<f64>,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Score used for ordering; unscored listings count as zero.
    pub fn score_or_zero(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }

    pub fn min_price(&self) -> Option<u32> {
        self.prices.iter().copied().min()
    }

    pub fn min_deposit(&self) -> Option<u32> {
        self.deposits.iter().copied().min()
    }
}

/// One candidate returned by a search page.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    /// Record built from the search result alone, used in fast mode
    pub summary: Option<ListingRecord>,
}

/// One page of search results for an area.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Total results the source reports for the whole search
    pub total_results: Option<usize>,
    pub has_more: bool,
}
