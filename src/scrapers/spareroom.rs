use crate::config::SourceSettings;
use crate::error::FetchError;
use crate::models::{ListingRecord, Phone, SearchHit, SearchPage, Source};
use crate::scrapers::http::PoliteClient;
use crate::scrapers::normalize::{monthly_rent, now, parse_available, parse_money, RentPeriod};
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::SearchParams;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "SpareRoomUK 3.1";
const FULL_WEEK: &str = "7 days a week";
const NO_DETAILS: &str = "No Details";

/// SpareRoom scraper backed by the JSON API of its mobile app
pub struct SpareRoomScraper {
    client: PoliteClient,
    settings: SourceSettings,
    params: SearchParams,
}

impl SpareRoomScraper {
    pub fn new(settings: SourceSettings, params: SearchParams, delay: Duration) -> Result<Self> {
        let client = PoliteClient::new(USER_AGENT, delay, &settings.cookies)?;
        Ok(Self {
            client,
            settings,
            params,
        })
    }

    fn search_url(&self, area: &str, page: u32) -> Result<Url, FetchError> {
        let base = format!("{}/flatshares", self.settings.api_url.trim_end_matches('/'));
        let mut query: Vec<(&str, String)> = vec![
            ("format", "json".to_string()),
            ("max_rent", self.params.max_rent.to_string()),
            ("per", "pcm".to_string()),
            ("page", page.to_string()),
            ("max_per_page", self.params.per_page.to_string()),
            ("where", area.to_lowercase()),
        ];
        if let Some(room_type) = &self.params.room_type {
            query.push(("room_types", room_type.clone()));
        }
        if let Some(rooms_for) = &self.params.rooms_for {
            query.push(("rooms_for", rooms_for.clone()));
        }
        if self.params.ensuite_only {
            query.push(("ensuite", "Y".to_string()));
        }

        Url::parse_with_params(&base, &query).map_err(|e| FetchError::parse(base, e.to_string()))
    }

    fn detail_url(&self, id: &str) -> String {
        format!(
            "{}/flatshares/{}?format=json",
            self.settings.api_url.trim_end_matches('/'),
            id
        )
    }

    fn listing_url(&self, id: &str) -> String {
        listing_url(&self.settings.web_url, id)
    }
}

#[async_trait]
impl SourceAdapter for SpareRoomScraper {
    async fn search(&self, area: &str, page: u32) -> Result<SearchPage, FetchError> {
        let url = self.search_url(area, page)?;
        let body = self.client.get_json(url.as_str()).await?;
        parse_search_page(
            &body,
            url.as_str(),
            area,
            self.params.per_page,
            &self.settings.web_url,
            now(),
        )
    }

    async fn fetch_detail(&self, id: &str, search_area: &str) -> Result<ListingRecord, FetchError> {
        let url = self.detail_url(id);
        let body = self.client.get_json(&url).await?;
        parse_detail(&body, &url, id, search_area, &self.listing_url(id), now())
    }

    fn source(&self) -> Source {
        Source::SpareRoom
    }
}

fn listing_url(web_url: &str, id: &str) -> String {
    format!(
        "{}/flatshare/flatshare_detail.pl?flatshare_id={}",
        web_url.trim_end_matches('/'),
        id
    )
}

/// Numbers come back as JSON numbers or as strings like "650.00".
fn number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_f64().map(|f| f as u32),
        Value::String(s) => parse_money(s),
        _ => None,
    }
}

fn text<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn check_full_week(id: &str, advert: &Value) -> Result<(), FetchError> {
    match text(advert.get("days_of_wk_available")) {
        Some(days) if days != FULL_WEEK => Err(FetchError::Rejected {
            id: id.to_string(),
            reason: format!("available {days}"),
        }),
        _ => Ok(()),
    }
}

fn rent_of(amount: Option<&Value>, per: Option<&Value>) -> Option<u32> {
    let amount = number(amount)?;
    let period = text(per).map(RentPeriod::from_label).unwrap_or(RentPeriod::Monthly);
    monthly_rent(amount, period)
}

pub(crate) fn parse_search_page(
    body: &Value,
    url: &str,
    area: &str,
    per_page: u32,
    web_url: &str,
    now: NaiveDateTime,
) -> Result<SearchPage, FetchError> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::parse(url, "missing `results` array"))?;

    let page = number(body.get("page")).unwrap_or(1);
    let pages = number(body.get("pages")).unwrap_or(page);
    let total_results = number(body.get("count"))
        .or_else(|| Some(pages.saturating_mul(per_page)))
        .map(|n| n as usize);

    let hits = results
        .iter()
        .filter_map(|result| {
            let id = id_of(result.get("advert_id"))?;
            let summary = parse_summary(result, &id, area, web_url, now);
            Some(SearchHit { id, summary })
        })
        .collect();

    Ok(SearchPage {
        hits,
        total_results,
        has_more: page < pages,
    })
}

/// Record built from a search result alone; fewer fields than a detail fetch.
fn parse_summary(
    result: &Value,
    id: &str,
    area: &str,
    web_url: &str,
    now: NaiveDateTime,
) -> Option<ListingRecord> {
    if let Err(err) = check_full_week(id, result) {
        debug!(listing_id = %id, "{}", err);
        return None;
    }

    let per = result.get("per");
    let prices: Vec<u32> = ["min_rent", "max_rent"]
        .iter()
        .filter_map(|key| rent_of(result.get(*key), per))
        .collect();

    Some(ListingRecord {
        id: id.to_string(),
        source: Source::SpareRoom,
        search_area: area.to_string(),
        images: text(result.get("main_image_square_url"))
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        station: text(result.get("station_name")).unwrap_or(NO_DETAILS).to_string(),
        prices,
        deposits: vec![],
        bills_included: text(result.get("bills_inc")) == Some("Yes"),
        rooms_in_property: number(result.get("rooms_in_property")),
        housemate_count: None,
        female_count: None,
        male_count: None,
        phone: Phone::None,
        available_label: NO_DETAILS.to_string(),
        available: now,
        is_new: true,
        score: None,
        url: listing_url(web_url, id),
        fetched_at: Utc::now(),
    })
}

pub(crate) fn parse_detail(
    body: &Value,
    url: &str,
    id: &str,
    search_area: &str,
    listing_url: &str,
    now: NaiveDateTime,
) -> Result<ListingRecord, FetchError> {
    let advert = body
        .get("advert_summary")
        .ok_or_else(|| FetchError::parse(url, "missing `advert_summary`"))?;

    check_full_week(id, advert)?;

    let phone = text(advert.get("tel"))
        .or_else(|| text(advert.get("tel_formatted")))
        .map(|tel| Phone::Number(tel.to_string()))
        .unwrap_or(Phone::None);

    let images = advert
        .get("photos")
        .and_then(Value::as_array)
        .map(|photos| {
            photos
                .iter()
                .filter_map(|photo| text(photo.get("large_url")).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let station = advert
        .get("nearest_station")
        .and_then(|station| text(station.get("station_name")))
        .unwrap_or(NO_DETAILS)
        .to_string();

    let available_label = text(advert.get("available")).unwrap_or("Now").to_string();

    let mut prices = Vec::new();
    let mut deposits = Vec::new();
    match advert.get("rooms").and_then(Value::as_array) {
        Some(rooms) => {
            for room in rooms {
                if let Some(deposit) = number(room.get("security_deposit")) {
                    deposits.push(deposit);
                }
                if let Some(price) = rent_of(room.get("room_price"), room.get("room_per")) {
                    prices.push(price);
                }
            }
        }
        None => {
            let per = advert.get("per");
            if let Some(price) =
                rent_of(advert.get("min_rent"), per).or_else(|| rent_of(advert.get("max_rent"), per))
            {
                prices.push(price);
            }
        }
    }

    Ok(ListingRecord {
        id: id.to_string(),
        source: Source::SpareRoom,
        search_area: search_area.to_string(),
        images,
        station,
        prices,
        deposits,
        bills_included: text(advert.get("bills_inc")) == Some("Yes"),
        rooms_in_property: number(advert.get("rooms_in_property")),
        housemate_count: number(advert.get("occupants")),
        female_count: Some(number(advert.get("number_of_females")).unwrap_or(0)),
        male_count: Some(number(advert.get("number_of_males")).unwrap_or(0)),
        phone,
        available: parse_available(&available_label, now),
        available_label,
        is_new: true,
        score: None,
        url: listing_url.to_string(),
        fetched_at: Utc::now(),
    })
}
