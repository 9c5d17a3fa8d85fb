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
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const NO_DETAILS: &str = "No Details";

/// Gumtree flatshare scraper working off the public HTML pages
pub struct GumtreeScraper {
    client: PoliteClient,
    settings: SourceSettings,
    params: SearchParams,
}

impl GumtreeScraper {
    pub fn new(settings: SourceSettings, params: SearchParams, delay: Duration) -> Result<Self> {
        let client = PoliteClient::new(USER_AGENT, delay, &settings.cookies)?;
        Ok(Self {
            client,
            settings,
            params,
        })
    }

    fn base(&self) -> &str {
        self.settings.web_url.trim_end_matches('/')
    }

    fn search_url(&self, area: &str, page: u32) -> Result<Url, FetchError> {
        let base = format!("{}/search", self.base());
        let mut query: Vec<(&str, String)> = vec![
            ("search_category", "flatshare".to_string()),
            ("search_location", area.to_lowercase()),
            ("max_price", self.params.max_rent.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(room_type) = &self.params.room_type {
            query.push(("room_type", room_type.clone()));
        }
        if let Some(rooms_for) = &self.params.rooms_for {
            query.push(("seeking", rooms_for.clone()));
        }

        Url::parse_with_params(&base, &query).map_err(|e| FetchError::parse(base, e.to_string()))
    }

    fn listing_url(&self, id: &str) -> String {
        format!("{}/p/flatshare/{}", self.base(), id)
    }
}

#[async_trait]
impl SourceAdapter for GumtreeScraper {
    async fn search(&self, area: &str, page: u32) -> Result<SearchPage, FetchError> {
        let url = self.search_url(area, page)?;
        let html = self.client.get_text(url.as_str()).await?;
        parse_search_html(&html, url.as_str(), area, self.base(), now())
    }

    async fn fetch_detail(&self, id: &str, search_area: &str) -> Result<ListingRecord, FetchError> {
        let url = self.listing_url(id);
        let html = self.client.get_text(&url).await?;
        parse_detail_html(&html, &url, id, search_area, now())
    }

    fn source(&self) -> Source {
        Source::Gumtree
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::parse(css, format!("bad selector: {e:?}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>, FetchError> {
    let selector = selector(css)?;
    Ok(scope
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty()))
}

/// "£160pw" -> monthly rent
fn rent_from_text(text: &str) -> Option<u32> {
    let amount = parse_money(text)?;
    let lower = text.to_lowercase();
    let period = if lower.contains("pw") || lower.contains("week") {
        RentPeriod::Weekly
    } else {
        RentPeriod::Monthly
    };
    monthly_rent(amount, period)
}

/// "Paddington, London" -> "Paddington"
fn location_station(location: &str) -> Option<String> {
    location
        .split(',')
        .next()
        .map(str::trim)
        .filter(|place| !place.is_empty())
        .map(str::to_string)
}

/// Listing id is the last path segment of the listing link.
fn id_from_href(href: &str) -> Option<String> {
    href.split(['?', '#'])
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_search_html(
    html: &str,
    url: &str,
    area: &str,
    base: &str,
    now: NaiveDateTime,
) -> Result<SearchPage, FetchError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let card_selector = selector("article.listing-maxi")?;
    let link_selector = selector("a.listing-link")?;
    let image_selector = selector("img")?;
    let next_selector = selector(".pagination-next a")?;

    let total_results = first_text(root, ".search-results-count")?.and_then(|text| {
        text.split(|c: char| !c.is_ascii_digit() && c != ',')
            .filter_map(|part| part.replace(',', "").parse::<usize>().ok())
            .last()
    });

    let mut hits = Vec::new();
    for card in document.select(&card_selector) {
        let Some(id) = card
            .select(&link_selector)
            .next()
            .and_then(|link| link.value().attr("href"))
            .and_then(id_from_href)
        else {
            continue;
        };

        let price = first_text(card, ".listing-price")?.and_then(|t| rent_from_text(&t));
        let summary = price.map(|price| {
            let images = card
                .select(&image_selector)
                .filter_map(|img| img.value().attr("data-src").or(img.value().attr("src")))
                .map(str::to_string)
                .collect();
            ListingRecord {
                id: id.clone(),
                source: Source::Gumtree,
                search_area: area.to_string(),
                images,
                station: first_text(card, ".listing-location span")
                    .ok()
                    .flatten()
                    .and_then(|location| location_station(&location))
                    .unwrap_or_else(|| NO_DETAILS.to_string()),
                prices: vec![price],
                deposits: vec![],
                bills_included: false,
                rooms_in_property: None,
                housemate_count: None,
                female_count: None,
                male_count: None,
                phone: Phone::None,
                available_label: NO_DETAILS.to_string(),
                available: now,
                is_new: true,
                score: None,
                url: format!("{base}/p/flatshare/{id}"),
                fetched_at: Utc::now(),
            }
        });

        hits.push(SearchHit { id, summary });
    }

    if hits.is_empty() && total_results.is_none() {
        let no_results = first_text(root, ".search-no-results")?.is_some();
        if !no_results {
            return Err(FetchError::parse(url, "no listing cards or result count found"));
        }
    }

    Ok(SearchPage {
        hits,
        total_results,
        has_more: document.select(&next_selector).next().is_some(),
    })
}

/// Value of a `dt`/`dd` attribute pair, matched on the lowercased label.
fn attribute_value<'a>(attributes: &'a [(String, String)], label: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key.trim_end_matches(':') == label)
        .map(|(_, value)| value.as_str())
}

pub(crate) fn parse_detail_html(
    html: &str,
    url: &str,
    id: &str,
    search_area: &str,
    now: NaiveDateTime,
) -> Result<ListingRecord, FetchError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let price_text = first_text(root, ".ad-price")?
        .ok_or_else(|| FetchError::parse(url, "listing has no price"))?;

    let dt_selector = selector("dl.ad-attributes dt")?;
    let attributes: Vec<(String, String)> = document
        .select(&dt_selector)
        .filter_map(|dt| {
            let dd = dt
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "dd")?;
            Some((element_text(dt).to_lowercase(), element_text(dd)))
        })
        .collect();

    let image_selector = selector(".gallery img")?;
    let images = document
        .select(&image_selector)
        .filter_map(|img| img.value().attr("data-src").or(img.value().attr("src")))
        .map(str::to_string)
        .collect();

    let description = first_text(root, ".ad-description")?.unwrap_or_default();
    let bills_included = attribute_value(&attributes, "bills included")
        .map(|v| v.eq_ignore_ascii_case("yes"))
        .unwrap_or_else(|| description.to_lowercase().contains("bills included"));

    let phone = first_text(root, ".phone-number")?
        .map(Phone::Number)
        .unwrap_or(Phone::None);

    let available_label = attribute_value(&attributes, "date available").unwrap_or("Now").to_string();

    Ok(ListingRecord {
        id: id.to_string(),
        source: Source::Gumtree,
        search_area: search_area.to_string(),
        images,
        station: attribute_value(&attributes, "nearest station").unwrap_or(NO_DETAILS).to_string(),
        prices: rent_from_text(&price_text).into_iter().collect(),
        deposits: attribute_value(&attributes, "deposit").and_then(parse_money).into_iter().collect(),
        bills_included,
        rooms_in_property: attribute_value(&attributes, "number of bedrooms")
            .or_else(|| attribute_value(&attributes, "bedrooms"))
            .and_then(parse_money),
        housemate_count: attribute_value(&attributes, "number of housemates").and_then(parse_money),
        female_count: None,
        male_count: None,
        phone,
        available: parse_available(&available_label, now),
        available_label,
        is_new: true,
        score: None,
        url: url.to_string(),
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::at;

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <div class="search-results-count">Showing 1 - 2 of 1,204 ads</div>
          <article class="listing-maxi">
            <a class="listing-link" href="/p/flatshare/double-room-near-paddington/1098765432">
              <img data-src="http://img/1.jpg">
              <span class="listing-price">£160pw</span>
              <div class="listing-location"><span>Paddington, London</span></div>
            </a>
          </article>
          <article class="listing-maxi">
            <a class="listing-link" href="/p/flatshare/box-room/1098765433?utm=x">
              <span class="listing-price">Please contact</span>
            </a>
          </article>
          <article class="listing-maxi"><span>sponsored</span></article>
          <ul><li class="pagination-next"><a href="?page=2">Next</a></li></ul>
        </body></html>
    "#;

    const DETAIL_PAGE: &str = r#"
        <html><body>
          <h1 id="ad-title">Lovely double room</h1>
          <strong class="ad-price">£700pm</strong>
          <dl class="ad-attributes">
            <dt>Date available</dt><dd>01/03/2015</dd>
            <dt>Deposit:</dt><dd>£700</dd>
            <dt>Number of bedrooms</dt><dd>3</dd>
            <dt>Number of housemates</dt><dd>2</dd>
            <dt>Nearest station</dt><dd>Marble Arch</dd>
          </dl>
          <ul class="gallery"><li><img src="http://img/a.jpg"></li><li><img src="http://img/b.jpg"></li></ul>
          <p class="ad-description">Great flat. Bills included, fast wifi.</p>
          <span class="phone-number">07700 900000</span>
        </body></html>
    "#;

    #[test]
    fn test_id_from_href() {
        assert_eq!(id_from_href("/p/flatshare/room/123").as_deref(), Some("123"));
        assert_eq!(id_from_href("/p/flatshare/room/123/?x=1").as_deref(), Some("123"));
        assert_eq!(id_from_href(""), None);
    }

    #[test]
    fn test_parse_search_html() {
        let page = parse_search_html(SEARCH_PAGE, "url", "Paddington", "https://gt", at(2015, 1, 1)).unwrap();
        assert_eq!(page.total_results, Some(1204));
        assert!(page.has_more);
        assert_eq!(page.hits.len(), 2);

        let first = &page.hits[0];
        assert_eq!(first.id, "1098765432");
        let summary = first.summary.as_ref().unwrap();
        assert_eq!(summary.prices, vec![693]);
        assert_eq!(summary.station, "Paddington");
        assert_eq!(summary.images, vec!["http://img/1.jpg".to_string()]);
        assert_eq!(summary.url, "https://gt/p/flatshare/1098765432");

        assert_eq!(page.hits[1].id, "1098765433");
        assert!(page.hits[1].summary.is_none());
    }

    #[test]
    fn test_unrecognised_search_page_is_error() {
        let err = parse_search_html("<html><body><p>captcha</p></body></html>", "url", "x", "b", at(2015, 1, 1))
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn test_empty_search_page_is_ok() {
        let html = r#"<div class="search-no-results">No results</div>"#;
        let page = parse_search_html(html, "url", "x", "b", at(2015, 1, 1)).unwrap();
        assert!(page.hits.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_detail_html() {
        let record = parse_detail_html(DETAIL_PAGE, "https://gt/p/flatshare/9", "9", "Marylebone", at(2015, 1, 1)).unwrap();
        assert_eq!(record.source, Source::Gumtree);
        assert_eq!(record.prices, vec![700]);
        assert_eq!(record.deposits, vec![700]);
        assert_eq!(record.rooms_in_property, Some(3));
        assert_eq!(record.housemate_count, Some(2));
        assert_eq!(record.female_count, None);
        assert_eq!(record.station, "Marble Arch");
        assert_eq!(record.available, at(2015, 3, 1));
        assert_eq!(record.available_label, "01/03/2015");
        assert_eq!(record.images.len(), 2);
        assert!(record.bills_included);
        assert_eq!(record.phone, Phone::Number("07700 900000".to_string()));
        assert_eq!(record.url, "https://gt/p/flatshare/9");
    }

    #[test]
    fn test_location_station() {
        assert_eq!(location_station("Paddington, London").as_deref(), Some("Paddington"));
        assert_eq!(location_station("Angel").as_deref(), Some("Angel"));
        assert_eq!(location_station(" , London"), None);
    }

    #[test]
    fn test_huge_weekly_prices() {
        let html = r#"<strong class="ad-price">£99,999,999pw</strong>"#;
        let record = parse_detail_html(html, "url", "9", "x", at(2015, 1, 1)).unwrap();
        assert_eq!(record.prices, vec![433_333_329]);

        let html = r#"<strong class="ad-price">£4,000,000,000pw</strong>"#;
        let record = parse_detail_html(html, "url", "9", "x", at(2015, 1, 1)).unwrap();
        assert!(record.prices.is_empty());
    }

    #[test]
    fn test_detail_without_price_is_error() {
        let err = parse_detail_html("<html><body></body></html>", "url", "9", "x", at(2015, 1, 1)).unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
