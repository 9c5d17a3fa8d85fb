// tests/reconcile_flow.rs
//
// Discovery, re-rating and reporting against a JSON store on disk.
//
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use room_finder::error::FetchError;
use room_finder::models::{SearchHit, SearchPage};
use room_finder::report::{render_html, select_rows, ReportField, ReportFilter, RowKind};
use room_finder::scoring::{Preferences, Weights};
use room_finder::{
    FileConfig, JsonFileStorage, ListingRecord, ListingStore, Phone, ReconcileOptions, Reconciler,
    RunMode, Scorer, Source, Storage,
};
use std::collections::HashMap;
use tempfile::TempDir;

fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

fn record(id: &str, station: &str, price: u32, available: NaiveDateTime) -> ListingRecord {
    ListingRecord {
        id: id.to_string(),
        source: Source::SpareRoom,
        search_area: String::new(),
        images: vec![format!("http://img/{id}.jpg")],
        station: station.to_string(),
        prices: vec![price],
        deposits: vec![price],
        bills_included: false,
        rooms_in_property: Some(3),
        housemate_count: Some(2),
        female_count: Some(1),
        male_count: Some(1),
        phone: Phone::None,
        available_label: available.format("%d %b %Y").to_string(),
        available,
        is_new: true,
        score: None,
        url: format!("https://rooms.example/{id}"),
        fetched_at: Utc::now(),
    }
}

/// Serves one search page per area and a detail record per id.
struct CannedSource {
    pages: HashMap<String, Vec<&'static str>>,
    details: HashMap<String, ListingRecord>,
}

#[async_trait]
impl room_finder::scrapers::SourceAdapter for CannedSource {
    async fn search(&self, area: &str, page: u32) -> Result<SearchPage, FetchError> {
        let ids = match (self.pages.get(area), page) {
            (Some(ids), 1) => ids.clone(),
            _ => Vec::new(),
        };
        Ok(SearchPage {
            total_results: Some(ids.len()),
            has_more: false,
            hits: ids
                .into_iter()
                .map(|id| SearchHit {
                    id: id.to_string(),
                    summary: None,
                })
                .collect(),
        })
    }

    async fn fetch_detail(&self, id: &str, search_area: &str) -> Result<ListingRecord, FetchError> {
        let mut record = self.details.get(id).cloned().ok_or_else(|| FetchError::Rejected {
            id: id.to_string(),
            reason: "weekdays only".to_string(),
        })?;
        record.search_area = search_area.to_string();
        Ok(record)
    }

    fn source(&self) -> Source {
        Source::SpareRoom
    }
}

fn canned_source() -> CannedSource {
    let mut pages = HashMap::new();
    pages.insert("Angel".to_string(), vec!["101", "102", "103"]);
    pages.insert("Bow".to_string(), vec!["201"]);

    let details = [
        record("101", "Angel", 700, day(2015, 3, 1)),
        record("102", "Bow", 900, day(2015, 4, 15)),
        // Available far too early
        record("201", "Bow", 650, day(2014, 6, 1)),
    ]
    .into_iter()
    .map(|r| (r.id.clone(), r))
    .collect();

    CannedSource { pages, details }
}

fn scorer() -> Scorer {
    Scorer::new(
        Preferences {
            areas: vec!["Angel".to_string(), "Bow".to_string()],
            target_rent: 750,
            move_in: day(2015, 3, 1),
            min_available: day(2015, 1, 1),
        },
        Weights::default(),
    )
}

#[tokio::test]
async fn discovery_persists_and_report_ranks_new_listings() {
    let dir = TempDir::new().unwrap();
    let storage = JsonFileStorage::new(dir.path().join("data").join("spareroom.json"));
    let source = canned_source();
    let scorer = scorer();
    let areas = vec!["Angel".to_string(), "Bow".to_string()];
    let reconciler = Reconciler::new(&scorer, ReconcileOptions::default());

    let mut store = reconciler.load_store(&storage).await;
    assert!(store.is_empty());

    let summary = reconciler
        .run(RunMode::Discover, &mut store, &source, &storage, &areas)
        .await;
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.excluded, 1);

    // What is on disk matches what is in memory
    let reloaded = ListingStore::load_or_empty(&storage).await;
    assert_eq!(reloaded.ids(), vec!["101", "102", "201"]);
    assert_eq!(reloaded.get("201").unwrap().score, Some(0.0));
    assert!(!reloaded.get("201").unwrap().is_new);

    let sorted = reloaded.get_sorted();
    assert_eq!(sorted[0].id, "101");
    let pref_ids = vec!["201".to_string()];
    let filter = ReportFilter {
        pref_ids: &pref_ids,
        ..Default::default()
    };
    let rows = select_rows(&sorted, &filter);
    let ids: Vec<&str> = rows.iter().map(|r| r.record.id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "201"]);
    assert_eq!(rows[2].kind, RowKind::Preferred);

    let html = render_html("spareroom", &rows, &[ReportField::Id, ReportField::Search]);
    assert!(html.contains("<a href=\"https://rooms.example/101\">101</a>"));
    assert!(html.contains("<td>Bow</td>"));
}

#[tokio::test]
async fn second_run_skips_known_listings_and_mark_old_ages_them() {
    let dir = TempDir::new().unwrap();
    let storage = JsonFileStorage::new(dir.path().join("spareroom.json"));
    let source = canned_source();
    let scorer = scorer();
    let areas = vec!["Angel".to_string()];

    let first = Reconciler::new(&scorer, ReconcileOptions::default());
    let mut store = first.load_store(&storage).await;
    first
        .run(RunMode::Discover, &mut store, &source, &storage, &areas)
        .await;

    let options = ReconcileOptions {
        mark_old: true,
        ..ReconcileOptions::default()
    };
    let second = Reconciler::new(&scorer, options);
    let mut store = second.load_store(&storage).await;
    assert!(store.ids().iter().all(|id| !store.get(id).unwrap().is_new));

    let summary = second
        .run(RunMode::Discover, &mut store, &source, &storage, &areas)
        .await;
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.skipped, 2);

    // Nothing new and nothing preferred leaves an empty report
    let sorted = store.get_sorted();
    assert!(select_rows(&sorted, &ReportFilter::default()).is_empty());

    // Re-rating marks everything new again
    let summary = second
        .run(RunMode::Rate, &mut store, &source, &storage, &areas)
        .await;
    assert_eq!(summary.rated, 2);
    let reloaded = ListingStore::load_or_empty(&storage).await;
    assert!(reloaded.get("101").unwrap().is_new);
}

#[tokio::test]
async fn corrupt_store_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gumtree.json");
    std::fs::write(&path, "{ not json").unwrap();

    let storage = JsonFileStorage::new(&path);
    assert!(storage.load().await.is_err());
    let store = ListingStore::load_or_empty(&storage).await;
    assert!(store.is_empty());
}

#[test]
fn settings_file_drives_scoring_preferences() {
    let config = FileConfig::from_toml(
        r#"
        [preferences]
        areas = ["Angel", "Bow"]
        target_rent = 750
        move_in = "2015-03-01"
        min_available = "2015-01-01"

        [spareroom]
        enabled = true
        "#,
    )
    .unwrap();
    let settings = config.validate().unwrap();

    let scorer = Scorer::new(settings.preferences.clone(), settings.weights.clone());
    let mut listing = record("101", "Angel", 700, day(2015, 3, 1));
    let breakdown = scorer.rate(&mut listing).unwrap();
    assert_eq!(breakdown.area, 100.0);
    assert!(!breakdown.excluded);
    assert_eq!(listing.score, Some(breakdown.total));
}
