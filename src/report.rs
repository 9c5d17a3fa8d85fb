//! Ranked HTML report of stored listings.

use crate::models::ListingRecord;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::Path;

const MAX_THUMBNAILS: usize = 5;

/// A column of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportField {
    Score,
    Id,
    Images,
    Prices,
    Deposits,
    /// Area search that found the listing
    Search,
    Station,
    Available,
    Bills,
    Rooms,
    Housemates,
    Phone,
}

impl ReportField {
    pub fn header(self) -> &'static str {
        match self {
            ReportField::Score => "Score",
            ReportField::Id => "Id",
            ReportField::Images => "Images",
            ReportField::Prices => "Prices",
            ReportField::Deposits => "Deposits",
            ReportField::Search => "Search",
            ReportField::Station => "Station",
            ReportField::Available => "Available",
            ReportField::Bills => "Bills",
            ReportField::Rooms => "Rooms",
            ReportField::Housemates => "Housemates",
            ReportField::Phone => "Phone",
        }
    }
}

/// Which listings make it into the report.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter<'a> {
    /// Listings shown even when they are not new
    pub pref_ids: &'a [String],
    /// Stop after this many rows
    pub max_rows: Option<usize>,
    /// Skip listings available before this
    pub min_available: Option<NaiveDateTime>,
    /// Only listings found by these area searches; empty means any
    pub areas: &'a [String],
}

/// Why a row is shown; decides its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    New,
    Preferred,
}

impl RowKind {
    fn css_class(self) -> &'static str {
        match self {
            RowKind::New => "success",
            RowKind::Preferred => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow<'a> {
    pub record: &'a ListingRecord,
    pub kind: RowKind,
}

/// Walk listings in score order and keep the ones worth showing.
pub fn select_rows<'a>(
    sorted: &[&'a ListingRecord],
    filter: &ReportFilter<'_>,
) -> Vec<ReportRow<'a>> {
    let areas: Vec<String> = filter.areas.iter().map(|a| a.to_lowercase()).collect();
    let limit = filter.max_rows.unwrap_or(usize::MAX);
    let mut rows = Vec::new();

    for record in sorted.iter().copied() {
        if rows.len() >= limit {
            break;
        }
        if filter.min_available.is_some_and(|min| record.available < min) {
            continue;
        }
        if !areas.is_empty() && !areas.contains(&record.search_area.to_lowercase()) {
            continue;
        }

        let kind = if record.is_new {
            RowKind::New
        } else if filter.pref_ids.contains(&record.id) {
            RowKind::Preferred
        } else {
            continue;
        };

        rows.push(ReportRow { record, kind });
    }

    rows
}

/// Render the selected rows as a bootstrap-styled HTML table.
pub fn render_html(title: &str, rows: &[ReportRow<'_>], fields: &[ReportField]) -> String {
    let mut html = format!(
        "<html><head><meta charset=\"utf-8\"><title>{} Classified Ads</title>\
         <link rel=\"stylesheet\" href=\"https://maxcdn.bootstrapcdn.com/bootstrap/3.3.1/css/bootstrap.min.css\">\
         </head><body><table class=\"table\"><thead><tr>",
        escape(title)
    );
    for field in fields {
        html.push_str(&format!("<th>{}</th>", field.header()));
    }
    html.push_str("</tr></thead><tbody>");

    for row in rows {
        html.push_str(&format!("<tr class=\"{}\">", row.kind.css_class()));
        for field in fields {
            html.push_str(&format!("<td>{}</td>", cell(row.record, *field)));
        }
        html.push_str("</tr>");
    }

    html.push_str("</tbody></table></body></html>");
    html
}

/// Write a rendered report to disk.
pub async fn write_report(path: &Path, html: &str) -> std::io::Result<()> {
    tokio::fs::write(path, html).await
}

fn cell(record: &ListingRecord, field: ReportField) -> String {
    match field {
        ReportField::Score => format!("{:.2}", record.score_or_zero()),
        ReportField::Id => format!(
            "<a href=\"{}\">{}</a>",
            escape(&record.url),
            escape(&record.id)
        ),
        ReportField::Images => record
            .images
            .iter()
            .take(MAX_THUMBNAILS)
            .map(|img| {
                let img = escape(img);
                format!("<a href=\"{img}\"><img src=\"{img}\" height=\"100\" width=\"100\"></a>")
            })
            .collect(),
        ReportField::Prices => join(&record.prices),
        ReportField::Deposits => join(&record.deposits),
        ReportField::Search => escape(&record.search_area),
        ReportField::Station => escape(&record.station),
        ReportField::Available => escape(&record.available_label),
        ReportField::Bills => if record.bills_included { "Yes" } else { "No" }.to_string(),
        ReportField::Rooms => record
            .rooms_in_property
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string()),
        ReportField::Housemates => match record.housemate_count {
            Some(n) => format!(
                "{} ({}F/{}M)",
                n,
                record.female_count.unwrap_or(0),
                record.male_count.unwrap_or(0)
            ),
            None => "?".to_string(),
        },
        ReportField::Phone => escape(&record.phone.to_string()),
    }
}

fn join(values: &[u32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{at, listing};
    use crate::store::ListingStore;

    fn record(id: &str, score: f64, is_new: bool) -> ListingRecord {
        let mut r = listing(id);
        r.score = Some(score);
        r.is_new = is_new;
        r
    }

    fn ids(rows: &[ReportRow<'_>]) -> Vec<String> {
        rows.iter().map(|r| r.record.id.clone()).collect()
    }

    #[test]
    fn test_pref_id_forces_stale_listing_in() {
        let store: ListingStore = vec![
            record("a", 80.0, true),
            record("b", 0.0, false),
            record("c", 45.0, false),
        ]
        .into_iter()
        .collect();
        let pref_ids = vec!["b".to_string()];
        let filter = ReportFilter {
            pref_ids: &pref_ids,
            max_rows: Some(2),
            ..Default::default()
        };

        let rows = select_rows(&store.get_sorted(), &filter);
        assert_eq!(ids(&rows), vec!["a", "b"]);
        assert_eq!(rows[0].kind, RowKind::New);
        assert_eq!(rows[1].kind, RowKind::Preferred);
    }

    #[test]
    fn test_max_rows_stops_before_preferred() {
        let store: ListingStore = vec![
            record("a", 80.0, true),
            record("b", 0.0, false),
            record("c", 45.0, true),
        ]
        .into_iter()
        .collect();
        let pref_ids = vec!["b".to_string()];
        let filter = ReportFilter {
            pref_ids: &pref_ids,
            max_rows: Some(2),
            ..Default::default()
        };

        let rows = select_rows(&store.get_sorted(), &filter);
        assert_eq!(ids(&rows), vec!["a", "c"]);
    }

    #[test]
    fn test_unlimited_rows_skip_stale() {
        let store: ListingStore = vec![
            record("a", 10.0, false),
            record("b", 20.0, true),
            record("c", 30.0, true),
        ]
        .into_iter()
        .collect();
        let rows = select_rows(&store.get_sorted(), &ReportFilter::default());
        assert_eq!(ids(&rows), vec!["c", "b"]);
    }

    #[test]
    fn test_min_available_and_area_filters() {
        let mut early = record("early", 90.0, true);
        early.available = at(2015, 1, 1);
        let mut elsewhere = record("elsewhere", 80.0, true);
        elsewhere.search_area = "Hackney".to_string();
        let fine = record("fine", 70.0, true);

        let store: ListingStore = vec![early, elsewhere, fine].into_iter().collect();
        let areas = vec!["paddington".to_string()];
        let filter = ReportFilter {
            min_available: Some(at(2015, 2, 1)),
            areas: &areas,
            ..Default::default()
        };
        let rows = select_rows(&store.get_sorted(), &filter);
        assert_eq!(ids(&rows), vec!["fine"]);
    }

    #[test]
    fn test_render_html() {
        let mut r = record("12", 61.234, true);
        r.images = (0..7).map(|i| format!("http://img/{i}.jpg")).collect();
        r.station = "King's Cross <St Pancras>".to_string();
        let rows = vec![ReportRow {
            record: &r,
            kind: RowKind::New,
        }];
        let fields = [
            ReportField::Score,
            ReportField::Id,
            ReportField::Images,
            ReportField::Station,
            ReportField::Housemates,
        ];

        let html = render_html("SpareRoom", &rows, &fields);
        assert!(html.contains("<title>SpareRoom Classified Ads</title>"));
        assert!(html.contains("<th>Score</th><th>Id</th>"));
        assert!(html.contains("<tr class=\"success\">"));
        assert!(html.contains("<td>61.23</td>"));
        assert!(html.contains("<a href=\"https://example.com/12\">12</a>"));
        assert_eq!(html.matches("<img ").count(), 5);
        assert!(html.contains("King's Cross &lt;St Pancras&gt;"));
        assert!(html.contains("<td>?</td>"));
    }
}
