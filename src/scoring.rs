//! Listing desirability scoring.
//!
//! Each dimension produces a sub-score on a 0-100 scale; the final score is
//! their weighted sum. Sub-scores are not clamped where the formula can run
//! past 100 (e.g. a property with no other rooms), so totals may land
//! slightly outside 0-100.

use crate::error::{ConfigError, ScoreError};
use crate::models::ListingRecord;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A scored aspect of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScoreDimension {
    Area,
    Price,
    Deposit,
    Bills,
    Rooms,
    Housemates,
    Images,
    Availability,
}

impl ScoreDimension {
    pub const ALL: [ScoreDimension; 8] = [
        ScoreDimension::Area,
        ScoreDimension::Price,
        ScoreDimension::Deposit,
        ScoreDimension::Bills,
        ScoreDimension::Rooms,
        ScoreDimension::Housemates,
        ScoreDimension::Images,
        ScoreDimension::Availability,
    ];

    /// Weight before normalization. Price and deposit share 0.05, split 3:1.
    pub fn default_weight(self) -> f64 {
        match self {
            ScoreDimension::Area => 0.25,
            ScoreDimension::Price => 0.0375,
            ScoreDimension::Deposit => 0.0125,
            ScoreDimension::Bills => 0.05,
            ScoreDimension::Rooms => 0.20,
            ScoreDimension::Housemates => 0.20,
            ScoreDimension::Images => 0.05,
            ScoreDimension::Availability => 0.15,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dim| dim.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScoreDimension::Area => "area",
            ScoreDimension::Price => "price",
            ScoreDimension::Deposit => "deposit",
            ScoreDimension::Bills => "bills",
            ScoreDimension::Rooms => "rooms",
            ScoreDimension::Housemates => "housemates",
            ScoreDimension::Images => "images",
            ScoreDimension::Availability => "availability",
        }
    }
}

/// Per-dimension weights, always summing to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    values: BTreeMap<ScoreDimension, f64>,
}

impl Weights {
    /// Merge `overrides` over the default weights and rescale to sum to 1.0.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for negative or non-finite
    /// weights, or when every weight is zero.
    pub fn with_overrides(overrides: &BTreeMap<ScoreDimension, f64>) -> Result<Self, ConfigError> {
        let mut values: BTreeMap<ScoreDimension, f64> = ScoreDimension::ALL
            .iter()
            .map(|dim| (*dim, dim.default_weight()))
            .collect();

        for (dim, weight) in overrides {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("weights.{}", dim.name()),
                    reason: format!("{weight} is not a non-negative number"),
                });
            }
            values.insert(*dim, *weight);
        }

        let total: f64 = values.values().sum();
        if total <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "weights".to_string(),
                reason: "all weights are zero".to_string(),
            });
        }

        for weight in values.values_mut() {
            *weight /= total;
        }

        Ok(Self { values })
    }

    pub fn get(&self, dim: ScoreDimension) -> f64 {
        self.values.get(&dim).copied().unwrap_or(0.0)
    }
}

impl Default for Weights {
    fn default() -> Self {
        let values: BTreeMap<ScoreDimension, f64> = ScoreDimension::ALL
            .iter()
            .map(|dim| (*dim, dim.default_weight()))
            .collect();
        let total: f64 = values.values().sum();
        Self {
            values: values.into_iter().map(|(dim, w)| (dim, w / total)).collect(),
        }
    }
}

/// What the user is looking for.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    /// Preferred stations/areas, best first
    pub areas: Vec<String>,
    /// Monthly rent the user aims for
    pub target_rent: u32,
    /// Desired move-in date
    pub move_in: NaiveDateTime,
    /// Listings available before this are excluded outright
    pub min_available: NaiveDateTime,
}

/// Every sub-score of one listing plus the weighted total.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub area: f64,
    pub price: f64,
    pub deposit: f64,
    pub bills: f64,
    pub rooms: f64,
    /// Absent when the housemate count is unknown
    pub housemates: Option<f64>,
    pub images: f64,
    pub availability: f64,
    /// True when the listing is available before the minimum date
    pub excluded: bool,
    pub total: f64,
}

impl ScoreBreakdown {
    /// Sub-scores that take part in the weighted sum.
    pub fn terms(&self) -> Vec<(ScoreDimension, f64)> {
        let mut terms = vec![
            (ScoreDimension::Area, self.area),
            (ScoreDimension::Price, self.price),
            (ScoreDimension::Deposit, self.deposit),
            (ScoreDimension::Bills, self.bills),
            (ScoreDimension::Rooms, self.rooms),
        ];
        if let Some(housemates) = self.housemates {
            terms.push((ScoreDimension::Housemates, housemates));
        }
        terms.push((ScoreDimension::Images, self.images));
        terms.push((ScoreDimension::Availability, self.availability));
        terms
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (dim, value) in self.terms() {
            writeln!(f, "{:>13}: {:.2}", dim.name(), value)?;
        }
        if self.housemates.is_none() {
            writeln!(f, "{:>13}: n/a", ScoreDimension::Housemates.name())?;
        }
        if self.excluded {
            writeln!(f, "     excluded: available before minimum date")?;
        }
        write!(f, "{:>13}: {:.2}", "total", self.total)
    }
}

/// Scores listings against fixed preferences and weights.
#[derive(Debug, Clone)]
pub struct Scorer {
    preferences: Preferences,
    weights: Weights,
    areas_lower: Vec<String>,
}

impl Scorer {
    pub fn new(preferences: Preferences, weights: Weights) -> Self {
        let areas_lower = preferences.areas.iter().map(|a| a.to_lowercase()).collect();
        Self {
            preferences,
            weights,
            areas_lower,
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Compute every sub-score and the weighted total for `record`.
    ///
    /// # Errors
    /// Returns [`ScoreError::NoPrices`] when the record carries no rent.
    pub fn breakdown(&self, record: &ListingRecord) -> Result<ScoreBreakdown, ScoreError> {
        let price = record.min_price().ok_or_else(|| ScoreError::NoPrices {
            id: record.id.clone(),
        })?;
        let target = self.preferences.target_rent;

        let mut breakdown = ScoreBreakdown {
            area: area_score(&record.station, &self.areas_lower),
            price: rent_score(price, target),
            deposit: rent_score(record.min_deposit().unwrap_or(0), target),
            bills: if record.bills_included { 100.0 } else { 0.0 },
            rooms: rooms_score(record.rooms_in_property),
            housemates: housemates_score(record.housemate_count, record.female_count),
            images: images_score(record.images.len()),
            availability: availability_score(self.preferences.move_in, record.available),
            excluded: record.available < self.preferences.min_available,
            total: 0.0,
        };

        breakdown.total = if breakdown.excluded {
            0.0
        } else {
            breakdown
                .terms()
                .into_iter()
                .map(|(dim, value)| value * self.weights.get(dim))
                .sum()
        };

        Ok(breakdown)
    }

    /// Recompute the score of `record` in place.
    ///
    /// Listings available before the minimum date get score 0 and lose
    /// their new flag. On error the record is left untouched.
    pub fn rate(&self, record: &mut ListingRecord) -> Result<ScoreBreakdown, ScoreError> {
        let breakdown = self.breakdown(record)?;

        debug!(
            listing_id = %record.id,
            area = breakdown.area,
            price = breakdown.price,
            deposit = breakdown.deposit,
            rooms = breakdown.rooms,
            housemates = ?breakdown.housemates,
            images = breakdown.images,
            availability = breakdown.availability,
            total = breakdown.total,
            "scored listing"
        );

        if breakdown.excluded {
            record.is_new = false;
        }
        record.score = Some(breakdown.total);

        Ok(breakdown)
    }
}

/// Rank-based: first preferred area scores 100, last scores 100/N.
pub fn area_score(station: &str, areas_lower: &[String]) -> f64 {
    let station = station.trim().to_lowercase();
    let n = areas_lower.len();
    match areas_lower.iter().position(|area| *area == station) {
        Some(idx) => (n - idx) as f64 * (100.0 / n as f64),
        None => 0.0,
    }
}

/// 50 at the target; loses a point per 10 over, gains a point per 10 under.
pub fn rent_score(value: u32, target: u32) -> f64 {
    let diff = (f64::from(value) - f64::from(target)).abs();
    if value >= target {
        (50.0 - diff / 10.0).max(0.0)
    } else {
        (50.0 + diff / 10.0).min(100.0)
    }
}

pub fn rooms_score(rooms: Option<u32>) -> f64 {
    match rooms {
        Some(rooms) => (100.0 - (f64::from(rooms) - 1.0) * 15.0).max(0.0),
        None => 0.0,
    }
}

/// Half for few housemates, half for the share of female housemates.
pub fn housemates_score(housemates: Option<u32>, females: Option<u32>) -> Option<f64> {
    let housemates = housemates?;
    let few = (100.0 - (f64::from(housemates) - 1.0) * 10.0).max(0.0) / 2.0;
    let female_share = if housemates == 0 {
        0.0
    } else {
        f64::from(females.unwrap_or(0)) / f64::from(housemates) * 100.0 / 2.0
    };
    Some(few + female_share)
}

pub fn images_score(count: usize) -> f64 {
    (25.0 * count as f64).min(100.0)
}

/// Loses a point per day between availability and the desired move-in.
pub fn availability_score(move_in: NaiveDateTime, available: NaiveDateTime) -> f64 {
    let seconds = (move_in - available).num_seconds().abs() as f64;
    (100.0 - seconds / SECONDS_PER_DAY).max(0.0)
}
