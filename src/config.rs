//! Configuration loading.
//!
//! Settings come from a TOML file, may be adjusted by command-line flags,
//! and are then validated once into an immutable [`Settings`] that is
//! handed to the scorer, reconciler and report.

use crate::error::ConfigError;
use crate::models::Source;
use crate::report::ReportField;
use crate::scoring::{Preferences, ScoreDimension, Weights};
use crate::scrapers::normalize::now;
use crate::scrapers::types::SearchParams;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Configuration file as written by the user. Everything is optional here;
/// [`FileConfig::validate`] decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub preferences: PreferencesConfig,
    /// Weight overrides keyed by dimension name
    pub weights: BTreeMap<String, f64>,
    pub search: SearchConfig,
    pub report: ReportConfig,
    pub spareroom: SourceConfig,
    pub gumtree: SourceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Preferred stations, best first
    pub areas: Vec<String>,
    /// Monthly rent aimed for
    pub target_rent: Option<u32>,
    /// Desired move-in date; defaults to now
    pub move_in: Option<String>,
    /// Earliest acceptable availability
    pub min_available: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum search pages per area
    pub max_pages: u32,
    /// Results requested per page
    pub per_page: u32,
    /// Seconds to wait before every request
    pub delay_secs: f64,
    pub rooms_for: Option<String>,
    pub room_type: Option<String>,
    pub ensuite_only: bool,
    /// Mark stored listings as not new when loading them
    pub mark_old: bool,
    /// Build records from search results instead of detail pages
    pub fast: bool,
    /// Re-fetch listings that are already stored
    pub force: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            per_page: 50,
            delay_secs: 1.0,
            rooms_for: None,
            room_type: None,
            ensuite_only: false,
            mark_old: false,
            fast: false,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub fields: Vec<ReportField>,
    /// Maximum rows in the report; unlimited when unset
    pub max_rows: Option<usize>,
    /// Hide listings available before the desired move-in date
    pub hide_before_move_in: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fields: vec![
                ReportField::Score,
                ReportField::Id,
                ReportField::Images,
                ReportField::Prices,
                ReportField::Search,
                ReportField::Available,
                ReportField::Phone,
            ],
            max_rows: None,
            hide_before_move_in: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub web_url: Option<String>,
    pub api_url: Option<String>,
    /// Session cookies sent with every request
    pub cookies: BTreeMap<String, String>,
    /// Listings always shown in the report
    pub pref_ids: Vec<String>,
    /// Where the listings are stored; defaults to `<source>.json`
    pub store: Option<PathBuf>,
}

/// Validated, immutable settings for a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub preferences: Preferences,
    pub weights: Weights,
    pub search: SearchOptions,
    pub report: ReportSettings,
    /// Enabled sources only
    pub sources: Vec<SourceSettings>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub params: SearchParams,
    pub max_pages: u32,
    pub delay: Duration,
    pub mark_old: bool,
    pub fast: bool,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub fields: Vec<ReportField>,
    pub max_rows: Option<usize>,
    pub hide_before_move_in: bool,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub source: Source,
    pub web_url: String,
    pub api_url: String,
    pub cookies: BTreeMap<String, String>,
    pub pref_ids: Vec<String>,
    pub store: PathBuf,
}

impl FileConfig {
    /// Read and parse a config file.
    ///
    /// # Errors
    /// Returns error if the file is missing, unreadable or not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn source_config_mut(&mut self, source: Source) -> &mut SourceConfig {
        match source {
            Source::SpareRoom => &mut self.spareroom,
            Source::Gumtree => &mut self.gumtree,
        }
    }

    /// Enable exactly the given sources, overriding the file.
    pub fn select_sources(&mut self, sources: &[Source]) {
        for source in [Source::SpareRoom, Source::Gumtree] {
            self.source_config_mut(source).enabled = sources.contains(&source);
        }
    }

    /// Check required settings and build the run settings.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when a required setting is absent and
    /// [`ConfigError::InvalidValue`] when a value is out of range.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let prefs = self.preferences;
        if prefs.areas.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::Missing("preferences.areas"));
        }
        let target_rent = prefs
            .target_rent
            .ok_or(ConfigError::Missing("preferences.target_rent"))?;
        let min_available = prefs
            .min_available
            .as_deref()
            .ok_or(ConfigError::Missing("preferences.min_available"))
            .and_then(|s| parse_datetime("preferences.min_available", s))?;
        let move_in = match prefs.move_in.as_deref() {
            Some(s) => parse_datetime("preferences.move_in", s)?,
            None => now(),
        };

        let mut overrides = BTreeMap::new();
        for (name, weight) in &self.weights {
            let dim = ScoreDimension::from_name(name).ok_or_else(|| ConfigError::InvalidValue {
                field: format!("weights.{name}"),
                reason: "unknown score dimension".to_string(),
            })?;
            overrides.insert(dim, *weight);
        }
        let weights = Weights::with_overrides(&overrides)?;

        let search = self.search;
        if !search.delay_secs.is_finite() || search.delay_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "search.delay_secs".to_string(),
                reason: format!("{} is not a non-negative number of seconds", search.delay_secs),
            });
        }
        if search.per_page == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.per_page".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut sources = Vec::new();
        for (source, config) in [
            (Source::SpareRoom, self.spareroom),
            (Source::Gumtree, self.gumtree),
        ] {
            if config.enabled {
                sources.push(SourceSettings::from_config(source, config));
            }
        }
        if sources.is_empty() {
            return Err(ConfigError::Missing("spareroom.enabled or gumtree.enabled"));
        }

        Ok(Settings {
            preferences: Preferences {
                areas: prefs
                    .areas
                    .into_iter()
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect(),
                target_rent,
                move_in,
                min_available,
            },
            weights,
            search: SearchOptions {
                params: SearchParams {
                    max_rent: target_rent,
                    rooms_for: search.rooms_for,
                    room_type: search.room_type,
                    per_page: search.per_page,
                    ensuite_only: search.ensuite_only,
                },
                max_pages: search.max_pages,
                delay: Duration::from_secs_f64(search.delay_secs),
                mark_old: search.mark_old,
                fast: search.fast,
                force: search.force,
            },
            report: ReportSettings {
                fields: self.report.fields,
                max_rows: self.report.max_rows,
                hide_before_move_in: self.report.hide_before_move_in,
            },
            sources,
        })
    }
}

impl SourceSettings {
    fn from_config(source: Source, config: SourceConfig) -> Self {
        let (default_web, default_api) = match source {
            Source::SpareRoom => (
                "http://www.spareroom.co.uk",
                "http://iphoneapp.spareroom.co.uk",
            ),
            Source::Gumtree => ("https://www.gumtree.com", "https://www.gumtree.com"),
        };
        Self {
            source,
            web_url: config.web_url.unwrap_or_else(|| default_web.to_string()),
            api_url: config.api_url.unwrap_or_else(|| default_api.to_string()),
            cookies: config.cookies,
            pref_ids: config.pref_ids,
            store: config
                .store
                .unwrap_or_else(|| PathBuf::from(format!("{}.json", source.name()))),
        }
    }
}

fn parse_datetime(field: &str, value: &str) -> Result<NaiveDateTime, ConfigError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("`{value}` is not a date (expected YYYY-MM-DD [HH:MM:SS])"),
        })
}
