//! In-memory listing store and its durable backing.

use crate::error::StorageError;
use crate::models::ListingRecord;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Durable storage for the listing set of one source.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load every stored listing, keyed by id.
    async fn load(&self) -> Result<HashMap<String, ListingRecord>, StorageError>;

    /// Replace the stored listing set.
    async fn save(&self, listings: &HashMap<String, ListingRecord>) -> Result<(), StorageError>;

    /// Where the listings live, for log messages and sibling files.
    fn location(&self) -> &Path;
}

/// Listings persisted as one JSON object mapping id to record.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load(&self) -> Result<HashMap<String, ListingRecord>, StorageError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })?;

        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, listings: &HashMap<String, ListingRecord>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(listings).map_err(StorageError::Serialize)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StorageError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Listings of one source, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ListingStore {
    listings: HashMap<String, ListingRecord>,
}

impl ListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store, starting empty when storage is missing or unreadable.
    pub async fn load_or_empty(storage: &dyn Storage) -> Self {
        match storage.load().await {
            Ok(listings) => {
                info!(
                    count = listings.len(),
                    path = %storage.location().display(),
                    "loaded listings"
                );
                Self { listings }
            }
            Err(err) => {
                warn!(op = "load", error = %err, "starting with an empty store");
                Self::default()
            }
        }
    }

    /// Persist the store. Failures are logged; in-memory state is kept.
    pub async fn persist(&self, storage: &dyn Storage) -> bool {
        match storage.save(&self.listings).await {
            Ok(()) => {
                debug!(
                    count = self.listings.len(),
                    path = %storage.location().display(),
                    "saved listings"
                );
                true
            }
            Err(err) => {
                error!(op = "save", error = %err, "failed to persist listings");
                false
            }
        }
    }

    /// Flag every listing as seen before.
    pub fn mark_all_old(&mut self) {
        for record in self.listings.values_mut() {
            record.is_new = false;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.listings.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ListingRecord> {
        self.listings.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ListingRecord> {
        self.listings.get_mut(id)
    }

    /// Insert or fully replace the listing with the same id.
    pub fn upsert(&mut self, record: ListingRecord) {
        self.listings.insert(record.id.clone(), record);
    }

    /// Ids in a stable order, so runs over the store are reproducible.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.listings.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Listings by score, highest first. Unscored listings count as zero;
    /// equal scores fall back to id order.
    pub fn get_sorted(&self) -> Vec<&ListingRecord> {
        let mut sorted: Vec<&ListingRecord> = self.listings.values().collect();
        sorted.sort_by(|a, b| {
            b.score_or_zero()
                .partial_cmp(&a.score_or_zero())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        sorted
    }
}

impl FromIterator<ListingRecord> for ListingStore {
    fn from_iter<I: IntoIterator<Item = ListingRecord>>(iter: I) -> Self {
        Self {
            listings: iter.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    /// Storage double that keeps the last saved set and counts saves.
    #[derive(Default)]
    pub struct MemoryStorage {
        pub saved: Mutex<Option<HashMap<String, ListingRecord>>>,
        pub saves: Mutex<usize>,
        pub fail_saves: bool,
        path: PathBuf,
    }

    impl MemoryStorage {
        pub fn failing() -> Self {
            Self {
                fail_saves: true,
                ..Self::default()
            }
        }

        pub fn save_count(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn load(&self) -> Result<HashMap<String, ListingRecord>, StorageError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }

        async fn save(&self, listings: &HashMap<String, ListingRecord>) -> Result<(), StorageError> {
            *self.saves.lock().unwrap() += 1;
            if self.fail_saves {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            *self.saved.lock().unwrap() = Some(listings.clone());
            Ok(())
        }

        fn location(&self) -> &Path {
            &self.path
        }
    }
}
