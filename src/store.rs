// Package store: a cached, newest-first list of packages kept in sync with the backend.
// Every operation performs its remote call first and only then reconciles the cache.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError, PackageQuery};
use crate::form::SavePackage;
use crate::itinerary::{check_days, ItineraryError};
use crate::model::{Destination, Itinerary, NewPackage, Package, PackageChanges, PackageDraft};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Itinerary(#[from] ItineraryError),
}

// Clears the loading flag when the fetch that owns `generation` ends, however it ends.
// A superseded fetch leaves the flag to the newer one.
struct LoadingGuard<'a> {
    loading: &'a AtomicBool,
    current: &'a AtomicU64,
    generation: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.current.load(Ordering::SeqCst) == self.generation {
            self.loading.store(false, Ordering::SeqCst);
        }
    }
}

// Outcome of a fetch; a superseded fetch leaves the cache alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(usize),
    Stale,
}

pub struct PackageStore<B: Backend> {
    backend: Arc<B>,
    packages: RwLock<Vec<Package>>,
    filter: RwLock<Option<String>>,
    error: RwLock<Option<String>>,
    loading: AtomicBool,
    generation: AtomicU64,
}

impl<B: Backend> PackageStore<B> {
    // Creates the store without touching the backend
    pub fn new(backend: Arc<B>, destination_filter: Option<String>) -> Self {
        Self {
            backend,
            packages: RwLock::new(Vec::new()),
            filter: RwLock::new(destination_filter),
            error: RwLock::new(None),
            loading: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    // Creates the store and runs the initial fetch. A failed initial fetch is recorded in `error()`.
    pub async fn open(backend: Arc<B>, destination_filter: Option<String>) -> Self {
        let store = Self::new(backend, destination_filter);
        let _ = store.fetch().await;
        store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn packages(&self) -> Vec<Package> {
        self.packages.read().clone()
    }

    pub fn package(&self, id: &str) -> Option<Package> {
        self.packages.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn destination_filter(&self) -> Option<String> {
        self.filter.read().clone()
    }

    // Changes the destination filter and refetches. Setting the same filter again is a no-op.
    pub async fn set_destination_filter(
        &self,
        destination_id: Option<String>,
    ) -> Result<FetchOutcome, StoreError> {
        {
            let mut filter = self.filter.write();
            if *filter == destination_id {
                return Ok(FetchOutcome::Applied(self.packages.read().len()));
            }
            *filter = destination_id;
        }
        // Invalidate any fetch still running for the old filter
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.fetch().await
    }

    pub async fn fetch(&self) -> Result<FetchOutcome, StoreError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = PackageQuery {
            destination_id: self.destination_filter(),
        };

        self.loading.store(true, Ordering::SeqCst);
        let _loading = LoadingGuard {
            loading: &self.loading,
            current: &self.generation,
            generation,
        };
        *self.error.write() = None;

        let result = self.backend.select_packages(&query).await;
        if let Err(err) = &result {
            error!(error = %err, destination_id = ?query.destination_id, "Error fetching packages");
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(
                destination_id = ?query.destination_id,
                "Discarding stale package fetch result"
            );
            return Ok(FetchOutcome::Stale);
        }

        match result {
            Ok(rows) => {
                let count = rows.len();
                *self.packages.write() = rows;
                debug!(count, destination_id = ?query.destination_id, "Fetched packages");
                Ok(FetchOutcome::Applied(count))
            }
            Err(err) => {
                *self.error.write() = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    pub async fn add(&self, package: &NewPackage) -> Result<Package, StoreError> {
        let created = self
            .backend
            .insert_package(package)
            .await
            .map_err(|err| {
                error!(error = %err, title = %package.title, "Error adding package");
                err
            })?;

        self.packages.write().insert(0, created.clone());
        info!(id = %created.id, "Added package");
        Ok(created)
    }

    pub async fn update(&self, id: &str, changes: &PackageChanges) -> Result<Package, StoreError> {
        let updated = self
            .backend
            .update_package(id, changes)
            .await
            .map_err(|err| {
                error!(error = %err, id, "Error updating package");
                err
            })?;

        let mut packages = self.packages.write();
        if let Some(slot) = packages.iter_mut().find(|p| p.id == id) {
            *slot = updated.clone();
        }
        drop(packages);

        info!(id, "Updated package");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.backend.delete_package(id).await.map_err(|err| {
            error!(error = %err, id, "Error deleting package");
            err
        })?;

        self.packages.write().retain(|p| p.id != id);
        info!(id, "Deleted package");
        Ok(())
    }

    pub async fn get_itinerary(&self, package_id: &str) -> Result<Option<Itinerary>, StoreError> {
        let itinerary = self
            .backend
            .select_itinerary(package_id)
            .await
            .map_err(|err| {
                error!(error = %err, package_id, "Error fetching itinerary");
                err
            })?;
        Ok(itinerary)
    }

    // Updates the existing itinerary row or inserts a new one
    pub async fn upsert_itinerary(
        &self,
        package_id: &str,
        descriptions: &[String],
    ) -> Result<Itinerary, StoreError> {
        let day_count = descriptions.len() as u32;

        let result = match self.backend.select_itinerary(package_id).await {
            Ok(Some(_)) => {
                self.backend
                    .update_itinerary(package_id, descriptions, day_count)
                    .await
            }
            Ok(None) => {
                self.backend
                    .insert_itinerary(&Itinerary::new(package_id, descriptions.to_vec()))
                    .await
            }
            Err(err) => Err(err),
        };

        let itinerary = result.map_err(|err| {
            error!(error = %err, package_id, "Error saving itinerary");
            err
        })?;
        debug!(package_id, day_count, "Saved itinerary");
        Ok(itinerary)
    }

    // Saves the package row, then its itinerary.
    // The two writes are not atomic: if the itinerary write fails, the package write is compensated.
    pub async fn save_package(&self, draft: PackageDraft) -> Result<Package, StoreError> {
        check_days(&draft.itinerary)?;

        match &draft.id {
            Some(id) => {
                let previous = self.previous_row(id).await?;
                let saved = self.update(id, &draft.to_changes()).await?;

                if let Err(err) = self.upsert_itinerary(&saved.id, &draft.itinerary).await {
                    match previous {
                        Some(previous) => self.restore(&previous).await,
                        None => warn!(
                            id = %saved.id,
                            "No prior row to restore after failed itinerary save"
                        ),
                    }
                    return Err(err);
                }
                Ok(saved)
            }
            None => {
                let saved = self.add(&draft.to_new_package()).await?;

                if let Err(err) = self.upsert_itinerary(&saved.id, &draft.itinerary).await {
                    self.discard(&saved.id).await;
                    return Err(err);
                }
                Ok(saved)
            }
        }
    }

    // Snapshot of a package before it is edited. Packages outside the cached filter are read from the backend.
    async fn previous_row(&self, id: &str) -> Result<Option<Package>, StoreError> {
        if let Some(cached) = self.package(id) {
            return Ok(Some(cached));
        }
        let row = self.backend.select_package(id).await.map_err(|err| {
            error!(error = %err, id, "Error reading package before update");
            err
        })?;
        Ok(row)
    }

    // Loads the destination list offered by the package form's selector
    pub async fn destinations(&self) -> Result<Vec<Destination>, StoreError> {
        let destinations = self.backend.select_destinations().await.map_err(|err| {
            error!(error = %err, "Error fetching destinations");
            err
        })?;
        debug!(count = destinations.len(), "Fetched destinations");
        Ok(destinations)
    }

    // Removes a package whose itinerary could not be written
    async fn discard(&self, id: &str) {
        match self.delete(id).await {
            Ok(()) => warn!(id, "Removed package after failed itinerary save"),
            Err(err) => warn!(error = %err, id, "Could not remove package after failed itinerary save"),
        }
    }

    // Writes back the fields a package had before a failed save
    async fn restore(&self, previous: &Package) {
        match self.update(&previous.id, &PackageChanges::from(previous)).await {
            Ok(_) => warn!(id = %previous.id, "Restored package after failed itinerary save"),
            Err(err) => warn!(
                error = %err,
                id = %previous.id,
                "Could not restore package after failed itinerary save"
            ),
        }
    }
}

#[async_trait]
impl<B: Backend> SavePackage for PackageStore<B> {
    async fn save(&self, draft: PackageDraft) -> anyhow::Result<Package> {
        Ok(self.save_package(draft).await?)
    }
}
