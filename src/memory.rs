// In-process backend with the same table semantics as the REST backend.
// Records every call and supports injected failures and delays, so the store and form run offline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::backend::{
    Backend, BackendError, Operation, PackageQuery, ITINERARY_TABLE, PACKAGES_TABLE,
};
use crate::model::{Destination, Itinerary, NewPackage, Package, PackageChanges};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    SelectPackages { destination_id: Option<String> },
    SelectPackage { id: String },
    InsertPackage { title: String },
    UpdatePackage { id: String },
    DeletePackage { id: String },
    SelectItinerary { package_id: String },
    InsertItinerary { package_id: String, day_count: u32 },
    UpdateItinerary { package_id: String, day_count: u32 },
    SelectDestinations,
}

impl BackendCall {
    pub fn operation(&self) -> Operation {
        match self {
            BackendCall::SelectPackages { .. } => Operation::SelectPackages,
            BackendCall::SelectPackage { .. } => Operation::SelectPackage,
            BackendCall::InsertPackage { .. } => Operation::InsertPackage,
            BackendCall::UpdatePackage { .. } => Operation::UpdatePackage,
            BackendCall::DeletePackage { .. } => Operation::DeletePackage,
            BackendCall::SelectItinerary { .. } => Operation::SelectItinerary,
            BackendCall::InsertItinerary { .. } => Operation::InsertItinerary,
            BackendCall::UpdateItinerary { .. } => Operation::UpdateItinerary,
            BackendCall::SelectDestinations => Operation::SelectDestinations,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            BackendCall::SelectPackages { .. }
                | BackendCall::SelectPackage { .. }
                | BackendCall::SelectItinerary { .. }
                | BackendCall::SelectDestinations
        )
    }
}

// Insertion sequence breaks ties between rows created within the same clock tick
struct StoredPackage {
    sequence: u64,
    package: Package,
}

#[derive(Default)]
pub struct InMemoryBackend {
    packages: DashMap<String, StoredPackage>,
    itineraries: DashMap<String, Itinerary>,
    destinations: Mutex<Vec<Destination>>,
    calls: Mutex<Vec<BackendCall>>,
    failures: Mutex<HashMap<Operation, String>>,
    delays: Mutex<HashMap<Operation, Duration>>,
    sequence: AtomicU64,
    request_count: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destinations(destinations: Vec<Destination>) -> Self {
        let backend = Self::new();
        *backend.destinations.lock() = destinations;
        backend
    }

    // Seeds rows directly without recording calls
    pub fn seed_package(&self, package: Package) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.packages
            .insert(package.id.clone(), StoredPackage { sequence, package });
    }

    pub fn seed_itinerary(&self, itinerary: Itinerary) {
        self.itineraries
            .insert(itinerary.package_id.clone(), itinerary);
    }

    // The next call of `operation` fails with an API error carrying `message`
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.failures.lock().insert(operation, message.into());
    }

    pub fn set_delay(&self, operation: Operation, delay: Duration) {
        self.delays.lock().insert(operation, delay);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<BackendCall> {
        self.calls().into_iter().filter(|c| c.is_write()).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn package(&self, id: &str) -> Option<Package> {
        self.packages.get(id).map(|stored| stored.package.clone())
    }

    pub fn itinerary(&self, package_id: &str) -> Option<Itinerary> {
        self.itineraries.get(package_id).map(|i| i.clone())
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    async fn begin(&self, call: BackendCall) -> Result<(), BackendError> {
        let operation = call.operation();
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(call);

        let delay = self.delays.lock().get(&operation).copied();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().remove(&operation);
        match failure {
            Some(message) => Err(BackendError::Api {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }

    fn check_destination(&self, destination_id: &str) -> Result<(), BackendError> {
        let destinations = self.destinations.lock();
        if !destinations.is_empty() && !destinations.iter().any(|d| d.id == destination_id) {
            return Err(BackendError::Api {
                status: 409,
                message: format!(
                    "insert or update on table \"{}\" violates foreign key constraint on destination_id {}",
                    PACKAGES_TABLE, destination_id
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn select_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, BackendError> {
        self.begin(BackendCall::SelectPackages {
            destination_id: query.destination_id.clone(),
        })
        .await?;

        let mut rows: Vec<(u64, Package)> = self
            .packages
            .iter()
            .filter(|entry| {
                query
                    .destination_id
                    .as_ref()
                    .map_or(true, |d| &entry.package.destination_id == d)
            })
            .map(|entry| (entry.sequence, entry.package.clone()))
            .collect();

        rows.sort_by(|a, b| {
            b.1.created_at
                .cmp(&a.1.created_at)
                .then_with(|| b.0.cmp(&a.0))
        });

        Ok(rows.into_iter().map(|(_, package)| package).collect())
    }

    async fn select_package(&self, id: &str) -> Result<Option<Package>, BackendError> {
        self.begin(BackendCall::SelectPackage { id: id.to_string() })
            .await?;

        Ok(self.package(id))
    }

    async fn insert_package(&self, package: &NewPackage) -> Result<Package, BackendError> {
        self.begin(BackendCall::InsertPackage {
            title: package.title.clone(),
        })
        .await?;
        self.check_destination(&package.destination_id)?;

        let now = Utc::now();
        let row = Package {
            id: Uuid::new_v4().to_string(),
            destination_id: package.destination_id.clone(),
            title: package.title.clone(),
            description: package.description.clone(),
            duration: package.duration,
            price: package.price,
            image_url: package.image_url.clone(),
            rating: package.rating,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.seed_package(row.clone());
        Ok(row)
    }

    async fn update_package(
        &self,
        id: &str,
        changes: &PackageChanges,
    ) -> Result<Package, BackendError> {
        self.begin(BackendCall::UpdatePackage { id: id.to_string() })
            .await?;
        if let Some(destination_id) = &changes.destination_id {
            self.check_destination(destination_id)?;
        }

        let mut stored = self
            .packages
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound {
                table: PACKAGES_TABLE,
                key: id.to_string(),
            })?;
        changes.apply_to(&mut stored.package);
        stored.package.updated_at = Some(Utc::now());
        Ok(stored.package.clone())
    }

    async fn delete_package(&self, id: &str) -> Result<(), BackendError> {
        self.begin(BackendCall::DeletePackage { id: id.to_string() })
            .await?;

        // The itinerary row references the package and goes with it
        self.packages.remove(id);
        self.itineraries.remove(id);
        Ok(())
    }

    async fn select_itinerary(&self, package_id: &str) -> Result<Option<Itinerary>, BackendError> {
        self.begin(BackendCall::SelectItinerary {
            package_id: package_id.to_string(),
        })
        .await?;

        Ok(self.itinerary(package_id))
    }

    async fn insert_itinerary(&self, itinerary: &Itinerary) -> Result<Itinerary, BackendError> {
        self.begin(BackendCall::InsertItinerary {
            package_id: itinerary.package_id.clone(),
            day_count: itinerary.day_count,
        })
        .await?;

        if !self.packages.contains_key(&itinerary.package_id) {
            return Err(BackendError::NotFound {
                table: PACKAGES_TABLE,
                key: itinerary.package_id.clone(),
            });
        }
        if self.itineraries.contains_key(&itinerary.package_id) {
            return Err(BackendError::Api {
                status: 409,
                message: format!(
                    "duplicate key value violates unique constraint on {}.package_id",
                    ITINERARY_TABLE
                ),
            });
        }

        self.seed_itinerary(itinerary.clone());
        Ok(itinerary.clone())
    }

    async fn update_itinerary(
        &self,
        package_id: &str,
        descriptions: &[String],
        day_count: u32,
    ) -> Result<Itinerary, BackendError> {
        self.begin(BackendCall::UpdateItinerary {
            package_id: package_id.to_string(),
            day_count,
        })
        .await?;

        let mut itinerary =
            self.itineraries
                .get_mut(package_id)
                .ok_or_else(|| BackendError::NotFound {
                    table: ITINERARY_TABLE,
                    key: package_id.to_string(),
                })?;
        itinerary.descriptions = descriptions.to_vec();
        itinerary.day_count = day_count;
        Ok(itinerary.clone())
    }

    async fn select_destinations(&self) -> Result<Vec<Destination>, BackendError> {
        self.begin(BackendCall::SelectDestinations).await?;

        let mut destinations = self.destinations.lock().clone();
        destinations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(destinations)
    }
}
