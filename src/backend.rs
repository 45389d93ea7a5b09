// Table-oriented backend collaborator consumed by the package store

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Destination, Itinerary, NewPackage, Package, PackageChanges};

pub const PACKAGES_TABLE: &str = "packages";
pub const ITINERARY_TABLE: &str = "package_itinerary";
pub const DESTINATIONS_TABLE: &str = "destinations";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("No row in {table} for {key}")]
    NotFound { table: &'static str, key: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

// Select filter for the packages table; results are always newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageQuery {
    pub destination_id: Option<String>,
}

impl PackageQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_destination(destination_id: impl Into<String>) -> Self {
        Self {
            destination_id: Some(destination_id.into()),
        }
    }
}

// Operation names, used for logging and for injecting failures in the in-memory backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SelectPackages,
    SelectPackage,
    InsertPackage,
    UpdatePackage,
    DeletePackage,
    SelectItinerary,
    InsertItinerary,
    UpdateItinerary,
    SelectDestinations,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn select_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, BackendError>;

    async fn select_package(&self, id: &str) -> Result<Option<Package>, BackendError>;

    // Returns the inserted row with its generated id and timestamps
    async fn insert_package(&self, package: &NewPackage) -> Result<Package, BackendError>;

    // Returns the updated row
    async fn update_package(
        &self,
        id: &str,
        changes: &PackageChanges,
    ) -> Result<Package, BackendError>;

    async fn delete_package(&self, id: &str) -> Result<(), BackendError>;

    async fn select_itinerary(&self, package_id: &str) -> Result<Option<Itinerary>, BackendError>;

    async fn insert_itinerary(&self, itinerary: &Itinerary) -> Result<Itinerary, BackendError>;

    async fn update_itinerary(
        &self,
        package_id: &str,
        descriptions: &[String],
        day_count: u32,
    ) -> Result<Itinerary, BackendError>;

    async fn select_destinations(&self) -> Result<Vec<Destination>, BackendError>;
}
