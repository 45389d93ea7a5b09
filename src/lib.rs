// Tour package administration: a package form model and a cached package store
// over a table-oriented backend

pub mod backend;
pub mod form;
pub mod itinerary;
pub mod memory;
pub mod model;
pub mod rest;
pub mod store;

// Re-export key types for convenience
pub use backend::{Backend, BackendError, Operation, PackageQuery};
pub use form::{FnSaver, FormError, LoadTicket, PackageForm, SavePackage, ValidationError};
pub use itinerary::{check_days, resize_days, ItineraryError, MAX_DURATION_DAYS};
pub use memory::{BackendCall, InMemoryBackend};
pub use model::{Destination, Itinerary, NewPackage, Package, PackageChanges, PackageDraft};
pub use rest::{ConfigError, RestBackend, RestConfig};
pub use store::{FetchOutcome, PackageStore, StoreError};
