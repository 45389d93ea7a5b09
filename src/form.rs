// Package form: transient edit state for one package record.
// Validates input, assembles a `PackageDraft` and hands it to an injected saver.

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::backend::Backend;
use crate::itinerary::{check_days, resize_days, trim_days, ItineraryError, MAX_DURATION_DAYS};
use crate::model::{Destination, Itinerary, Package, PackageDraft};
use crate::store::PackageStore;

pub const SAVE_FALLBACK_MESSAGE: &str = "Failed to save package";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select a destination")]
    DestinationRequired,

    #[error("Please select a valid destination")]
    UnknownDestination,

    #[error("Title is required")]
    TitleRequired,

    #[error("Description is required")]
    DescriptionRequired,

    #[error("Duration must be between 1 and 365 days")]
    InvalidDuration,

    #[error("Price must be greater than 0")]
    InvalidPrice,

    #[error("Image URL is required")]
    ImageUrlRequired,

    #[error(transparent)]
    Itinerary(#[from] ItineraryError),
}

#[derive(Error, Debug)]
pub enum FormError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Itinerary is still loading")]
    ItineraryLoading,

    #[error("Form is already closed")]
    Closed,

    #[error("{}", save_message(.0))]
    Save(anyhow::Error),
}

fn save_message(err: &anyhow::Error) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        SAVE_FALLBACK_MESSAGE.to_string()
    } else {
        message
    }
}

// Persists an assembled draft and returns the saved package row
#[async_trait]
pub trait SavePackage: Send + Sync {
    async fn save(&self, draft: PackageDraft) -> anyhow::Result<Package>;
}

// Adapts an async closure into a saver
pub struct FnSaver<F>(pub F);

#[async_trait]
impl<F, Fut> SavePackage for FnSaver<F>
where
    F: Fn(PackageDraft) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Package>> + Send,
{
    async fn save(&self, draft: PackageDraft) -> anyhow::Result<Package> {
        (self.0)(draft).await
    }
}

// Holds the submitting flag for the duration of a save, including when the save future is dropped
struct SubmittingGuard<'a>(&'a mut bool);

impl<'a> SubmittingGuard<'a> {
    fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItineraryState {
    // Editing an existing package whose itinerary has not been requested yet
    Unloaded,
    Loading(u64),
    Ready,
}

// Handle for one itinerary fetch; only the most recent ticket is honoured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    package_id: String,
    generation: u64,
}

impl LoadTicket {
    pub fn package_id(&self) -> &str {
        &self.package_id
    }
}

pub struct PackageForm {
    existing: Option<Package>,
    destinations: Vec<Destination>,
    destination_id: String,
    title: String,
    description: String,
    duration: String,
    price: String,
    image_url: String,
    itinerary: Vec<String>,
    itinerary_state: ItineraryState,
    load_generation: u64,
    error: Option<String>,
    submitting: bool,
    closed: bool,
    on_close: Option<Box<dyn FnMut() + Send>>,
}

impl PackageForm {
    // `existing` selects edit mode; its itinerary stays locked until loaded
    pub fn new(existing: Option<Package>, destinations: Vec<Destination>) -> Self {
        let mut form = Self {
            existing: None,
            destinations,
            destination_id: String::new(),
            title: String::new(),
            description: String::new(),
            duration: String::new(),
            price: String::new(),
            image_url: String::new(),
            itinerary: Vec::new(),
            itinerary_state: ItineraryState::Ready,
            load_generation: 0,
            error: None,
            submitting: false,
            closed: false,
            on_close: None,
        };

        if let Some(package) = existing {
            form.destination_id = package.destination_id.clone();
            form.title = package.title.clone();
            form.description = package.description.clone();
            form.duration = package.duration.to_string();
            form.price = package.price.to_string();
            form.image_url = package.image_url.clone();
            form.itinerary = resize_days(&[], package.duration as i64);
            form.itinerary_state = ItineraryState::Unloaded;
            form.existing = Some(package);
        }

        form
    }

    pub fn with_on_close<F>(mut self, on_close: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_close = Some(Box::new(on_close));
        self
    }

    pub fn is_edit(&self) -> bool {
        self.existing.is_some()
    }

    pub fn existing(&self) -> Option<&Package> {
        self.existing.as_ref()
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn duration(&self) -> &str {
        &self.duration
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn itinerary(&self) -> &[String] {
        &self.itinerary
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn itinerary_editable(&self) -> bool {
        self.itinerary_state == ItineraryState::Ready
    }

    pub fn can_submit(&self) -> bool {
        !self.submitting && !self.closed && self.itinerary_editable()
    }

    pub fn set_destinations(&mut self, destinations: Vec<Destination>) {
        self.destinations = destinations;
    }

    pub fn set_destination(&mut self, destination_id: impl Into<String>) {
        self.destination_id = destination_id.into();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    // Resizes the itinerary on every change; unparsable input counts as zero days
    pub fn set_duration(&mut self, duration: impl Into<String>) {
        self.duration = duration.into();
        self.itinerary = resize_days(&self.itinerary, self.duration_days());
    }

    pub fn set_price(&mut self, price: impl Into<String>) {
        self.price = price.into();
    }

    pub fn set_image_url(&mut self, image_url: impl Into<String>) {
        self.image_url = image_url.into();
    }

    // Returns false while the itinerary is locked or the day does not exist
    pub fn set_day(&mut self, index: usize, text: impl Into<String>) -> bool {
        if !self.itinerary_editable() {
            return false;
        }
        match self.itinerary.get_mut(index) {
            Some(day) => {
                *day = text.into();
                true
            }
            None => false,
        }
    }

    // Digit strings too long for i64 saturate; resize_days caps the result
    fn duration_days(&self) -> i64 {
        let text = self.duration.trim();
        match text.parse::<i64>() {
            Ok(days) => days,
            Err(_) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => i64::MAX,
            Err(_) => 0,
        }
    }

    // Starts an itinerary fetch for the package being edited. Supersedes any earlier ticket.
    pub fn begin_itinerary_load(&mut self) -> Option<LoadTicket> {
        let package_id = self.existing.as_ref()?.id.clone();
        self.load_generation += 1;
        self.itinerary_state = ItineraryState::Loading(self.load_generation);

        Some(LoadTicket {
            package_id,
            generation: self.load_generation,
        })
    }

    // Applies a fetch result. Stale tickets are ignored and return false.
    // The fetched days are fitted to the duration currently in the form.
    pub fn finish_itinerary_load<E: Display>(
        &mut self,
        ticket: LoadTicket,
        result: Result<Option<Itinerary>, E>,
    ) -> bool {
        if self.closed || self.itinerary_state != ItineraryState::Loading(ticket.generation) {
            warn!(
                package_id = %ticket.package_id,
                "Ignoring stale itinerary load"
            );
            return false;
        }

        let fetched = match result {
            Ok(Some(itinerary)) => itinerary.descriptions,
            Ok(None) => Vec::new(),
            Err(err) => {
                self.error = Some(err.to_string());
                Vec::new()
            }
        };

        self.itinerary = resize_days(&fetched, self.duration_days());
        self.itinerary_state = ItineraryState::Ready;
        true
    }

    pub async fn load_itinerary<B: Backend>(&mut self, store: &PackageStore<B>) -> bool {
        let Some(ticket) = self.begin_itinerary_load() else {
            return false;
        };
        let result = store.get_itinerary(ticket.package_id()).await;
        self.finish_itinerary_load(ticket, result)
    }

    // Checks fields in display order and assembles the trimmed draft
    pub fn validate(&self) -> Result<PackageDraft, ValidationError> {
        let destination_id = self.destination_id.trim();
        if destination_id.is_empty() {
            return Err(ValidationError::DestinationRequired);
        }
        if !self.destinations.is_empty()
            && !self.destinations.iter().any(|d| d.id == destination_id)
        {
            return Err(ValidationError::UnknownDestination);
        }

        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::TitleRequired);
        }

        let description = self.description.trim();
        if description.is_empty() {
            return Err(ValidationError::DescriptionRequired);
        }

        let duration = self
            .duration
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|d| (1..=MAX_DURATION_DAYS).contains(d))
            .ok_or(ValidationError::InvalidDuration)?;

        let price = self
            .price
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or(ValidationError::InvalidPrice)?;

        let image_url = self.image_url.trim();
        if image_url.is_empty() {
            return Err(ValidationError::ImageUrlRequired);
        }

        check_days(&self.itinerary)?;

        Ok(PackageDraft {
            id: self.existing.as_ref().map(|p| p.id.clone()),
            destination_id: destination_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            duration,
            price,
            image_url: image_url.to_string(),
            rating: self.existing.as_ref().map_or(0.0, |p| p.rating),
            itinerary: trim_days(&self.itinerary),
        })
    }

    // Validates, saves through `saver` and closes on success.
    // On failure the message is kept in `error()` and the form stays open.
    pub async fn submit<S>(&mut self, saver: &S) -> Result<Package, FormError>
    where
        S: SavePackage + ?Sized,
    {
        if self.closed {
            return Err(FormError::Closed);
        }
        self.error = None;

        if !self.itinerary_editable() {
            return Err(self.fail(FormError::ItineraryLoading));
        }

        let draft = match self.validate() {
            Ok(draft) => draft,
            Err(err) => return Err(self.fail(err.into())),
        };

        let result = {
            let _submitting = SubmittingGuard::new(&mut self.submitting);
            saver.save(draft).await
        };

        match result {
            Ok(package) => {
                self.close();
                Ok(package)
            }
            Err(err) => Err(self.fail(FormError::Save(err))),
        }
    }

    fn fail(&mut self, err: FormError) -> FormError {
        self.error = Some(err.to_string());
        err
    }

    // Closes the form once. Pending itinerary loads become stale.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.load_generation += 1;
        if let Some(on_close) = self.on_close.as_mut() {
            on_close();
        }
    }
}
