// Row and payload types for the `packages`, `package_itinerary` and `destinations` tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// A row of the `packages` table, as returned by the backend
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Package {
    pub id: String,
    pub destination_id: String,
    pub title: String,
    pub description: String,
    pub duration: u32,
    pub price: f64,
    pub image_url: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// Insert payload; id and timestamps are assigned by the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPackage {
    pub destination_id: String,
    pub title: String,
    pub description: String,
    pub duration: u32,
    pub price: f64,
    pub image_url: String,
    pub rating: f64,
}

// Partial update payload. Absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl PackageChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, package: &mut Package) {
        if let Some(destination_id) = &self.destination_id {
            package.destination_id = destination_id.clone();
        }
        if let Some(title) = &self.title {
            package.title = title.clone();
        }
        if let Some(description) = &self.description {
            package.description = description.clone();
        }
        if let Some(duration) = self.duration {
            package.duration = duration;
        }
        if let Some(price) = self.price {
            package.price = price;
        }
        if let Some(image_url) = &self.image_url {
            package.image_url = image_url.clone();
        }
        if let Some(rating) = self.rating {
            package.rating = rating;
        }
    }
}

// Writes every editable field back; used to restore a package after a failed save
impl From<&Package> for PackageChanges {
    fn from(package: &Package) -> Self {
        Self {
            destination_id: Some(package.destination_id.clone()),
            title: Some(package.title.clone()),
            description: Some(package.description.clone()),
            duration: Some(package.duration),
            price: Some(package.price),
            image_url: Some(package.image_url.clone()),
            rating: Some(package.rating),
        }
    }
}

// A row of the `package_itinerary` table. One per package.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Itinerary {
    pub package_id: String,
    pub day_count: u32,
    #[serde(default)]
    pub descriptions: Vec<String>,
}

impl Itinerary {
    pub fn new(package_id: impl Into<String>, descriptions: Vec<String>) -> Self {
        Self {
            package_id: package_id.into(),
            day_count: descriptions.len() as u32,
            descriptions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
}

// The record assembled by the package form on submit.
// `id` is only present when an existing package is being edited.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDraft {
    pub id: Option<String>,
    pub destination_id: String,
    pub title: String,
    pub description: String,
    pub duration: u32,
    pub price: f64,
    pub image_url: String,
    pub rating: f64,
    pub itinerary: Vec<String>,
}

impl PackageDraft {
    pub fn is_edit(&self) -> bool {
        self.id.is_some()
    }

    pub fn to_new_package(&self) -> NewPackage {
        NewPackage {
            destination_id: self.destination_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            duration: self.duration,
            price: self.price,
            image_url: self.image_url.clone(),
            rating: self.rating,
        }
    }

    pub fn to_changes(&self) -> PackageChanges {
        PackageChanges {
            destination_id: Some(self.destination_id.clone()),
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            duration: Some(self.duration),
            price: Some(self.price),
            image_url: Some(self.image_url.clone()),
            rating: Some(self.rating),
        }
    }
}
