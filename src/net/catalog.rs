//! Read-only typed clients for browseable catalog resources.
//!
//! Each resource kind gets its own named client. They share transport via
//! [`RestClient`], but a hotel client can never be handed a cultural
//! attraction path by accident.

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::rest::RestClient;
use super::types::ApiError;

// =============================================================================
// RECORDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub link: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nb_beds: Option<u32>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Shared shape of cultural and physical attractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attraction {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub is_free_access: bool,
    #[serde(default)]
    pub access_amount: Option<f64>,
    #[serde(default)]
    pub is_kids_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CulturalAttraction(pub Attraction);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalAttraction(pub Attraction);

/// Mean of all rating values, `None` when unrated.
#[must_use]
pub fn average_rating(ratings: &[Rating]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = ratings.len() as f64;
    Some(ratings.iter().map(|r| r.value).sum::<f64>() / count)
}

impl Hotel {
    #[must_use]
    pub fn average_rating(&self) -> Option<f64> {
        average_rating(&self.ratings)
    }
}

impl Attraction {
    #[must_use]
    pub fn average_rating(&self) -> Option<f64> {
        average_rating(&self.ratings)
    }

    /// Entry price, `None` for free access.
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        if self.is_free_access { None } else { Some(self.access_amount.unwrap_or(0.0)) }
    }

    /// OpenStreetMap link centered on the attraction, when located.
    #[must_use]
    pub fn map_url(&self) -> Option<String> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        Some(format!("https://www.openstreetmap.org/?mlat={lat}&mlon={lon}#map=15/{lat}/{lon}"))
    }
}

// =============================================================================
// CLIENTS
// =============================================================================

/// A catalog resource served under a fixed collection path.
pub trait CatalogResource: DeserializeOwned + Send {
    /// Collection path, e.g. `/amenity/Hotels`.
    const PATH: &'static str;
}

impl CatalogResource for Hotel {
    const PATH: &'static str = "/amenity/Hotels";
}

impl CatalogResource for CulturalAttraction {
    const PATH: &'static str = "/attraction/Culturals";
}

impl CatalogResource for PhysicalAttraction {
    const PATH: &'static str = "/attraction/Physicals";
}

#[derive(Debug, Clone)]
pub struct CatalogClient<R> {
    rest: RestClient,
    _resource: PhantomData<fn() -> R>,
}

pub type HotelsClient = CatalogClient<Hotel>;
pub type CulturalAttractionsClient = CatalogClient<CulturalAttraction>;
pub type PhysicalAttractionsClient = CatalogClient<PhysicalAttraction>;

impl<R: CatalogResource> CatalogClient<R> {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest, _resource: PhantomData }
    }

    pub(crate) fn item_path(id: i64) -> String {
        format!("{}/{id}", R::PATH)
    }

    /// Fetch the whole collection.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or an item does not decode.
    pub async fn list(&self) -> Result<Vec<R>, ApiError> {
        self.rest.get_json(R::PATH).await
    }

    /// Fetch one item by id.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the item does not decode.
    pub async fn get(&self, id: i64) -> Result<R, ApiError> {
        self.rest.get_json(&Self::item_path(id)).await
    }
}
