use std::collections::BTreeSet;

use serde;

/// A cleaned listing. `location` follows the geo convention: x is the
/// longitude, y the latitude.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Listing {
    pub id: String,
    pub neighbourhood: String,
    pub location: geo::Point<f64>,
    pub price: f64,
    pub review_scores_rating: f64,
    pub amenities: BTreeSet<String>,
    pub count_amenities: u32,
    pub zipcode: Option<u32>,
    pub host_response_rate: Option<f64>,
    pub reviews_per_month: Option<f64>,
    pub distance_km: f64,
}

impl Listing {
    #[inline]
    pub fn latitude(&self) -> f64 {
        self.location.y()
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.location.x()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attraction {
    pub name: String,
    pub location: geo::Point<f64>,
}

impl Attraction {
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Attraction {
        Attraction {
            name: name.to_owned(),
            location: geo::Point::from((longitude, latitude)),
        }
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.location.y()
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.location.x()
    }
}
