use std::cmp::Ordering;

use geo::algorithm::centroid::Centroid;
use geo_types::{MultiPoint, Point};

use super::dataset_types::{Attraction, Listing};
use super::DatasetError;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Arithmetic mean of the attraction coordinates. Not a geodesic centroid,
/// which is fine at the scale of one city.
pub fn attractions_centroid(attractions: &[Attraction]) -> Option<Point<f64>> {
    let points: Vec<Point<f64>> = attractions.iter().map(|a| a.location).collect();
    MultiPoint(points).centroid()
}

/// Great circle distance in km. No antimeridian or pole handling.
pub fn haversine_km(from: &Point<f64>, to: &Point<f64>) -> f64 {
    let (lon1, lat1) = (from.x().to_radians(), from.y().to_radians());
    let (lon2, lat2) = (to.x().to_radians(), to.y().to_radians());

    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    c * EARTH_RADIUS_KM
}

/// Distance from a point to the centroid of the loaded attractions.
pub fn compute_distance(
    attractions: &[Attraction],
    latitude: f64,
    longitude: f64,
) -> Result<f64, DatasetError> {
    let centroid = attractions_centroid(attractions)
        .ok_or(DatasetError::DataEmpty { table: "attractions" })?;

    Ok(haversine_km(&centroid, &Point::from((longitude, latitude))))
}

/// Fills `distance_km` for every listing and sorts the table by it. Views
/// reuse this order as the closeness ranking, so the sort is stable.
pub fn locate_listings(
    mut listings: Vec<Listing>,
    attractions: &[Attraction],
) -> Result<Vec<Listing>, DatasetError> {
    let centroid = attractions_centroid(attractions)
        .ok_or(DatasetError::DataEmpty { table: "attractions" })?;

    for listing in listings.iter_mut() {
        listing.distance_km = haversine_km(&centroid, &listing.location);
    }

    listings.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
    });

    Ok(listings)
}
