mod cleaning;
mod dataset_types;
mod distance;
mod facilities;

use std::io;

use failure::Fail;
use log::{info, warn};
use serde;

use crate::config::PreparerConfig;

pub use self::cleaning::{load_and_clean, CleaningReport, LoadOptions};
pub use self::dataset_types::{Attraction, Listing};
pub use self::distance::{compute_distance, locate_listings};
pub use self::facilities::{build_facility_matrix, FacilityVocabulary, FeatureError, FeatureMatrix};

#[derive(Debug, Fail)]
pub enum DatasetError {
    #[fail(display = "Column '{}' not found in the {} input", column, table)]
    Schema { table: &'static str, column: String },
    #[fail(display = "No valid {} remain after cleaning", table)]
    DataEmpty { table: &'static str },
    #[fail(display = "Feature matrix error: {}", _0)]
    Feature(FeatureError),
    #[fail(display = "Invalid pattern: {}", _0)]
    Pattern(regex::Error),
    #[fail(display = "I/O error: {}", _0)]
    Io(io::Error),
    #[fail(display = "Csv error: {}", _0)]
    Csv(csv::Error),
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> DatasetError {
        DatasetError::Csv(err)
    }
}

impl From<io::Error> for DatasetError {
    fn from(err: io::Error) -> DatasetError {
        DatasetError::Io(err)
    }
}

impl From<regex::Error> for DatasetError {
    fn from(err: regex::Error) -> DatasetError {
        DatasetError::Pattern(err)
    }
}

impl From<FeatureError> for DatasetError {
    fn from(err: FeatureError) -> DatasetError {
        DatasetError::Feature(err)
    }
}

/// Everything the views read, built once and never changed afterwards.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PreparedDataset {
    /// Sorted by distance to the attractions centroid, closest first.
    pub listings: Vec<Listing>,
    pub attractions: Vec<Attraction>,
    pub features: FeatureMatrix,
    pub facilities: FacilityVocabulary,
}

impl PreparedDataset {
    /// Distance of an arbitrary point to the attractions of this dataset.
    pub fn distance_to_attractions(&self, latitude: f64, longitude: f64) -> Result<f64, DatasetError> {
        compute_distance(&self.attractions, latitude, longitude)
    }
}

pub fn prepare(
    listings_input: &mut dyn io::Read,
    attractions_input: &mut dyn io::Read,
    config: &PreparerConfig,
    options: &LoadOptions,
) -> Result<(PreparedDataset, CleaningReport), DatasetError> {
    let (listings, attractions, report) = load_and_clean(listings_input, attractions_input, options)?;
    info!(
        "Kept {} of {} listings and {} attractions",
        report.accepted_rows,
        report.total_rows,
        attractions.len()
    );

    let listings = locate_listings(listings, &attractions)?;

    let (features, facilities) = build_facility_matrix(&listings, config)?;
    if facilities.is_empty() {
        warn!("No facility reaches the support threshold, the matrix only has neighbourhoods and distance");
    }
    info!(
        "Feature matrix has {} columns, {} of them facilities",
        features.columns().len(),
        facilities.len()
    );

    Ok((
        PreparedDataset {
            listings,
            attractions,
            features,
            facilities,
        },
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::distance::attractions_centroid;
    use crate::config::FacilitySupport;

    const LISTINGS_CSV: &str = include_str!("test_resources/listings_sample.csv");
    const ATTRACTIONS_CSV: &str = include_str!("test_resources/attractions_sample.csv");

    fn low_support_config() -> PreparerConfig {
        PreparerConfig {
            facility_support: FacilitySupport::Count(2),
            ..PreparerConfig::default()
        }
    }

    #[test]
    fn it_should_keep_the_single_valid_price_and_place_it_on_the_attraction() {
        let listings = "id,price,review_scores_rating,neighbourhood,latitude,longitude,amenities\n\
                        1,$50,90,Midtown,40.758896,-73.985130,{Wifi}\n\
                        2,not a price,90,Midtown,40.75,-73.98,{Wifi}\n\
                        3,$0,90,Midtown,40.75,-73.98,{Wifi}\n";
        let attractions = "Attraction,latitude,longitude\nTimes Square,40.758896,-73.985130\n";

        let (dataset, report) = prepare(
            &mut listings.as_bytes(),
            &mut attractions.as_bytes(),
            &PreparerConfig::default(),
            &LoadOptions::default(),
        )
        .unwrap();

        assert_eq!(dataset.listings.len(), 1);
        assert_eq!(dataset.listings[0].id, "1");
        assert_eq!(dataset.listings[0].price, 50.0);
        assert_eq!(dataset.listings[0].distance_km, 0.0);
        assert_eq!(report.rejected_rows(), 2);
    }

    #[test]
    fn it_should_sort_the_prepared_listings_by_distance() {
        let (dataset, _) = prepare(
            &mut LISTINGS_CSV.as_bytes(),
            &mut ATTRACTIONS_CSV.as_bytes(),
            &low_support_config(),
            &LoadOptions::default(),
        )
        .unwrap();

        let ids: Vec<&str> = dataset.listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1005", "1002", "1008"]);
        assert!(dataset
            .listings
            .windows(2)
            .all(|w| w[0].distance_km <= w[1].distance_km));
        assert_eq!(dataset.features.listing_ids(), &["1001", "1005", "1002", "1008"]);
    }

    #[test]
    fn it_should_expose_facilities_and_columns() {
        let (dataset, _) = prepare(
            &mut LISTINGS_CSV.as_bytes(),
            &mut ATTRACTIONS_CSV.as_bytes(),
            &low_support_config(),
            &LoadOptions::default(),
        )
        .unwrap();

        assert_eq!(dataset.facilities.names(), &["Kitchen", "Wifi"]);
        assert_eq!(
            dataset.features.columns(),
            &[
                "Kitchen",
                "Wifi",
                "neighbourhood_Chelsea",
                "neighbourhood_Harlem",
                "neighbourhood_Midtown",
                "neighbourhood_Williamsburg",
                "distance"
            ]
        );
    }

    #[test]
    fn it_should_measure_new_points_against_the_loaded_attractions() {
        let (dataset, _) = prepare(
            &mut LISTINGS_CSV.as_bytes(),
            &mut ATTRACTIONS_CSV.as_bytes(),
            &low_support_config(),
            &LoadOptions::default(),
        )
        .unwrap();
        let centroid = attractions_centroid(&dataset.attractions).unwrap();

        let distance = dataset
            .distance_to_attractions(centroid.y(), centroid.x())
            .unwrap();

        assert_eq!(distance, 0.0);
    }
}
