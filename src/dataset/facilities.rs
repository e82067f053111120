use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use failure::Fail;
use regex::Regex;
use serde;

use super::dataset_types::Listing;
use crate::config::PreparerConfig;

pub const DISTANCE_COLUMN: &str = "distance";

#[derive(Debug, Fail)]
pub enum FeatureError {
    #[fail(display = "Duplicated feature column: {}", _0)]
    DuplicateColumn(String),
    #[fail(display = "Feature row {} has {} values, expected {}", row, found, expected)]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[fail(display = "The last feature column must be '{}'", _0)]
    MissingDistanceColumn(&'static str),
    #[fail(display = "Unknown facility: {}", _0)]
    UnknownFacility(String),
    #[fail(display = "Unknown neighbourhood: {}", _0)]
    UnknownNeighbourhood(String),
}

/// Turns raw amenity text into facility names. Everything but ASCII letters,
/// digits and whitespace is removed; case is kept.
pub struct AmenityNormalizer {
    pattern: Regex,
}

impl AmenityNormalizer {
    pub fn new() -> Result<AmenityNormalizer, regex::Error> {
        Ok(AmenityNormalizer {
            pattern: Regex::new(r"[^a-zA-Z\d\s]")?,
        })
    }

    pub fn normalize(&self, token: &str) -> String {
        self.pattern.replace_all(token, "").into_owned()
    }

    /// Comma separated tokens, normalized. Tokens left blank are skipped.
    pub fn tokens(&self, raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|token| self.normalize(token))
            .filter(|token| !token.trim().is_empty())
            .collect()
    }
}

/// Facility names retained as feature columns, in column order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FacilityVocabulary {
    names: Vec<String>,
}

impl FacilityVocabulary {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Regression input. Columns are the retained facilities, then one column per
/// neighbourhood, then the distance. Rows follow the listing table order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    facility_count: usize,
    neighbourhood_prefix: String,
    listing_ids: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(
        columns: Vec<String>,
        facility_count: usize,
        neighbourhood_prefix: &str,
        listing_ids: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<FeatureMatrix, FeatureError> {
        if columns.last().map(String::as_str) != Some(DISTANCE_COLUMN) || facility_count >= columns.len() {
            return Err(FeatureError::MissingDistanceColumn(DISTANCE_COLUMN));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(FeatureError::DuplicateColumn(column.clone()));
            }
        }

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(FeatureError::RowWidth {
                    row: row_idx,
                    found: row.len(),
                    expected: columns.len(),
                });
            }
        }

        Ok(FeatureMatrix {
            columns,
            facility_count,
            neighbourhood_prefix: neighbourhood_prefix.to_owned(),
            listing_ids,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn listing_ids(&self) -> &[String] {
        &self.listing_ids
    }

    pub fn neighbourhood_column(&self, neighbourhood: &str) -> String {
        format!("{}{}", self.neighbourhood_prefix, neighbourhood)
    }

    /// Builds one row for a listing that is not in the table, with the exact
    /// column layout of the matrix. Unselected columns stay at zero.
    pub fn input_row(
        &self,
        neighbourhood: &str,
        facilities: &[&str],
        distance_km: f64,
    ) -> Result<Vec<f64>, FeatureError> {
        let mut row = vec![0.0; self.columns.len()];

        for facility in facilities {
            let idx = self.columns[..self.facility_count]
                .iter()
                .position(|c| c == facility)
                .ok_or_else(|| FeatureError::UnknownFacility((*facility).to_owned()))?;
            row[idx] = 1.0;
        }

        let neighbourhood_column = self.neighbourhood_column(neighbourhood);
        let distance_idx = self.columns.len() - 1;
        let neighbourhood_idx = self.columns[self.facility_count..distance_idx]
            .iter()
            .position(|c| *c == neighbourhood_column)
            .ok_or_else(|| FeatureError::UnknownNeighbourhood(neighbourhood.to_owned()))?;
        row[self.facility_count + neighbourhood_idx] = 1.0;

        row[distance_idx] = distance_km;

        Ok(row)
    }
}

/// One-hot encodes facilities and neighbourhoods of the cleaned listings.
/// Only facilities present in at least the configured number of listings are
/// kept, minus the configured junk names.
pub fn build_facility_matrix(
    listings: &[Listing],
    config: &PreparerConfig,
) -> Result<(FeatureMatrix, FacilityVocabulary), FeatureError> {
    let mut support: BTreeMap<&str, u32> = BTreeMap::new();
    for listing in listings {
        for amenity in &listing.amenities {
            *support.entry(amenity.as_str()).or_insert(0) += 1;
        }
    }

    let threshold = config.facility_support.resolve(listings.len());
    let facilities: Vec<String> = support
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .filter(|(name, _)| !config.junk_facilities.iter().any(|junk| junk == name))
        .map(|(name, _)| name.to_owned())
        .collect();

    let neighbourhoods: BTreeSet<&str> = listings.iter().map(|l| l.neighbourhood.as_str()).collect();

    let mut columns: Vec<String> = facilities.clone();
    columns.extend(
        neighbourhoods
            .iter()
            .map(|n| format!("{}{}", config.neighbourhood_prefix, n)),
    );
    columns.push(DISTANCE_COLUMN.to_owned());

    let facility_idx: HashMap<&str, usize> = facilities
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let neighbourhood_idx: HashMap<&str, usize> = neighbourhoods
        .iter()
        .enumerate()
        .map(|(idx, name)| (*name, facilities.len() + idx))
        .collect();

    let width = columns.len();
    let rows: Vec<Vec<f64>> = listings
        .iter()
        .map(|listing| {
            let mut row = vec![0.0; width];
            for amenity in &listing.amenities {
                if let Some(idx) = facility_idx.get(amenity.as_str()) {
                    row[*idx] = 1.0;
                }
            }
            if let Some(idx) = neighbourhood_idx.get(listing.neighbourhood.as_str()) {
                row[*idx] = 1.0;
            }
            row[width - 1] = listing.distance_km;
            row
        })
        .collect();

    let listing_ids = listings.iter().map(|l| l.id.clone()).collect();
    let matrix = FeatureMatrix::new(
        columns,
        facilities.len(),
        &config.neighbourhood_prefix,
        listing_ids,
        rows,
    )?;

    Ok((matrix, FacilityVocabulary { names: facilities }))
}
