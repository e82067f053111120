use std::collections::BTreeMap;
use std::io;

use failure::Fail;
use regex::Regex;

use super::dataset_types::{Attraction, Listing};
use super::facilities::AmenityNormalizer;
use super::DatasetError;
use crate::cli_utils;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Why a listing row was left out of the cleaned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Fail)]
pub enum RejectReason {
    #[fail(display = "unreadable record")]
    UnreadableRecord,
    #[fail(display = "missing price")]
    MissingPrice,
    #[fail(display = "price is not a number")]
    InvalidPrice,
    #[fail(display = "price is not positive")]
    NonPositivePrice,
    #[fail(display = "missing rating")]
    MissingRating,
    #[fail(display = "rating is not a number")]
    InvalidRating,
    #[fail(display = "rating is not positive")]
    NonPositiveRating,
    #[fail(display = "missing neighbourhood")]
    MissingNeighbourhood,
    #[fail(display = "invalid coordinates")]
    InvalidCoordinates,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleaningReport {
    pub total_rows: u32,
    pub accepted_rows: u32,
    pub rejected: BTreeMap<RejectReason, u32>,
}

impl CleaningReport {
    fn record(&mut self, outcome: &Result<Listing, RejectReason>) {
        self.total_rows += 1;
        match outcome {
            Ok(_) => self.accepted_rows += 1,
            Err(reason) => *self.rejected.entry(*reason).or_insert(0) += 1,
        }
    }

    pub fn rejected_rows(&self) -> u32 {
        self.rejected.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub delimiter: u8,
    /// Size in bytes of the listings input, for the progress bar.
    pub listings_size: Option<u64>,
    pub quiet: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            delimiter: b',',
            listings_size: None,
            quiet: true,
        }
    }
}

struct ListingColumns {
    id: Option<usize>,
    neighbourhood: usize,
    latitude: usize,
    longitude: usize,
    price: usize,
    rating: usize,
    amenities: usize,
    zipcode: Option<usize>,
    host_response_rate: Option<usize>,
    reviews_per_month: Option<usize>,
}

fn column_position(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn required_column(
    headers: &csv::StringRecord,
    table: &'static str,
    name: &str,
) -> Result<usize, DatasetError> {
    column_position(headers, name).ok_or_else(|| DatasetError::Schema {
        table,
        column: name.to_owned(),
    })
}

impl ListingColumns {
    fn from_headers(headers: &csv::StringRecord) -> Result<ListingColumns, DatasetError> {
        Ok(ListingColumns {
            id: column_position(headers, "id").or_else(|| column_position(headers, "id_listings")),
            neighbourhood: required_column(headers, "listings", "neighbourhood")?,
            latitude: required_column(headers, "listings", "latitude")?,
            longitude: required_column(headers, "listings", "longitude")?,
            price: required_column(headers, "listings", "price")?,
            rating: required_column(headers, "listings", "review_scores_rating")?,
            amenities: required_column(headers, "listings", "amenities")?,
            zipcode: column_position(headers, "zipcode"),
            host_response_rate: column_position(headers, "host_response_rate"),
            reviews_per_month: column_position(headers, "reviews_per_month"),
        })
    }
}

/// Parsing rules for a single listing row. Holds the compiled patterns so
/// they are built once per load.
pub struct RowValidator {
    amenities: AmenityNormalizer,
    whitespace_run: Regex,
    digits: Regex,
}

impl RowValidator {
    pub fn new() -> Result<RowValidator, regex::Error> {
        Ok(RowValidator {
            amenities: AmenityNormalizer::new()?,
            whitespace_run: Regex::new(r"\s\s+")?,
            digits: Regex::new(r"\d+")?,
        })
    }

    pub fn clean_price(&self, raw: Option<&str>) -> Result<f64, RejectReason> {
        let raw = non_blank(raw).ok_or(RejectReason::MissingPrice)?;

        let stripped: String = raw
            .chars()
            .filter(|c| !c.is_ascii_alphabetic() && *c != ',' && !CURRENCY_SYMBOLS.contains(c))
            .collect();
        let price = stripped
            .trim()
            .parse::<f64>()
            .map_err(|_| RejectReason::InvalidPrice)?;

        if price > 0.0 {
            Ok(price)
        } else {
            Err(RejectReason::NonPositivePrice)
        }
    }

    pub fn clean_rating(&self, raw: Option<&str>) -> Result<f64, RejectReason> {
        let raw = non_blank(raw).ok_or(RejectReason::MissingRating)?;

        let stripped: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(*c, '.' | '-' | '+'))
            .collect();
        let collapsed = self.whitespace_run.replace_all(&stripped, "");
        let rating = collapsed
            .trim()
            .parse::<f64>()
            .map_err(|_| RejectReason::InvalidRating)?;

        if rating > 0.0 {
            Ok(rating)
        } else {
            Err(RejectReason::NonPositiveRating)
        }
    }

    /// First run of digits, so "10001.0" and "NY 10001" both give 10001.
    pub fn clean_zipcode(&self, raw: Option<&str>) -> Option<u32> {
        non_blank(raw)
            .and_then(|value| self.digits.find(value))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    }

    fn validate(
        &self,
        record: &csv::StringRecord,
        columns: &ListingColumns,
        row_number: usize,
    ) -> Result<Listing, RejectReason> {
        let price = self.clean_price(record.get(columns.price))?;
        let review_scores_rating = self.clean_rating(record.get(columns.rating))?;

        let neighbourhood = non_blank(record.get(columns.neighbourhood))
            .ok_or(RejectReason::MissingNeighbourhood)?
            .trim()
            .to_owned();

        let latitude = parse_coordinate(record.get(columns.latitude))
            .ok_or(RejectReason::InvalidCoordinates)?;
        let longitude = parse_coordinate(record.get(columns.longitude))
            .ok_or(RejectReason::InvalidCoordinates)?;

        let raw_amenities = record.get(columns.amenities).unwrap_or_default();
        let tokens = self.amenities.tokens(raw_amenities);

        let id = columns
            .id
            .and_then(|idx| non_blank(record.get(idx)))
            .map(|v| v.trim().to_owned())
            .unwrap_or_else(|| row_number.to_string());

        Ok(Listing {
            id,
            neighbourhood,
            location: geo::Point::from((longitude, latitude)),
            price,
            review_scores_rating,
            // Every raw comma separated entry counts, blank ones included.
            count_amenities: raw_amenities.split(',').count() as u32,
            amenities: tokens.into_iter().collect(),
            zipcode: self.clean_zipcode(columns.zipcode.and_then(|idx| record.get(idx))),
            host_response_rate: columns
                .host_response_rate
                .and_then(|idx| parse_percentage(record.get(idx))),
            reviews_per_month: columns
                .reviews_per_month
                .and_then(|idx| parse_number(record.get(idx))),
            distance_km: 0.0,
        })
    }
}

#[inline]
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[inline]
fn parse_number(value: Option<&str>) -> Option<f64> {
    non_blank(value)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[inline]
fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    parse_number(value)
}

#[inline]
fn parse_percentage(value: Option<&str>) -> Option<f64> {
    parse_number(value.map(|v| v.trim().trim_end_matches('%')))
}

#[inline]
fn record_size(record: &csv::StringRecord) -> u64 {
    record.as_slice().len() as u64
}

/// Reads the listings table. Rows failing validation are counted in the
/// report and left out.
pub fn load_listings(
    input: &mut dyn io::Read,
    options: &LoadOptions,
) -> Result<(Vec<Listing>, CleaningReport), DatasetError> {
    let validator = RowValidator::new()?;
    let progress_bar =
        cli_utils::create_progress_bar_bytes(options.quiet, "Reading listings...", options.listings_size);

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = csv_reader.headers()?.clone();
    let columns = ListingColumns::from_headers(&headers)?;

    let mut listings = Vec::new();
    let mut report = CleaningReport::default();

    for (row_number, record_result) in csv_reader.records().enumerate() {
        let outcome = match record_result {
            Ok(record) => {
                progress_bar.inc(record_size(&record));
                validator.validate(&record, &columns, row_number)
            }
            Err(err) if err.is_io_error() => {
                progress_bar.finish_and_clear();
                return Err(DatasetError::from(err));
            }
            Err(_) => Err(RejectReason::UnreadableRecord),
        };

        report.record(&outcome);
        if let Ok(listing) = outcome {
            listings.push(listing);
        }
    }

    progress_bar.finish_and_clear();

    Ok((listings, report))
}

/// Reads the attractions table. Rows without usable coordinates are skipped.
pub fn load_attractions(
    input: &mut dyn io::Read,
    delimiter: u8,
) -> Result<Vec<Attraction>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = csv_reader.headers()?.clone();
    let name_idx = required_column(&headers, "attractions", "Attraction")?;
    let latitude_idx = required_column(&headers, "attractions", "latitude")?;
    let longitude_idx = required_column(&headers, "attractions", "longitude")?;

    let mut attractions = Vec::new();
    for record_result in csv_reader.records() {
        let record = match record_result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(DatasetError::from(err)),
            Err(_) => continue,
        };

        let latitude = parse_coordinate(record.get(latitude_idx));
        let longitude = parse_coordinate(record.get(longitude_idx));
        if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
            let name = record.get(name_idx).unwrap_or_default().trim();
            attractions.push(Attraction::new(name, latitude, longitude));
        }
    }

    Ok(attractions)
}

/// Loads and cleans both tables. A table left without usable rows is an
/// error; partially valid input is never passed on.
pub fn load_and_clean(
    listings_input: &mut dyn io::Read,
    attractions_input: &mut dyn io::Read,
    options: &LoadOptions,
) -> Result<(Vec<Listing>, Vec<Attraction>, CleaningReport), DatasetError> {
    let (listings, report) = load_listings(listings_input, options)?;
    if listings.is_empty() {
        return Err(DatasetError::DataEmpty { table: "listings" });
    }

    let attractions = load_attractions(attractions_input, options.delimiter)?;
    if attractions.is_empty() {
        return Err(DatasetError::DataEmpty { table: "attractions" });
    }

    Ok((listings, attractions, report))
}
