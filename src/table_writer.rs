use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

use failure::Fail;
use log::{info, warn};

use super::clustering::{cluster_input, ClusterPoint, ClusteredPoint};
use super::dataset::{Attraction, FacilityVocabulary, FeatureMatrix, Listing, PreparedDataset};
use super::statistics::Distribution;

const MISSING_VALUE: &str = "";

#[derive(Debug, Fail)]
pub enum TableWriterError {
    #[fail(display = "I/O error: {}", _0)]
    Io(io::Error),
    #[fail(display = "Csv error: {}", _0)]
    Csv(csv::Error),
}

impl From<io::Error> for TableWriterError {
    fn from(err: io::Error) -> TableWriterError {
        TableWriterError::Io(err)
    }
}

impl From<csv::Error> for TableWriterError {
    fn from(err: csv::Error) -> TableWriterError {
        TableWriterError::Csv(err)
    }
}

#[derive(Debug)]
pub struct ExportStats {
    pub written_files: u32,
    pub skipped_files: u32,
}

fn csv_writer(output: &mut dyn io::Write, delimiter: u8) -> csv::Writer<&mut dyn io::Write> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(output)
}

#[inline]
fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| MISSING_VALUE.to_owned(), |v| v.to_string())
}

pub fn write_listings<'a, I>(
    listings: I,
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError>
where
    I: IntoIterator<Item = &'a Listing>,
{
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&[
        "id",
        "neighbourhood",
        "latitude",
        "longitude",
        "price",
        "review_scores_rating",
        "zipcode",
        "host_response_rate",
        "reviews_per_month",
        "distance_km",
        "count_amenities",
        "amenities",
    ])?;

    for listing in listings {
        let amenities: Vec<&str> = listing.amenities.iter().map(String::as_str).collect();
        writer.write_record(&[
            listing.id.clone(),
            listing.neighbourhood.clone(),
            listing.latitude().to_string(),
            listing.longitude().to_string(),
            listing.price.to_string(),
            listing.review_scores_rating.to_string(),
            optional(listing.zipcode),
            optional(listing.host_response_rate),
            optional(listing.reviews_per_month),
            listing.distance_km.to_string(),
            listing.count_amenities.to_string(),
            amenities.join(","),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_attractions(
    attractions: &[Attraction],
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&["Attraction", "latitude", "longitude"])?;
    for attraction in attractions {
        writer.write_record(&[
            attraction.name.clone(),
            attraction.latitude().to_string(),
            attraction.longitude().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// The feature matrix with the listing id as first column.
pub fn write_features(
    features: &FeatureMatrix,
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);

    let mut header = vec!["id"];
    header.extend(features.columns().iter().map(String::as_str));
    writer.write_record(&header)?;

    for (id, row) in features.listing_ids().iter().zip(features.rows()) {
        let mut record = vec![id.clone()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_feature_row(
    columns: &[String],
    row: &[f64],
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(columns)?;
    writer.write_record(row.iter().map(|v| v.to_string()))?;
    writer.flush()?;
    Ok(())
}

pub fn write_facilities(
    facilities: &FacilityVocabulary,
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&["facility"])?;
    for name in facilities.names() {
        writer.write_record(&[name])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_cluster_input(
    points: &[ClusterPoint],
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&[
        "listing_id",
        "latitude",
        "longitude",
        "price",
        "zipcode",
        "distance_km",
    ])?;
    for point in points {
        writer.write_record(&[
            point.listing_id.clone(),
            point.latitude.to_string(),
            point.longitude.to_string(),
            point.price.to_string(),
            point.zipcode.to_string(),
            point.distance_km.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_clustered(
    points: &[ClusteredPoint],
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&[
        "listing_id",
        "latitude",
        "longitude",
        "price",
        "zipcode",
        "distance_km",
        "cluster",
    ])?;
    for clustered in points {
        let point = &clustered.point;
        writer.write_record(&[
            point.listing_id.clone(),
            point.latitude.to_string(),
            point.longitude.to_string(),
            point.price.to_string(),
            point.zipcode.to_string(),
            point.distance_km.to_string(),
            clustered.cluster.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per bucket, one column per neighbourhood, as relative frequencies.
pub fn write_distribution(
    distribution: &Distribution,
    neighbourhoods: &[&str],
    bucket_label: &str,
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);

    let mut header = vec![bucket_label];
    header.extend_from_slice(neighbourhoods);
    writer.write_record(&header)?;

    for bucket in &distribution.buckets {
        let mut record = vec![bucket.to_string()];
        record.extend(
            neighbourhoods
                .iter()
                .map(|n| distribution.frequency(n, *bucket).to_string()),
        );
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Estimated price for a new listing, rounded to whole currency units.
pub fn write_estimate(
    neighbourhood: &str,
    price: f64,
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&["neighbourhood", "price"])?;
    writer.write_record(&[neighbourhood.to_owned(), format!("{:.0}", price.round())])?;
    writer.flush()?;
    Ok(())
}

pub fn write_counts(
    counts: &[(&str, usize)],
    output: &mut dyn io::Write,
    delimiter: u8,
) -> Result<(), TableWriterError> {
    let mut writer = csv_writer(output, delimiter);
    writer.write_record(&["neighbourhood", "count"])?;
    for (neighbourhood, count) in counts {
        writer.write_record(&[neighbourhood.to_string(), count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn export_table<F>(
    dir: &Path,
    name: &str,
    force: bool,
    stats: &mut ExportStats,
    write_table: F,
) -> Result<(), TableWriterError>
where
    F: FnOnce(&mut dyn io::Write) -> Result<(), TableWriterError>,
{
    let path = dir.join(name);
    if path.exists() && !force {
        warn!(
            "Table exists in {}. Skipping. Use --force to overwrite",
            path.display()
        );
        stats.skipped_files += 1;
        return Ok(());
    }

    let mut buf_writer = io::BufWriter::new(fs::File::create(&path)?);
    write_table(&mut buf_writer)?;
    buf_writer.flush()?;
    info!("Wrote {}", path.display());
    stats.written_files += 1;

    Ok(())
}

/// Writes every prepared table into `dir`, one CSV file each.
pub fn export_prepared(
    dataset: &PreparedDataset,
    dir: &Path,
    delimiter: u8,
    force: bool,
) -> Result<ExportStats, TableWriterError> {
    fs::create_dir_all(dir)?;

    let mut stats = ExportStats {
        written_files: 0,
        skipped_files: 0,
    };

    export_table(dir, "listings.csv", force, &mut stats, |out| {
        write_listings(&dataset.listings, out, delimiter)
    })?;
    export_table(dir, "attractions.csv", force, &mut stats, |out| {
        write_attractions(&dataset.attractions, out, delimiter)
    })?;
    export_table(dir, "features.csv", force, &mut stats, |out| {
        write_features(&dataset.features, out, delimiter)
    })?;
    export_table(dir, "facilities.csv", force, &mut stats, |out| {
        write_facilities(&dataset.facilities, out, delimiter)
    })?;
    export_table(dir, "cluster_input.csv", force, &mut stats, |out| {
        write_cluster_input(&cluster_input(&dataset.listings), out, delimiter)
    })?;

    Ok(stats)
}
