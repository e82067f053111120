#[macro_use]
extern crate clap;
use clap::{App, Arg, ArgGroup, ArgMatches, SubCommand};

#[macro_use]
extern crate failure;
use failure::Error;

use log::{error, info, warn};
use simplelog;
use std::fs::File;
use std::io;
use std::path::Path;

mod cli_utils;
mod clustering;
mod config;
mod dataset;
mod finder;
mod prediction;
mod snapshot;
mod statistics;
mod table_writer;

use chrono::offset::Local;

use config::{FacilitySupport, PreparerConfig};
use dataset::{CleaningReport, LoadOptions, PreparedDataset};

#[derive(Debug, Fail)]
pub enum MainError {
    #[fail(display = "Missing input: --{} is required", _0)]
    MissingInput(&'static str),
    #[fail(display = "Delimiter must be exactly one character, got {:?}", _0)]
    InvalidDelimiter(String),
    #[fail(display = "Unknown statistic: {}", _0)]
    UnknownStatistic(String),
    #[fail(display = "Bucket size must be positive, got {}", _0)]
    InvalidBucket(f64),
}

fn main() {
    let local_time = Local::now();
    let time_offset = local_time.offset();
    // Configure logging
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config {
            offset: time_offset.clone(),
            ..simplelog::Config::default()
        },
        simplelog::TerminalMode::Stderr,
    )
    .ok();

    match do_main() {
        Ok(_) => info!("Process finished OK"),
        Err(err) => {
            error!("Process finished with an error: {}", err);
            std::process::exit(1);
        }
    };
}

fn parse_delimiter(matches: &ArgMatches) -> Result<u8, MainError> {
    let delimiter = matches
        .value_of("delimiter")
        .unwrap_or_default()
        .replace("\\t", "\t");

    match delimiter.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(MainError::InvalidDelimiter(delimiter)),
    }
}

fn preparer_config(matches: &ArgMatches) -> Result<PreparerConfig, Error> {
    let mut config = match matches.value_of("config") {
        Some(path) => {
            info!("Reading configuration from '{}'.", path);
            PreparerConfig::from_file(path)?
        }
        None => PreparerConfig::default(),
    };

    if matches.is_present("min-support") {
        config.facility_support = FacilitySupport::Count(value_t!(matches, "min-support", u32)?);
    }
    config.validate()?;

    Ok(config)
}

fn log_report(report: &CleaningReport) {
    info!(
        "Cleaning kept {} of {} listing rows, dropped {}",
        report.accepted_rows,
        report.total_rows,
        report.rejected_rows()
    );
    for (reason, count) in &report.rejected {
        info!("Dropped {} rows: {}", count, reason);
    }
}

fn prepare_from_files(
    matches: &ArgMatches,
    config: &PreparerConfig,
    delimiter: u8,
) -> Result<PreparedDataset, Error> {
    let listings_path = matches
        .value_of("listings")
        .ok_or(MainError::MissingInput("listings"))?;
    let attractions_path = matches
        .value_of("attractions")
        .ok_or(MainError::MissingInput("attractions"))?;

    info!(
        "Preparing listings from '{}' and attractions from '{}'.",
        listings_path, attractions_path
    );

    let mut listings_file = File::open(listings_path)?;
    let listings_size = listings_file.metadata()?.len();
    let mut attractions_file = File::open(attractions_path)?;

    let options = LoadOptions {
        delimiter,
        listings_size: Some(listings_size),
        quiet: false,
    };
    let (dataset, report) =
        dataset::prepare(&mut listings_file, &mut attractions_file, config, &options)?;
    log_report(&report);

    Ok(dataset)
}

/// Either a snapshot from a previous `prepare` run or a fresh preparation.
fn load_dataset(matches: &ArgMatches) -> Result<PreparedDataset, Error> {
    if let Some(snapshot_path) = matches.value_of("snapshot") {
        info!("Loading snapshot from '{}'.", snapshot_path);
        let dataset = snapshot::load_snapshot(Path::new(snapshot_path))?;
        info!("Snapshot from '{}' loaded.", snapshot_path);
        return Ok(dataset);
    }

    let config = preparer_config(matches)?;
    let delimiter = parse_delimiter(matches)?;
    prepare_from_files(matches, &config, delimiter)
}

fn open_output(matches: &ArgMatches) -> Result<Box<dyn io::Write>, Error> {
    match matches.value_of("output") {
        Some(path) => {
            info!("Writing to file {}.", path);
            Ok(Box::new(io::BufWriter::new(File::create(path)?)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn prepare_command(matches: &ArgMatches) -> Result<(), Error> {
    let config = preparer_config(matches)?;
    let delimiter = parse_delimiter(matches)?;
    let force = matches.is_present("force");

    let dataset = prepare_from_files(matches, &config, delimiter)?;

    let output_dir = Path::new(matches.value_of("output").unwrap_or_default());
    let stats = table_writer::export_prepared(&dataset, output_dir, delimiter, force)?;
    info!("Stats: {:?}", stats);

    if let Some(snapshot_path) = matches.value_of("save-snapshot") {
        let snapshot_file = Path::new(snapshot_path);
        if snapshot_file.exists() && !force {
            warn!(
                "Snapshot exist in {}. Skipping. Use --force to overwrite",
                snapshot_file.display()
            );
        } else {
            info!("Saving snapshot into {}", snapshot_file.display());
            snapshot::save_snapshot(&dataset, snapshot_file)?;
        }
    }

    Ok(())
}

fn stats_command(matches: &ArgMatches) -> Result<(), Error> {
    let dataset = load_dataset(matches)?;
    let delimiter = parse_delimiter(matches)?;

    let kind = matches.value_of("kind").unwrap_or_default();
    let focus_size = if matches.is_present("focus") {
        value_t!(matches, "focus", usize)?
    } else {
        statistics::DEFAULT_FOCUS_SIZE
    };
    let focus = statistics::focus_neighbourhoods(&dataset.listings, focus_size);
    info!("Using {} focus neighbourhoods", focus.len());

    let mut output = open_output(matches)?;

    if kind == "counts" {
        let counts = statistics::listing_counts(&dataset.listings, &focus);
        table_writer::write_counts(&counts, output.as_mut(), delimiter)?;
        return Ok(());
    }

    let metric = statistics::Metric::from_name(kind)
        .ok_or_else(|| MainError::UnknownStatistic(kind.to_owned()))?;
    let bucket = if matches.is_present("bucket") {
        value_t!(matches, "bucket", f64)?
    } else {
        metric.default_bucket()
    };
    if !(bucket > 0.0) {
        return Err(Error::from(MainError::InvalidBucket(bucket)));
    }

    let distribution = statistics::relative_distribution(&dataset.listings, metric, bucket);
    table_writer::write_distribution(&distribution, &focus, kind, output.as_mut(), delimiter)?;

    Ok(())
}

fn find_command(matches: &ArgMatches) -> Result<(), Error> {
    let dataset = load_dataset(matches)?;
    let delimiter = parse_delimiter(matches)?;

    let area = match matches.value_of("neighbourhood") {
        Some(name) => finder::Area::Neighbourhood(name.to_owned()),
        None => finder::Area::Radius(value_t!(matches, "radius", f64)?),
    };

    let mut query = finder::Query::new(area);
    if let Some(names) = matches.values_of("query") {
        query.criteria = names
            .map(finder::Criterion::from_name)
            .collect::<Result<Vec<_>, _>>()?;
    }
    query.limit = value_t!(matches, "limit", usize)?;

    if matches.is_present("min-price") || matches.is_present("max-price") {
        let min = price_bound(matches, "min-price", 0)?;
        let max = price_bound(matches, "max-price", i64::max_value())?;
        query.price_range = Some(finder::PriceRange::new(min, max)?);
    }

    let found = finder::find_listings(&dataset.listings, &query)?;
    info!("Found {} listings", found.len());

    let mut output = open_output(matches)?;
    table_writer::write_listings(found, output.as_mut(), delimiter)?;

    Ok(())
}

/// A malformed bound is an error, an absent one falls back to `default`.
fn price_bound(matches: &ArgMatches, name: &str, default: i64) -> Result<i64, clap::Error> {
    if matches.is_present(name) {
        value_t!(matches, name, i64)
    } else {
        Ok(default)
    }
}

fn cluster_command(matches: &ArgMatches) -> Result<(), Error> {
    let dataset = load_dataset(matches)?;
    let delimiter = parse_delimiter(matches)?;

    let seed = value_t!(matches, "seed", u64)?;
    let fraction = value_t!(matches, "sample-fraction", f64)?;
    let config = clustering::KMeansConfig {
        clusters: value_t!(matches, "clusters", usize)?,
        seed,
        ..clustering::KMeansConfig::default()
    };

    let points = clustering::cluster_input(&dataset.listings);
    let sample = clustering::sample_points(&points, fraction, seed)?;
    info!(
        "Clustering {} of {} listings with a zipcode",
        sample.len(),
        points.len()
    );

    let (clustered, summaries) = clustering::cluster_listings(&sample, &config)?;
    for summary in &summaries {
        info!(
            "Cluster {}: {} listings, average price {:.0}",
            summary.cluster, summary.size, summary.mean_price
        );
    }

    let mut output = open_output(matches)?;
    table_writer::write_clustered(&clustered, output.as_mut(), delimiter)?;

    Ok(())
}

/// Feature row of the listing described on the command line, laid out like
/// the dataset's feature matrix.
fn new_listing_row(matches: &ArgMatches, dataset: &PreparedDataset) -> Result<Vec<f64>, Error> {
    let neighbourhood = matches
        .value_of("neighbourhood")
        .ok_or(MainError::MissingInput("neighbourhood"))?;
    let facilities: Vec<&str> = matches
        .values_of("facility")
        .map(|values| values.collect())
        .unwrap_or_else(Vec::new);
    let latitude = value_t!(matches, "latitude", f64)?;
    let longitude = value_t!(matches, "longitude", f64)?;

    let distance = dataset.distance_to_attractions(latitude, longitude)?;
    info!("Distance to the attractions: {:.3} km", distance);

    let row = dataset.features.input_row(neighbourhood, &facilities, distance)?;
    Ok(row)
}

fn feature_row_command(matches: &ArgMatches) -> Result<(), Error> {
    let dataset = load_dataset(matches)?;
    let delimiter = parse_delimiter(matches)?;

    let row = new_listing_row(matches, &dataset)?;

    let mut output = open_output(matches)?;
    table_writer::write_feature_row(dataset.features.columns(), &row, output.as_mut(), delimiter)?;

    Ok(())
}

fn predict_command(matches: &ArgMatches) -> Result<(), Error> {
    let dataset = load_dataset(matches)?;
    let delimiter = parse_delimiter(matches)?;

    let row = new_listing_row(matches, &dataset)?;

    let config = prediction::ForestConfig {
        trees: value_t!(matches, "trees", usize)?,
        max_depth: value_t!(matches, "max-depth", usize)?,
        seed: value_t!(matches, "seed", u64)?,
        ..prediction::ForestConfig::default()
    };
    let forest = prediction::fit_price_model(&dataset, &config)?;
    let price = forest.predict(&row)?;

    let neighbourhood = matches.value_of("neighbourhood").unwrap_or_default();
    info!("Estimated price in {}: {:.0}", neighbourhood, price);

    let mut output = open_output(matches)?;
    table_writer::write_estimate(neighbourhood, price, output.as_mut(), delimiter)?;

    Ok(())
}

/// Describes a listing that is not in the table yet.
fn new_listing_args<'a, 'b>(command: App<'a, 'b>) -> App<'a, 'b> {
    command
        .arg(Arg::with_name("neighbourhood")
            .short("n")
            .long("neighbourhood")
            .takes_value(true)
            .required(true)
        )
        .arg(Arg::with_name("facility")
            .long("facility")
            .help("Facilities offered by the new listing")
            .takes_value(true)
            .multiple(true)
        )
        .arg(Arg::with_name("latitude")
            .long("latitude")
            .takes_value(true)
            .required(true)
            .allow_hyphen_values(true)
        )
        .arg(Arg::with_name("longitude")
            .long("longitude")
            .takes_value(true)
            .required(true)
            .allow_hyphen_values(true)
        )
}

fn common_args<'a, 'b>(command: App<'a, 'b>) -> App<'a, 'b> {
    command
        .arg(Arg::with_name("delimiter")
            .short("d")
            .long("delimiter")
            .help("Delimiter for input and output fields")
            .takes_value(true)
            .default_value(",")
        )
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .help("JSON file with the preparation settings.")
            .takes_value(true)
        )
        .arg(Arg::with_name("min-support")
            .long("min-support")
            .help("Minimum number of listings a facility must appear in to become a feature.")
            .takes_value(true)
        )
        .arg(Arg::with_name("listings")
            .short("l")
            .long("listings")
            .help("Path for the listings file.")
            .takes_value(true)
            .requires("attractions")
        )
        .arg(Arg::with_name("attractions")
            .short("a")
            .long("attractions")
            .help("Path for the attractions file.")
            .takes_value(true)
            .requires("listings")
        )
}

/// Commands reading prepared data accept raw inputs or a snapshot.
fn dataset_args<'a, 'b>(command: App<'a, 'b>) -> App<'a, 'b> {
    common_args(command)
        .arg(Arg::with_name("snapshot")
            .short("s")
            .long("snapshot")
            .help("Use a snapshot written by 'prepare' instead of the raw files.")
            .takes_value(true)
        )
        .group(ArgGroup::with_name("source")
            .args(&["listings", "snapshot"])
            .required(true))
        .arg(Arg::with_name("output")
            .short("o")
            .long("output")
            .help("Sets the output file to create. If omitted, stdout will be used.")
            .takes_value(true)
        )
}

fn do_main() -> Result<(), Error> {
    let matches = App::new("listing_preparer")
                    .version("0.1.0")
                    .about("Cleans rental listings and derives the tables behind the exploration views")
                    .subcommand(
                        common_args(SubCommand::with_name("prepare")
                            .about("Clean the inputs and write the prepared tables")
                            .arg(Arg::with_name("output")
                                .short("o")
                                .long("output")
                                .help("Directory for the prepared tables")
                                .takes_value(true)
                                .default_value("prepared")
                            )
                            .arg(Arg::with_name("save-snapshot")
                                .long("save-snapshot")
                                .help("Also save the prepared dataset as a snapshot file")
                                .takes_value(true)
                            )
                            .arg(Arg::with_name("force")
                                .short("f")
                                .long("force")
                                .help("Overwrite existing tables and snapshot")
                                .takes_value(false)
                            ))
                            .group(ArgGroup::with_name("raw-input")
                                .args(&["listings"])
                                .required(true))
                    )
                    .subcommand(
                        dataset_args(SubCommand::with_name("stats")
                            .about("Per neighbourhood distributions for the focus neighbourhoods")
                            .arg(Arg::with_name("kind")
                                .short("k")
                                .long("kind")
                                .help("Statistic to compute")
                                .takes_value(true)
                                .possible_values(&["counts", "price", "rating", "amenities"])
                                .default_value("price")
                            )
                            .arg(Arg::with_name("focus")
                                .long("focus")
                                .help("Number of closest and of farthest neighbourhoods to keep. Defaults to 20.")
                                .takes_value(true)
                            )
                            .arg(Arg::with_name("bucket")
                                .long("bucket")
                                .help("Bucket size. Defaults to 100 for prices and 5 otherwise.")
                                .takes_value(true)
                            ))
                    )
                    .subcommand(
                        dataset_args(SubCommand::with_name("find")
                            .about("Find listings by area, ranked by queries")
                            .arg(Arg::with_name("radius")
                                .long("radius")
                                .help("Radius in km from the attractions centroid")
                                .takes_value(true)
                            )
                            .arg(Arg::with_name("neighbourhood")
                                .short("n")
                                .long("neighbourhood")
                                .help("Neighbourhood to search in")
                                .takes_value(true)
                            )
                            .group(ArgGroup::with_name("area")
                                .args(&["radius", "neighbourhood"])
                                .required(true))
                            .arg(Arg::with_name("query")
                                .short("q")
                                .long("query")
                                .help("Ranking queries by order of priority")
                                .takes_value(true)
                                .multiple(true)
                                .possible_values(&["price", "score", "response", "popularity"])
                            )
                            .arg(Arg::with_name("limit")
                                .long("limit")
                                .help("Number of ranked listings to show (1 to 50)")
                                .takes_value(true)
                                .default_value("25")
                            )
                            .arg(Arg::with_name("min-price")
                                .long("min-price")
                                .help("Minimum price, compared against prices rounded up to 50")
                                .takes_value(true)
                            )
                            .arg(Arg::with_name("max-price")
                                .long("max-price")
                                .help("Maximum price, compared against prices rounded up to 50")
                                .takes_value(true)
                            ))
                    )
                    .subcommand(
                        dataset_args(SubCommand::with_name("cluster")
                            .about("Group a sample of listings by price and zipcode")
                            .arg(Arg::with_name("clusters")
                                .short("k")
                                .long("clusters")
                                .takes_value(true)
                                .default_value("10")
                            )
                            .arg(Arg::with_name("sample-fraction")
                                .long("sample-fraction")
                                .help("Fraction of the listings to cluster")
                                .takes_value(true)
                                .default_value("0.05")
                            )
                            .arg(Arg::with_name("seed")
                                .long("seed")
                                .takes_value(true)
                                .default_value("0")
                            ))
                    )
                    .subcommand(
                        new_listing_args(dataset_args(SubCommand::with_name("feature-row")
                            .about("Build a regression input row for a new listing")))
                    )
                    .subcommand(
                        new_listing_args(dataset_args(SubCommand::with_name("predict")
                            .about("Estimate a price for a new listing from the prepared listings")
                            .arg(Arg::with_name("trees")
                                .long("trees")
                                .takes_value(true)
                                .default_value("50")
                            )
                            .arg(Arg::with_name("max-depth")
                                .long("max-depth")
                                .takes_value(true)
                                .default_value("8")
                            )
                            .arg(Arg::with_name("seed")
                                .long("seed")
                                .takes_value(true)
                                .default_value("0")
                            )))
                    )
                    .get_matches();

    match matches.subcommand() {
        ("prepare", Some(m)) => prepare_command(m),
        ("stats", Some(m)) => stats_command(m),
        ("find", Some(m)) => find_command(m),
        ("cluster", Some(m)) => cluster_command(m),
        ("feature-row", Some(m)) => feature_row_command(m),
        ("predict", Some(m)) => predict_command(m),
        _ => {
            warn!("No command given. Use --help to list the commands.");
            Ok(())
        }
    }
}
