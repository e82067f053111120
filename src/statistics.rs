//! Per-neighbourhood summaries behind the distribution charts.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::dataset::Listing;

pub const DEFAULT_FOCUS_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Price,
    Rating,
    AmenityCount,
}

impl Metric {
    pub fn value(&self, listing: &Listing) -> f64 {
        match self {
            Metric::Price => listing.price,
            Metric::Rating => listing.review_scores_rating,
            Metric::AmenityCount => f64::from(listing.count_amenities),
        }
    }

    pub fn default_bucket(&self) -> f64 {
        match self {
            Metric::Price => 100.0,
            Metric::Rating => 5.0,
            Metric::AmenityCount => 5.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Metric> {
        match name {
            "price" => Some(Metric::Price),
            "rating" => Some(Metric::Rating),
            "amenities" => Some(Metric::AmenityCount),
            _ => None,
        }
    }
}

/// Rounds up to the next multiple of `bucket`.
#[inline]
pub fn bucket_of(value: f64, bucket: f64) -> i64 {
    ((value / bucket).ceil() * bucket) as i64
}

/// Neighbourhoods in order of first appearance. On the distance sorted table
/// this is closest first.
pub fn unique_neighbourhoods(listings: &[Listing]) -> Vec<&str> {
    let mut seen = HashSet::new();
    listings
        .iter()
        .map(|l| l.neighbourhood.as_str())
        .filter(|n| seen.insert(*n))
        .collect()
}

/// The `size` closest and `size` farthest neighbourhoods.
pub fn focus_neighbourhoods(listings: &[Listing], size: usize) -> Vec<&str> {
    let unique = unique_neighbourhoods(listings);
    if unique.len() <= size * 2 {
        return unique;
    }

    let mut focus: Vec<&str> = unique[..size].to_vec();
    focus.extend_from_slice(&unique[unique.len() - size..]);
    focus
}

pub fn listing_counts<'a>(listings: &[Listing], focus: &[&'a str]) -> Vec<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for listing in listings {
        *counts.entry(listing.neighbourhood.as_str()).or_insert(0) += 1;
    }

    focus
        .iter()
        .map(|n| (*n, counts.get(n).cloned().unwrap_or(0)))
        .collect()
}

/// Share of each neighbourhood's listings falling in each bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub buckets: BTreeSet<i64>,
    pub frequencies: HashMap<String, BTreeMap<i64, f64>>,
}

impl Distribution {
    pub fn frequency(&self, neighbourhood: &str, bucket: i64) -> f64 {
        self.frequencies
            .get(neighbourhood)
            .and_then(|f| f.get(&bucket))
            .cloned()
            .unwrap_or(0.0)
    }
}

pub fn relative_distribution(listings: &[Listing], metric: Metric, bucket: f64) -> Distribution {
    let mut counts: HashMap<&str, BTreeMap<i64, u32>> = HashMap::new();
    let mut totals: HashMap<&str, u32> = HashMap::new();
    let mut buckets = BTreeSet::new();

    for listing in listings {
        let b = bucket_of(metric.value(listing), bucket);
        buckets.insert(b);
        *counts
            .entry(listing.neighbourhood.as_str())
            .or_insert_with(BTreeMap::new)
            .entry(b)
            .or_insert(0) += 1;
        *totals.entry(listing.neighbourhood.as_str()).or_insert(0) += 1;
    }

    let frequencies = counts
        .into_iter()
        .map(|(neighbourhood, per_bucket)| {
            let total = f64::from(totals[neighbourhood]);
            let shares = per_bucket
                .into_iter()
                .map(|(b, count)| (b, f64::from(count) / total))
                .collect();
            (neighbourhood.to_owned(), shares)
        })
        .collect();

    Distribution {
        buckets,
        frequencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn listing(neighbourhood: &str, price: f64, rating: f64, count_amenities: u32) -> Listing {
        Listing {
            id: format!("{}-{}", neighbourhood, price),
            neighbourhood: neighbourhood.to_owned(),
            location: geo::Point::from((-73.98, 40.75)),
            price,
            review_scores_rating: rating,
            amenities: BTreeSet::new(),
            count_amenities,
            zipcode: None,
            host_response_rate: None,
            reviews_per_month: None,
            distance_km: 0.0,
        }
    }

    #[test]
    fn it_should_round_up_to_the_bucket() {
        assert_eq!(bucket_of(120.0, 100.0), 200);
        assert_eq!(bucket_of(100.0, 100.0), 100);
        assert_eq!(bucket_of(93.0, 5.0), 95);
        assert_eq!(bucket_of(1.0, 50.0), 50);
    }

    #[test]
    fn it_should_list_neighbourhoods_by_first_appearance() {
        let listings = vec![
            listing("Midtown", 100.0, 90.0, 10),
            listing("Chelsea", 100.0, 90.0, 10),
            listing("Midtown", 100.0, 90.0, 10),
            listing("Harlem", 100.0, 90.0, 10),
        ];

        assert_eq!(unique_neighbourhoods(&listings), vec!["Midtown", "Chelsea", "Harlem"]);
    }

    #[test]
    fn it_should_pick_closest_and_farthest_neighbourhoods() {
        let names = ["A", "B", "C", "D", "E", "F"];
        let listings: Vec<Listing> = names.iter().map(|n| listing(n, 100.0, 90.0, 10)).collect();

        assert_eq!(focus_neighbourhoods(&listings, 2), vec!["A", "B", "E", "F"]);
        assert_eq!(focus_neighbourhoods(&listings, 3), names.to_vec());
        assert_eq!(focus_neighbourhoods(&listings, 20), names.to_vec());
    }

    #[test]
    fn it_should_count_listings_in_focus_order() {
        let listings = vec![
            listing("Midtown", 100.0, 90.0, 10),
            listing("Harlem", 100.0, 90.0, 10),
            listing("Midtown", 100.0, 90.0, 10),
        ];

        assert_eq!(
            listing_counts(&listings, &["Harlem", "Midtown", "Queens"]),
            vec![("Harlem", 1), ("Midtown", 2), ("Queens", 0)]
        );
    }

    #[test]
    fn it_should_compute_relative_frequencies_per_neighbourhood() {
        let listings = vec![
            listing("Midtown", 150.0, 91.0, 12),
            listing("Midtown", 180.0, 96.0, 22),
            listing("Midtown", 320.0, 99.0, 31),
            listing("Harlem", 60.0, 80.0, 7),
        ];

        let prices = relative_distribution(&listings, Metric::Price, Metric::Price.default_bucket());

        assert_eq!(prices.buckets.iter().cloned().collect::<Vec<_>>(), vec![100, 200, 400]);
        assert!((prices.frequency("Midtown", 200) - 2.0 / 3.0).abs() < 1e-12);
        assert!((prices.frequency("Midtown", 400) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(prices.frequency("Harlem", 100), 1.0);
        assert_eq!(prices.frequency("Harlem", 200), 0.0);

        let amenities = relative_distribution(&listings, Metric::AmenityCount, 5.0);
        assert_eq!(amenities.frequency("Harlem", 10), 1.0);
    }

    #[test]
    fn it_should_parse_metric_names() {
        assert_eq!(Metric::from_name("rating"), Some(Metric::Rating));
        assert_eq!(Metric::from_name("amenities"), Some(Metric::AmenityCount));
        assert_eq!(Metric::from_name("zipcode"), None);
    }
}
