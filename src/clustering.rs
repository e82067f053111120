use std::cmp::Ordering;

use failure::Fail;
use log::{info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::dataset::Listing;
use super::statistics::bucket_of;

const PRICE_STEP: f64 = 50.0;

#[derive(Debug, Fail, PartialEq)]
pub enum ClusterError {
    #[fail(display = "Not enough listings to cluster: {} points for {} clusters", points, clusters)]
    NotEnoughPoints { points: usize, clusters: usize },
    #[fail(display = "Sample fraction must be in (0, 1], got {}", _0)]
    InvalidFraction(f64),
    #[fail(display = "Number of clusters must be positive")]
    NoClusters,
}

/// A listing as seen by the investment view: it needs a zipcode, and its
/// price is rounded up to a multiple of 50.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub listing_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub price: f64,
    pub zipcode: u32,
    pub distance_km: f64,
}

impl ClusterPoint {
    fn features(&self) -> Vec<f64> {
        vec![self.price, f64::from(self.zipcode)]
    }
}

pub fn cluster_input(listings: &[Listing]) -> Vec<ClusterPoint> {
    listings
        .iter()
        .filter_map(|listing| {
            listing.zipcode.map(|zipcode| ClusterPoint {
                listing_id: listing.id.clone(),
                latitude: listing.latitude(),
                longitude: listing.longitude(),
                price: bucket_of(listing.price, PRICE_STEP) as f64,
                zipcode,
                distance_km: listing.distance_km,
            })
        })
        .collect()
}

/// Random subset of `fraction` of the points, rounded up, never empty.
pub fn sample_points(
    points: &[ClusterPoint],
    fraction: f64,
    seed: u64,
) -> Result<Vec<ClusterPoint>, ClusterError> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(ClusterError::InvalidFraction(fraction));
    }

    let size = ((points.len() as f64 * fraction).ceil() as usize)
        .max(1)
        .min(points.len());

    let mut rng = StdRng::seed_from_u64(seed);
    Ok(points.choose_multiple(&mut rng, size).cloned().collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    pub clusters: usize,
    pub max_iterations: usize,
    /// Stop once no centroid moves farther than this.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        KMeansConfig {
            clusters: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f64>>,
    pub assignments: Vec<usize>,
    pub iterations: usize,
}

pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> KMeans {
        KMeans { config }
    }

    pub fn fit(&self, data: &[Vec<f64>]) -> Result<KMeansFit, ClusterError> {
        let k = self.config.clusters;
        if k == 0 {
            return Err(ClusterError::NoClusters);
        }
        if data.len() < k {
            return Err(ClusterError::NotEnoughPoints {
                points: data.len(),
                clusters: k,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut centroids = kmeans_plus_plus_init(data, k, &mut rng);
        let mut assignments: Vec<usize> = data.iter().map(|p| nearest_centroid(p, &centroids).0).collect();

        for iteration in 1..=self.config.max_iterations {
            let new_centroids = update_centroids(data, &assignments, &centroids);
            let movement = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(old, new)| euclidean_distance(old, new))
                .fold(0.0, f64::max);
            centroids = new_centroids;

            let new_assignments: Vec<usize> =
                data.iter().map(|p| nearest_centroid(p, &centroids).0).collect();
            let changed = new_assignments != assignments;
            assignments = new_assignments;

            if !changed || movement < self.config.tolerance {
                return Ok(KMeansFit {
                    centroids,
                    assignments,
                    iterations: iteration,
                });
            }
        }

        warn!(
            "K-means did not converge within {} iterations",
            self.config.max_iterations
        );
        Ok(KMeansFit {
            centroids,
            assignments,
            iterations: self.config.max_iterations,
        })
    }
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, euclidean_distance(point, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .unwrap_or((0, 0.0))
}

fn kmeans_plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..data.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = data
            .iter()
            .map(|p| nearest_centroid(p, &centroids).1.powi(2))
            .collect();

        // All points sit on a centroid already: fall back to a uniform pick.
        let next = match WeightedIndex::new(&weights) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => rng.gen_range(0..data.len()),
        };
        centroids.push(data[next].clone());
    }

    centroids
}

/// Mean of each cluster. An emptied cluster keeps its previous centroid.
fn update_centroids(data: &[Vec<f64>], assignments: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dimension = previous.first().map_or(0, |c| c.len());
    let mut sums = vec![vec![0.0; dimension]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (point, cluster) in data.iter().zip(assignments.iter()) {
        counts[*cluster] += 1;
        for (sum, value) in sums[*cluster].iter_mut().zip(point.iter()) {
            *sum += value;
        }
    }

    sums.into_iter()
        .zip(counts.into_iter())
        .zip(previous.iter())
        .map(|((sum, count), old)| {
            if count == 0 {
                old.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredPoint {
    pub point: ClusterPoint,
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub mean_price: f64,
}

/// Groups the points by rounded price and zipcode.
pub fn cluster_listings(
    points: &[ClusterPoint],
    config: &KMeansConfig,
) -> Result<(Vec<ClusteredPoint>, Vec<ClusterSummary>), ClusterError> {
    let data: Vec<Vec<f64>> = points.iter().map(ClusterPoint::features).collect();
    let fit = KMeans::new(config.clone()).fit(&data)?;
    info!(
        "K-means on {} points settled after {} iterations",
        points.len(),
        fit.iterations
    );

    let clustered: Vec<ClusteredPoint> = points
        .iter()
        .zip(fit.assignments.iter())
        .map(|(point, cluster)| ClusteredPoint {
            point: point.clone(),
            cluster: *cluster,
        })
        .collect();

    let summaries = (0..config.clusters)
        .filter_map(|cluster| {
            let prices: Vec<f64> = clustered
                .iter()
                .filter(|p| p.cluster == cluster)
                .map(|p| p.point.price)
                .collect();
            if prices.is_empty() {
                return None;
            }
            Some(ClusterSummary {
                cluster,
                size: prices.len(),
                mean_price: prices.iter().sum::<f64>() / prices.len() as f64,
            })
        })
        .collect();

    Ok((clustered, summaries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn point(id: usize, price: f64, zipcode: u32) -> ClusterPoint {
        ClusterPoint {
            listing_id: id.to_string(),
            latitude: 40.75,
            longitude: -73.98,
            price,
            zipcode,
            distance_km: 1.0,
        }
    }

    fn two_groups() -> Vec<ClusterPoint> {
        let mut points = Vec::new();
        for i in 0..5 {
            points.push(point(i, 100.0 + 50.0 * (i % 2) as f64, 10001));
        }
        for i in 5..10 {
            points.push(point(i, 900.0 + 50.0 * (i % 2) as f64, 11211));
        }
        points
    }

    #[test]
    fn it_should_round_prices_and_skip_listings_without_zipcode() {
        let base = Listing {
            id: "1".to_owned(),
            neighbourhood: "Midtown".to_owned(),
            location: geo::Point::from((-73.98, 40.75)),
            price: 101.0,
            review_scores_rating: 90.0,
            amenities: BTreeSet::new(),
            count_amenities: 0,
            zipcode: Some(10018),
            host_response_rate: None,
            reviews_per_month: None,
            distance_km: 0.7,
        };
        let without_zip = Listing {
            id: "2".to_owned(),
            zipcode: None,
            ..base.clone()
        };

        let points = cluster_input(&[base, without_zip]);

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, 150.0);
        assert_eq!(points[0].zipcode, 10018);
        assert_eq!(points[0].latitude, 40.75);
    }

    #[test]
    fn it_should_sample_a_fraction_of_points() {
        let points: Vec<ClusterPoint> = (0..100).map(|i| point(i, 100.0, 10001)).collect();

        assert_eq!(sample_points(&points, 0.05, 0).unwrap().len(), 5);
        assert_eq!(sample_points(&points, 0.001, 0).unwrap().len(), 1);
        assert_eq!(
            sample_points(&points, 0.05, 7).unwrap(),
            sample_points(&points, 0.05, 7).unwrap()
        );
        assert_eq!(
            sample_points(&points, 0.0, 0),
            Err(ClusterError::InvalidFraction(0.0))
        );
    }

    #[test]
    fn it_should_separate_distinct_price_groups() {
        let points = two_groups();
        let config = KMeansConfig {
            clusters: 2,
            ..KMeansConfig::default()
        };

        let (clustered, summaries) = cluster_listings(&points, &config).unwrap();

        let low = clustered[0].cluster;
        let high = clustered[9].cluster;
        assert_ne!(low, high);
        assert!(clustered[..5].iter().all(|p| p.cluster == low));
        assert!(clustered[5..].iter().all(|p| p.cluster == high));

        let low_summary = summaries.iter().find(|s| s.cluster == low).unwrap();
        assert_eq!(low_summary.size, 5);
        assert_eq!(low_summary.mean_price, 120.0);
    }

    #[test]
    fn it_should_be_deterministic_for_a_seed() {
        let points = two_groups();
        let config = KMeansConfig {
            clusters: 3,
            ..KMeansConfig::default()
        };

        assert_eq!(
            cluster_listings(&points, &config).unwrap(),
            cluster_listings(&points, &config).unwrap()
        );
    }

    #[test]
    fn it_should_fail_with_fewer_points_than_clusters() {
        let points = vec![point(0, 100.0, 10001)];

        assert_eq!(
            cluster_listings(&points, &KMeansConfig::default()),
            Err(ClusterError::NotEnoughPoints {
                points: 1,
                clusters: 10
            })
        );
    }

    #[test]
    fn it_should_handle_identical_points() {
        let points: Vec<ClusterPoint> = (0..4).map(|i| point(i, 100.0, 10001)).collect();
        let config = KMeansConfig {
            clusters: 2,
            ..KMeansConfig::default()
        };

        let (clustered, _) = cluster_listings(&points, &config).unwrap();

        assert_eq!(clustered.len(), 4);
    }
}
