use std::cmp::Ordering;

use failure::Fail;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::dataset::PreparedDataset;

#[derive(Debug, Fail, PartialEq)]
pub enum PredictionError {
    #[fail(display = "Cannot fit a model without training rows")]
    EmptyTrainingSet,
    #[fail(display = "Got {} feature rows but {} prices", rows, targets)]
    TargetCount { rows: usize, targets: usize },
    #[fail(display = "Training row {} has {} features, expected {}", row, found, expected)]
    RowWidth { row: usize, found: usize, expected: usize },
    #[fail(display = "Input row has {} features, the model was fitted on {}", found, expected)]
    InputWidth { found: usize, expected: usize },
    #[fail(display = "Feature rows do not follow the listing table order")]
    MisalignedRows,
    #[fail(display = "A forest needs at least one tree")]
    NoTrees,
    #[fail(display = "{} must be in (0, 1], got {}", name, value)]
    InvalidFraction { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub trees: usize,
    pub max_depth: usize,
    /// Share of the training rows every leaf must hold.
    pub min_samples_leaf: f64,
    /// Share of the training rows a node needs before it may split.
    pub min_samples_split: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            trees: 50,
            max_depth: 8,
            min_samples_leaf: 0.1,
            min_samples_split: 0.1,
            seed: 0,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), PredictionError> {
        if self.trees == 0 {
            return Err(PredictionError::NoTrees);
        }
        for (name, value) in &[
            ("min_samples_leaf", self.min_samples_leaf),
            ("min_samples_split", self.min_samples_split),
        ] {
            if !(*value > 0.0 && *value <= 1.0) {
                return Err(PredictionError::InvalidFraction {
                    name: *name,
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

#[inline]
fn share_of(fraction: f64, rows: usize) -> usize {
    (fraction * rows as f64).ceil() as usize
}

#[derive(Debug, Clone, PartialEq)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Summed squared error of both children.
    error: f64,
}

/// Grows one regression tree over a bootstrap sample, splitting on the
/// lowest summed squared error.
struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    max_depth: usize,
    min_leaf: usize,
    min_split: usize,
}

impl<'a> TreeBuilder<'a> {
    fn build(&self, samples: Vec<usize>, depth: usize) -> TreeNode {
        let mean = samples.iter().map(|&i| self.targets[i]).sum::<f64>() / samples.len() as f64;

        if depth >= self.max_depth
            || samples.len() < self.min_split
            || samples.len() < 2 * self.min_leaf
        {
            return TreeNode::Leaf { value: mean };
        }

        match self.best_split(&samples) {
            Some(split) => {
                let (left, right): (Vec<usize>, Vec<usize>) = samples
                    .iter()
                    .partition(|&&i| self.rows[i][split.feature] <= split.threshold);
                TreeNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(self.build(left, depth + 1)),
                    right: Box::new(self.build(right, depth + 1)),
                }
            }
            None => TreeNode::Leaf { value: mean },
        }
    }

    fn best_split(&self, samples: &[usize]) -> Option<SplitCandidate> {
        let count = samples.len();
        let total: f64 = samples.iter().map(|&i| self.targets[i]).sum();
        let total_sq: f64 = samples.iter().map(|&i| self.targets[i].powi(2)).sum();
        let parent_error = total_sq - total * total / count as f64;
        if parent_error <= 0.0 {
            return None;
        }

        let feature_count = self.rows[samples[0]].len();
        let mut order = samples.to_vec();
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..feature_count {
            order.sort_by(|&a, &b| {
                self.rows[a][feature]
                    .partial_cmp(&self.rows[b][feature])
                    .unwrap_or(Ordering::Equal)
            });

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for position in 0..count - 1 {
                let target = self.targets[order[position]];
                left_sum += target;
                left_sq += target * target;

                let left_count = position + 1;
                let right_count = count - left_count;
                if left_count < self.min_leaf || right_count < self.min_leaf {
                    continue;
                }

                let current = self.rows[order[position]][feature];
                let next = self.rows[order[position + 1]][feature];
                if !(next > current) {
                    continue;
                }

                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let error = (left_sq - left_sum * left_sum / left_count as f64)
                    + (right_sq - right_sum * right_sum / right_count as f64);

                if best.as_ref().map_or(true, |b| error < b.error) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (current + next) / 2.0,
                        error,
                    });
                }
            }
        }

        best.filter(|b| b.error < parent_error)
    }
}

/// Bagged regression trees. Every tree sees all features and a bootstrap
/// sample of the rows; the prediction is the mean over the trees.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<TreeNode>,
    feature_count: usize,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], config: &ForestConfig) -> Result<RandomForest, PredictionError> {
        config.validate()?;

        let feature_count = rows.first().ok_or(PredictionError::EmptyTrainingSet)?.len();
        if rows.len() != targets.len() {
            return Err(PredictionError::TargetCount {
                rows: rows.len(),
                targets: targets.len(),
            });
        }
        if let Some((row, found)) = rows
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|(_, len)| *len != feature_count)
        {
            return Err(PredictionError::RowWidth {
                row,
                found,
                expected: feature_count,
            });
        }

        let row_count = rows.len();
        let builder = TreeBuilder {
            rows,
            targets,
            max_depth: config.max_depth,
            min_leaf: share_of(config.min_samples_leaf, row_count).max(1),
            min_split: share_of(config.min_samples_split, row_count).max(2),
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let trees = (0..config.trees)
            .map(|_| {
                let sample: Vec<usize> = (0..row_count).map(|_| rng.gen_range(0..row_count)).collect();
                builder.build(sample, 0)
            })
            .collect();

        Ok(RandomForest { trees, feature_count })
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64, PredictionError> {
        if row.len() != self.feature_count {
            return Err(PredictionError::InputWidth {
                found: row.len(),
                expected: self.feature_count,
            });
        }

        let total: f64 = self.trees.iter().map(|tree| tree.predict(row)).sum();
        Ok(total / self.trees.len() as f64)
    }
}

/// Fits the forest on the feature matrix against the listing prices.
pub fn fit_price_model(dataset: &PreparedDataset, config: &ForestConfig) -> Result<RandomForest, PredictionError> {
    let aligned = dataset.features.listing_ids().len() == dataset.listings.len()
        && dataset
            .features
            .listing_ids()
            .iter()
            .zip(dataset.listings.iter())
            .all(|(id, listing)| *id == listing.id);
    if !aligned {
        return Err(PredictionError::MisalignedRows);
    }

    let prices: Vec<f64> = dataset.listings.iter().map(|l| l.price).collect();
    info!(
        "Fitting {} trees on {} listings and {} features",
        config.trees,
        prices.len(),
        dataset.features.columns().len()
    );

    RandomForest::fit(dataset.features.rows(), &prices, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FacilitySupport, PreparerConfig};
    use crate::dataset::{prepare, LoadOptions};
    use assert_matches::assert_matches;

    const LISTINGS_CSV: &str = include_str!("dataset/test_resources/listings_sample.csv");
    const ATTRACTIONS_CSV: &str = include_str!("dataset/test_resources/attractions_sample.csv");

    /// Price is 100, plus 200 when the first feature is set. The second
    /// feature is noise interleaving both groups.
    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i % 2) as f64, i as f64 / 40.0])
            .collect();
        let targets = rows.iter().map(|r| 100.0 + 200.0 * r[0]).collect();
        (rows, targets)
    }

    fn prepared() -> PreparedDataset {
        let config = PreparerConfig {
            facility_support: FacilitySupport::Count(2),
            ..PreparerConfig::default()
        };
        prepare(
            &mut LISTINGS_CSV.as_bytes(),
            &mut ATTRACTIONS_CSV.as_bytes(),
            &config,
            &LoadOptions::default(),
        )
        .unwrap()
        .0
    }

    #[test]
    fn it_should_learn_a_step_in_price() {
        let (rows, targets) = step_data();

        let forest = RandomForest::fit(&rows, &targets, &ForestConfig::default()).unwrap();

        assert!((forest.predict(&[1.0, 0.5]).unwrap() - 300.0).abs() < 1e-9);
        assert!((forest.predict(&[0.0, 0.5]).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn it_should_predict_a_constant_price() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let targets = vec![80.0; 10];

        let forest = RandomForest::fit(&rows, &targets, &ForestConfig::default()).unwrap();

        assert!((forest.predict(&[3.5]).unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn it_should_be_reproducible_for_a_seed() {
        let (rows, mut targets) = step_data();
        targets.iter_mut().enumerate().for_each(|(i, t)| *t += (i % 7) as f64);
        let config = ForestConfig {
            trees: 5,
            seed: 42,
            ..ForestConfig::default()
        };

        let first = RandomForest::fit(&rows, &targets, &config).unwrap();
        let second = RandomForest::fit(&rows, &targets, &config).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn it_should_reject_invalid_training_input() {
        let (rows, targets) = step_data();
        let config = ForestConfig::default();

        assert_matches!(
            RandomForest::fit(&[], &[], &config),
            Err(PredictionError::EmptyTrainingSet)
        );
        assert_matches!(
            RandomForest::fit(&rows, &targets[..10], &config),
            Err(PredictionError::TargetCount { rows: 40, targets: 10 })
        );
        assert_matches!(
            RandomForest::fit(&[vec![1.0, 2.0], vec![1.0]], &[1.0, 2.0], &config),
            Err(PredictionError::RowWidth { row: 1, found: 1, expected: 2 })
        );
        assert_matches!(
            RandomForest::fit(&rows, &targets, &ForestConfig { trees: 0, ..ForestConfig::default() }),
            Err(PredictionError::NoTrees)
        );
        assert_matches!(
            RandomForest::fit(
                &rows,
                &targets,
                &ForestConfig {
                    min_samples_leaf: 0.0,
                    ..ForestConfig::default()
                }
            ),
            Err(PredictionError::InvalidFraction { name: "min_samples_leaf", .. })
        );
    }

    #[test]
    fn it_should_reject_input_rows_of_another_width() {
        let (rows, targets) = step_data();
        let forest = RandomForest::fit(&rows, &targets, &ForestConfig::default()).unwrap();

        assert_matches!(
            forest.predict(&[1.0]),
            Err(PredictionError::InputWidth { found: 1, expected: 2 })
        );
    }

    #[test]
    fn it_should_estimate_a_new_listing_within_the_observed_prices() {
        let dataset = prepared();
        let forest = fit_price_model(&dataset, &ForestConfig::default()).unwrap();
        let distance = dataset.distance_to_attractions(40.7549, -73.984).unwrap();
        let row = dataset
            .features
            .input_row("Midtown", &["Wifi", "Kitchen"], distance)
            .unwrap();

        let price = forest.predict(&row).unwrap();

        // Cleaned prices in the sample run from 75 to 1200.
        assert!(price >= 75.0 && price <= 1200.0);
    }

    #[test]
    fn it_should_refuse_features_out_of_listing_order() {
        let mut dataset = prepared();
        dataset.listings.reverse();

        assert_matches!(
            fit_price_model(&dataset, &ForestConfig::default()),
            Err(PredictionError::MisalignedRows)
        );
    }
}
