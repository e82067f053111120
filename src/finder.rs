use std::cmp::Ordering;

use failure::Fail;

use super::dataset::Listing;
use super::statistics::bucket_of;

pub const DEFAULT_LIMIT: usize = 25;
pub const MAX_LIMIT: usize = 50;
const PRICE_RANGE_STEP: f64 = 50.0;

#[derive(Debug, Fail, PartialEq)]
pub enum FinderError {
    #[fail(display = "Please enter a valid range: minimum {} is above maximum {}", min, max)]
    InvalidPriceRange { min: i64, max: i64 },
    #[fail(display = "Number of listings must be between 1 and {}, got {}", max, found)]
    InvalidLimit { found: usize, max: usize },
    #[fail(display = "Radius must be positive, got {}", _0)]
    InvalidRadius(f64),
    #[fail(display = "Unknown query: {}", _0)]
    UnknownCriterion(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Area {
    /// Strictly closer than this many km to the attractions centroid.
    Radius(f64),
    Neighbourhood(String),
}

impl Area {
    fn contains(&self, listing: &Listing) -> bool {
        match self {
            Area::Radius(km) => listing.distance_km < *km,
            Area::Neighbourhood(name) => listing.neighbourhood == *name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    LowestPrice,
    HighestScore,
    HighestResponseRate,
    Popularity,
}

impl Criterion {
    pub fn from_name(name: &str) -> Result<Criterion, FinderError> {
        match name {
            "price" => Ok(Criterion::LowestPrice),
            "score" => Ok(Criterion::HighestScore),
            "response" => Ok(Criterion::HighestResponseRate),
            "popularity" => Ok(Criterion::Popularity),
            other => Err(FinderError::UnknownCriterion(other.to_owned())),
        }
    }

    fn key(&self, listing: &Listing) -> Option<f64> {
        match self {
            Criterion::LowestPrice => Some(listing.price),
            Criterion::HighestScore => Some(listing.review_scores_rating),
            Criterion::HighestResponseRate => listing.host_response_rate,
            Criterion::Popularity => listing.reviews_per_month,
        }
    }

    fn ascending(&self) -> bool {
        *self == Criterion::LowestPrice
    }

    /// Missing values go last whatever the direction.
    fn compare(&self, a: &Listing, b: &Listing) -> Ordering {
        match (self.key(a), self.key(b)) {
            (Some(x), Some(y)) => {
                let ordering = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if self.ascending() {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Inclusive bounds on the price rounded up to a multiple of 50.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    min: i64,
    max: i64,
}

impl PriceRange {
    pub fn new(min: i64, max: i64) -> Result<PriceRange, FinderError> {
        if min > max {
            return Err(FinderError::InvalidPriceRange { min, max });
        }
        Ok(PriceRange { min, max })
    }

    fn contains(&self, listing: &Listing) -> bool {
        let rounded = bucket_of(listing.price, PRICE_RANGE_STEP);
        rounded >= self.min && rounded <= self.max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub area: Area,
    pub price_range: Option<PriceRange>,
    /// In order of priority.
    pub criteria: Vec<Criterion>,
    pub limit: usize,
}

impl Query {
    pub fn new(area: Area) -> Query {
        Query {
            area,
            price_range: None,
            criteria: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }

    fn validate(&self) -> Result<(), FinderError> {
        if let Area::Radius(km) = self.area {
            if !(km > 0.0) {
                return Err(FinderError::InvalidRadius(km));
            }
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(FinderError::InvalidLimit {
                found: self.limit,
                max: MAX_LIMIT,
            });
        }
        Ok(())
    }
}

/// Listings in the area, ranked by the criteria. Without criteria every
/// matching listing is returned in table order, i.e. by distance.
pub fn find_listings<'a>(listings: &'a [Listing], query: &Query) -> Result<Vec<&'a Listing>, FinderError> {
    query.validate()?;

    let mut found: Vec<&Listing> = listings
        .iter()
        .filter(|l| query.area.contains(l))
        .filter(|l| query.price_range.map_or(true, |range| range.contains(l)))
        .collect();

    if query.criteria.is_empty() {
        return Ok(found);
    }

    found.sort_by(|a, b| {
        query
            .criteria
            .iter()
            .map(|criterion| criterion.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    found.truncate(query.limit);

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::BTreeSet;

    fn listing(
        id: &str,
        neighbourhood: &str,
        price: f64,
        rating: f64,
        response: Option<f64>,
        distance_km: f64,
    ) -> Listing {
        Listing {
            id: id.to_owned(),
            neighbourhood: neighbourhood.to_owned(),
            location: geo::Point::from((-73.98, 40.75)),
            price,
            review_scores_rating: rating,
            amenities: BTreeSet::new(),
            count_amenities: 0,
            zipcode: None,
            host_response_rate: response,
            reviews_per_month: None,
            distance_km,
        }
    }

    fn table() -> Vec<Listing> {
        vec![
            listing("a", "Midtown", 200.0, 90.0, Some(100.0), 0.4),
            listing("b", "Midtown", 120.0, 98.0, None, 0.9),
            listing("c", "Chelsea", 120.0, 95.0, Some(80.0), 1.6),
            listing("d", "Harlem", 60.0, 85.0, Some(95.0), 5.2),
        ]
    }

    fn ids(found: &[&Listing]) -> Vec<String> {
        found.iter().map(|l| l.id.clone()).collect()
    }

    #[test]
    fn it_should_filter_by_radius() {
        let listings = table();

        let found = find_listings(&listings, &Query::new(Area::Radius(2.0))).unwrap();

        assert_eq!(ids(&found), vec!["a", "b", "c"]);
    }

    #[test]
    fn it_should_filter_by_neighbourhood() {
        let listings = table();

        let found = find_listings(&listings, &Query::new(Area::Neighbourhood("Midtown".to_owned()))).unwrap();

        assert_eq!(ids(&found), vec!["a", "b"]);
    }

    #[test]
    fn it_should_rank_by_criteria_in_priority_order() {
        let listings = table();
        let mut query = Query::new(Area::Radius(10.0));
        query.criteria = vec![Criterion::LowestPrice, Criterion::HighestScore];

        let found = find_listings(&listings, &query).unwrap();

        assert_eq!(ids(&found), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn it_should_put_missing_values_last() {
        let listings = table();
        let mut query = Query::new(Area::Radius(10.0));
        query.criteria = vec![Criterion::HighestResponseRate];

        let found = find_listings(&listings, &query).unwrap();

        assert_eq!(ids(&found), vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn it_should_truncate_ranked_results() {
        let listings = table();
        let mut query = Query::new(Area::Radius(10.0));
        query.criteria = vec![Criterion::HighestScore];
        query.limit = 2;

        let found = find_listings(&listings, &query).unwrap();

        assert_eq!(ids(&found), vec!["b", "c"]);
    }

    #[test]
    fn it_should_filter_by_rounded_price() {
        let listings = table();
        let mut query = Query::new(Area::Radius(10.0));
        query.price_range = Some(PriceRange::new(100, 150).unwrap());

        let found = find_listings(&listings, &query).unwrap();

        // 60 rounds up to 100, 200 stays at 200.
        assert_eq!(ids(&found), vec!["b", "c", "d"]);
    }

    #[test]
    fn it_should_reject_invalid_queries() {
        let listings = table();
        let mut query = Query::new(Area::Radius(10.0));
        query.limit = 51;

        assert_matches!(PriceRange::new(300, 100), Err(FinderError::InvalidPriceRange { .. }));
        assert_matches!(find_listings(&listings, &query), Err(FinderError::InvalidLimit { .. }));
        assert_matches!(
            find_listings(&listings, &Query::new(Area::Radius(0.0))),
            Err(FinderError::InvalidRadius(_))
        );
        assert_matches!(Criterion::from_name("cheapest"), Err(FinderError::UnknownCriterion(_)));
    }
}
