use std::fs::File;
use std::io;
use std::path::Path;

use failure::Fail;
use serde;

pub const REFERENCE_MIN_SUPPORT: u32 = 1090;
pub const DEFAULT_NEIGHBOURHOOD_PREFIX: &str = "neighbourhood_";

/// Minimum number of listings a facility must appear in to become a feature
/// column. The count only makes sense for one dataset size, so a fraction of
/// the cleaned listings can be given instead.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilitySupport {
    Count(u32),
    Fraction(f64),
}

impl FacilitySupport {
    pub fn resolve(&self, listing_count: usize) -> u32 {
        match *self {
            FacilitySupport::Count(count) => count,
            FacilitySupport::Fraction(fraction) => (fraction * listing_count as f64).ceil() as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreparerConfig {
    pub facility_support: FacilitySupport,
    /// Amenity columns dropped even when they reach the support threshold.
    pub junk_facilities: Vec<String>,
    pub neighbourhood_prefix: String,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        PreparerConfig {
            facility_support: FacilitySupport::Count(REFERENCE_MIN_SUPPORT),
            junk_facilities: vec![
                "translation missing enhostingamenity49".to_owned(),
                "translation missing enhostingamenity50".to_owned(),
            ],
            neighbourhood_prefix: DEFAULT_NEIGHBOURHOOD_PREFIX.to_owned(),
        }
    }
}

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "I/O error reading config: {}", _0)]
    Io(io::Error),
    #[fail(display = "Invalid config file: {}", _0)]
    Json(serde_json::Error),
    #[fail(display = "Facility support fraction must be in (0, 1], got {}", _0)]
    InvalidFraction(f64),
}

impl PreparerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PreparerConfig, ConfigError> {
        let file = File::open(path).map_err(ConfigError::Io)?;
        PreparerConfig::from_reader(io::BufReader::new(file))
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<PreparerConfig, ConfigError> {
        let config: PreparerConfig = serde_json::from_reader(reader).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.facility_support {
            FacilitySupport::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                Err(ConfigError::InvalidFraction(f))
            }
            _ => Ok(()),
        }
    }
}
