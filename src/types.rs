use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One monitored city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutionRecord {
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "PM2.5")]
    pub pm25: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl PollutionRecord {
    pub fn new(city: &str, pm25: f64, latitude: f64, longitude: f64) -> Self {
        Self {
            city: city.to_string(),
            pm25,
            latitude,
            longitude,
        }
    }
}

/// A record projected into map space: point is (longitude, latitude).
#[derive(Debug, Clone, PartialEq)]
pub struct CityPoint {
    pub point: Point<f64>,
    pub pm25: f64,
    pub city: String,
}

/// Boundary polygons drawn as the map background. Attributes are not kept.
#[derive(Debug, Clone)]
pub struct BaseMap {
    pub source: PathBuf,
    pub regions: Vec<MultiPolygon<f64>>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BaseMapUnavailable {
    #[error("base map not found: {0:?}")]
    NotFound(PathBuf),
    #[error("unsupported base map format {extension:?} for {path:?}")]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("failed to read base map {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("base map {0:?} contains no polygon geometry")]
    NoPolygons(PathBuf),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DatasetError {
    #[error("row {row}: city name is empty")]
    EmptyCity { row: usize },
    #[error("row {row}: duplicate city {city:?}")]
    DuplicateCity { row: usize, city: String },
    #[error("{city}: latitude {value} outside [-90, 90]")]
    LatitudeOutOfRange { city: String, value: f64 },
    #[error("{city}: longitude {value} outside [-180, 180]")]
    LongitudeOutOfRange { city: String, value: f64 },
    #[error("{city}: PM2.5 value {value} is not a finite number")]
    NonFinitePm25 { city: String, value: f64 },
    #[error("{city}: negative PM2.5 value {value}")]
    NegativePm25 { city: String, value: f64 },
}
