use crate::config::AppConfig;
use crate::types::{BaseMap, BaseMapUnavailable, DatasetError, PollutionRecord};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use shapefile::ShapeReader;
use std::cell::OnceCell;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// The four monitored cities shipped with the tool, in display order.
pub fn sample_records() -> Vec<PollutionRecord> {
    vec![
        PollutionRecord::new("Delhi", 310.0, 28.61, 77.20),
        PollutionRecord::new("Chennai", 45.0, 13.08, 80.27),
        PollutionRecord::new("Mumbai", 98.0, 19.07, 72.87),
        PollutionRecord::new("Kolkata", 112.0, 22.57, 88.36),
    ]
}

pub fn load_records(config: &AppConfig) -> Result<Vec<PollutionRecord>> {
    let records = match &config.input.data_csv {
        Some(path) => load_csv_records(path)?,
        None => {
            tracing::debug!("No data_csv configured, using built-in sample dataset");
            sample_records()
        }
    };

    validate_records(&records)?;
    tracing::info!("Loaded {} pollution records", records.len());
    Ok(records)
}

fn load_csv_records(path: &Path) -> Result<Vec<PollutionRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        // +2: header line plus one-based numbering
        let record: PollutionRecord = result
            .with_context(|| format!("Malformed row {} in {:?}", i + 2, path))?;
        records.push(record);
    }

    Ok(records)
}

pub fn validate_records(records: &[PollutionRecord]) -> std::result::Result<(), DatasetError> {
    let mut seen = HashSet::new();

    for (row, record) in records.iter().enumerate() {
        let city = record.city.trim();
        if city.is_empty() {
            return Err(DatasetError::EmptyCity { row });
        }
        if !seen.insert(city) {
            return Err(DatasetError::DuplicateCity { row, city: city.to_string() });
        }
        if !(-90.0..=90.0).contains(&record.latitude) {
            return Err(DatasetError::LatitudeOutOfRange { city: city.to_string(), value: record.latitude });
        }
        if !(-180.0..=180.0).contains(&record.longitude) {
            return Err(DatasetError::LongitudeOutOfRange { city: city.to_string(), value: record.longitude });
        }
        if !record.pm25.is_finite() {
            return Err(DatasetError::NonFinitePm25 { city: city.to_string(), value: record.pm25 });
        }
        if record.pm25 < 0.0 {
            return Err(DatasetError::NegativePm25 { city: city.to_string(), value: record.pm25 });
        }
    }

    Ok(())
}

/// Reads the boundary file. Every failure is reported as `BaseMapUnavailable`.
pub fn load_base_map(path: &Path) -> std::result::Result<BaseMap, BaseMapUnavailable> {
    if !path.is_file() {
        return Err(BaseMapUnavailable::NotFound(path.to_path_buf()));
    }

    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .unwrap_or_default();

    let loaded = match extension.as_str() {
        "shp" => load_shapefile_regions(path),
        "json" | "geojson" => load_geojson_regions(path),
        _ => {
            return Err(BaseMapUnavailable::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            })
        }
    };

    let regions = loaded.map_err(|e| BaseMapUnavailable::Unreadable {
        path: path.to_path_buf(),
        reason: format!("{:#}", e),
    })?;

    if regions.is_empty() {
        return Err(BaseMapUnavailable::NoPolygons(path.to_path_buf()));
    }

    tracing::info!("Loaded {} base map regions from {:?}", regions.len(), path);
    Ok(BaseMap {
        source: path.to_path_buf(),
        regions,
    })
}

fn load_shapefile_regions(path: &Path) -> Result<Vec<MultiPolygon<f64>>> {
    let reader = ShapeReader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;
    let shapes = reader.read().context("Failed to read shapes")?;

    let mut regions = Vec::new();
    for shape in shapes {
        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // outlines only
        };
        regions.push(geometry);
    }

    Ok(regions)
}

fn load_geojson_regions(path: &Path) -> Result<Vec<MultiPolygon<f64>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();
    for feature in collection.features {
        let Some(geometry) = feature.geometry else { continue };
        let geometry: geo::Geometry<f64> = geometry.value.try_into()
            .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

        match geometry {
            geo::Geometry::MultiPolygon(mp) => regions.push(mp),
            geo::Geometry::Polygon(p) => regions.push(MultiPolygon::new(vec![p])),
            _ => {}
        }
    }

    Ok(regions)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    MapAvailable,
    MapUnavailable,
}

/// Owns the base map for one render session. The file is read on first
/// access and the result (success or failure) is kept for the session.
#[derive(Debug)]
pub struct Session {
    base_map_path: PathBuf,
    base_map: OnceCell<std::result::Result<BaseMap, BaseMapUnavailable>>,
}

impl Session {
    pub fn new(base_map_path: impl Into<PathBuf>) -> Self {
        Self {
            base_map_path: base_map_path.into(),
            base_map: OnceCell::new(),
        }
    }

    pub fn base_map(&self) -> std::result::Result<&BaseMap, &BaseMapUnavailable> {
        self.base_map
            .get_or_init(|| load_base_map(&self.base_map_path))
            .as_ref()
    }

    pub fn map_state(&self) -> MapState {
        match self.base_map() {
            Ok(_) => MapState::MapAvailable,
            Err(_) => MapState::MapUnavailable,
        }
    }
}
