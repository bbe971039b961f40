use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result, bail};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub map: MapConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// Boundary geometry drawn under the city markers (.shp, .json or .geojson)
    pub base_map: PathBuf,
    /// Optional City,PM2.5,Latitude,Longitude table; the built-in sample is used when absent
    pub data_csv: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            base_map: PathBuf::from("india_st.shp"),
            data_csv: None,
        }
    }
}

/// Largest marker radius in pixels; keeps the disc maths well inside i32.
pub const MAX_MARKER_RADIUS: u32 = 200;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    pub marker_radius: u32,
    pub title: String,
    pub legend_label: String,
    pub legend_shrink: f64, // colour bar height relative to the plot area
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1200,
            marker_radius: 10,
            title: "Air Pollution (PM2.5) in Major Indian Cities".to_string(),
            legend_label: "PM2.5 Level".to_string(),
            legend_shrink: 0.6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub map_png: PathBuf,
    pub dashboard_json: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            map_png: PathBuf::from("pollution_map.png"),
            dashboard_json: PathBuf::from("dashboard.json"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.map.marker_radius > MAX_MARKER_RADIUS {
            bail!(
                "map.marker_radius = {} exceeds the maximum of {} pixels",
                self.map.marker_radius, MAX_MARKER_RADIUS
            );
        }
        Ok(())
    }

    /// Uses the built-in defaults when no config file was named.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[input]\nbase_map = \"maps/india.geojson\"\n\n[map]\nwidth = 640").unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.input.base_map, PathBuf::from("maps/india.geojson"));
        assert!(config.input.data_csv.is_none());
        assert_eq!(config.map.width, 640);
        assert_eq!(config.map.height, 1200);
        assert_eq!(config.output.map_png, PathBuf::from("pollution_map.png"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn oversized_marker_radius_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[map]\nmarker_radius = 50000").unwrap();

        let err = AppConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
        assert!(format!("{:#}", err).contains("marker_radius = 50000"));
    }

    #[test]
    fn no_path_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.input.base_map, PathBuf::from("india_st.shp"));
        assert_eq!(config.output.dashboard_json, PathBuf::from("dashboard.json"));
    }
}
