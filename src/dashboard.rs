use crate::charts::{self, ChartSpec, TableSpec};
use crate::config::{AppConfig, MapConfig};
use crate::processing::{self, SummaryStatistics};
use crate::render::{self, MapLayout, MapRender};
use crate::types::{BaseMap, PollutionRecord};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The full artifact set for one render pass.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub map: MapRender,
    pub table: TableSpec,
    pub statistics: SummaryStatistics,
    pub bar_chart: ChartSpec,
    pub pie_chart: ChartSpec,
}

/// Builds every artifact. Only the map depends on `base_map`; the table,
/// statistics and charts are always produced.
pub fn generate(records: &[PollutionRecord], base_map: Option<&BaseMap>, config: &MapConfig) -> Dashboard {
    let points = processing::build_point_layer(records);

    Dashboard {
        map: render::render_composite_map(base_map, &points, config),
        table: charts::render_styled_table(records),
        statistics: processing::compute_summary_statistics(records),
        bar_chart: charts::render_bar_chart(records),
        pie_chart: charts::render_pie_chart(records),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MapSummary<'a> {
    Rendered { path: &'a Path, layout: &'a MapLayout },
    Skipped { notice: &'a str },
}

/// JSON view of a dashboard, written next to the map image.
#[derive(Debug, Serialize)]
pub struct DashboardDocument<'a> {
    pub map: MapSummary<'a>,
    pub table: &'a TableSpec,
    pub statistics: &'a SummaryStatistics,
    pub bar_chart: &'a ChartSpec,
    pub pie_chart: &'a ChartSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenArtifacts {
    pub map_png: Option<PathBuf>,
    pub dashboard_json: PathBuf,
}

/// Saves the map (when rendered) and the JSON document. `notice` explains a
/// skipped map to whoever presents the dashboard.
pub fn write_artifacts(dashboard: &Dashboard, config: &AppConfig, notice: &str) -> Result<WrittenArtifacts> {
    let map_png = match &dashboard.map {
        MapRender::Rendered(map) => {
            render::save_png(&map.image, &config.output.map_png)?;
            tracing::info!("Saved map to {:?}", config.output.map_png);
            Some(config.output.map_png.clone())
        }
        MapRender::Skipped => None,
    };

    let map = match &dashboard.map {
        MapRender::Rendered(map) => MapSummary::Rendered {
            path: &config.output.map_png,
            layout: &map.layout,
        },
        MapRender::Skipped => MapSummary::Skipped { notice },
    };
    let document = DashboardDocument {
        map,
        table: &dashboard.table,
        statistics: &dashboard.statistics,
        bar_chart: &dashboard.bar_chart,
        pie_chart: &dashboard.pie_chart,
    };

    let path = &config.output.dashboard_json;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(&document).context("Failed to serialize dashboard")?;
    fs::write(path, json).with_context(|| format!("Failed to write dashboard: {:?}", path))?;
    tracing::info!("Saved dashboard to {:?}", path);

    Ok(WrittenArtifacts {
        map_png,
        dashboard_json: path.clone(),
    })
}

/// Plain-text rendition of the data table for the terminal.
pub fn format_table(table: &TableSpec) -> String {
    let mut out = format!(
        "{:<16} {:>8} {:>10} {:>10}  {}\n",
        table.columns[0], table.columns[1], table.columns[2], table.columns[3], "shade"
    );
    for row in &table.rows {
        out.push_str(&format!(
            "{:<16} {:>8.1} {:>10.2} {:>10.2}  {}\n",
            row.city, row.pm25, row.latitude, row.longitude, row.pm25_background
        ));
    }
    out
}
