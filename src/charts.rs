use crate::colormap::{self, ColorScale};
use crate::types::PollutionRecord;
use serde::Serialize;

/// Qualitative palette for pie slices, cycled in input order.
const PLOTLY_QUALITATIVE: [&str; 10] = [
    "#636EFA", "#EF553B", "#00CC96", "#AB63FA", "#FFA15A",
    "#19D3F3", "#FF6692", "#B6E880", "#FF97FF", "#FECB52",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    Bar(BarChart),
    Pie(PieChart),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub title: String,
    pub x_axis: String,
    pub y_axis: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub category: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieChart {
    pub title: String,
    pub slices: Vec<PieSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub percent: f64,
    pub color: String,
    pub text: String,
}

pub fn render_bar_chart(records: &[PollutionRecord]) -> ChartSpec {
    ChartSpec::Bar(BarChart {
        title: "PM2.5 Levels by City".to_string(),
        x_axis: "City".to_string(),
        y_axis: "PM2.5".to_string(),
        bars: records.iter().map(|r| Bar {
            category: r.city.clone(),
            value: r.pm25,
        }).collect(),
    })
}

pub fn render_pie_chart(records: &[PollutionRecord]) -> ChartSpec {
    let total: f64 = records.iter().map(|r| r.pm25).sum();

    // Slices sharing a PM2.5 value share a colour; colours follow first appearance.
    let mut distinct: Vec<f64> = Vec::new();
    for r in records {
        if !distinct.contains(&r.pm25) {
            distinct.push(r.pm25);
        }
    }

    let slices = records.iter().map(|r| {
        let i = distinct.iter().position(|v| *v == r.pm25).unwrap_or(0);
        let percent = if total > 0.0 { r.pm25 / total * 100.0 } else { 0.0 };
        PieSlice {
            label: r.city.clone(),
            value: r.pm25,
            percent,
            color: PLOTLY_QUALITATIVE[i % PLOTLY_QUALITATIVE.len()].to_string(),
            text: format!("{}\n{:.1}%", r.city, percent),
        }
    }).collect();

    ChartSpec::Pie(PieChart {
        title: "Pollution Share by City".to_string(),
        slices,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSpec {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub city: String,
    pub pm25: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub pm25_background: String,
    pub pm25_text_color: String,
    /// Position of the PM2.5 cell on the colour scale, 0 = green end.
    pub pm25_scale_position: f64,
}

/// Rows in input order; the PM2.5 gradient spans this table's own min/max.
pub fn render_styled_table(records: &[PollutionRecord]) -> TableSpec {
    let columns = ["City", "PM2.5", "Latitude", "Longitude"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    let Some(scale) = ColorScale::from_values(records.iter().map(|r| r.pm25)) else {
        return TableSpec { columns, rows: Vec::new() };
    };

    let rows = records.iter().map(|r| {
        let background = scale.color(r.pm25);
        TableRow {
            city: r.city.clone(),
            pm25: r.pm25,
            latitude: r.latitude,
            longitude: r.longitude,
            pm25_background: colormap::to_hex(background),
            pm25_text_color: colormap::text_color_for(background).to_string(),
            pm25_scale_position: scale.position(r.pm25),
        }
    }).collect();

    TableSpec { columns, rows }
}
