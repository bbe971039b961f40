use crate::types::{CityPoint, PollutionRecord};
use geo::Point;
use serde::Serialize;
use std::fmt;

/// One point per record, in input order. No filtering.
pub fn build_point_layer(records: &[PollutionRecord]) -> Vec<CityPoint> {
    records.iter().map(|r| CityPoint {
        point: Point::new(r.longitude, r.latitude),
        pm25: r.pm25,
        city: r.city.clone(),
    }).collect()
}

/// Descriptive statistics of the PM2.5 column. Fields other than `count`
/// are `None` when undefined (empty input, or `std` with a single value).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub p25: Option<f64>,
    #[serde(rename = "50%")]
    pub p50: Option<f64>,
    #[serde(rename = "75%")]
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

pub fn compute_summary_statistics(records: &[PollutionRecord]) -> SummaryStatistics {
    let mut values: Vec<f64> = records.iter().map(|r| r.pm25).collect();
    values.sort_by(f64::total_cmp);

    let count = values.len();
    if count == 0 {
        return SummaryStatistics {
            count,
            mean: None,
            std: None,
            min: None,
            p25: None,
            p50: None,
            p75: None,
            max: None,
        };
    }

    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    // Sample standard deviation (n - 1)
    let std = (count > 1).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });

    SummaryStatistics {
        count,
        mean: Some(mean),
        std,
        min: values.first().copied(),
        p25: Some(percentile(&values, 0.25)),
        p50: Some(percentile(&values, 0.50)),
        p75: Some(percentile(&values, 0.75)),
        max: values.last().copied(),
    }
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

impl SummaryStatistics {
    pub fn rows(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("count", Some(self.count as f64)),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.p25),
            ("50%", self.p50),
            ("75%", self.p75),
            ("max", self.max),
        ]
    }
}

impl fmt::Display for SummaryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<6} {:>12}", "", "PM2.5")?;
        for (name, value) in self.rows() {
            match value {
                Some(v) => writeln!(f, "{:<6} {:>12.6}", name, v)?,
                None => writeln!(f, "{:<6} {:>12}", name, "NaN")?,
            }
        }
        Ok(())
    }
}
