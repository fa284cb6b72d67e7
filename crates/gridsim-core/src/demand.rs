//! Demand series provider
//!
//! An ordered, timestamped, read-only sequence of historical load values.
//! The series is loaded once per run and shared behind an `Arc`; episodes
//! read contiguous windows of it through [`DemandWindow`].

use std::f64::consts::PI;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{GridError, Result};

/// A single load sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub load_mw: f64,
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DD HH:MM:SS` stamp, read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("unrecognised timestamp '{raw}'"))
}

/// Chronologically ordered, uniformly sampled load history
#[derive(Debug, Clone, PartialEq)]
pub struct DemandSeries {
    points: Vec<DemandPoint>,
    step: Duration,
}

/// Summary statistics of a series
#[derive(Debug, Clone, Serialize)]
pub struct DemandStats {
    pub len: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub step_minutes: i64,
    pub min_mw: f64,
    pub max_mw: f64,
    pub mean_mw: f64,
}

impl DemandSeries {
    /// Build a series, checking order, spacing and values.
    ///
    /// The step is the spacing of the first two samples; every later pair
    /// must be spaced exactly one step apart.
    pub fn new(points: Vec<DemandPoint>) -> Result<Self> {
        if let Some((i, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| !p.load_mw.is_finite() || p.load_mw < 0.0)
        {
            return Err(GridError::Data(format!(
                "load at index {i} ({}) must be finite and non-negative",
                p.load_mw
            )));
        }

        let step = match points.as_slice() {
            [first, second, ..] => second.timestamp - first.timestamp,
            _ => Duration::hours(1),
        };
        if step <= Duration::zero() {
            return Err(GridError::Data(
                "demand series must be strictly chronological".to_string(),
            ));
        }

        for (i, pair) in points.windows(2).enumerate() {
            let delta = pair[1].timestamp - pair[0].timestamp;
            if delta <= Duration::zero() {
                return Err(GridError::Data(format!(
                    "demand series out of order at index {}",
                    i + 1
                )));
            }
            if delta != step {
                return Err(GridError::Data(format!(
                    "irregular spacing at index {}: {} minutes, expected {}",
                    i + 1,
                    delta.num_minutes(),
                    step.num_minutes()
                )));
            }
        }

        Ok(Self { points, step })
    }

    /// Build a series from raw loads starting at `start`, spaced by `step`.
    pub fn from_loads(start: DateTime<Utc>, step: Duration, loads: &[f64]) -> Result<Self> {
        let points = loads
            .iter()
            .enumerate()
            .map(|(i, &load_mw)| DemandPoint {
                timestamp: start + step * i as i32,
                load_mw,
            })
            .collect();
        let mut series = Self::new(points)?;
        series.step = step;
        Ok(series)
    }

    /// Hourly series with the same load at every step.
    pub fn constant(load_mw: f64, len: usize) -> Result<Self> {
        Self::from_loads(default_start(), Duration::hours(1), &vec![load_mw; len])
    }

    /// Load from a `.csv` (`timestamp,load_mw`) or `.json` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let series = match path.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => Self::from_csv(path)?,
            Some("json") => Self::from_json(path)?,
            _ => {
                return Err(GridError::Data(format!(
                    "unsupported demand file format: {}",
                    path.display()
                )))
            }
        };
        info!(
            "Loaded {} demand samples from {}",
            series.len(),
            path.display()
        );
        Ok(series)
    }

    fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let points = reader
            .deserialize::<DemandPoint>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(points)
    }

    fn from_json(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let points: Vec<DemandPoint> = serde_json::from_reader(file)?;
        Self::new(points)
    }

    /// Write the series as `timestamp,load_mw` CSV.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for point in &self.points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sampling interval
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Sampling interval in hours (used to turn MW into MWh)
    pub fn step_hours(&self) -> f64 {
        self.step.num_seconds() as f64 / 3600.0
    }

    pub fn load(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|p| p.load_mw)
    }

    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        self.points.get(index).map(|p| p.timestamp)
    }

    pub fn points(&self) -> &[DemandPoint] {
        &self.points
    }

    /// Loads for the `steps` samples after `index`, padded with the final
    /// sample when the series ends first.
    pub fn forecast(&self, index: usize, steps: usize) -> Vec<f64> {
        let last = self.points.last().map(|p| p.load_mw).unwrap_or(0.0);
        (1..=steps)
            .map(|k| self.load(index + k).unwrap_or(last))
            .collect()
    }

    /// Chronological train/validation/test split by ratio.
    pub fn split(&self, train_ratio: f64, val_ratio: f64) -> Result<(Self, Self, Self)> {
        if !(0.0..=1.0).contains(&train_ratio)
            || !(0.0..=1.0).contains(&val_ratio)
            || train_ratio + val_ratio > 1.0
        {
            return Err(GridError::Config(format!(
                "invalid split ratios: train {train_ratio}, val {val_ratio}"
            )));
        }
        let n = self.points.len();
        let train_end = (n as f64 * train_ratio) as usize;
        let val_end = ((n as f64 * (train_ratio + val_ratio)) as usize).min(n);

        let part = |range: std::ops::Range<usize>| Self {
            points: self.points[range].to_vec(),
            step: self.step,
        };
        debug!(
            "Split demand series: train {}, val {}, test {}",
            train_end,
            val_end - train_end,
            n - val_end
        );
        Ok((part(0..train_end), part(train_end..val_end), part(val_end..n)))
    }

    pub fn stats(&self) -> DemandStats {
        let loads = self.points.iter().map(|p| p.load_mw);
        let (min, max, sum) = loads.fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), v| (min.min(v), max.max(v), sum + v),
        );
        let len = self.points.len();
        DemandStats {
            len,
            start: self.points.first().map(|p| p.timestamp),
            end: self.points.last().map(|p| p.timestamp),
            step_minutes: self.step.num_minutes(),
            min_mw: if len > 0 { min } else { 0.0 },
            max_mw: if len > 0 { max } else { 0.0 },
            mean_mw: if len > 0 { sum / len as f64 } else { 0.0 },
        }
    }
}

fn default_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Parameters for the synthetic load profile
/// (base + daily sinusoid + seasonal sinusoid + Gaussian noise).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticDemand {
    pub start: DateTime<Utc>,
    pub hours: usize,
    pub base_mw: f64,
    pub daily_amplitude_mw: f64,
    pub seasonal_amplitude_mw: f64,
    pub noise_std_mw: f64,
    pub seed: u64,
}

impl Default for SyntheticDemand {
    fn default() -> Self {
        Self {
            start: default_start(),
            hours: 24 * 365 * 2,
            base_mw: 2500.0,
            daily_amplitude_mw: 500.0,
            seasonal_amplitude_mw: 1000.0,
            noise_std_mw: 100.0,
            seed: 42,
        }
    }
}

impl SyntheticDemand {
    /// Generate an hourly series. The same seed always yields the same series.
    pub fn generate(&self) -> Result<DemandSeries> {
        let noise = Normal::new(0.0, self.noise_std_mw.max(0.0))
            .map_err(|e| GridError::Config(format!("invalid noise std: {e}")))?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let loads: Vec<f64> = (0..self.hours)
            .map(|i| {
                let ts = self.start + Duration::hours(i as i64);
                let daily = self.daily_amplitude_mw * (2.0 * PI * ts.hour() as f64 / 24.0).sin();
                let seasonal =
                    self.seasonal_amplitude_mw * (2.0 * PI * ts.ordinal() as f64 / 365.0).sin();
                (self.base_mw + daily + seasonal + noise.sample(&mut rng)).max(0.0)
            })
            .collect();

        DemandSeries::from_loads(self.start, Duration::hours(1), &loads)
    }
}

/// Contiguous slice of a shared series assigned to one episode.
#[derive(Debug, Clone)]
pub struct DemandWindow {
    series: Arc<DemandSeries>,
    offset: usize,
    len: usize,
}

impl DemandWindow {
    /// Window of up to `horizon` samples starting at `offset`. When fewer
    /// samples remain the window is shortened; an empty window is an error.
    pub fn new(series: Arc<DemandSeries>, offset: usize, horizon: usize) -> Result<Self> {
        let available = series.len().saturating_sub(offset);
        if available == 0 || horizon == 0 {
            return Err(GridError::DataExhaustion {
                offset,
                requested: horizon,
                available,
            });
        }
        Ok(Self {
            series,
            offset,
            len: horizon.min(available),
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of steps the window can serve
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Demand at episode step `t`, `None` once the window is exhausted.
    pub fn demand(&self, t: usize) -> Option<f64> {
        if t < self.len {
            self.series.load(self.offset + t)
        } else {
            None
        }
    }

    pub fn timestamp(&self, t: usize) -> Option<DateTime<Utc>> {
        if t < self.len {
            self.series.timestamp(self.offset + t)
        } else {
            None
        }
    }

    /// Hour of day and weekday (Monday = 0) of step `t`.
    pub fn calendar(&self, t: usize) -> (u32, u32) {
        let index = (self.offset + t.min(self.len.saturating_sub(1))).min(self.series.len() - 1);
        self.series
            .timestamp(index)
            .map(|ts| (ts.hour(), ts.weekday().num_days_from_monday()))
            .unwrap_or((0, 0))
    }

    /// Forecast after step `t`; reads past the window into the rest of the
    /// series, which is historical data.
    pub fn forecast(&self, t: usize, steps: usize) -> Vec<f64> {
        self.series.forecast(self.offset + t, steps)
    }

    pub fn step_hours(&self) -> f64 {
        self.series.step_hours()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(loads: &[f64]) -> DemandSeries {
        DemandSeries::from_loads(default_start(), Duration::hours(1), loads).unwrap()
    }

    #[test]
    fn test_rejects_out_of_order() {
        let t0 = default_start();
        let points = vec![
            DemandPoint {
                timestamp: t0 + Duration::hours(1),
                load_mw: 1.0,
            },
            DemandPoint {
                timestamp: t0,
                load_mw: 1.0,
            },
        ];
        assert!(matches!(DemandSeries::new(points), Err(GridError::Data(_))));
    }

    #[test]
    fn test_rejects_gap() {
        let t0 = default_start();
        let points = [0, 1, 3]
            .iter()
            .map(|&h| DemandPoint {
                timestamp: t0 + Duration::hours(h),
                load_mw: 10.0,
            })
            .collect();
        assert!(DemandSeries::new(points).is_err());
    }

    #[test]
    fn test_rejects_negative_load() {
        assert!(DemandSeries::from_loads(default_start(), Duration::hours(1), &[1.0, -2.0]).is_err());
    }

    #[test]
    fn test_forecast_pads_with_last_value() {
        let series = hourly(&[1.0, 2.0, 3.0]);
        assert_eq!(series.forecast(0, 4), vec![2.0, 3.0, 3.0, 3.0]);
        assert_eq!(series.forecast(2, 2), vec![3.0, 3.0]);
    }

    #[test]
    fn test_step_hours() {
        let series =
            DemandSeries::from_loads(default_start(), Duration::minutes(30), &[1.0, 2.0]).unwrap();
        assert_eq!(series.step_hours(), 0.5);
        assert_eq!(DemandSeries::constant(5.0, 1).unwrap().step_hours(), 1.0);
    }

    #[test]
    fn test_split_is_chronological() {
        let loads: Vec<f64> = (0..100).map(f64::from).collect();
        let series = hourly(&loads);
        let (train, val, test) = series.split(0.7, 0.15).unwrap();
        assert_eq!(train.len(), 70);
        assert_eq!(val.len(), 15);
        assert_eq!(test.len(), 15);
        assert_eq!(val.load(0), Some(70.0));
        assert!(series.split(0.9, 0.2).is_err());
    }

    #[test]
    fn test_window_truncates_to_available() {
        let series = Arc::new(hourly(&[5.0; 100]));
        let window = DemandWindow::new(series.clone(), 0, 168).unwrap();
        assert_eq!(window.len(), 100);
        assert_eq!(window.demand(99), Some(5.0));
        assert_eq!(window.demand(100), None);

        assert!(matches!(
            DemandWindow::new(series, 100, 10),
            Err(GridError::DataExhaustion { available: 0, .. })
        ));
    }

    #[test]
    fn test_window_calendar() {
        // 2020-01-01 was a Wednesday
        let series = Arc::new(hourly(&[1.0; 48]));
        let window = DemandWindow::new(series, 0, 48).unwrap();
        assert_eq!(window.calendar(0), (0, 2));
        assert_eq!(window.calendar(25), (1, 3));
    }

    #[test]
    fn test_synthetic_is_seeded() {
        let params = SyntheticDemand {
            hours: 48,
            ..SyntheticDemand::default()
        };
        let a = params.generate().unwrap();
        let b = params.generate().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 48);

        let other = SyntheticDemand {
            seed: 7,
            ..params
        }
        .generate()
        .unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_stats() {
        let stats = hourly(&[1.0, 3.0, 5.0]).stats();
        assert_eq!(stats.min_mw, 1.0);
        assert_eq!(stats.max_mw, 5.0);
        assert_eq!(stats.mean_mw, 3.0);
        assert_eq!(stats.step_minutes, 60);
    }
}
