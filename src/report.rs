use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::config::GammaConfig;
use crate::enums::{Normalization, SearchStrategy};
use crate::stats::GammaStats;

/// Wall-time statistics over repeated runs of the same comparison.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TimingStats {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl TimingStats {
    pub fn from_durations(durations: &[Duration]) -> Self {
        let ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1e3).collect();
        let mean = ms.iter().sum::<f64>() / ms.len() as f64;
        let var = ms.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / ms.len() as f64;
        Self {
            mean_ms: mean,
            std_ms: var.sqrt(),
            min_ms: ms.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: ms.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// One benchmark run: configuration, timing and result statistics.
/// Serialized as a CSV row for comparison against other implementations.
#[derive(Clone, Debug, Serialize)]
pub struct BenchmarkRecord {
    pub strategy: SearchStrategy,
    pub dims: u8,
    pub dd: f64,
    pub dta: f64,
    pub normalization: Normalization,
    pub global_norm_dose: Option<f64>,
    pub dose_cutoff: f64,
    pub max_search_distance: f64,
    pub step_size: f64,
    pub repeats: usize,
    pub timing: TimingStats,
    pub stats: GammaStats,
}

impl BenchmarkRecord {
    pub fn new(
        config: &GammaConfig,
        repeats: usize,
        timing: TimingStats,
        stats: GammaStats,
    ) -> Self {
        Self {
            strategy: config.search_strategy,
            dims: config.dims,
            dd: config.dd,
            dta: config.dta,
            normalization: config.normalization,
            global_norm_dose: config.global_norm_dose,
            dose_cutoff: config.dose_cutoff,
            max_search_distance: config.max_search_distance,
            step_size: config.step_size,
            repeats,
            timing,
            stats,
        }
    }

    pub fn csv_header() -> &'static str {
        "strategy,dims,dd[%],dta[mm],norm,normDose,cutoff,maxSearchDist[mm],stepSize[mm],repeats,\
         meanTime[ms],stdTime[ms],minTime[ms],maxTime[ms],\
         passRate[%],meanGamma,minGamma,maxGamma,voxels,excluded,exhausted"
    }

    pub fn to_csv_row(&self) -> String {
        let opt = |v: Option<f64>| v.map_or_else(|| "nan".to_string(), |v| format!("{v:.6}"));
        format!(
            "{:?},{},{},{},{:?},{},{},{},{},{},{:.6},{:.6},{:.3},{:.3},{},{},{},{},{},{},{}",
            self.strategy,
            self.dims,
            self.dd,
            self.dta,
            self.normalization,
            self.global_norm_dose
                .map_or_else(|| "max".to_string(), |v| v.to_string()),
            self.dose_cutoff,
            self.max_search_distance,
            self.step_size,
            self.repeats,
            self.timing.mean_ms,
            self.timing.std_ms,
            self.timing.min_ms,
            self.timing.max_ms,
            opt(self.stats.pass_rate.map(|r| r * 100.0)),
            opt(self.stats.mean),
            opt(self.stats.min),
            opt(self.stats.max),
            self.stats.total_voxels,
            self.stats.excluded_voxels,
            self.stats.exhausted_voxels,
        )
    }

    /// Append this record to a CSV file, writing the header first when the
    /// file is new or empty.
    pub fn append_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", Self::csv_header())?;
        }
        writeln!(file, "{}", self.to_csv_row())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stats() -> GammaStats {
        GammaStats {
            pass_rate: Some(0.95),
            mean: Some(0.4),
            min: Some(0.0),
            max: Some(2.5),
            total_voxels: 1000,
            excluded_voxels: 100,
            exhausted_voxels: 5,
            passed_voxels: 855,
        }
    }

    #[test]
    fn timing_stats_over_repeats() {
        let timing = TimingStats::from_durations(&[
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(30),
        ]);
        assert_abs_diff_eq!(timing.mean_ms, 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(timing.min_ms, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(timing.max_ms, 30.0, epsilon = 1e-9);
        assert!(timing.std_ms > 0.0);
    }

    #[test]
    fn row_has_as_many_fields_as_the_header() {
        let record = BenchmarkRecord::new(
            &GammaConfig::default(),
            3,
            TimingStats::from_durations(&[Duration::from_millis(5)]),
            stats(),
        );
        let header_fields = BenchmarkRecord::csv_header().split(',').count();
        let row_fields = record.to_csv_row().split(',').count();
        assert_eq!(header_fields, row_fields);
    }

    #[test]
    fn append_writes_header_once() {
        let path = tempfile::tempdir().unwrap().keep().join("bench.csv");
        let record = BenchmarkRecord::new(
            &GammaConfig::default(),
            1,
            TimingStats::from_durations(&[Duration::from_millis(5)]),
            stats(),
        );
        record.append_to(&path).unwrap();
        record.append_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("strategy,"));
        assert_eq!(lines[1], lines[2]);
    }
}
