//! Thread-safe statistics aggregator: per-name timing accumulators, per
//! iteration tuples, and per-generation duplicate counts, with both a
//! synchronous and an asynchronous (background-flusher) write mode.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Result;

/// Running count/min/max/mean/variance/sum over a named stream of samples,
/// computed incrementally (Welford's method for the variance).
#[derive(Debug, Clone, Copy, Default)]
pub struct Accumulator {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
    sum: f64,
}

impl Accumulator {
    pub fn insert(&mut self, sample: f64) {
        if self.count == 0 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
        self.count += 1;
        self.sum += sample;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

#[derive(Debug, Clone)]
struct IterationRow {
    sector_id: String,
    num_waypoints: usize,
    iteration: usize,
    best_fitness: f64,
    iteration_time_sec: f64,
}

#[derive(Debug, Clone)]
struct DuplicateRow {
    sector_id: String,
    num_waypoints: usize,
    iteration: usize,
    number_duplicates: usize,
}

#[derive(Default)]
struct Inner {
    timing_info: HashMap<String, Accumulator>,
    pending_iterations: Vec<IterationRow>,
    pending_duplicates: Vec<DuplicateRow>,
}

/// Thread-safe aggregator shared by every sector runner and optimizer run.
pub struct StatsAggregator {
    inner: Arc<Mutex<Inner>>,
    writer: Mutex<Option<WriterHandle>>,
}

struct WriterHandle {
    shutdown: Arc<Mutex<bool>>,
    thread: JoinHandle<()>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        StatsAggregator {
            inner: Arc::new(Mutex::new(Inner::default())),
            writer: Mutex::new(None),
        }
    }

    pub fn report_timing(&self, subsystem: &str, elapsed_seconds: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .timing_info
            .entry(subsystem.to_string())
            .or_default()
            .insert(elapsed_seconds);
    }

    pub fn report_iteration_complete(
        &self,
        sector_id: &str,
        num_waypoints: usize,
        iteration: usize,
        best_fitness: f64,
        iteration_time_sec: f64,
    ) {
        log::debug!(
            "iteration complete: sector={}, waypoints={}, iteration={}, fitness={}, time={}",
            sector_id,
            num_waypoints,
            iteration,
            best_fitness,
            iteration_time_sec
        );
        let mut inner = self.inner.lock().unwrap();
        inner.pending_iterations.push(IterationRow {
            sector_id: sector_id.to_string(),
            num_waypoints,
            iteration,
            best_fitness,
            iteration_time_sec,
        });
    }

    pub fn report_duplicate_entry(
        &self,
        sector_id: &str,
        num_waypoints: usize,
        iteration: usize,
        number_duplicates: usize,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_duplicates.push(DuplicateRow {
            sector_id: sector_id.to_string(),
            num_waypoints,
            iteration,
            number_duplicates,
        });
    }

    pub fn timing_summary(&self, subsystem: &str) -> Option<Accumulator> {
        self.inner.lock().unwrap().timing_info.get(subsystem).copied()
    }

    /// Writes `<path>.iteration.csv` and `<path>.duplicates.csv`, draining
    /// any pending rows.
    pub fn flush(&self, path: &str, append: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        write_iteration_csv(path, append, &inner.pending_iterations)?;
        write_duplicates_csv(path, append, &inner.pending_duplicates)?;
        inner.pending_iterations.clear();
        inner.pending_duplicates.clear();
        Ok(())
    }

    /// Starts a background thread that wakes roughly every 5 seconds,
    /// drains pending rows, and appends them to the two stats files.
    pub fn start_writer(self: &Arc<Self>, path: String) {
        let mut writer = self.writer.lock().unwrap();
        if writer.is_some() {
            return;
        }
        let shutdown = Arc::new(Mutex::new(false));
        let aggregator = Arc::clone(self);
        let shutdown_flag = Arc::clone(&shutdown);
        let thread = std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(5));
            if let Err(err) = aggregator.flush(&path, true) {
                log::error!("stats flush failed: {}", err);
            }
            if *shutdown_flag.lock().unwrap() {
                break;
            }
        });
        *writer = Some(WriterHandle { shutdown, thread });
    }

    /// Signals the background flusher to stop and joins it.
    pub fn stop_writer(&self) {
        let handle = self.writer.lock().unwrap().take();
        if let Some(handle) = handle {
            *handle.shutdown.lock().unwrap() = true;
            let _ = handle.thread.join();
        }
    }
}

fn write_iteration_csv(path: &str, append: bool, rows: &[IterationRow]) -> Result<()> {
    let pathname = format!("{}.iteration.csv", path);
    let write_header = !append || !std::path::Path::new(&pathname).exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .truncate(!append)
        .open(&pathname)?;
    if write_header {
        writeln!(file, "SectorId,NumWaypoints,Iteration,BestFitness,IterationTimeSec")?;
    }
    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{}",
            row.sector_id, row.num_waypoints, row.iteration, row.best_fitness, row.iteration_time_sec
        )?;
    }
    Ok(())
}

fn write_duplicates_csv(path: &str, append: bool, rows: &[DuplicateRow]) -> Result<()> {
    let pathname = format!("{}.duplicates.csv", path);
    let write_header = !append || !std::path::Path::new(&pathname).exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .truncate(!append)
        .open(&pathname)?;
    if write_header {
        writeln!(file, "SectorId,NumWaypoints,Iteration,NumberDuplicates")?;
    }
    for row in rows {
        writeln!(
            file,
            "{},{},{},{}",
            row.sector_id, row.num_waypoints, row.iteration, row.number_duplicates
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn accumulator_tracks_running_statistics() {
        let mut acc = Accumulator::default();
        for sample in [1.0, 2.0, 3.0, 4.0, 5.0] {
            acc.insert(sample);
        }
        assert_eq!(acc.count(), 5);
        assert_eq!(acc.min(), 1.0);
        assert_eq!(acc.max(), 5.0);
        assert!((acc.mean() - 3.0).abs() < 1e-9);
        assert!((acc.sum() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn flush_writes_both_csv_files_with_headers() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("run");
        let base_str = base.to_str().unwrap();

        let aggregator = StatsAggregator::new();
        aggregator.report_iteration_complete("sector-1", 8, 0, 42.0, 0.5);
        aggregator.report_duplicate_entry("sector-1", 8, 0, 3);
        aggregator.flush(base_str, false).unwrap();

        let iteration_csv = std::fs::read_to_string(format!("{}.iteration.csv", base_str)).unwrap();
        assert!(iteration_csv.starts_with("SectorId,NumWaypoints,Iteration,BestFitness,IterationTimeSec"));
        assert!(iteration_csv.contains("sector-1,8,0,42,0.5"));

        let duplicates_csv = std::fs::read_to_string(format!("{}.duplicates.csv", base_str)).unwrap();
        assert!(duplicates_csv.starts_with("SectorId,NumWaypoints,Iteration,NumberDuplicates"));
        assert!(duplicates_csv.contains("sector-1,8,0,3"));
    }

    #[test]
    fn flush_clears_pending_rows() {
        let dir = tempdir().unwrap();
        let base_str = dir.path().join("run").to_str().unwrap().to_string();
        let aggregator = StatsAggregator::new();
        aggregator.report_iteration_complete("s", 8, 0, 1.0, 0.1);
        aggregator.flush(&base_str, false).unwrap();
        assert!(aggregator.inner.lock().unwrap().pending_iterations.is_empty());
    }
}
