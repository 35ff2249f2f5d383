//! Per-year flight-time reports shared by all workers.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use glider_engine::{report_header, FlightRecord};
use tracing::{debug, info};

/// Appends report rows to `Flt-times_<year>.csv`, creating each year's file on first use.
pub struct YearlyCsvSink {
    dir: PathBuf,
    thresholds: Vec<u32>,
    writers: Mutex<BTreeMap<String, (PathBuf, csv::Writer<File>)>>,
}

pub fn report_path(dir: &Path, year: &str) -> PathBuf {
    dir.join(format!("Flt-times_{}.csv", year))
}

impl YearlyCsvSink {
    pub fn new(dir: &Path, thresholds: &[u32]) -> Self {
        Self {
            dir: dir.to_path_buf(),
            thresholds: thresholds.to_vec(),
            writers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Write one flight. Year lookup, file creation and the row append happen under one lock.
    pub fn append(&self, file_name: &str, flight: &FlightRecord) -> Result<()> {
        let year = flight.year_key();
        let row = flight.report_row(file_name, &self.thresholds);

        let mut writers = self
            .writers
            .lock()
            .map_err(|_| anyhow!("report writer lock poisoned"))?;
        if !writers.contains_key(&year) {
            let path = report_path(&self.dir, &year);
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(report_header(&self.thresholds))?;
            debug!("Opened flight report {}", path.display());
            writers.insert(year.clone(), (path, writer));
        }
        let Some((path, writer)) = writers.get_mut(&year) else {
            return Err(anyhow!("no report writer for {}", year));
        };
        writer
            .write_record(&row)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Flush every report and return the written paths in year order.
    pub fn finish(self) -> Result<Vec<PathBuf>> {
        let writers = self
            .writers
            .into_inner()
            .map_err(|_| anyhow!("report writer lock poisoned"))?;
        let mut paths = Vec::with_capacity(writers.len());
        for (_, (path, mut writer)) in writers {
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", path.display()))?;
            info!("Wrote flight report: {}", path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}
