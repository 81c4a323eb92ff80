//! Binary snapshot files: a `u32` count followed by that many bincode-encoded
//! [`StepSnapshot`]s, so readers can stream them one at a time.

use anyhow::{Context, Result};
use spill_common::StepSnapshot;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub fn write_snapshots<P: AsRef<Path>>(path: P, snapshots: &[StepSnapshot]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_snapshots_to(&mut writer, snapshots)?;
    writer.flush()?;
    Ok(())
}

pub fn write_snapshots_to<W: Write>(mut writer: W, snapshots: &[StepSnapshot]) -> Result<()> {
    let count = u32::try_from(snapshots.len()).context("Too many snapshots for one file")?;
    bincode::serialize_into(&mut writer, &count).context("Failed to write snapshot count")?;
    for snapshot in snapshots {
        bincode::serialize_into(&mut writer, snapshot)
            .with_context(|| format!("Failed to write snapshot for step {}", snapshot.step))?;
    }
    Ok(())
}

/// Streams the snapshots of a file written by [`write_snapshots`].
pub struct SnapshotReader<R> {
    reader: R,
    remaining: u32,
    count: u32,
}

impl SnapshotReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open input file: {}", path.display()))?;
        SnapshotReader::new(BufReader::new(file))
    }
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let count: u32 = bincode::deserialize_from(&mut reader).context("Failed to read snapshot count from header")?;
        Ok(SnapshotReader {
            reader,
            remaining: count,
            count,
        })
    }

    /// Number of snapshots the header announced.
    pub fn count(&self) -> u32 {
        self.count
    }
}

impl<R: Read> Iterator for SnapshotReader<R> {
    type Item = Result<StepSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.count - self.remaining;
        self.remaining -= 1;
        let snapshot = bincode::deserialize_from(&mut self.reader)
            .with_context(|| format!("Failed to read snapshot {} of {}", index, self.count));
        if snapshot.is_err() {
            self.remaining = 0;
        }
        Some(snapshot)
    }
}

pub fn read_snapshots<P: AsRef<Path>>(path: P) -> Result<Vec<StepSnapshot>> {
    SnapshotReader::open(path)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use spill_common::{ElementSnapshot, ElementStatus, Vec3};

    fn snapshot(step: u32) -> StepSnapshot {
        let t0 = NaiveDate::from_ymd_opt(2013, 2, 13).unwrap().and_hms_opt(9, 0, 0).unwrap();
        StepSnapshot {
            step,
            model_time: t0 + Duration::minutes(15 * step as i64),
            populations: vec![ElementSnapshot {
                uncertain: false,
                positions: vec![Vec3::new(-72.0, 41.0 + step as f64 * 0.01, 0.0)],
                status_codes: vec![ElementStatus::InWater],
                windages: vec![0.03],
                spill_num: vec![0],
                element_id: vec![0],
            }],
        }
    }

    #[test]
    fn file_header_counts_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_snapshots.bin");
        let written: Vec<StepSnapshot> = (0..3).map(snapshot).collect();
        write_snapshots(&path, &written).unwrap();

        let reader = SnapshotReader::open(&path).unwrap();
        assert_eq!(reader.count(), 3);
        assert_eq!(read_snapshots(&path).unwrap(), written);
    }

    #[test]
    fn truncated_file_reports_an_error_and_stops() {
        let mut bytes = Vec::new();
        write_snapshots_to(&mut bytes, &[snapshot(0), snapshot(1)]).unwrap();
        bytes.truncate(bytes.len() - 4);
        let results: Vec<_> = SnapshotReader::new(bytes.as_slice()).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
