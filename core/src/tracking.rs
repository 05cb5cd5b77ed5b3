//! Local experiment tracking.
//!
//! Every logged event is appended as one JSON object per line, so a run can be
//! inspected with standard tooling after the fact.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedRecord {
    pub run: String,
    pub step: usize,
    pub values: BTreeMap<String, f64>,
}

/// Sink for scalar metrics.
pub trait Tracker {
    fn log(&mut self, step: usize, values: &[(&str, f64)]) -> Result<()>;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTracker;

impl Tracker for NullTracker {
    fn log(&mut self, _step: usize, _values: &[(&str, f64)]) -> Result<()> {
        Ok(())
    }
}

/// Adds fixed tags to every record before forwarding it.
pub struct TaggedTracker<'a> {
    inner: &'a mut dyn Tracker,
    tags: Vec<(&'static str, f64)>,
}

impl<'a> TaggedTracker<'a> {
    pub fn new(inner: &'a mut dyn Tracker, tags: Vec<(&'static str, f64)>) -> Self {
        Self { inner, tags }
    }
}

impl Tracker for TaggedTracker<'_> {
    fn log(&mut self, step: usize, values: &[(&str, f64)]) -> Result<()> {
        let mut tagged: Vec<(&str, f64)> = Vec::with_capacity(self.tags.len() + values.len());
        for &(name, value) in &self.tags {
            tagged.push((name, value));
        }
        tagged.extend_from_slice(values);
        self.inner.log(step, &tagged)
    }
}

/// Appends records for one named run to a JSON-lines file.
pub struct JsonlTracker {
    run: String,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlTracker {
    pub fn open(path: &Path, run: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open metrics log {}", path.display()))?;

        Ok(Self {
            run: run.into(),
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Record the run configuration as a `config` line.
    pub fn log_config<T: Serialize>(&mut self, config: &T) -> Result<()> {
        let line = serde_json::json!({
            "run": self.run,
            "config": serde_json::to_value(config)?,
        });
        self.write_line(&line)
    }

    fn write_line(&mut self, value: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }
}

impl Tracker for JsonlTracker {
    fn log(&mut self, step: usize, values: &[(&str, f64)]) -> Result<()> {
        let record = TrackedRecord {
            run: self.run.clone(),
            step,
            values: values
                .iter()
                .map(|&(name, value)| (name.to_owned(), value))
                .collect(),
        };
        let value = serde_json::to_value(&record)?;
        self.write_line(&value)
    }
}

/// Read back the metric records of a JSON-lines log, skipping config lines.
pub fn read_records(path: &Path) -> Result<Vec<TrackedRecord>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read metrics log {}", path.display()))?;
    let mut records = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON on line {} of {}", number + 1, path.display()))?;
        if value.get("config").is_some() {
            continue;
        }
        records.push(serde_json::from_value(value)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/metrics.jsonl");

        {
            let mut tracker = JsonlTracker::open(&path, "std_5_image_0").unwrap();
            tracker.log_config(&serde_json::json!({ "std_dev": 5.0 })).unwrap();
            tracker.log(1, &[("loss", 0.5), ("test_psnr", 12.0)]).unwrap();
            tracker.log(2, &[("loss", 0.25)]).unwrap();
        }
        {
            let mut tracker = JsonlTracker::open(&path, "second").unwrap();
            tracker.log(1, &[("loss", 0.125)]).unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].run, "std_5_image_0");
        assert_eq!(records[0].values["test_psnr"], 12.0);
        assert_eq!(records[1].step, 2);
        assert_eq!(records[2].run, "second");
    }

    #[test]
    fn tagged_tracker_prefixes_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.jsonl");
        let mut tracker = JsonlTracker::open(&path, "sweep").unwrap();

        {
            let mut tagged = TaggedTracker::new(&mut tracker, vec![("std_dev", 3.0)]);
            tagged.log(4, &[("loss", 0.5)]).unwrap();
        }
        drop(tracker);

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step, 4);
        assert_eq!(records[0].values["std_dev"], 3.0);
        assert_eq!(records[0].values["loss"], 0.5);
    }
}
