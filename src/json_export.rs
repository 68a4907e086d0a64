//! Double-buffered rotating JSON trace export (§6 "External interfaces",
//! json-export feature). Disabled in minimal/embedded-host builds.
//!
//! Grounded on `json_export.hpp/.cpp`'s double-buffer-flush-swap pattern:
//! entries accumulate in an in-memory buffer and are flushed to a numbered
//! file once `json_length` entries have been collected, so disk I/O never
//! blocks the producer past a buffer swap.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::PhyError;

/// One entry queued for export: a name (`<prefix_entry><counter>`) and an
/// arbitrary serializable payload.
struct PendingEntry {
    name: String,
    value: Value,
}

/// Writes JSON trace files named `<prefix_file><10-digit-counter>.json`,
/// each containing up to `json_length` entries named
/// `<prefix_entry><64-bit-counter>` (§6).
pub struct JsonExport {
    dir: PathBuf,
    prefix_file: String,
    prefix_entry: String,
    json_length: usize,
    file_counter: u32,
    entry_counter: u64,
    buffer: Vec<PendingEntry>,
    /// When set, floats are scaled and rounded to i32 before export (§6
    /// "optional float-to-int32 scaling"), trading precision for smaller
    /// files when downstream tooling only needs fixed-point values.
    int32_scale: Option<f64>,
}

impl JsonExport {
    pub fn new(dir: impl AsRef<Path>, prefix_file: &str, prefix_entry: &str, json_length: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix_file: prefix_file.to_string(),
            prefix_entry: prefix_entry.to_string(),
            json_length: json_length.max(1),
            file_counter: 0,
            entry_counter: 0,
            buffer: Vec::with_capacity(json_length.max(1)),
            int32_scale: None,
        }
    }

    pub fn with_int32_scaling(mut self, scale: f64) -> Self {
        self.int32_scale = Some(scale);
        self
    }

    /// Queues one entry for export, flushing to disk once `json_length`
    /// entries have accumulated.
    pub fn push<T: Serialize>(&mut self, value: &T) -> Result<(), PhyError> {
        let mut json = serde_json::to_value(value).map_err(crate::error::ConfigError::from)?;
        if let Some(scale) = self.int32_scale {
            scale_floats_to_int32(&mut json, scale);
        }

        let name = format!("{}{}", self.prefix_entry, self.entry_counter);
        self.entry_counter += 1;
        self.buffer.push(PendingEntry { name, value: json });

        if self.buffer.len() >= self.json_length {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes every buffered entry to `<prefix_file><10-digit-counter>.json`
    /// and clears the buffer, regardless of whether it is full.
    pub fn flush(&mut self) -> Result<(), PhyError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let filename = format!("{}{:010}.json", self.prefix_file, self.file_counter);
        let path = self.dir.join(filename);
        let file = File::create(&path).map_err(PhyError::Io)?;
        let mut writer = BufWriter::new(file);

        let mut object = serde_json::Map::new();
        for entry in self.buffer.drain(..) {
            object.insert(entry.name, entry.value);
        }
        serde_json::to_writer_pretty(&mut writer, &Value::Object(object)).map_err(crate::error::ConfigError::from)?;
        writer.flush().map_err(PhyError::Io)?;

        self.file_counter += 1;
        Ok(())
    }

    pub fn pending_entries(&self) -> usize {
        self.buffer.len()
    }
}

impl Drop for JsonExport {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn scale_floats_to_int32(value: &mut Value, scale: f64) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                let scaled = (f * scale).round() as i64;
                *n = serde_json::Number::from(scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| scale_floats_to_int32(v, scale)),
        Value::Object(map) => map.values_mut().for_each(|v| scale_floats_to_int32(v, scale)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct SampleEntry {
        time: i64,
        snr_db: f32,
    }

    #[test]
    fn flushes_automatically_at_json_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut export = JsonExport::new(dir.path(), "trace", "entry", 2);
        export.push(&SampleEntry { time: 0, snr_db: 10.0 }).unwrap();
        assert_eq!(export.pending_entries(), 1);
        export.push(&SampleEntry { time: 1, snr_db: 11.0 }).unwrap();
        assert_eq!(export.pending_entries(), 0);
        assert!(dir.path().join("trace0000000000.json").exists());
    }

    #[test]
    fn int32_scaling_rounds_floats() {
        let mut value = serde_json::json!({ "snr_db": 10.4 });
        scale_floats_to_int32(&mut value, 1000.0);
        assert_eq!(value["snr_db"], serde_json::json!(10400));
    }

    #[test]
    fn drop_flushes_remaining_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut export = JsonExport::new(dir.path(), "trace", "entry", 100);
            export.push(&SampleEntry { time: 0, snr_db: 5.0 }).unwrap();
        }
        assert!(dir.path().join("trace0000000000.json").exists());
    }
}
