//! JSON-array output of result records.
//!
//! Two ways to produce the same document: [`write_all`] replaces the file in
//! one step, [`IncrementalWriter`] grows it batch by batch. An incremental
//! file is only valid JSON after [`IncrementalWriter::close`] has written the
//! closing bracket; nothing closes it implicitly.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tplus_models::ResultRecord;
use tracing::debug;

use crate::error::BatchError;

/// Write `records` as a pretty JSON array, replacing `path` atomically.
pub fn write_all(path: &Path, records: &[ResultRecord]) -> Result<(), BatchError> {
    let tmp = tmp_path(path);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut out, records)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), count = records.len(), "Results written");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A JSON array appended to across several flushes.
pub struct IncrementalWriter {
    out: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl IncrementalWriter {
    /// Truncate `path` and write the opening bracket.
    pub fn create(path: &Path) -> Result<Self, BatchError> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(b"[\n")?;
        out.flush()?;
        Ok(Self {
            out,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Append records after any already written, comma separated. Flushed to
    /// disk before returning.
    pub fn append(&mut self, records: &[ResultRecord]) -> Result<(), BatchError> {
        for record in records {
            if self.written > 0 {
                self.out.write_all(b",\n")?;
            }
            serde_json::to_writer_pretty(&mut self.out, record)?;
            self.written += 1;
        }
        self.out.flush()?;
        debug!(
            path = %self.path.display(),
            appended = records.len(),
            total = self.written,
            "Results appended"
        );
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Write the closing bracket.
    pub fn close(mut self) -> Result<(), BatchError> {
        let tail: &[u8] = if self.written > 0 { b"\n]\n" } else { b"]\n" };
        self.out.write_all(tail)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(code: &str) -> ResultRecord {
        ResultRecord::failed(code, None, "profile not found")
    }

    fn read_array(path: &Path) -> Vec<serde_json::Value> {
        let text = fs::read_to_string(path).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn write_all_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "stale").unwrap();

        write_all(&path, &[failed("600000"), failed("000001")]).unwrap();

        let values = read_array(&path);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["code"], "000001");
        assert!(!dir.path().join("out.json.tmp").exists());
    }

    #[test]
    fn write_all_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_all(&path, &[]).unwrap();
        assert!(read_array(&path).is_empty());
    }

    #[test]
    fn three_records_in_two_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut writer = IncrementalWriter::create(&path).unwrap();
        writer.append(&[failed("a"), failed("b")]).unwrap();
        writer.append(&[failed("c")]).unwrap();
        assert_eq!(writer.written(), 3);
        writer.close().unwrap();

        let codes: Vec<String> = read_array(&path)
            .iter()
            .map(|v| v["code"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(codes, ["a", "b", "c"]);
    }

    #[test]
    fn unclosed_file_is_not_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut writer = IncrementalWriter::create(&path).unwrap();
        writer.append(&[failed("a")]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_err());
        drop(writer);
    }

    #[test]
    fn close_without_records_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        IncrementalWriter::create(&path).unwrap().close().unwrap();
        assert!(read_array(&path).is_empty());
    }
}
