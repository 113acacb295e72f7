use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Write `rows` as comma-separated lines to `{dir}/{filename}`.
pub fn write_rows<R, F>(dir: &Path, filename: &str, rows: R) -> Result<PathBuf, PersistError>
where
    R: IntoIterator<Item = Vec<F>>,
    F: AsRef<str>,
{
    let mut buffer = String::new();
    for row in rows {
        let mut first = true;
        for field in row {
            if !first {
                buffer.push(',');
            }
            first = false;
            push_field(&mut buffer, field.as_ref());
        }
        buffer.push('\n');
    }
    AtomicFileWriter::new(dir.to_path_buf()).write(filename, &buffer)
}

fn push_field(buffer: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\r', '\n']);
    if !needs_quotes {
        buffer.push_str(field);
        return;
    }
    buffer.push('"');
    buffer.push_str(&field.replace('"', "\"\""));
    buffer.push('"');
}
