//! CSV session storage.
//!
//! [`CsvSink`] is one open output file. [`SinkManager`] owns the lifecycle of at most
//! one sink at a time and lives inside the session state, so every open, append and
//! finalize runs inside the session lock's critical section.
use crate::data::clock::WallClock;
use crate::data::row::{ColumnLayout, LogRow};
use crate::error::{AppResult, DaqError};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_NAME_SUFFIX: u32 = 10_000;

/// One open session file.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    layout: ColumnLayout,
    rows_written: u64,
}

impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("rows_written", &self.rows_written)
            .finish()
    }
}

impl CsvSink {
    /// Create a new file in `dir` named after `stamp`, and write the header.
    ///
    /// Names follow `output_YYYYmmdd_HHMMSS.csv`; if that exists, `_1`, `_2`, ... are
    /// appended. Existing files are never opened for writing.
    pub fn create(
        dir: &Path,
        stamp: chrono::DateTime<chrono::Local>,
        layout: ColumnLayout,
    ) -> AppResult<Self> {
        let base = format!("output_{}", stamp.format("%Y%m%d_%H%M%S"));
        let (path, file) = create_unique(dir, &base)?;

        let mut writer = csv::WriterBuilder::new().from_writer(file);
        writer.write_record(layout.header())?;
        writer.flush()?;

        Ok(Self {
            path,
            writer,
            layout,
            rows_written: 0,
        })
    }

    /// Append one row and flush it to the OS.
    pub fn append(&mut self, row: &LogRow) -> AppResult<()> {
        self.writer.write_record(row.to_record(self.layout))?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush, sync to disk, and close.
    pub fn finalize(mut self) -> AppResult<PathBuf> {
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| DaqError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        Ok(self.path)
    }

    /// Path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows appended so far, header excluded.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

fn create_unique(dir: &Path, base: &str) -> AppResult<(PathBuf, File)> {
    for suffix in 0..MAX_NAME_SUFFIX {
        let name = if suffix == 0 {
            format!("{base}.csv")
        } else {
            format!("{base}_{suffix}.csv")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "Output name taken, trying next suffix");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(DaqError::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free output file name for '{base}' in {}", dir.display()),
    )))
}

/// Owns at most one open [`CsvSink`].
pub struct SinkManager {
    output_dir: PathBuf,
    layout: ColumnLayout,
    clock: Arc<dyn WallClock>,
    current: Option<CsvSink>,
}

impl SinkManager {
    /// Manager writing into `output_dir`.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        layout: ColumnLayout,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout,
            clock,
            current: None,
        }
    }

    /// Open a new file. If one is already open it is kept and its path returned.
    pub fn open(&mut self) -> AppResult<PathBuf> {
        if let Some(sink) = &self.current {
            warn!(path = %sink.path().display(), "Sink already open, keeping it");
            return Ok(sink.path().to_path_buf());
        }

        ensure_directory_exists(&self.output_dir)?;
        let sink = CsvSink::create(&self.output_dir, self.clock.now(), self.layout)?;
        let path = sink.path().to_path_buf();
        info!(path = %path.display(), "Logging data to new file");
        self.current = Some(sink);
        Ok(path)
    }

    /// Append a row to the open file. Returns `false` when nothing is open.
    pub fn append(&mut self, row: &LogRow) -> AppResult<bool> {
        match self.current.as_mut() {
            Some(sink) => {
                sink.append(row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Finalize the open file. With nothing open this is a no-op returning `None`.
    pub fn finalize(&mut self) -> AppResult<Option<PathBuf>> {
        let Some(sink) = self.current.take() else {
            return Ok(None);
        };
        let rows = sink.rows_written();
        let path = sink.finalize()?;
        info!(path = %path.display(), rows, "Finalized session file");
        Ok(Some(path))
    }

    /// Whether a file is open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Path of the open file, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|sink| sink.path())
    }

    /// Column layout of files opened by this manager.
    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    /// Directory receiving the files.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Create `dir` (and parents) if missing.
pub fn ensure_directory_exists(dir: &Path) -> AppResult<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        info!(dir = %dir.display(), "Created output directory");
    }
    Ok(())
}
