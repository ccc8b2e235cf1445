//! Append-only per-session record files
//!
//! Layout: `<root>/<YYYY-MM-DD>/<HHMM>_<identifier>/market_data.csv`
//! - `YYYY-MM-DD`: process-local date when the session started tracking
//! - `HHMM`: settlement time in the market's timezone
//!
//! The path is fixed when the session file is created and never recomputed, so a
//! session crossing local midnight still writes a single file. The file itself is
//! only created on the first append; a session that never samples leaves nothing
//! behind. Every append is synced before it returns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{Record, SessionMetadata};

/// File name inside each session folder
pub const RECORD_FILE_NAME: &str = "market_data.csv";

/// Column header, kept identical to historical files
pub const HEADER: &str = "timestamp,time_readable,btc_price,strike_price,poly_yes_price";

/// Root of the record tree
#[derive(Clone, Debug)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic file path for a session
    pub fn session_path(
        &self,
        metadata: &SessionMetadata,
        folder_prefix: &str,
        started_at: DateTime<Utc>,
    ) -> PathBuf {
        let date_folder = started_at.with_timezone(&Local).format("%Y-%m-%d").to_string();
        let event_folder = format!("{}_{}", folder_prefix, metadata.identifier);
        self.root.join(date_folder).join(event_folder).join(RECORD_FILE_NAME)
    }

    /// Handle for a session's file. Nothing touches the disk until the first append.
    pub fn open(&self, path: PathBuf) -> SessionFile {
        SessionFile { path, file: None, rows_written: 0 }
    }
}

/// Lazily-created, append-only file for one session
#[derive(Debug)]
pub struct SessionFile {
    path: PathBuf,
    file: Option<File>,
    rows_written: u64,
}

impl SessionFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been created or reopened by this handle
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Rows appended through this handle (excludes rows from a previous process)
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one record and sync it to disk before returning
    pub async fn append(&mut self, record: &Record) -> Result<(), StoreError> {
        let line = format_record(record);
        let path = self.path.clone();
        let file = self.ensure_open().await?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|source| StoreError::Write { path: path.clone(), source })?;
        file.flush().await.map_err(|source| StoreError::Write { path: path.clone(), source })?;
        file.sync_data().await.map_err(|source| StoreError::Write { path, source })?;

        self.rows_written += 1;
        Ok(())
    }

    /// Flush and release the file. Safe to call on a handle that never wrote.
    pub async fn close(mut self) -> Result<(), StoreError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
            file.sync_all()
                .await
                .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
            debug!("Closed {} after {} rows", self.path.display(), self.rows_written);
        }
        Ok(())
    }

    async fn ensure_open(&mut self) -> Result<&mut File, StoreError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => open_for_append(&self.path).await?,
        };
        Ok(self.file.insert(file))
    }
}

/// Open in append mode, writing the header only if the file is new or empty
async fn open_for_append(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::CreateDir { path: parent.to_path_buf(), source })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| StoreError::Open { path: path.to_path_buf(), source })?;

    let existing_len = file
        .metadata()
        .await
        .map_err(|source| StoreError::Open { path: path.to_path_buf(), source })?
        .len();

    if existing_len == 0 {
        file.write_all(format!("{}\n", HEADER).as_bytes())
            .await
            .map_err(|source| StoreError::Write { path: path.to_path_buf(), source })?;
        file.flush()
            .await
            .map_err(|source| StoreError::Write { path: path.to_path_buf(), source })?;
        file.sync_data()
            .await
            .map_err(|source| StoreError::Write { path: path.to_path_buf(), source })?;
        info!("Created record file {}", path.display());
    } else {
        info!("Reopened record file {} ({} bytes)", path.display(), existing_len);
    }

    Ok(file)
}

/// `epoch.micros,HH:MM:SS,price,strike,probability\n`
pub fn format_record(record: &Record) -> String {
    let ts = record.captured_at;
    let readable = ts.with_timezone(&Local).format("%H:%M:%S");
    format!(
        "{}.{:06},{},{},{},{}\n",
        ts.timestamp(),
        ts.timestamp_subsec_micros(),
        readable,
        record.underlying_price,
        record.strike,
        record.implied_probability
    )
}
