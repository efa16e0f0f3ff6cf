//! Durable state: the user profile and the last analysis record, as one
//! JSON file under the platform data directory.
//!
//! Access is guarded by an advisory file lock so concurrent processes
//! don't interleave writes. Reads are best-effort: a corrupt file is
//! moved aside and defaults load, never an error. The API key is NOT
//! stored here; it lives in the environment or OS keychain via
//! [`crate::config`].

use anyhow::Context;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::snapshot::AnalysisRecord;

const STORE_FILE: &str = "store.json";
const LOCK_FILE: &str = ".lock";
const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    /// Free-text JSON blob describing the user; validated parseable on save.
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    last_analysis: Option<AnalysisRecord>,
}

pub struct Store {
    data_dir: PathBuf,
}

struct StoreLock {
    file: std::fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Store {
    /// Store under the platform data directory.
    pub fn open_default() -> anyhow::Result<Self> {
        let dir = dirs::data_dir()
            .context("could not determine data directory")?
            .join("pagepilot");
        Ok(Self::at(dir))
    }

    /// Store rooted at an explicit directory.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn profile(&self) -> Option<String> {
        self.load().profile
    }

    /// Save the profile after checking it parses as JSON.
    pub fn set_profile(&self, profile: &str) -> anyhow::Result<()> {
        serde_json::from_str::<serde_json::Value>(profile)
            .context("profile must be valid JSON")?;
        let _lock = self.lock()?;
        let mut data = self.load();
        data.profile = Some(profile.to_string());
        self.write(&data)
    }

    pub fn last_analysis(&self) -> Option<AnalysisRecord> {
        self.load().last_analysis
    }

    /// Persist an analysis record. Returns `false` without writing when
    /// the stored record belongs to a newer cycle, so a slow early cycle
    /// can never clobber a later one.
    pub fn save_record(&self, record: &AnalysisRecord) -> anyhow::Result<bool> {
        let _lock = self.lock()?;
        let mut data = self.load();
        if let Some(existing) = &data.last_analysis {
            if is_stale(record, existing.cycle_id == record.cycle_id, existing.started_at) {
                tracing::debug!(
                    cycle = %record.cycle_id,
                    "discarding stale analysis record"
                );
                return Ok(false);
            }
        }
        data.last_analysis = Some(record.clone());
        self.write(&data)?;
        Ok(true)
    }

    fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    /// Read the store file, tolerating absence and corruption.
    fn load(&self) -> StoreData {
        let path = self.store_path();
        let Ok(content) = fs::read_to_string(&path) else {
            return StoreData::default();
        };
        match serde_json::from_str(&content) {
            Ok(data) => data,
            Err(err) => {
                preserve_corrupt_file(&path, &content);
                tracing::warn!(%err, "store file was corrupted; backup saved, defaults loaded");
                StoreData::default()
            }
        }
    }

    fn write(&self, data: &StoreData) -> anyhow::Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        let content = serde_json::to_string_pretty(data)?;
        write_atomic(&self.store_path(), &content)
    }

    fn lock(&self) -> anyhow::Result<StoreLock> {
        fs::create_dir_all(&self.data_dir)?;
        let lock_path = self.data_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err.into());
                    }
                    if start.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) {
                        anyhow::bail!("timed out waiting for store lock ({}s)", LOCK_TIMEOUT_SECS);
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
                }
            }
        }
        Ok(StoreLock { file })
    }
}

/// A record is stale when an unrelated cycle with a later start already
/// landed. Re-writes within one cycle (processing -> complete) always pass.
fn is_stale(record: &AnalysisRecord, same_cycle: bool, existing_started: DateTime<Utc>) -> bool {
    !same_cycle && record.started_at < existing_started
}

fn preserve_corrupt_file(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
