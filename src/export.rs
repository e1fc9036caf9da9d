//! Write results to timestamped JSON files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use log::debug;
use serde::Serialize;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Writes one JSON file per export into a directory.
pub struct Exporter {
    dir: PathBuf,
    tz: FixedOffset,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>, tz: FixedOffset) -> Self {
        Self {
            dir: dir.into(),
            tz,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export `data` as `<stem>_<timestamp>.json`, stamped with the current time.
    pub fn export<T: Serialize>(&self, stem: &str, data: &T) -> Result<PathBuf> {
        self.export_at(stem, data, Utc::now().with_timezone(&self.tz))
    }

    /// Export with an explicit timestamp.
    pub fn export_at<T: Serialize>(
        &self,
        stem: &str,
        data: &T,
        at: DateTime<FixedOffset>,
    ) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(data).context("Failed to serialize export")?;

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.dir.join(file_name(stem, at));

        // Write to a temp file first so a failed write leaves nothing behind
        let temp_path = path.with_extension("json.tmp");
        let written = fs::write(&temp_path, format!("{}\n", content))
            .with_context(|| format!("Failed to write {}", temp_path.display()))
            .and_then(|()| {
                fs::rename(&temp_path, &path)
                    .with_context(|| format!("Failed to move export into {}", path.display()))
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        debug!("Exported {} bytes to {}", content.len() + 1, path.display());
        Ok(path)
    }
}

/// `<stem>_<YYYYmmdd_HHMMSS>.json`
pub fn file_name(stem: &str, at: DateTime<FixedOffset>) -> String {
    format!("{}_{}.json", sanitize_stem(stem), at.format(TIMESTAMP_FORMAT))
}

/// Keep file names portable: IDs come from the server and may contain anything.
fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
