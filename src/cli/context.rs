use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{FixedOffset, Offset, Utc};

use crate::config::Settings;
use crate::export::Exporter;
use crate::output::format::{detect_output_mode, OutputMode};

pub struct RunContext {
    pub output_mode: OutputMode,
    pub tz: FixedOffset,
    pub settings: Settings,
    output_dir: Option<PathBuf>,
}

impl RunContext {
    /// Create context from CLI arguments and loaded settings
    pub fn from_args(
        json: bool,
        no_color: bool,
        utc: bool,
        output_dir: Option<&Path>,
        settings: Settings,
    ) -> Result<Self> {
        if no_color {
            colored::control::set_override(false);
        }

        let output_mode = detect_output_mode(json);
        let tz = if utc {
            Utc.fix()
        } else {
            *chrono::Local::now().offset()
        };

        // --output-dir beats HCHB_OUTPUT_DIR
        let output_dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| settings.output_dir.clone());

        Ok(RunContext {
            output_mode,
            tz,
            settings,
            output_dir,
        })
    }

    /// Exporter for a command whose files normally go to `default_dir`.
    pub fn exporter(&self, default_dir: &str) -> Exporter {
        let dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_dir));
        Exporter::new(dir, self.tz)
    }
}
