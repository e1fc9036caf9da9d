use std::fmt::Display;

use serde::Serialize;

use super::json::to_json;

/// Output mode determines how results are formatted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Tty,
    Json,
}

impl OutputMode {
    /// Render `value` for stdout: pretty JSON, or the human rendering from `tty`.
    pub fn render<T: Serialize + ?Sized>(self, value: &T, tty: impl FnOnce() -> String) -> String {
        match self {
            OutputMode::Json => to_json(value),
            OutputMode::Tty => tty(),
        }
    }
}

pub fn detect_output_mode(json_flag: bool) -> OutputMode {
    if json_flag {
        OutputMode::Json
    } else {
        OutputMode::Tty
    }
}

/// Progress and summary lines go to stderr so stdout stays parseable.
pub fn status(msg: impl Display) {
    eprintln!("[hchb] {}", msg);
}
