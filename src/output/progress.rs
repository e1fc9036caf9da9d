use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal};

use super::format::OutputMode;

/// Create a spinner for indeterminate-progress operations (e.g., waiting for an API response).
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("[hchb] {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Spinner shown only for interactive TTY output; hidden otherwise.
pub fn fetch_spinner(message: &str, mode: OutputMode) -> ProgressBar {
    if mode == OutputMode::Tty && io::stderr().is_terminal() {
        create_spinner(message)
    } else {
        ProgressBar::hidden()
    }
}
