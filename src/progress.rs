//! Spinner-style progress line for an in-flight transfer

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::copy::ProgressSample;
use crate::units::{bits_per_second, human_size, human_speed, human_time};

pub struct TransferProgress {
    spinner: ProgressBar,
}

impl TransferProgress {
    pub fn new(label: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(label.to_string());
        Self { spinner }
    }

    /// A progress display that draws nothing.
    pub fn hidden() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, sample: &ProgressSample) {
        self.spinner.set_message(describe(sample));
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

/// One-line summary of a progress sample.
pub fn describe(sample: &ProgressSample) -> String {
    format!(
        "{} so far (read {} @ {}, write {} @ {})",
        human_size(sample.bytes_so_far),
        human_time(sample.read_time_ms),
        human_speed(bits_per_second(sample.bytes_so_far, sample.read_time_ms)),
        human_time(sample.write_time_ms),
        human_speed(bits_per_second(sample.bytes_so_far, sample.write_time_ms)),
    )
}
