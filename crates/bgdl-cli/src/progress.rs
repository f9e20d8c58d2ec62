//! Terminal progress display for `fetch`.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Percentage bar driven by transfer notifications.
pub struct FetchProgress {
    bar: ProgressBar,
}

impl FetchProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        bar.set_message(label.to_string());
        Self { bar }
    }

    /// A bar that draws nothing, for non-interactive output.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn set_percentage(&self, percentage: f64) {
        self.bar.set_position(percent_position(percentage));
    }

    pub fn message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.set_position(100);
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_position(percentage: f64) -> u64 {
    percentage.clamp(0.0, 100.0).floor() as u64
}
