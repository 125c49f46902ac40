// ABOUTME: Progress display for running dumps
// ABOUTME: Hands out byte progress bars, hidden when output is silenced

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec})";
const SPINNER_TEMPLATE: &str = "{spinner} {msg} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

/// Passed explicitly to whatever needs to draw progress
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    visible: bool,
}

impl Reporter {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Bar measured against `estimated` bytes, or a spinner when the size is unknown
    pub fn byte_progress(&self, estimated: Option<u64>, message: &str) -> ProgressBar {
        if !self.visible {
            return ProgressBar::hidden();
        }

        let bar = match estimated {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                    bar.set_style(style.progress_chars("##-"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
                    bar.set_style(style);
                }
                bar
            }
        };
        bar.set_message(message.to_string());
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_reporter_draws_nothing() {
        let bar = Reporter::hidden().byte_progress(Some(1024), "Dumping");
        assert!(bar.is_hidden());
    }

    #[test]
    fn test_templates_parse() {
        assert!(ProgressStyle::with_template(BAR_TEMPLATE).is_ok());
        assert!(ProgressStyle::with_template(SPINNER_TEMPLATE).is_ok());
    }

    #[test]
    fn test_visible_bar_tracks_position() {
        let bar = Reporter::new(true).byte_progress(Some(100), "Dumping");
        bar.set_position(40);
        assert_eq!(bar.position(), 40);
        assert_eq!(bar.length(), Some(100));
    }
}
