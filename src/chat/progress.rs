//! The "thinking" spinner shown while a turn is pending.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(80);
const TEMPLATE: &str = "{msg} {spinner:.cyan} Please wait...";

/// Message shown next to the spinner while waiting for a backend.
pub const THINKING: &str = "🤔 Thinking:";

/// A decorative progress indicator with start and stop only.
///
/// `stop` clears the spinner line before returning, so output written
/// afterwards never interleaves with it.
pub struct ProgressIndicator {
    enabled: bool,
    running: bool,
    bar: Option<ProgressBar>,
}

impl ProgressIndicator {
    /// A spinner drawn on stderr.
    pub fn new() -> Self {
        Self {
            enabled: true,
            running: false,
            bar: None,
        }
    }

    /// An indicator that draws nothing but still tracks start and stop.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            running: false,
            bar: None,
        }
    }

    /// Start spinning with `message`.  Restarting a running spinner only
    /// replaces its message.
    pub fn start(&mut self, message: &str) {
        self.running = true;
        if !self.enabled {
            return;
        }
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
            return;
        }
        let bar = ProgressBar::new_spinner();
        match ProgressStyle::default_spinner().template(TEMPLATE) {
            Ok(style) => bar.set_style(style),
            Err(err) => tracing::debug!(error = %err, "spinner template rejected"),
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(TICK);
        self.bar = Some(bar);
    }

    /// Stop and clear the spinner.  Stopping an idle indicator is a no-op.
    pub fn stop(&mut self) {
        self.running = false;
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    /// True between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.stop();
    }
}
