//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::protocol::ControllerMessage;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress bar for an install session, fed by controller broadcasts.
///
/// Interactive mode draws an indicatif bar from 0 to 100. Plain mode
/// prints one line per essential asset and skips the synthetic ramp.
pub struct InstallProgress {
    bar: Option<ProgressBar>,
}

impl InstallProgress {
    pub fn new(ctx: &UiContext, store: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(100);
            let template = ProgressStyle::default_bar()
                .template("  {spinner:.blue} {prefix}  {bar:24.blue/dim} {pos:>3}% {msg:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"));
            bar.set_prefix(store.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Caching {}...", store);
            None
        };
        Self { bar }
    }

    /// Apply one broadcast. Returns true once the session has completed.
    pub fn on_message(&self, msg: &ControllerMessage) -> bool {
        match &self.bar {
            Some(bar) => match msg {
                ControllerMessage::CacheProgress { progress, file } => {
                    bar.set_position(u64::from(*progress));
                    if let Some(file) = file {
                        bar.set_message(file.clone());
                    }
                }
                ControllerMessage::CacheComplete => {
                    bar.set_position(100);
                    bar.set_message("done");
                }
                _ => {}
            },
            None => {
                if let Some(line) = plain_line(msg) {
                    println!("{}", line);
                }
            }
        }
        matches!(msg, ControllerMessage::CacheComplete)
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// CI rendering of a controller message; ramp steps print nothing
fn plain_line(msg: &ControllerMessage) -> Option<String> {
    match msg {
        ControllerMessage::CacheProgress {
            progress,
            file: Some(file),
        } => Some(format!("  [{:>3}%] {}", progress, file)),
        ControllerMessage::CacheComplete => Some("  [100%] complete".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Deleting stores...");
        spinner.stop("Done");
    }

    #[test]
    fn plain_lines_cover_assets_only() {
        let asset = ControllerMessage::CacheProgress {
            progress: 25,
            file: Some("/index.html".to_string()),
        };
        assert_eq!(plain_line(&asset).unwrap(), "  [ 25%] /index.html");

        let ramp = ControllerMessage::CacheProgress {
            progress: 70,
            file: None,
        };
        assert!(plain_line(&ramp).is_none());
        assert!(plain_line(&ControllerMessage::CacheStarted).is_none());
        assert!(plain_line(&ControllerMessage::CacheComplete).is_some());
    }

    #[test]
    fn install_progress_reports_completion() {
        let progress = InstallProgress::new(&UiContext::non_interactive(), "quiz-app-v1.0.1");
        assert!(!progress.on_message(&ControllerMessage::CacheStarted));
        assert!(!progress.on_message(&ControllerMessage::CacheProgress {
            progress: 50,
            file: Some("/".to_string()),
        }));
        assert!(progress.on_message(&ControllerMessage::CacheComplete));
        progress.finish();
    }
}
