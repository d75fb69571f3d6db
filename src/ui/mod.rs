//! Terminal output for the CLI
//!
//! Uses `cliclack` for prompts and log lines and `indicatif` for the
//! install progress bar, with plain line output in CI and when stdout is
//! not a terminal.
//!
//! ```rust,ignore
//! use swcache::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//! ui::intro(&ctx, "Installing quiz-app-v1.0.1");
//! ui::step_ok_detail(&ctx, "Deleted", "quiz-app-v1.0.0");
//! if ui::confirm(&ctx, "Delete 2 cache store(s)?", false).await? { /* ... */ }
//! ui::outro_success(&ctx, "Done");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_success, outro_warn, remark, step_error_detail,
    step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{InstallProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, SwcacheTheme};
