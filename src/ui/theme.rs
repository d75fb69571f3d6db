//! cliclack theme

use cliclack::ThemeState;
use console::Style;

/// Blue accents; errors stay red
#[derive(Debug, Clone, Default)]
pub struct SwcacheTheme;

impl cliclack::Theme for SwcacheTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().blue(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().blue().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().blue(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().yellow(),
            ThemeState::Submit => Style::new().green(),
        }
    }
}

/// Install the theme for every prompt in this process
pub fn init_theme() {
    cliclack::set_theme(SwcacheTheme);
}
