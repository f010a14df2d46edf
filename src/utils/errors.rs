use crate::cli::ColorMode;
use nu_ansi_term::Color;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_EXIT_CODE: i32 = 1;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

pub(crate) fn configure_color(cmode: ColorMode) {
    USE_COLOR.store(cmode == ColorMode::On, Ordering::Relaxed);
}

/// Renders `text` behind a red `error:` label, or a plain one when color is
/// disabled.
fn render_error(text: &str, color: bool) -> String {
    if color {
        format!(
            "{} {}",
            Color::Red.bold().paint("error:"),
            Color::Default.bold().paint(text)
        )
    } else {
        format!("error: {}", text)
    }
}

/// Prints a fatal error to standard error. Used by [`die!`](crate::die).
pub(crate) fn error_internal(text: &str) {
    eprintln!("{}", render_error(text, USE_COLOR.load(Ordering::Relaxed)));
}

/// Reports an error and exits the process.
#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE);
    })
}
