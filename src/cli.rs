use std::io::{self, IsTerminal};

use crate::RequestedColorMode;

pub(crate) mod list;
pub(crate) mod serve;

#[derive(Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl ColorMode {
    /// Returns whether ANSI color should be used on standard error, where
    /// diagnostics and logs are written.
    ///
    /// A preference given on the command line wins, then the "NO_COLOR"
    /// environment variable. Otherwise color is used when standard error is a
    /// terminal.
    pub(crate) fn resolve_auto(cm: RequestedColorMode) -> ColorMode {
        match cm {
            RequestedColorMode::Auto => {
                let disable_color =
                    std::env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();

                if disable_color {
                    ColorMode::Off
                } else {
                    ColorMode::On
                }
            }
            RequestedColorMode::On => ColorMode::On,
            RequestedColorMode::Off => ColorMode::Off,
        }
    }
}
