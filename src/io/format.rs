//! Nice MDMET output formatting.

use std::fmt;

use log;

const MDMET_BANNER_LENGTH: usize = 103;

/// Logs an error to the `dmet-output` logger.
macro_rules! dmet_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "dmet-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `dmet-output` logger.
macro_rules! dmet_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "dmet-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `dmet-output` logger.
macro_rules! dmet_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "dmet-output", $fmt, $($($arg)*)?); }
}

#[allow(unused_imports)]
pub(crate) use {dmet_error, dmet_output, dmet_warn};

/// Logs a nicely formatted section title to the `dmet-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(MDMET_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    dmet_output!("┌──{bar}──┐");
    dmet_output!("│§ {title:^length$} §│");
    dmet_output!("└──{bar}──┘");
}

/// Writes a nicely formatted subtitle.
pub(crate) fn write_subtitle(f: &mut fmt::Formatter<'_>, subtitle: &str) -> fmt::Result {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    writeln!(f, "{subtitle}")?;
    writeln!(f, "{bar}")?;
    Ok(())
}

/// Logs a nicely formatted subtitle to the `dmet-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    dmet_output!("{}", subtitle);
    dmet_output!("{}", bar);
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging MDMET outputs nicely.
pub(crate) trait DmetOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            dmet_output!("{line}");
        })
    }

    /// Logs debug output nicely.
    #[allow(dead_code)]
    fn log_output_debug(&self) {
        let lines = format!("{self:?}");
        lines.lines().for_each(|line| {
            dmet_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> DmetOutput for T where T: fmt::Debug + fmt::Display {}
