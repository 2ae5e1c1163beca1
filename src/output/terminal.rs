//! Terminal output helpers.

use crate::policy::Decision;
use colored::{ColoredString, Colorize};

/// Format a value as a quoted, right-aligned field.
///
/// Values longer than `width` are kept whole.
pub fn format_field<T: ToString>(value: T, width: usize) -> String {
    let value_str = value.to_string();
    let quoted = format!("\"{value_str}\"");
    let quoted_len = quoted.len();

    if quoted_len >= width {
        quoted
    } else {
        format!("{quoted:>width$}")
    }
}

/// ACCEPT in green or REJECT in red.
pub fn verdict(decision: &Decision) -> ColoredString {
    match decision {
        Decision::Accepted => "ACCEPT".green(),
        Decision::Rejected(_) => "REJECT".red().bold(),
    }
}
