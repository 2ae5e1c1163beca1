//! Output formatting for replay reports.
//!
//! - [`csv`] - one CSV row per plan step
//! - [`terminal`] - quoted fields and colored verdicts

mod csv;
mod terminal;

pub use csv::{outcome_row, print_outcomes};
pub use terminal::{format_field, verdict};
