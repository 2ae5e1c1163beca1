//! CSV report of a plan replay.

use super::terminal::{format_field, verdict};
use crate::plan::StepOutcome;
use colored::Colorize;
use itertools::Itertools;

const HEADER: [(&str, usize); 6] = [
    ("step", 6),
    ("op", 24),
    ("target", 18),
    ("verdict", 8),
    ("reason", 34),
    ("detail", 0),
];

/// Print one CSV row per step followed by a summary line.
pub fn print_outcomes(outcomes: &[StepOutcome]) {
    log::info!("#Start print_outcomes() {} step(s)", outcomes.len());
    println!(
        "{}",
        HEADER
            .iter()
            .map(|(name, width)| format_field(name, *width))
            .join(",")
    );
    for outcome in outcomes {
        println!("{}", outcome_row(outcome, true));
    }

    let rejected = outcomes.iter().filter(|o| !o.decision.is_accepted()).count();
    let summary = format!(
        "{} accepted, {rejected} rejected",
        outcomes.len() - rejected
    );
    if rejected > 0 {
        println!("#{}# {summary}", "NOTE".on_red());
    } else {
        println!("#{}# {summary}", "OK".on_green());
    }
}

/// One CSV row; `color` marks the verdict with ANSI colors.
pub fn outcome_row(outcome: &StepOutcome, color: bool) -> String {
    let verdict_text = if color {
        verdict(&outcome.decision).to_string()
    } else {
        verdict(&outcome.decision).clear().to_string()
    };
    let reason = match (outcome.decision.reason_code(), outcome.decision.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        _ => String::new(),
    };
    format!(
        r#"{step},{op},{target},{verdict},{reason},{detail}"#,
        step = format_field(outcome.index, HEADER[0].1),
        op = format_field(outcome.op, HEADER[1].1),
        target = format_field(&outcome.target, HEADER[2].1),
        verdict = format_field(verdict_text, HEADER[3].1),
        reason = format_field(escape_quotes(&reason), HEADER[4].1),
        detail = format_field(escape_quotes(&outcome.detail), HEADER[5].1),
    )
}

fn escape_quotes(input: &str) -> String {
    input.replace('"', "\"\"")
}
