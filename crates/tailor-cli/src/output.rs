use atty::Stream;
use color_eyre::Result;
use serde_json::Value;
use tailor_core::{CommandGroup, CommandInfo, ExecutionOutcome};

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn emit_output(opts: &OutputOptions, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = tailor_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !opts.quiet {
        let message = tailor_core::format_status_message(info, &outcome.message);
        println!("{}", style.status(outcome.status, &message));
        for line in detail_lines(&style, info, &outcome.details) {
            println!("{line}");
        }
    }

    Ok(code)
}

fn string_items(details: &Value, field: &str) -> Vec<String> {
    details
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn detail_lines(style: &Style, info: CommandInfo, details: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    if details.get("lock").and_then(Value::as_str) == Some("escaped") {
        lines.push(style.warning(
            "lock wait timed out; the index was written without holding the lock",
        ));
    }
    match info.group {
        CommandGroup::Cleanup => {
            let deleted = string_items(details, "deleted");
            if !deleted.is_empty() {
                let dry_run = details.get("dry_run").and_then(Value::as_bool) == Some(true);
                lines.push(style.info(if dry_run { "Would delete:" } else { "Deleted:" }));
                lines.extend(deleted.iter().map(|key| style.item(key)));
            }
            let remaining = string_items(details, "remaining_versions");
            if !remaining.is_empty() {
                lines.push(style.info("Index versions:"));
                lines.extend(remaining.iter().map(|version| style.item(version)));
            }
        }
        CommandGroup::Index => {
            if let Some(entry) = details.get("entry") {
                if let Ok(rendered) = serde_json::to_string_pretty(entry) {
                    lines.push(rendered);
                }
            } else {
                lines.extend(
                    string_items(details, "versions")
                        .iter()
                        .map(|version| style.item(version)),
                );
            }
        }
        CommandGroup::Publish | CommandGroup::Lock => {}
    }
    if let Some(hint) = details.get("hint").and_then(Value::as_str) {
        lines.push(style.info(&format!("Tip: {hint}")));
    }
    lines
}
