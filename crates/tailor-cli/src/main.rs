use clap::Parser;
use color_eyre::Result;
use serde_json::json;
use tailor_core::{CommandContext, ExecutionOutcome, GlobalOptions};

mod cli;
mod dispatch;
mod output;
mod style;

use cli::TailorCli;
use dispatch::{command_info, dispatch_command};
use output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = TailorCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        no_color: cli.no_color,
        store: cli.store.clone(),
    };

    let (info, outcome) = match CommandContext::new(&global) {
        Ok(ctx) => dispatch_command(&ctx, &cli.command)?,
        Err(err) => (
            command_info(&cli.command),
            ExecutionOutcome::user_error(
                format!("{err:#}"),
                json!({ "reason": "invalid_configuration" }),
            ),
        ),
    };
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = emit_output(&opts, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("tailor_core={level},tailor_image={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
