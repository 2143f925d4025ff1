//! `pairgate pair`: request a pairing code from a running server.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pairgate_core::normalize_phone_number;

use crate::cli::{GlobalOpts, PairArgs};
use crate::error::CliError;
use crate::output;
use crate::remote::{RemoteClient, into_result};

pub async fn handle(args: &PairArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Reject obviously bad input before the server charges a cooldown.
    let number = normalize_phone_number(&args.number)?;
    let client = RemoteClient::new(&args.target.server)?;

    let spinner = spinner(global.quiet);
    spinner.set_message(format!("Requesting a pairing code for {number}..."));
    let reply = client.generate_code(&number).await;
    spinner.finish_and_clear();

    let reply = into_result(reply?)?;
    let code = reply.code.unwrap_or_default();
    let rendered = output::render_code(
        &code,
        reply.expires_in.unwrap_or_default(),
        output::should_color(global.color),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {elapsed}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
