//! `pairgate status`: query a running server.

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;
use crate::remote::RemoteClient;

pub async fn handle(args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let client = RemoteClient::new(&args.target.server)?;
    let status = client.status().await?;
    let rendered = output::render_status(&status, args.output, output::should_color(global.color));
    output::print_output(&rendered, global.quiet);
    Ok(())
}
