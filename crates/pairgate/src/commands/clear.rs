//! `pairgate clear-session`: wipe credentials locally or on a running server.

use pairgate_core::CredentialStore;

use crate::cli::{ClearSessionArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;
use crate::remote::{RemoteClient, into_result};

use super::util;

pub async fn handle(args: ClearSessionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(server) = args.server {
        let reply = into_result(RemoteClient::new(&server)?.clear_session().await?)?;
        let message = reply.message.unwrap_or_else(|| "Session cleared.".into());
        output::print_output(&message, global.quiet);
        return Ok(());
    }

    let config = util::load_config(global)?;
    let store = CredentialStore::new(config.session.auth_dir);
    let prompt = format!("Delete session credentials in {}?", store.path().display());
    if !util::confirm(&prompt, "clear-session", global.yes)? {
        return Ok(());
    }

    let message = if store.destroy().await? {
        format!("Removed {}", store.path().display())
    } else {
        format!("No credentials at {}", store.path().display())
    };
    output::print_output(&message, global.quiet);
    Ok(())
}
