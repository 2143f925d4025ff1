//! Shared helpers for command handlers.

use std::io::IsTerminal;

use pairgate_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the layered configuration, honouring `--config`.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(pairgate_config::load_config(global.config.as_deref())?)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
