//! `pairgate serve`: run the HTTP interface and the session controller.

use std::sync::Arc;

use pairgate_api::BridgeConnector;
use pairgate_core::SessionController;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::error::CliError;
use crate::server;

use super::util;

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = util::load_config(global)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let session = config.session_config()?;
    let bridge = config.bridge_config()?;
    info!(
        bridge = %bridge.url,
        auth_dir = %session.auth_dir.display(),
        cooldown_secs = session.cooldown.as_secs(),
        "starting pairgate"
    );

    let controller = SessionController::new(session, Arc::new(BridgeConnector::new(bridge)));
    if let Err(e) = controller.start().await {
        warn!(error = %e, "could not resume stored session; will retry in the background");
    }

    server::serve(
        config.server.socket_addr(),
        &config.server.public_dir,
        controller,
    )
    .await
}
