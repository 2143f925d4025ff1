// ── Chat command dispatch ──
//
// Fixed keyword-to-reply table for inbound messages, plus the `!quit`
// group routine that hands the group over to the configured admin
// before leaving.

use std::time::Duration;

use pairgate_api::{
    Error as ApiError, IncomingMessage, ParticipantAction, SessionHandle, user_jid,
};
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

/// Pause between membership changes so the platform applies them in order.
pub const QUIT_STEP_PAUSE: Duration = Duration::from_secs(2);

const PONG: &str = "🏓 Pong! Bot online!";
const GREETING: &str = "👋 Hi! The bot is up and running!";
const HELP: &str = "🤖 *Available commands*

📌 !ping - Check the bot
📌 !bonjour - Say hello
📌 !info - Bot information
📌 !quit - Leave the group (admin only)
📌 !help - This help";
const INFO: &str = "ℹ️ *Bot information*

✅ Status: Online
🔗 Connection: Stable
⚡ Ready to answer!";

const ADDING_ADMIN: &str = "➕ Adding the new administrator to the group...";
const PROMOTING: &str = "⚙️ Promoting to administrator...";
const FAREWELL: &str = "👋 New admin configured! Leaving the group. Goodbye!";
const LEAVING_UNPRIVILEGED: &str = "⚠️ I am not an admin, leaving without promotion.";

/// Recognised chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BotCommand {
    Ping,
    Bonjour,
    Help,
    Info,
    Quit,
}

impl BotCommand {
    /// Parse a message body. Only an exact `!command` (ignoring case and
    /// surrounding whitespace) matches.
    pub fn parse(text: &str) -> Option<Self> {
        text.trim().strip_prefix('!')?.parse().ok()
    }

    /// Canned reply, for the commands that have one.
    pub fn reply(self) -> Option<&'static str> {
        match self {
            Self::Ping => Some(PONG),
            Self::Bonjour => Some(GREETING),
            Self::Help => Some(HELP),
            Self::Info => Some(INFO),
            Self::Quit => None,
        }
    }
}

/// Handle one inbound message. Returns the command that was executed, if any.
pub async fn handle_message(
    handle: &dyn SessionHandle,
    message: &IncomingMessage,
    admin_number: Option<&str>,
) -> Result<Option<BotCommand>, ApiError> {
    if message.from_me {
        return Ok(None);
    }
    let Some(command) = BotCommand::parse(&message.text) else {
        return Ok(None);
    };
    debug!(%command, group = message.is_group(), "chat command");

    if let Some(reply) = command.reply() {
        handle.send_text(&message.from, reply).await?;
        return Ok(Some(command));
    }

    if !message.is_group() {
        return Ok(None);
    }
    if let Err(e) = quit_group(handle, &message.from, admin_number).await {
        warn!(group = %message.from, error = %e, "!quit failed");
        handle
            .send_text(&message.from, &format!("❌ Operation failed: {e}"))
            .await?;
    }
    Ok(Some(command))
}

async fn quit_group(
    handle: &dyn SessionHandle,
    group: &str,
    admin_number: Option<&str>,
) -> Result<(), ApiError> {
    let metadata = handle.group_metadata(group).await?;
    let is_admin = handle
        .own_id()
        .map(|id| user_jid(&id))
        .and_then(|me| metadata.participant(&me).map(|p| p.role.is_admin()))
        .unwrap_or(false);
    info!(group = %metadata.subject, is_admin, "leaving group");

    if !is_admin {
        handle.send_text(group, LEAVING_UNPRIVILEGED).await?;
        tokio::time::sleep(QUIT_STEP_PAUSE).await;
        return handle.leave_group(group).await;
    }

    if let Some(number) = admin_number {
        let admin = vec![user_jid(number)];
        if metadata.participant(&admin[0]).is_none() {
            handle.send_text(group, ADDING_ADMIN).await?;
            handle
                .update_participants(group, &admin, ParticipantAction::Add)
                .await?;
            tokio::time::sleep(QUIT_STEP_PAUSE).await;
        }
        handle.send_text(group, PROMOTING).await?;
        handle
            .update_participants(group, &admin, ParticipantAction::Promote)
            .await?;
        info!(admin = %admin[0], "admin promoted");
    }

    handle.send_text(group, FAREWELL).await?;
    tokio::time::sleep(QUIT_STEP_PAUSE).await;
    handle.leave_group(group).await
}
