//! Clap derive structures for the `pairgate` CLI.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default address of a running `pairgate serve`.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pairgate -- link a messaging account by pairing code and keep it online
#[derive(Debug, Parser)]
#[command(
    name = "pairgate",
    version,
    about = "Link a messaging account by pairing code and keep the session alive",
    long_about = "Serves a small web page and JSON API that requests pairing codes\n\
        from the messaging platform, then keeps the linked session connected.\n\n\
        The protocol itself is spoken by a bridge sidecar; see session.bridge_url.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "PAIRGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web interface and keep the session alive
    Serve(ServeArgs),

    /// Show the session status of a running server
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Request a pairing code from a running server
    Pair(PairArgs),

    /// Close the session and delete stored credentials
    ClearSession(ClearSessionArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen port (overrides config and PORT)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Listen address (overrides config)
    #[arg(long)]
    pub bind: Option<IpAddr>,
}

#[derive(Debug, Args)]
pub struct ServerArg {
    /// Base URL of a running pairgate server
    #[arg(long, env = "PAIRGATE_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: ServerArg,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Phone number with country code, digits only or formatted
    pub number: String,

    #[command(flatten)]
    pub target: ServerArg,
}

#[derive(Debug, Args)]
pub struct ClearSessionArgs {
    /// Ask a running server instead of deleting local credentials
    #[arg(long)]
    pub server: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
