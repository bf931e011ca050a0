use clap::{Args, Parser, Subcommand};

/// notify-cli: follow and manage document-editor notifications
#[derive(Parser)]
#[command(name = "notify-cli", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the environment-driven configuration.
#[derive(Args)]
pub struct ConnectionArgs {
    /// Base URL of the notification API
    #[arg(long, global = true, env = "NOTIFY_API_URL")]
    pub api_url: Option<String>,

    /// Live channel websocket URL
    #[arg(long, global = true, env = "NOTIFY_WS_URL")]
    pub ws_url: Option<String>,

    /// Signed-in user id
    #[arg(long, global = true, env = "NOTIFY_USER_ID")]
    pub user_id: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "NOTIFY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List notifications, newest first
    List {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Mark one notification read
    Read { id: String },

    /// Mark every notification read
    ReadAll,

    /// Follow notifications live until Ctrl-C
    Watch {
        /// Re-fetch interval in seconds (0 disables polling)
        #[arg(long)]
        poll_secs: Option<u64>,
    },
}
