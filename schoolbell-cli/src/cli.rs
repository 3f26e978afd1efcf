use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "bell", version, about = "Live notifications from the school dashboard")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to <config dir>/schoolbell/config.toml)
    #[arg(short, long, global = true, env = "SCHOOLBELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend origin, e.g. https://school.example.com
    #[arg(long, global = true, env = "SCHOOLBELL_URL")]
    pub url: Option<String>,

    /// Bearer token of the signed-in user
    #[arg(long, global = true, env = "SCHOOLBELL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream the live feed until interrupted
    Watch {
        /// Desktop alert permission for this run
        #[arg(long, value_enum)]
        alerts: Option<AlertMode>,
    },

    /// Print the current notifications
    List {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,
    },

    /// Mark one notification as read
    Read { id: String },

    /// Mark every notification as read
    ReadAll,

    /// Delete one notification
    Delete { id: String },

    /// Sign in and print a bearer token
    Login {
        #[arg(long, env = "SCHOOLBELL_EMAIL")]
        email: String,

        #[arg(long, env = "SCHOOLBELL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the effective configuration
    Config {
        /// Print the configuration file location instead
        #[arg(long)]
        path: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertMode {
    /// Ring the terminal bell for new notifications
    On,
    Off,
    /// Decide on first start (on when stderr is a terminal)
    Ask,
}
