use std::path::PathBuf;

use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $COLLAB_CONFIG
  3) platform default, e.g. ~/.config/collab/client.yaml

Log in once with login-student or login-teacher; the token is kept in the config.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "collab-client",
    version,
    about = "Terminal client for the classroom sharing server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in as a student with the class access code
    LoginStudent {
        /// Server URL (e.g., http://127.0.0.1:5151). Falls back to config or prompt.
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        code: Option<String>,
    },
    /// Log in as a teacher with identity provider details
    LoginTeacher {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Subject id from the identity provider
        #[arg(long)]
        external_id: Option<String>,
    },
    /// Show the access code, or replace it (teachers)
    SetCode { code: Option<String> },
    /// Create a new live session (teachers)
    StartSession,
    /// Replace the text of a session (teachers). Reads stdin without --text/--file.
    Update {
        session: String,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Join a session and follow its content, chat and your points
    Watch { session: String },
    /// Print the leaderboard
    Leaderboard {
        /// Keep refreshing until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Post to a chat room, or print its recent messages without TEXT
    Chat {
        /// Session id or `general`
        room: String,
        text: Option<String>,
    },
    /// Share a snippet of text once. Reads stdin without TEXT.
    ShareText {
        text: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Share a file once
    ShareFile { path: PathBuf },
    /// Fetch shared content by id
    Receive {
        id: String,
        /// Where to write the payload (files default to their original name)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Give a point to the author of some content (students)
    Reward {
        sender: String,
        /// Content id; rewards for the same content count once
        #[arg(long)]
        content: Option<String>,
    },
    /// Show points for yourself or someone else
    Points { name: Option<String> },
}
