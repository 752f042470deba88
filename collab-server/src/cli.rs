use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/collab.db)
  PORT        (default: 5151 or config.listen_port)
  RUST_LOG    (default: info)

The `install` command writes a systemd unit and a default config.
Run it as root (or with sudo) for a system-wide install.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "collab-server",
    version,
    about = "Classroom content sharing server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install systemd unit + default config
    Install(InstallArgs),
    /// Uninstall systemd unit; optionally remove config
    Uninstall {
        #[arg(long, default_value = "/etc/systemd/system/collab-server.service")]
        unit_path: PathBuf,
        /// Also remove config file
        #[arg(long)]
        remove_config: bool,
        #[arg(long, default_value = "/etc/collab/config.yaml")]
        config_path: PathBuf,
    },
    /// Parse the config file and exit
    CheckConfig {
        /// Defaults to $CONFIG_PATH or ./config.yaml
        #[arg(long)]
        config_path: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[arg(long, default_value = "/etc/systemd/system/collab-server.service")]
    pub unit_path: PathBuf,
    #[arg(long, default_value = "/etc/collab/config.yaml")]
    pub config_path: PathBuf,
    /// DB path passed to the service as DB_PATH
    #[arg(long, default_value = "/var/lib/collab/collab.db")]
    pub db_path: PathBuf,
    /// Absolute path to the server binary used in ExecStart (defaults to this executable)
    #[arg(long)]
    pub bin_path: Option<PathBuf>,
    #[arg(long, default_value = "collab")]
    pub user: String,
    #[arg(long, default_value = "collab")]
    pub group: String,
    #[arg(long, default_value = "/var/lib/collab")]
    pub working_dir: PathBuf,
    /// Also generate a random key for the maintenance routes
    #[arg(long)]
    pub with_api_key: bool,
    /// Overwrite files if they already exist
    #[arg(long)]
    pub force: bool,
}
