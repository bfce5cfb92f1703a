use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "stackyard", version, about = "Compose stacks across local and SSH hosts")]
pub(crate) struct Args {
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, default_value = "~/.stackyard/logs")]
    pub(crate) log_dir: PathBuf,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Find stacks on every enabled host and show their status.
    Discover {
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Re-poll every stack at this interval (e.g. `30s`) until interrupted.
        #[arg(long, value_parser = humantime::parse_duration)]
        watch: Option<Duration>,
    },
    /// Show container status for one stack.
    Status {
        stack: String,
        #[arg(long, value_parser = humantime::parse_duration)]
        watch: Option<Duration>,
    },
    Up { stack: String },
    Down { stack: String },
    Pull { stack: String },
    /// Pull images, then recreate the stack.
    Refresh { stack: String },
    /// Remove unused docker data on a host.
    Prune { host: String },
    #[command(subcommand)]
    Hosts(HostsCommand),
}

#[derive(Subcommand, Debug)]
pub(crate) enum HostsCommand {
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Add(HostFields),
    Edit {
        name: String,
        #[command(flatten)]
        fields: HostEdits,
    },
    Remove {
        name: String,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    /// Import hosts from an OpenSSH client config.
    Import {
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long)]
        remote_root: String,
        /// Only import these aliases (comma separated).
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
}

#[derive(ClapArgs, Debug)]
pub(crate) struct HostFields {
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long)]
    pub(crate) hostname: String,
    #[arg(long)]
    pub(crate) user: String,
    #[arg(long, default_value = "")]
    pub(crate) port: String,
    #[arg(long)]
    pub(crate) remote_root: String,
    #[command(flatten)]
    pub(crate) auth: AuthArgs,
    #[arg(long, default_value_t = false)]
    pub(crate) disabled: bool,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct HostEdits {
    #[arg(long)]
    pub(crate) rename: Option<String>,
    #[arg(long)]
    pub(crate) hostname: Option<String>,
    #[arg(long)]
    pub(crate) user: Option<String>,
    #[arg(long)]
    pub(crate) port: Option<String>,
    #[arg(long)]
    pub(crate) remote_root: Option<String>,
    #[command(flatten)]
    pub(crate) auth: AuthArgs,
}

#[derive(ClapArgs, Debug, Default)]
#[group(multiple = false)]
pub(crate) struct AuthArgs {
    #[arg(long)]
    pub(crate) key: Option<String>,
    #[arg(long, default_value_t = false)]
    pub(crate) agent: bool,
    #[arg(long)]
    pub(crate) password: Option<String>,
}
