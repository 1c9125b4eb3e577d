use crate::config::{Config, DEFAULT_CONFIG_FILE};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, time::Duration};

/// Output format for structured messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// JSON format, one message per line
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Resolve every configured binary and write the lockfile
    Lock,

    /// Install binaries, using the lockfile if there is one
    ///
    /// Without a lockfile, binaries are resolved on demand and the lockfile is not written.
    Install {
        /// Names of the binaries to install, as they appear in the config.  All binaries are
        /// installed if none are given.
        #[arg(value_name = "NAME")]
        names: Vec<String>,

        /// Ignore an existing lockfile and resolve versions again
        #[arg(long)]
        no_lock: bool,
    },
}

#[derive(Clone, Debug, Parser)]
#[command(name = "prebuilt")]
#[command(about = "Install pinned prebuilt binaries from GitHub, GitLab or plain HTTP")]
#[command(disable_version_flag = true, arg_required_else_help = true)]
#[non_exhaustive]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Print version information
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Configuration file to read.  The lockfile lives next to it, with a `.lock` extension.
    #[arg(short = 'c', long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory to install binaries into, overriding `global.installDir` from the config
    #[arg(long, global = true, value_name = "DIR", env = "PREBUILT_INSTALL_DIR")]
    pub install_dir: Option<String>,

    /// Abort if the whole run takes longer than this (e.g. `90s`, `5m`)
    #[arg(long, global = true, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Timeout for each HTTP request, overriding `http.timeout` from the config
    #[arg(long, global = true, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub http_timeout: Option<Duration>,

    /// Use verbose output (-vv very verbose)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit structured progress messages on stdout in the given format
    #[arg(long, global = true, value_name = "FMT")]
    pub message_format: Option<MessageFormat>,

    /// Also write logs to this file, without colors.  Useful to keep per-binary failure details
    /// from an install run.
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl CliArgs {
    /// Parse the process's command line.  Exits with a usage message if it is invalid.
    pub fn parse_from_cli_args() -> Self {
        Self::parse()
    }

    pub fn print_help() -> std::io::Result<()> {
        Self::command().print_help()
    }

    /// Apply the settings given on the command line on top of those from the config file.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(install_dir) = &self.install_dir {
            config.global.install_dir.clone_from(install_dir);
        }

        if let Some(timeout) = self.http_timeout {
            config.http.timeout = timeout;
        }
    }
}
