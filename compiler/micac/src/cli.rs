//! Argument surface of the `mica` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mica", about = "Client for the Mica checking daemon", version)]
pub struct Cli {
    /// Status file recording the daemon's pid and connection name.
    #[arg(long, global = true, default_value = ".mica.status")]
    pub status_file: PathBuf,

    /// Append daemon logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a daemon in the background.
    Start {
        /// Flags passed through to the daemon.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },
    /// Stop any running daemon, then start a fresh one.
    Restart {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },
    /// Ask the daemon to exit cleanly.
    Stop,
    /// Report daemon health and memory usage.
    Status {
        /// Also dump the file watcher state to this path.
        #[arg(long)]
        fswatcher_dump_file: Option<PathBuf>,
    },
    /// Check the given files.
    Check {
        files: Vec<String>,
    },
    /// Re-check the files from the previous check.
    Recheck {
        /// Paths removed since the last check.
        #[arg(long, num_args = 1..)]
        remove: Option<Vec<String>>,
        /// Paths changed or added since the last check.
        #[arg(long, num_args = 1..)]
        update: Option<Vec<String>>,
    },
    /// Check files, restarting the daemon if its options are stale.
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Suggest a signature for a function.
    Suggest {
        function: String,
        #[arg(long)]
        callsites: bool,
    },
    /// Inspect the inferred type of an expression.
    Inspect {
        location: String,
        #[arg(long, default_value = "type")]
        show: String,
    },
    /// Run the daemon in the foreground (used by `start`).
    Daemon {
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },
    /// Kill the daemon process without waiting for a clean stop.
    Kill,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_recheck_lists() {
        let cli = Cli::parse_from([
            "mica", "recheck", "--remove", "a.py", "--update", "b.py", "c.py",
        ]);
        let Command::Recheck { remove, update } = cli.command else {
            panic!("expected recheck");
        };
        assert_eq!(remove, Some(vec!["a.py".to_owned()]));
        assert_eq!(
            update,
            Some(vec!["b.py".to_owned(), "c.py".to_owned()])
        );
    }

    #[test]
    fn global_status_file_flag() {
        let cli = Cli::parse_from(["mica", "--status-file", "/tmp/x.status", "stop"]);
        assert_eq!(cli.status_file, PathBuf::from("/tmp/x.status"));
    }
}
