//! Command line definitions for `fedsync-admin`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fedsync_core::Username;

/// Inspect and maintain the fedsync user file.
#[derive(Parser, Debug)]
#[command(name = "fedsync-admin")]
#[command(version)]
pub struct Cli {
    /// JSON config file; `FEDSYNC_*` variables still apply on top
    #[arg(short, long, env = "FEDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// User file to operate on (overrides the configured path)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the user file with its header if it does not exist
    Init,
    /// List all users
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single user
    Show { username: Username },
    /// Add a user with a random placeholder credential
    Add {
        username: Username,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Change fields of an existing user
    Set {
        username: Username,
        /// New username
        #[arg(long)]
        rename: Option<Username>,
        #[command(flatten)]
        profile: ProfileArgs,
        /// Remove every group
        #[arg(long, conflicts_with = "groups")]
        clear_groups: bool,
    },
    /// Delete one or more users in a single pass
    Delete {
        #[arg(required = true)]
        usernames: Vec<Username>,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct ProfileArgs {
    /// Display name
    #[arg(long)]
    pub name: Option<String>,

    /// Email address
    #[arg(long)]
    pub mail: Option<String>,

    /// Group membership (repeatable)
    #[arg(long = "group", id = "groups")]
    pub groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn set_parses_rename_and_groups() {
        let cli = Cli::try_parse_from([
            "fedsync-admin",
            "set",
            "alice",
            "--rename",
            "alicia",
            "--group",
            "staff",
            "--group",
            "admins",
        ])
        .unwrap();

        let Command::Set {
            username,
            rename,
            profile,
            clear_groups,
        } = cli.command
        else {
            panic!("expected set");
        };
        assert_eq!(username.as_str(), "alice");
        assert_eq!(rename.unwrap().as_str(), "alicia");
        assert_eq!(profile.groups, vec!["staff", "admins"]);
        assert!(!clear_groups);
    }

    #[test]
    fn invalid_usernames_are_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["fedsync-admin", "show", "bad:name"]).is_err());
    }

    #[test]
    fn delete_requires_a_username() {
        assert!(Cli::try_parse_from(["fedsync-admin", "delete"]).is_err());
    }
}
