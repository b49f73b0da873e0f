//! Clap CLI definitions for CAPE.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  cape directory                                  Run the directory on listen_addr
  cape agent -u alice -p secret --offer dialog    Run alice's agent
  cape find alice dialog                          Ask the directory who serves alice
  cape notify -u bob -p pw alice \"hello\"          Notify alice through her dialog agent
  cape contacts -u alice -p secret                Fetch alice's contacts";

/// CAPE: directory-mediated discovery and routing for user agents.
#[derive(Parser)]
#[command(name = "cape", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Username and password of the agent a one-shot command acts as.
#[derive(clap::Args)]
pub struct LoginArgs {
    /// Transport username.
    #[arg(long, short = 'u')]
    pub username: String,
    /// Transport password.
    #[arg(long, short = 'p')]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the directory service until interrupted.
    Directory,
    /// Run a user's agent until interrupted.
    Agent {
        #[command(flatten)]
        login: LoginArgs,
        /// Capability to register with the directory (repeatable).
        #[arg(long = "offer", value_name = "DATA_TYPE")]
        offers: Vec<String>,
        /// JSON file with an array of contacts to serve.
        #[arg(long)]
        contacts_file: Option<PathBuf>,
    },
    /// Deliver a notification to a user's dialog agent.
    Notify {
        #[command(flatten)]
        login: LoginArgs,
        /// Recipient; defaults to the logged-in user.
        #[arg(long)]
        to: Option<String>,
        /// Message text.
        message: String,
    },
    /// List the agents serving a capability for a user.
    Find {
        /// User to look up.
        user: String,
        /// Capability, e.g. "dialog" or "contacts".
        data_type: String,
    },
    /// Fetch the logged-in user's contacts.
    Contacts {
        #[command(flatten)]
        login: LoginArgs,
        /// JSON object every returned contact must match, e.g. '{"name":"Bob"}'.
        #[arg(long)]
        filter: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_agent_offers() {
        let cli = Cli::try_parse_from([
            "cape", "agent", "-u", "alice", "-p", "pw", "--offer", "dialog", "--offer", "contacts",
        ])
        .unwrap();
        match cli.command {
            Commands::Agent { login, offers, .. } => {
                assert_eq!(login.username, "alice");
                assert_eq!(offers, vec!["dialog", "contacts"]);
            }
            _ => panic!("expected agent command"),
        }
    }

    #[test]
    fn test_notify_defaults_to_self() {
        let cli =
            Cli::try_parse_from(["cape", "notify", "-u", "bob", "-p", "pw", "hello"]).unwrap();
        match cli.command {
            Commands::Notify { to, message, .. } => {
                assert!(to.is_none());
                assert_eq!(message, "hello");
            }
            _ => panic!("expected notify command"),
        }
    }
}
