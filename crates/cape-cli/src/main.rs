//! CAPE CLI: run the directory or a user's agent, or route one-shot requests.
//!
//! Every command boots an in-process node from `~/.cape/config.toml` (or
//! `--config`). Long-running commands serve until Ctrl+C.

mod cli;
mod cmd;
mod ui;

use crate::cli::*;
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Directory => cmd::directory::cmd_directory(cli.config),
        Commands::Agent {
            login,
            offers,
            contacts_file,
        } => cmd::agent::cmd_agent(cli.config, login, offers, contacts_file),
        Commands::Notify { login, to, message } => {
            cmd::route::cmd_notify(cli.config, login, to.as_deref(), &message)
        }
        Commands::Find { user, data_type } => cmd::route::cmd_find(cli.config, &user, &data_type),
        Commands::Contacts { login, filter } => {
            cmd::route::cmd_contacts(cli.config, login, filter.as_deref())
        }
    }
}
