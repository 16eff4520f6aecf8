mod cli;
mod commands;
mod dimension;
mod engine;
mod error;
mod member;
mod metadata;
mod model;
mod progress;
mod session;
mod slice;
mod store;
mod subcube;
#[cfg(test)]
mod test_support;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = &cli.store;

    match cli.command {
        Commands::Load(args) => commands::load::run(store, args),
        Commands::Allocate(args) => commands::operation::run_allocate(store, args),
        Commands::Calculate(args) => commands::operation::run_calculate(store, args),
        Commands::Translate(args) => commands::operation::run_translate(store, args),
        Commands::Consolidate(args) => commands::operation::run_consolidate(store, args),
        Commands::Members(args) => commands::members::run_members(store, args),
        Commands::MemberLists(args) => commands::members::run_member_lists(store, args),
        Commands::ListMembers(args) => commands::members::run_list_members(store, args),
        Commands::Status => commands::status::run(store),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
