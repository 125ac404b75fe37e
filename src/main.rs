//! `trace`: validate, analyse and export ASPICE traceability items.

use clap::Parser;

mod cli;

use cli::Cli;

fn main() -> anyhow::Result<()> {
    Cli::parse().run()
}
