use std::path::{Path, PathBuf};

mod coverage;
mod export;
mod init;
mod schema;
mod show;
mod terminal;
mod validate;

use aspice_trace::{
    Config, ItemStore, SchemaRegistry,
    domain::{IngestReport, Rejection},
    load_records,
};
use clap::ArgAction;
use coverage::Coverage;
use export::Export;
use init::Init;
use schema::Schema;
use show::Show;
use terminal::Colorize;
use validate::Validate;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the configuration file
    #[arg(short, long, default_value = "trace.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(&self.config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Write a configuration file describing the ASPICE schema
    Init(Init),

    /// Validate items, links and traceability
    Validate(Validate),

    /// Export the validated items as JSON
    ///
    /// Nothing is written if ingestion, link validation or cycle detection
    /// fails.
    Export(Export),

    /// List items not covered by a chain of links to another item type
    Coverage(Coverage),

    /// Show one item with its outgoing and incoming links
    Show(Show),

    /// Print the active schema
    Schema(Schema),
}

impl Command {
    fn run(self, config: &Path) -> anyhow::Result<()> {
        match self {
            Self::Init(command) => command.run(config)?,
            Self::Validate(command) => command.run(config)?,
            Self::Export(command) => command.run(config)?,
            Self::Coverage(command) => command.run(config)?,
            Self::Show(command) => command.run(config)?,
            Self::Schema(command) => command.run(config)?,
        }
        Ok(())
    }
}

/// The configuration and the schema registry it describes.
struct Workspace {
    config: Config,
    registry: SchemaRegistry,
}

impl Workspace {
    fn open(config_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load_or_default(config_path)
            .map_err(|e| anyhow::anyhow!("{}: {e}", config_path.display()))?;
        Self::new(config)
    }

    fn new(config: Config) -> anyhow::Result<Self> {
        let registry = config.registry()?;
        Ok(Self { config, registry })
    }

    /// Loads records from `input`, ingests them and seals the store.
    fn sealed_store(&self, input: &Path) -> anyhow::Result<(ItemStore<'_>, IngestReport)> {
        let records = load_records(input)?;

        let mut store = ItemStore::new(&self.registry);
        if !self.config.id_required {
            store = store.generate_missing_ids(self.config.id_length());
        }
        let report = store.ingest(records);
        store.seal();

        Ok((store, report))
    }
}

fn print_rejections(rejected: &[Rejection]) {
    for rejection in rejected {
        let id = rejection.id.as_deref().unwrap_or("<no id>");
        eprintln!(
            "{}",
            format!("  record #{} ({id}): {}", rejection.index, rejection.error).warning()
        );
    }
}
