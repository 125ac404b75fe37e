use std::path::{Path, PathBuf};

use aspice_trace::{Graph, validate_links};
use clap::Parser;
use tracing::instrument;

use super::{Workspace, print_rejections, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "List items not covered by a chain of links to another item type")]
pub struct Coverage {
    /// A record file, or a directory of record files
    input: PathBuf,

    /// Directive of the items that should be covered
    #[arg(long = "from", value_name = "TYPE")]
    source: String,

    /// Directive of the items they should reach
    #[arg(long = "to", value_name = "TYPE")]
    target: String,

    /// Only follow these link types (can be specified multiple times)
    #[arg(long, value_name = "OPTION")]
    via: Vec<String>,
}

impl Coverage {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let workspace = Workspace::open(config)?;
        let (store, report) = workspace.sealed_store(&self.input)?;
        if !report.is_clean() {
            print_rejections(&report.rejected);
            anyhow::bail!("{} records rejected", report.rejected.len());
        }

        let graph = Graph::build(validate_links(&store)?);

        let via: Vec<&str> = self.via.iter().map(String::as_str).collect();
        let uncovered = graph.uncovered(&self.source, &self.target, &via)?;
        let total = store.items_of_type(&self.source).count();

        let summary = format!(
            "{} → {}: {}/{total} covered",
            self.source,
            self.target,
            total - uncovered.len()
        );
        if uncovered.is_empty() {
            println!("{}", summary.success());
        } else {
            println!("{}", summary.warning());
            for id in uncovered {
                println!("  {id}");
            }
        }

        Ok(())
    }
}
