use std::path::Path;

use aspice_trace::export::ExportSchema;
use clap::Parser;
use tracing::instrument;

use super::{Workspace, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Print the active schema")]
pub struct Schema {
    /// Print the schema as JSON
    #[arg(long)]
    json: bool,
}

impl Schema {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let workspace = Workspace::open(config)?;
        let registry = &workspace.registry;

        if self.json {
            let schema = ExportSchema::from(registry);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }

        println!("{}", "Item types".info());
        for item_type in registry.item_types() {
            let traced = if item_type.requires_traceability {
                ""
            } else {
                " (no traceability required)"
            };
            println!(
                "  {:<10} {:<12} {}{}",
                item_type.directive,
                item_type.prefix,
                item_type.title,
                traced.dim()
            );
        }

        println!("\n{}", "Link types".info());
        for link_type in registry.link_types() {
            let acyclic = if link_type.acyclic { " (acyclic)" } else { "" };
            println!(
                "  {:<13} {} / {}{}",
                link_type.option,
                link_type.outgoing,
                link_type.incoming,
                acyclic.dim()
            );
            if let Some(pairs) = &link_type.allowed_pairs {
                for pair in pairs {
                    println!("{}", format!("      {} → {}", pair.source, pair.target).dim());
                }
            }
        }

        println!("\n{}", "Extra options".info());
        for option in registry.extra_options() {
            println!("  {option}");
        }

        println!("\n{} {}", "ID pattern".info(), registry.id_pattern());
        Ok(())
    }
}
