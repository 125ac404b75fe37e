use std::path::{Path, PathBuf};

use aspice_trace::{Item, ItemStore};
use clap::Parser;
use tracing::instrument;

use super::{Workspace, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Show one item with its outgoing and incoming links")]
pub struct Show {
    /// A record file, or a directory of record files
    input: PathBuf,

    /// The ID of the item to display
    id: String,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

impl Show {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let workspace = Workspace::open(config)?;
        let (store, report) = workspace.sealed_store(&self.input)?;
        if !report.is_clean() {
            tracing::warn!(
                rejected = report.rejected.len(),
                "some records were rejected; run 'trace validate' for details"
            );
        }

        // IDs are upper case; accept lower case input at the command line
        let id = self.id.to_uppercase();
        let item = store.get(&id)?;

        match self.output {
            OutputFormat::Pretty => output_pretty(&store, item),
            OutputFormat::Json => output_json(&store, item)?,
        }
        Ok(())
    }
}

fn output_pretty(store: &ItemStore<'_>, item: &Item) {
    let registry = store.registry();
    let type_title = registry
        .resolve_item_type(item.directive())
        .map_or(item.directive(), |t| t.title.as_str());

    println!("{}", item.id().to_string().info());
    println!("{}", format!("{type_title} ({})", item.directive()).dim());
    if !item.title().is_empty() {
        println!("\n{}", item.title());
    }
    if !item.content().is_empty() {
        println!("\n{}", item.content());
    }

    if !item.attributes().is_empty() {
        println!();
        for (key, value) in item.attributes() {
            println!("  {}: {value}", key.dim());
        }
    }

    if !item.links().is_empty() {
        println!("\nOutgoing:");
        for link in item.links() {
            let label = registry
                .resolve_link_type(&link.option)
                .map_or(link.option.as_str(), |t| t.outgoing.as_str());
            let target = if store.contains(&link.target) {
                link.target.clone()
            } else {
                format!("{} (missing)", link.target).warning()
            };
            println!("  {label} {target}");
        }
    }

    let incoming: Vec<_> = store.incoming(item.id()).collect();
    if !incoming.is_empty() {
        println!("\nIncoming:");
        for (source, link) in incoming {
            let label = registry
                .resolve_link_type(&link.option)
                .map_or(link.option.as_str(), |t| t.incoming.as_str());
            println!("  {label} {}", source.id());
        }
    }
}

fn output_json(store: &ItemStore<'_>, item: &Item) -> anyhow::Result<()> {
    use serde_json::json;

    let incoming: Vec<_> = store
        .incoming(item.id())
        .map(|(source, link)| json!({ "option": link.option, "source": source.id() }))
        .collect();

    let output = json!({
        "id": item.id(),
        "type": item.directive(),
        "title": item.title(),
        "content": item.content(),
        "attributes": item.attributes(),
        "links": item.links(),
        "back_links": incoming,
        "fingerprint": item.fingerprint(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
