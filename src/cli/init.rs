use std::path::Path;

use aspice_trace::Config;
use clap::Parser;
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "Write a configuration file describing the ASPICE schema")]
pub struct Init {
    /// Project name recorded in exports
    #[arg(long)]
    project: Option<String>,

    /// Overwrite an existing configuration file
    #[arg(long)]
    force: bool,
}

impl Init {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config_path: &Path) -> anyhow::Result<()> {
        if config_path.exists() && !self.force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        let mut config = Config::default();
        if let Some(project) = self.project {
            config.project = project;
        }

        config
            .save(config_path)
            .map_err(|e| anyhow::anyhow!("{}: {e}", config_path.display()))?;

        println!(
            "{}",
            format!("Wrote {}", config_path.display()).success()
        );
        println!(
            "{}",
            format!("Exports will be written to {}", config.export_path.display()).dim()
        );
        Ok(())
    }
}
