use std::path::{Path, PathBuf};

use aspice_trace::{ExportBlockedError, export::export_records, load_records};
use clap::Parser;
use tracing::instrument;

use super::{Workspace, print_rejections, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Export the validated items as JSON")]
pub struct Export {
    /// A record file, or a directory of record files
    input: PathBuf,

    /// Where to write the export (defaults to the configured export path)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the export to stdout instead of writing a file
    #[arg(long)]
    stdout: bool,
}

impl Export {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let workspace = Workspace::open(config)?;

        match self.export_to(&workspace) {
            Ok(Some(path)) => {
                println!("{}", format!("Exported to {}", path.display()).success());
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => match error.downcast_ref::<ExportBlockedError>() {
                Some(blocked) => {
                    report_blocked(blocked);
                    std::process::exit(2);
                }
                None => Err(error),
            },
        }
    }

    /// Exports the input and writes it out.
    ///
    /// Returns the path written, or `None` when printing to stdout. A blocked
    /// export is returned as an [`ExportBlockedError`] and writes nothing.
    fn export_to(&self, workspace: &Workspace) -> anyhow::Result<Option<PathBuf>> {
        let records = load_records(&self.input)?;
        let document = export_records(&workspace.registry, &workspace.config, records)?;

        if self.stdout {
            print!("{}", document.to_json()?);
            return Ok(None);
        }

        let path = self.destination(workspace);
        document.write(&path)?;
        Ok(Some(path))
    }

    fn destination(&self, workspace: &Workspace) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| workspace.config.export_path.clone())
    }
}

fn report_blocked(error: &ExportBlockedError) {
    eprintln!("{}", error.to_string().error());
    match error {
        ExportBlockedError::RejectedRecords(rejected) => {
            let rejected: Vec<_> = rejected.iter().cloned().collect();
            print_rejections(&rejected);
        }
        ExportBlockedError::InvalidLinks(violations) => {
            for violation in violations.iter() {
                eprintln!("{}", format!("  {violation}").warning());
            }
        }
        ExportBlockedError::Cycles(cycles) => {
            for cycle in cycles.iter() {
                eprintln!("{}", format!("  {cycle}").warning());
            }
        }
        ExportBlockedError::NotSealed | ExportBlockedError::Schema(_) => {}
    }
    eprintln!("{}", "No export was written".dim());
}
