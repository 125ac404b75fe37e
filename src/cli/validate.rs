use std::path::{Path, PathBuf};

use aspice_trace::{
    Analysis, Graph, LinkError, ValidationError, domain::Rejection, validate_links,
};
use clap::Parser;
use tracing::instrument;

use super::{Workspace, print_rejections, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Validate items, links and traceability")]
pub struct Validate {
    /// A record file, or a directory of record files
    input: PathBuf,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,

    /// Also fail on orphans and coverage gaps
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Summary,
}

#[derive(Debug, Default)]
struct ValidationResult {
    items: usize,
    rejected: Vec<Rejection>,
    links: Vec<LinkError>,
    analysis: Option<Analysis>,
}

impl ValidationResult {
    fn fatal_issues(&self) -> usize {
        self.rejected.len()
            + self.links.len()
            + self.analysis.as_ref().map_or(0, |a| a.cycles.len())
    }

    fn advisory_issues(&self) -> usize {
        self.analysis.as_ref().map_or(0, |analysis| {
            analysis.orphans.len()
                + analysis
                    .coverage
                    .iter()
                    .map(|c| c.uncovered.len())
                    .sum::<usize>()
        })
    }
}

impl Validate {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, config: &Path) -> anyhow::Result<()> {
        let workspace = Workspace::open(config)?;
        let result = self.check(&workspace)?;

        match self.output {
            OutputFormat::Table => self.output_table(&result),
            OutputFormat::Json => Self::output_json(&result)?,
            OutputFormat::Summary => Self::output_summary(&result),
        }

        if self.fails(&result) {
            std::process::exit(2);
        }

        Ok(())
    }

    /// Ingests the input, validates its links and analyses the graph.
    fn check(&self, workspace: &Workspace) -> anyhow::Result<ValidationResult> {
        let (store, report) = workspace.sealed_store(&self.input)?;

        let mut result = ValidationResult {
            items: store.len(),
            rejected: report.rejected,
            ..ValidationResult::default()
        };

        match validate_links(&store) {
            Ok(validated) => {
                let graph = Graph::build(validated);
                result.analysis = Some(graph.analyse(workspace.config.coverage())?);
            }
            Err(ValidationError::Links(violations)) => result.links = violations.into(),
            Err(e @ ValidationError::StoreNotSealed) => return Err(e.into()),
        }

        Ok(result)
    }

    /// Whether the run should exit with a failure status.
    fn fails(&self, result: &ValidationResult) -> bool {
        result.fatal_issues() > 0 || (self.strict && result.advisory_issues() > 0)
    }

    fn output_table(&self, result: &ValidationResult) {
        if !result.rejected.is_empty() {
            eprintln!(
                "{}",
                format!("✗ Ingestion:  {} records rejected", result.rejected.len()).error()
            );
            print_rejections(&result.rejected);
        }
        if !result.links.is_empty() {
            eprintln!(
                "{}",
                format!("✗ Links:      {} invalid links", result.links.len()).error()
            );
            for violation in &result.links {
                eprintln!("{}", format!("  {violation}").warning());
            }
        }

        if self.quiet {
            return;
        }

        println!("Validating {} items...\n", result.items);

        if result.rejected.is_empty() {
            println!("✓ Ingestion:  all records accepted");
        }
        if result.links.is_empty() {
            println!("✓ Links:      all links resolve to allowed item types");
        }

        let Some(analysis) = &result.analysis else {
            println!("\n{}", "Graph analysis skipped (fix invalid links first)".dim());
            Self::print_summary(result);
            return;
        };

        if analysis.cycles.is_empty() {
            println!("✓ Cycles:     no refinement cycles");
        } else {
            println!(
                "{}",
                format!("✗ Cycles:     {} refinement cycles", analysis.cycles.len()).error()
            );
            for cycle in &analysis.cycles {
                println!("  {cycle}");
            }
        }

        if analysis.orphans.is_empty() {
            println!("✓ Orphans:    every item is traced");
        } else {
            println!(
                "{}",
                format!("! Orphans:    {} items without incoming traceability", analysis.orphans.len())
                    .warning()
            );
            for orphan in &analysis.orphans {
                println!("  {} {}", orphan.id, format!("({})", orphan.item_type).dim());
            }
        }

        for coverage in &analysis.coverage {
            let covered = coverage.total - coverage.uncovered.len();
            let line = format!(
                "  Coverage {} → {}: {covered}/{}",
                coverage.source, coverage.target, coverage.total
            );
            if coverage.uncovered.is_empty() {
                println!("{}", line.info());
            } else {
                println!("{}", line.warning());
            }
        }

        Self::print_summary(result);
    }

    fn print_summary(result: &ValidationResult) {
        let fatal = result.fatal_issues();
        let advisory = result.advisory_issues();
        if fatal == 0 {
            println!(
                "\n{}",
                format!("Traceability is valid ({advisory} advisory findings)").success()
            );
        } else {
            println!(
                "\n{}",
                format!("Summary: {fatal} errors, {advisory} advisory findings").error()
            );
        }
    }

    fn output_json(result: &ValidationResult) -> anyhow::Result<()> {
        use serde_json::json;

        let rejected: Vec<_> = result
            .rejected
            .iter()
            .map(|rejection| {
                json!({
                    "index": rejection.index,
                    "id": rejection.id,
                    "error": rejection.error.to_string(),
                })
            })
            .collect();

        let links: Vec<_> = result.links.iter().map(ToString::to_string).collect();
        let fatal = result.fatal_issues();

        let output = json!({
            "status": if fatal == 0 { "valid" } else { "invalid" },
            "items": result.items,
            "rejected": rejected,
            "links": links,
            "analysis": result.analysis,
            "summary": {
                "errors": fatal,
                "advisory": result.advisory_issues(),
            }
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_summary(result: &ValidationResult) {
        println!(
            "errors={} advisory={}",
            result.fatal_issues(),
            result.advisory_issues()
        );
    }
}
