//! FOLIO Enrich CLI: run one document through the pipeline, inspect stored
//! jobs, and sweep expired ones.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use folio_enrich::EnrichService;
use folio_logging::{init_logging, jobs_dir, LogConfig};
use folio_ontology::{InMemoryOntology, ObjectProperty, OntologyClass};
use folio_pipeline::{DocumentSource, PipelineDeps};
use folio_protocol::{EnrichConfig, JobId};
use folio_store::JobStore;

#[derive(Parser, Debug)]
#[command(name = "folio-enrich", about = "Legal-document enrichment against the FOLIO ontology")]
struct Cli {
    /// Verbose console logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Job store root (defaults to ~/.folio_enrich/jobs)
    #[arg(long, env = "FOLIO_ENRICH_JOBS_DIR", global = true)]
    jobs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich one UTF-8 text document and print the result
    Enrich {
        /// Path to the document
        file: PathBuf,
        /// Ontology JSON (classes and object properties); see docs for the
        /// schema
        #[arg(long, env = "FOLIO_ONTOLOGY_PATH")]
        ontology: PathBuf,
        /// Print the full JobResult JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print a stored job result
    Show {
        job_id: JobId,
        #[arg(long)]
        json: bool,
    },
    /// Delete jobs past the retention window
    Sweep,
}

#[derive(serde::Deserialize)]
struct OntologyFile {
    #[serde(default)]
    classes: Vec<OntologyClass>,
    #[serde(default)]
    object_properties: Vec<ObjectProperty>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig {
        app_name: "folio-enrich",
        verbose: cli.verbose,
    })?;
    let store = JobStore::new(cli.jobs_dir.clone().unwrap_or_else(jobs_dir));

    match cli.command {
        Command::Enrich {
            file,
            ontology,
            json,
        } => {
            let text = std::fs::read(&file)
                .with_context(|| format!("Failed to read document: {}", file.display()))?;
            let ontology_raw = std::fs::read_to_string(&ontology)
                .with_context(|| format!("Failed to read ontology: {}", ontology.display()))?;
            let parsed: OntologyFile =
                serde_json::from_str(&ontology_raw).context("Failed to parse ontology JSON")?;
            let accessor = Arc::new(InMemoryOntology::new(
                parsed.classes,
                parsed.object_properties,
            ));
            // No provider wiring on the CLI: the pipeline runs in its
            // degraded deterministic mode.
            let deps = Arc::new(
                PipelineDeps::new(accessor, None, None)
                    .context("Failed to build pipeline from ontology")?,
            );
            let service = EnrichService::new(deps, store, EnrichConfig::default());
            let job_id = service
                .submit(DocumentSource::Bytes(text), None)
                .await;
            let result = service.result(job_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
        }
        Command::Show { job_id, json } => {
            let result = store.load_result(job_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
        }
        Command::Sweep => {
            let removed = store.sweep(EnrichConfig::default().retention_days).await?;
            println!("swept {removed} expired job(s)");
        }
    }
    Ok(())
}

fn print_summary(result: &folio_protocol::JobResult) {
    println!("job      {}", result.job_id);
    println!("state    {:?}", result.state);
    println!("hash     {}", result.text_hash);
    println!(
        "counts   {} annotations, {} individuals, {} properties, {} triples",
        result.annotations.len(),
        result.individuals.len(),
        result.properties.len(),
        result.triples.len()
    );
    for annotation in &result.annotations {
        println!(
            "  [{}] {} {} -> {} ({:.2}, {})",
            annotation.id,
            annotation.span,
            annotation.surface_text,
            annotation.concept_iri,
            annotation.confidence,
            annotation.state.as_str(),
        );
    }
    if !result.quality_signals.is_empty() {
        println!("signals  {}", result.quality_signals.len());
        for signal in &result.quality_signals {
            println!("  {} {}", signal.stage, signal.reason);
        }
    }
}
