mod cli;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use tagbridge_lib::markup::extract::{checkboxes_from_scan, paragraphs_from_scan};
use tagbridge_lib::markup::{extract_tag_contexts, DocumentCodec, DocxCodec};
use tagbridge_lib::pipeline::oracle::{OllamaOracle, SemanticOracle};
use tagbridge_lib::pipeline::{DocumentInput, MappingReport};
use tagbridge_lib::{config, MappingConfig, MappingOptions, MappingRequest, ParagraphCache, Processor};

use crate::cli::{BatchArgs, Cli, Commands, InspectArgs, MapArgs, RunArgs};

fn main() {
    tagbridge_lib::init_tracing();

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

    match cli.command {
        Commands::Map(args) => run_map(args),
        Commands::Batch(args) => run_batch(args),
        Commands::Inspect(args) => run_inspect(args),
    }
}

fn build_processor(run: &RunArgs) -> Result<Processor> {
    let mut config = match &run.config {
        Some(path) => MappingConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => MappingConfig::default(),
    };
    if let Some(url) = &run.ollama_url {
        config.oracle.base_url = url.clone();
    }
    if let Some(model) = &run.model {
        config.oracle.model = Some(model.clone());
    }

    let oracle: Option<Box<dyn SemanticOracle>> = if run.no_oracle {
        None
    } else {
        match OllamaOracle::connect(&config.oracle) {
            Ok(oracle) => {
                info!(model = oracle.model(), url = %config.oracle.base_url, "Oracle connected");
                Some(Box::new(oracle))
            }
            Err(e) => {
                warn!(error = %e, "Oracle unavailable, using the pattern cascade only");
                None
            }
        }
    };

    info!(version = config::APP_VERSION, oracle = oracle.is_some(), "{} ready", config::APP_NAME);
    Ok(Processor::new(config, oracle))
}

fn options(run: &RunArgs, output_name: Option<String>) -> MappingOptions {
    MappingOptions {
        segmentation: run.segmentation.into(),
        debug: run.debug,
        output_name,
        checkbox_mode: run.checkboxes.into(),
    }
}

fn run_map(args: MapArgs) -> Result<()> {
    let processor = build_processor(&args.run)?;
    let output_name = args
        .output
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());
    let request = MappingRequest {
        reference: DocumentInput::Path(args.reference.clone()),
        target: DocumentInput::Path(args.target.clone()),
        options: options(&args.run, output_name),
    };

    let mut cache = ParagraphCache::from_config(processor.config());
    let item = processor
        .process_item(&request, &mut cache)
        .with_context(|| format!("failed to map {} onto {}", args.reference.display(), args.target.display()))?;

    let output = args
        .output
        .unwrap_or_else(|| args.target.with_file_name(&item.output_name));
    fs::write(&output, &item.output_bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(output = %output.display(), summary = %item.report.summary(), "Tagged document written");

    write_report(&item.report, args.report.as_deref())
}

fn write_report(report: &MappingReport, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match path {
        Some(path) => fs::write(path, json).with_context(|| format!("failed to write report {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    reference: PathBuf,
    target: PathBuf,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchLine {
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<MappingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_batch(args: BatchArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.manifest)
        .with_context(|| format!("failed to read manifest {}", args.manifest.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("manifest {} is not a JSON array of items", args.manifest.display()))?;
    let base = args.manifest.parent().unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let processor = build_processor(&args.run)?;

    let requests: Vec<MappingRequest> = entries
        .into_iter()
        .map(|entry| MappingRequest {
            reference: DocumentInput::Path(base.join(entry.reference)),
            target: DocumentInput::Path(base.join(entry.target)),
            options: options(&args.run, entry.output),
        })
        .collect();

    let mut lines = Vec::with_capacity(requests.len());
    let mut failed = 0usize;
    for (request, result) in requests.iter().zip(processor.process_batch(&requests)) {
        let target = request.target.name();
        match result {
            Ok(item) => {
                let output = args.out_dir.join(&item.output_name);
                match fs::write(&output, &item.output_bytes) {
                    Ok(()) => lines.push(BatchLine {
                        target,
                        output: Some(output.display().to_string()),
                        report: Some(item.report),
                        error: None,
                    }),
                    Err(e) => {
                        failed += 1;
                        lines.push(BatchLine {
                            target,
                            output: None,
                            report: Some(item.report),
                            error: Some(format!("failed to write {}: {e}", output.display())),
                        });
                    }
                }
            }
            Err(e) => {
                failed += 1;
                lines.push(BatchLine {
                    target,
                    output: None,
                    report: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&lines)?);
    if failed > 0 {
        bail!("{failed} of {} item(s) failed", lines.len());
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let bytes = fs::read(&args.document).with_context(|| format!("failed to read {}", args.document.display()))?;
    let tree = DocxCodec
        .open(&bytes)
        .with_context(|| format!("{} is not a readable document", args.document.display()))?;
    let scan = tree.scan();

    let view = serde_json::json!({
        "contexts": extract_tag_contexts(&tree),
        "paragraphs": paragraphs_from_scan(&scan),
        "checkboxes": checkboxes_from_scan(&scan),
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
