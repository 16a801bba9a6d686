use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use tagbridge_lib::pipeline_config::{CheckboxMode, SegmentationMode};

#[derive(Parser, Debug)]
#[command(
    name = "tagbridge",
    version,
    about = "Transfer {{TAG}} placeholders and checkbox states from a reference document to its look-alike"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Map one reference onto one target.
    Map(MapArgs),
    /// Map every pair listed in a JSON manifest.
    Batch(BatchArgs),
    /// Print what the extractor sees in a document.
    Inspect(InspectArgs),
}

/// Flags shared by `map` and `batch`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = SegmentationArg::Auto)]
    pub segmentation: SegmentationArg,

    #[arg(long, value_enum, default_value_t = CheckboxArg::Deterministic)]
    pub checkboxes: CheckboxArg,

    /// Attach debug details to the report and write the diagnostic dump.
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Skip the oracle and use the pattern cascade only.
    #[arg(long, default_value_t = false)]
    pub no_oracle: bool,

    #[arg(long)]
    pub ollama_url: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    /// JSON mapping configuration; missing keys keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    #[arg(long)]
    pub reference: PathBuf,

    #[arg(long)]
    pub target: PathBuf,

    /// Defaults to `<target stem>_tagged.docx` next to the target.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// JSON array of `{"reference": ..., "target": ..., "output": ...}`.
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long)]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub document: PathBuf,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SegmentationArg {
    Auto,
    Always,
    Never,
}

impl From<SegmentationArg> for SegmentationMode {
    fn from(arg: SegmentationArg) -> Self {
        match arg {
            SegmentationArg::Auto => Self::Auto,
            SegmentationArg::Always => Self::Always,
            SegmentationArg::Never => Self::Never,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CheckboxArg {
    Deterministic,
    ContentAware,
}

impl From<CheckboxArg> for CheckboxMode {
    fn from(arg: CheckboxArg) -> Self {
        match arg {
            CheckboxArg::Deterministic => Self::Deterministic,
            CheckboxArg::ContentAware => Self::ContentAware,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_flags_parse() {
        let cli = Cli::try_parse_from([
            "tagbridge",
            "map",
            "--reference",
            "modele.docx",
            "--target",
            "dc1.docx",
            "--segmentation",
            "never",
            "--checkboxes",
            "content-aware",
            "--no-oracle",
        ])
        .unwrap();
        let Commands::Map(args) = cli.command else {
            panic!("expected map");
        };
        assert_eq!(args.target, PathBuf::from("dc1.docx"));
        assert_eq!(args.run.segmentation, SegmentationArg::Never);
        assert_eq!(CheckboxMode::from(args.run.checkboxes), CheckboxMode::ContentAware);
        assert!(args.run.no_oracle);
        assert!(args.output.is_none());
    }

    #[test]
    fn batch_requires_out_dir() {
        assert!(Cli::try_parse_from(["tagbridge", "batch", "--manifest", "m.json"]).is_err());
    }
}
