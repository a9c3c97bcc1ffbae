use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facereg_core::provider::DEFAULT_SIMILARITY_THRESHOLD;
use facereg_core::{
    EmbeddingProvider, FaceAnalyzer, FaceRegistry, ImageDir, ImageUpload, LocalProvider,
    MatchPolicy, ReconcilePolicy, RegistryStore,
};

#[derive(Parser)]
#[command(name = "facereg", about = "Offline face registry tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ModelArgs {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "FACEREG_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Cosine similarity needed for a match
    #[arg(
        long,
        env = "FACEREG_MATCH_THRESHOLD",
        default_value_t = DEFAULT_SIMILARITY_THRESHOLD
    )]
    threshold: f32,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every image in a faces directory and report what would be enrolled
    Scan {
        #[arg(long, env = "FACEREG_FACES_DIR")]
        dir: PathBuf,
        /// Report unusable images instead of stopping at the first one
        #[arg(long)]
        skip_invalid: bool,
        #[command(flatten)]
        models: ModelArgs,
    },
    /// Print the embedding of every face found in an image
    Embed {
        image: PathBuf,
        #[command(flatten)]
        models: ModelArgs,
    },
    /// Match the faces in an image against a faces directory
    Recognize {
        image: PathBuf,
        #[arg(long, env = "FACEREG_FACES_DIR")]
        dir: PathBuf,
        #[command(flatten)]
        models: ModelArgs,
    },
}

impl ModelArgs {
    fn provider(&self) -> Result<LocalProvider<FaceAnalyzer>> {
        let model_dir = self
            .model_dir
            .clone()
            .unwrap_or_else(facereg_core::default_model_dir);
        let analyzer = FaceAnalyzer::load(&model_dir)
            .with_context(|| format!("failed to load models from {}", model_dir.display()))?;
        Ok(LocalProvider::new(analyzer, MatchPolicy::new(self.threshold)))
    }

    fn registry(&self, dir: &Path) -> Result<FaceRegistry> {
        let images = open_faces_dir(dir)?;
        Ok(FaceRegistry::new(
            Arc::new(RegistryStore::new()),
            images,
            Arc::new(self.provider()?),
        ))
    }
}

/// The commands only read the faces directory, so a mistyped path is an error.
fn open_faces_dir(dir: &Path) -> Result<ImageDir> {
    ImageDir::open_existing(dir)
        .with_context(|| format!("faces directory {} is not usable", dir.display()))
}

fn read_upload(path: &Path) -> Result<ImageUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ImageUpload::new(filename, bytes))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            dir,
            skip_invalid,
            models,
        } => {
            let registry = models.registry(&dir)?;
            let policy = if skip_invalid {
                ReconcilePolicy::SkipInvalid
            } else {
                ReconcilePolicy::Abort
            };
            let report = registry.reconcile(policy)?;

            let skipped: Vec<_> = report
                .skipped
                .iter()
                .map(|(path, reason)| serde_json::json!({ "path": path, "reason": reason }))
                .collect();
            let out = serde_json::json!({ "enrolled": report.enrolled, "skipped": skipped });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Embed { image, models } => {
            let upload = read_upload(&image)?;
            upload.validate()?;
            let provider = models.provider()?;
            let faces = provider.embed(&upload.bytes)?;
            println!("{}", serde_json::to_string_pretty(&faces)?);
        }
        Commands::Recognize { image, dir, models } => {
            let upload = read_upload(&image)?;
            let registry = models.registry(&dir)?;
            let report = registry.reconcile(ReconcilePolicy::SkipInvalid)?;
            for (path, reason) in &report.skipped {
                eprintln!("skipped {}: {reason}", path.display());
            }
            let result = registry.recognize(&upload)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
