//! TAP-rs CLI: record layer activations and preference labels for
//! statement datasets

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tap_rs::{
    load_model, parse_device, resolve_layers, run_dataset, StatementDataset, TapBackend,
    WeightsConfig,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tap-rs")]
#[command(about = "Generate per-layer activations for statements in a dataset")]
#[command(version)]
struct Cli {
    /// Size of the model to use (must be configured in the config file)
    #[arg(long, default_value = "13B")]
    model: String,

    /// Layers to save activations from; -1 means all layers
    #[arg(long, num_args = 1.., allow_negative_numbers = true, required = true)]
    layers: Vec<i64>,

    /// Names of datasets, without the .csv extension
    #[arg(long, num_args = 1.., required = true)]
    datasets: Vec<String>,

    /// Directory to save activations to
    #[arg(long = "output_dir", default_value = "acts")]
    output_dir: PathBuf,

    /// Compute device: cpu, cuda, cuda:<n> or metal
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Path to the weights config file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== TAP-rs: Truth Activation Probing ===");
    println!("Model:  {}", cli.model);
    println!("Device: {}", cli.device);
    println!("Output: {}", cli.output_dir.display());

    let config = WeightsConfig::load(&cli.config)?;
    let device = parse_device(&cli.device)?;

    info!("Loading model...");
    let model = load_model(&config, &cli.model, &device)?;
    info!(
        "Model: {} layers, {} hidden",
        model.n_layers(),
        model.hidden_size()
    );

    // The -1 sentinel expands before any hook is registered.
    let layers = resolve_layers(&cli.layers, model.n_layers())?;
    info!("Saving activations from {} layer(s)", layers.len());

    for dataset_name in &cli.datasets {
        let dataset_path = PathBuf::from("datasets").join(format!("{dataset_name}.csv"));
        let dataset = StatementDataset::load(&dataset_path)?;
        run_dataset(
            &model,
            &dataset,
            dataset_name,
            &cli.model,
            &layers,
            &cli.output_dir,
        )?;
    }

    info!("Done");
    Ok(())
}
