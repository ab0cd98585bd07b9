//! Пайплайн: feature engineering, затем подбор модели

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use reservation_ml::{FeatureEngineer, ModelSelector, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "reservation-ml", about = "Hotel reservation cancellation pipeline")]
struct Args {
    /// Путь к YAML-конфигурации
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reservation_ml=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = PipelineConfig::from_yaml_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;

    let engineer = FeatureEngineer::new(config.data_processing.clone());
    engineer.run(&config.paths)?;

    let selector = ModelSelector::new(config.model_training.clone(), config.data_processing.label_column.clone());
    let summary = selector.run(&config.paths);
    match &summary.failure {
        None => tracing::info!(
            "Pipeline finished: state {}, run {}",
            summary.state,
            summary.run_id.map(|id| id.to_string()).unwrap_or_default()
        ),
        Some(e) => tracing::error!("Pipeline finished with a failed training run: {}", e),
    }

    Ok(())
}
