use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use sentiment_monitor::{
    AppConfig, AppMetrics, AppState, BuiltinModel, Classify, ExporterStatus, InteractionController,
    MetricsExporter, MetricsRegistry, ModelManager, RuntimeConfig, SentimentClassifier,
};

async fn ensure_model_downloaded(config: &AppConfig) -> anyhow::Result<()> {
    let manager = ModelManager::new_default()
        .context("Failed to create model cache directory")?
        .with_expected_hashes(config.model_sha256.clone(), config.tokenizer_sha256.clone());
    let model = BuiltinModel::DistilBertSst2;

    if config.fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(model)?;
    }

    manager.ensure_model_downloaded(model).await?;
    Ok(())
}

fn build_classifier(config: &AppConfig) -> anyhow::Result<SentimentClassifier> {
    let builder = SentimentClassifier::builder()
        .with_runtime_config(RuntimeConfig::default().with_intra_threads(config.intra_threads));

    let builder = match config.custom_model() {
        Some((model_path, tokenizer_path)) => {
            let labels: Vec<&str> = config.labels.iter().map(String::as_str).collect();
            builder.with_custom_model(
                &model_path.to_string_lossy(),
                &tokenizer_path.to_string_lossy(),
                &labels,
                Some(config.max_sequence_length),
            )?
        }
        None => builder.with_model(BuiltinModel::DistilBertSst2)?,
    };

    Ok(builder.build()?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sentiment_monitor::init_logger();
    let config = AppConfig::parse();

    info!("=== Starting Sentiment Monitor ===");

    if config.custom_model().is_none() {
        ensure_model_downloaded(&config).await?;
    }

    let start_time = Instant::now();
    info!("Loading classifier...");
    let classifier = build_classifier(&config).context("Failed to load sentiment classifier")?;
    info!("Classifier info: {:?}", classifier.info());

    // Warm-up run so the first user request doesn't pay for graph initialisation
    let warmup = classifier.classify("I love this!")?;
    info!(
        "=== Classifier ready (took {:.2?}, warm-up: {} {:.3}) ===",
        start_time.elapsed(),
        warmup.label,
        warmup.confidence
    );

    let registry = Arc::new(MetricsRegistry::new());
    let metrics = AppMetrics::init(&registry)?;

    let exporter = MetricsExporter::new(Arc::clone(&registry));
    match exporter.ensure_started(config.metrics_addr()).await? {
        ExporterStatus::Started(addr) => info!("Metrics endpoint listening on {}", addr),
        ExporterStatus::AlreadyRunning(addr) => {
            warn!("Metrics port {} is already served, not starting another endpoint", addr)
        }
    }

    let controller = InteractionController::new(Arc::new(classifier), metrics);
    let listener = tokio::net::TcpListener::bind(config.ui_addr())
        .await
        .with_context(|| format!("Failed to bind UI on {}", config.ui_addr()))?;

    let state = AppState::with_session_ttl(controller, config.session_ttl());
    sentiment_monitor::server::serve(listener, state, shutdown_signal()).await?;

    exporter.shutdown().await;
    info!("=== Sentiment Monitor stopped ===");
    Ok(())
}
