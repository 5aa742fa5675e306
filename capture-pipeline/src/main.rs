use anyhow::Context;
use capture_pipeline::config::Cli;
use capture_pipeline::frame_source::ensure_out_dir;
use capture_pipeline::prompts::analysis_prompt;
use capture_pipeline::server::{self, AppState};
use capture_pipeline::{
    console, CaptureController, FrameSource, LlmAdapter, LookupConfig, LookupService, MockLlmAdapter,
    OpenAiAdapter, PokeApiLookup, ScreenFrameSource, StillFrameSource,
};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Placeholder frame written for `--mock` runs; the scripted model never reads it.
const MOCK_FRAME: &[u8] = b"mock frame";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = cli.config.resolve(!cli.mock).context("invalid configuration")?;

    ensure_out_dir(&settings.out_dir, !cli.keep_captures)
        .await
        .with_context(|| format!("cannot prepare {}", settings.out_dir.display()))?;

    // One lookup instance for the whole process, shared by the loop and chat.
    let lookup = Arc::new(PokeApiLookup::new(settings.lookup_base_url.as_str(), LookupConfig::default())?);

    let (frames, adapter): (Arc<dyn FrameSource>, Arc<dyn LlmAdapter>) = if cli.mock {
        let still = settings.out_dir.join("mock_frame.png");
        tokio::fs::write(&still, MOCK_FRAME).await?;
        let adapter = MockLlmAdapter::new("demo").with_delay(200).with_lookup(lookup.clone());
        (Arc::new(StillFrameSource::new(still)), Arc::new(adapter))
    } else {
        let api_key = settings.api_key.clone().unwrap_or_default();
        let adapter = OpenAiAdapter::new(
            settings.base_url.as_str(),
            api_key,
            settings.model.clone(),
            lookup.clone() as Arc<dyn LookupService>,
        )?;
        (
            Arc::new(ScreenFrameSource::new(settings.source.clone(), settings.out_dir.clone())),
            Arc::new(adapter),
        )
    };

    let controller = CaptureController::new(
        settings.loop_config(),
        frames,
        adapter.clone(),
        lookup,
        analysis_prompt(&settings.source),
    );

    if cli.web {
        let state = AppState {
            controller: controller.clone(),
            chat: adapter,
            keep_alive: settings.keep_alive,
        };
        controller.start();
        return server::serve(state, &settings.bind_address()).await;
    }

    info!(
        "Capturing from {} every {:?} using model {}",
        settings.source, settings.interval, settings.model
    );
    info!("Saving screenshots to: {}", settings.out_dir.display());
    info!("Generating cumulative summary every {} captures", settings.summary_interval);

    let printer = tokio::spawn(console::log_events(
        controller.analysis_channel().subscribe(),
        controller.summary_channel().subscribe(),
    ));
    controller.start();

    tokio::signal::ctrl_c().await?;
    info!("Stopped.");
    controller.stop();
    controller.join().await;
    printer.abort();
    if let Err(e) = printer.await {
        if !e.is_cancelled() {
            error!("Console printer failed: {}", e);
        }
    }
    Ok(())
}
