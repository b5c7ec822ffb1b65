use std::sync::Arc;

use posture_watch::app::ConsoleView;
use posture_watch::capture::open_device;
use posture_watch::{
    AnalysisClient, AppError, CameraFeed, CameraFrameSource, DetectionLoop, Settings,
};
use tokio_util::sync::CancellationToken;
use tracing::Level;

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = Settings::load()?;
    init_logging(settings.log_level());
    tracing::info!(
        backend = %settings.backend.base_url,
        device = %settings.camera.device,
        "Posture watch starting"
    );

    let device = open_device(&settings.camera)?;
    let frame_source = Arc::new(CameraFrameSource::new(
        CameraFeed::new(device),
        settings.camera.jpeg_quality,
    ));
    let analyzer = Arc::new(AnalysisClient::new(
        &settings.backend.base_url,
        settings.request_timeout(),
    )?);
    let mut detection = DetectionLoop::builder()
        .frame_source(frame_source)
        .analyzer(analyzer)
        .build()?;

    let cancel_token = CancellationToken::new();
    let view_task =
        tokio::spawn(ConsoleView::new().run(detection.subscribe(), cancel_token.clone()));

    detection.toggle()?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
    detection.shutdown().await;
    cancel_token.cancel();
    if let Err(e) = view_task.await {
        tracing::error!("Console view task failed: {}", e);
    }
    Ok(())
}
