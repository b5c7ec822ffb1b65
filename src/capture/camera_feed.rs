use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::device::{CameraDevice, Interrupter};

pub type LatestImage = Option<Arc<DynamicImage>>;

/// How long `stop` waits for the camera thread before leaving it behind.
const STOP_GRACE: Duration = Duration::from_millis(250);

/// Owns the camera device on a background thread and publishes the newest image.
pub struct CameraFeed {
    id: Uuid,
    cancel_token: CancellationToken,
    camera_thread: Option<std::thread::JoinHandle<()>>,
    // Disconnects when the camera thread exits.
    exited_rx: mpsc::Receiver<()>,
    interrupter: Option<Interrupter>,
    latest_rx: watch::Receiver<LatestImage>,
}

impl CameraFeed {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        let id = Uuid::new_v4();
        let cancel_token = CancellationToken::new();
        let (latest_tx, latest_rx) = watch::channel(None);
        let (exited_tx, exited_rx) = mpsc::channel();
        let interrupter = device.interrupter();
        let mut camera = Camera {
            id,
            device,
            latest_tx,
        };
        let thread_token = cancel_token.clone();
        Self {
            id,
            cancel_token,
            camera_thread: Some(std::thread::spawn(move || {
                let _exited = exited_tx;
                camera.run(thread_token);
            })),
            exited_rx,
            interrupter,
            latest_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The most recent image, or `None` before the first frame or after the device closed.
    pub fn latest(&self) -> LatestImage {
        self.latest_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LatestImage> {
        self.latest_rx.clone()
    }

    /// Stops the camera thread. A device stuck in a read is interrupted, and a thread that
    /// still has not exited after a short grace period is detached.
    pub fn stop(&mut self) {
        self.cancel_token.cancel();
        let Some(thread) = self.camera_thread.take() else {
            return;
        };
        if let Some(interrupt) = self.interrupter.take() {
            interrupt();
        }
        match self.exited_rx.recv_timeout(STOP_GRACE) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!("Camera thread for {} did not stop in time, detaching", self.id);
                // Later reads see no frame.
                self.latest_rx = watch::channel(None).1;
            }
            _ => {
                if thread.join().is_err() {
                    tracing::error!("Camera thread for {} panicked", self.id);
                }
            }
        }
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Camera {
    id: Uuid,
    device: Box<dyn CameraDevice>,
    latest_tx: watch::Sender<LatestImage>,
}

impl Camera {
    fn run(&mut self, cancel_token: CancellationToken) {
        tracing::info!(
            "Camera feed {} starting on device {}",
            self.id,
            self.device.name()
        );
        let mut frames: u64 = 0;
        while !cancel_token.is_cancelled() {
            match self.device.next_frame() {
                Ok(Some(image)) => {
                    frames += 1;
                    self.latest_tx.send_replace(Some(Arc::new(image)));
                }
                Ok(None) => {
                    tracing::warn!("Camera device {} closed", self.device.name());
                    break;
                }
                Err(e) => {
                    tracing::error!("Camera device {} failed: {}", self.device.name(), e);
                    break;
                }
            }
        }
        // Readers see "no frame" once the device is gone.
        self.latest_tx.send_replace(None);
        self.device.close();
        tracing::info!("Camera feed {} stopped after {} frames", self.id, frames);
    }
}
