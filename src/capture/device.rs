use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, RgbImage};

use crate::config::CameraSettings;
use crate::error::CaptureError;

pub const TEST_PATTERN_DEVICE: &str = "test-pattern";

/// Unblocks a pending [`CameraDevice::next_frame`] from another thread.
pub type Interrupter = Box<dyn Fn() + Send>;

/// A blocking source of decoded camera images, driven by the camera feed thread.
pub trait CameraDevice: Send {
    /// Blocks until the next image is available. `Ok(None)` means the device has closed.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError>;

    fn name(&self) -> &str;

    /// Devices whose reads can block indefinitely hand out a way to break them.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }

    fn close(&mut self) {}
}

/// Opens the device named in the camera settings.
pub fn open_device(settings: &CameraSettings) -> Result<Box<dyn CameraDevice>, CaptureError> {
    if settings.device == TEST_PATTERN_DEVICE {
        return Ok(Box::new(TestPatternDevice::new(
            settings.width,
            settings.height,
            settings.framerate,
        )));
    }
    Ok(Box::new(FfmpegDevice::spawn(settings)?))
}

/// Reads rgb24 raw video from an `ffmpeg` child process bound to a v4l2 device.
pub struct FfmpegDevice {
    device: String,
    child: Arc<Mutex<Child>>,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl FfmpegDevice {
    pub fn spawn(settings: &CameraSettings) -> Result<Self, CaptureError> {
        let frame_len = settings.frame_len().ok_or(CaptureError::FrameSize {
            width: settings.width,
            height: settings.height,
        })?;
        let size_arg = format!("{}x{}", settings.width, settings.height);
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("video4linux2")
            .arg("-framerate")
            .arg(settings.framerate.to_string())
            .arg("-video_size")
            .arg(&size_arg)
            .arg("-i")
            .arg(&settings.device)
            .arg("-vf")
            .arg(format!("scale={}:{}", settings.width, settings.height))
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| CaptureError::Open {
            device: settings.device.clone(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| CaptureError::Open {
            device: settings.device.clone(),
            source: std::io::Error::new(ErrorKind::BrokenPipe, "ffmpeg stdout unavailable"),
        })?;

        tracing::info!(
            device = %settings.device,
            size = %size_arg,
            framerate = settings.framerate,
            "Spawned ffmpeg camera reader"
        );
        Ok(Self {
            device: settings.device.clone(),
            child: Arc::new(Mutex::new(child)),
            stdout,
            width: settings.width,
            height: settings.height,
            buffer: vec![0; frame_len],
        })
    }
}

impl CameraDevice for FfmpegDevice {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        match self.stdout.read_exact(&mut self.buffer) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(CaptureError::Read(e)),
        }
        let len = self.buffer.len();
        let image = RgbImage::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or(CaptureError::Geometry(len))?;
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }

    fn name(&self) -> &str {
        &self.device
    }

    // Killing ffmpeg closes its stdout, so a blocked read ends with EOF.
    fn interrupter(&self) -> Option<Interrupter> {
        let child = self.child.clone();
        Some(Box::new(move || kill_child(&child)))
    }

    fn close(&mut self) {
        kill_child(&self.child);
        reap_child(&self.child, &self.device);
    }
}

fn kill_child(child: &Mutex<Child>) {
    let mut child = match child.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(e) = child.kill() {
        tracing::debug!("ffmpeg already exited: {}", e);
    }
}

fn reap_child(child: &Mutex<Child>, device: &str) {
    let mut child = match child.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(e) = child.wait() {
        tracing::warn!("Failed to reap ffmpeg for {}: {}", device, e);
    }
}

impl Drop for FfmpegDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// A synthetic moving gradient, for running without camera hardware.
pub struct TestPatternDevice {
    width: u32,
    height: u32,
    frame_interval: Duration,
    tick: u32,
}

impl TestPatternDevice {
    pub fn new(width: u32, height: u32, framerate: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(1000 / u64::from(framerate.max(1))),
            tick: 0,
        }
    }
}

impl CameraDevice for TestPatternDevice {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        std::thread::sleep(self.frame_interval);
        let offset = self.tick;
        self.tick = self.tick.wrapping_add(4);
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            image::Rgb([
                (x.wrapping_add(offset) % 256) as u8,
                (y % 256) as u8,
                (offset % 256) as u8,
            ])
        });
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }

    fn name(&self) -> &str {
        TEST_PATTERN_DEVICE
    }
}
