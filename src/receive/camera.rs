//! camera.rs
//! Optional camera feed, captured on its own thread and published as
//! `CompressedImage` messages. Independent of radio state.
//!
//! `ImageDirCamera` stands in for a capture device: it cycles through the
//! already-encoded JPEG/PNG files of a directory at a fixed frame rate.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use prost::Message;
use thiserror::Error;

use crate::publish::{queue::OutboundMessage, router::ChannelFanout};
use crate::receive::packet::unix_now_ns;
use crate::schema::{CompressedImage, Timestamp};
use crate::utils::{metrics::StationMetrics, pacing::Pacer};

/// Upper bound on one capture wait, so the reader re-checks the running flag.
const CAPTURE_POLL: Duration = Duration::from_millis(200);
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device unavailable: {0}")]
    Unavailable(String),

    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    /// Encoding name, e.g. "jpeg" or "png".
    pub format: String,
}

pub trait Camera: Send {
    /// Wait up to `timeout` for the next frame. `Ok(None)` when no frame is due yet.
    fn capture(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError>;
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn capture(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError> {
        (**self).capture(timeout)
    }
}

pub struct ImageDirCamera {
    files: Vec<(PathBuf, String)>,
    cursor: usize,
    pacer: Pacer,
}

impl ImageDirCamera {
    pub fn open(dir: &Path, fps: f64) -> Result<Self, CameraError> {
        if !(fps > 0.0 && fps.is_finite()) {
            return Err(CameraError::Unavailable(format!("invalid frame rate {}", fps)));
        }

        let mut files: Vec<(PathBuf, String)> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| image_format(&path).map(|fmt| (path, fmt.to_string())))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "no jpeg/png frames in {}",
                dir.display()
            )));
        }

        info!("[Camera] {} frames from {} at {:.1} fps", files.len(), dir.display(), fps);
        Ok(Self {
            files,
            cursor: 0,
            pacer: Pacer::new(Duration::from_secs_f64(1.0 / fps)),
        })
    }
}

impl Camera for ImageDirCamera {
    fn capture(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError> {
        if !self.pacer.wait(timeout) {
            return Ok(None);
        }
        let (path, format) = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();
        let data = fs::read(path)?;
        Ok(Some(Frame {
            data,
            format: format.clone(),
        }))
    }
}

fn image_format(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("jpeg"),
        "png" => Some("png"),
        _ => None,
    }
}

/// Camera worker: capture → wrap in `CompressedImage` → enqueue on the image channel.
pub struct CameraReader<C: Camera> {
    camera: C,
    fanout: ChannelFanout,
    running: Arc<AtomicBool>,
    metrics: Arc<StationMetrics>,
    frame_id: String,
}

impl<C: Camera> CameraReader<C> {
    pub fn new(
        camera: C,
        fanout: ChannelFanout,
        running: Arc<AtomicBool>,
        metrics: Arc<StationMetrics>,
    ) -> Self {
        Self {
            camera,
            fanout,
            running,
            metrics,
            frame_id: "ground_camera".into(),
        }
    }

    pub fn run(mut self) -> C {
        info!("[CameraReader] started -> {}", self.fanout.topic());

        while self.running.load(Ordering::Acquire) {
            match self.camera.capture(CAPTURE_POLL) {
                Ok(Some(frame)) => self.publish_frame(frame),
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_camera_error();
                    warn!("[CameraReader] capture failed: {}", e);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        debug!("[CameraReader] stopped.");
        self.camera
    }

    fn publish_frame(&self, frame: Frame) {
        let now_ns = unix_now_ns();
        let image = CompressedImage {
            timestamp: Some(Timestamp::from_nanos(now_ns)),
            data: frame.data,
            format: frame.format,
            frame_id: self.frame_id.clone(),
        };
        let displaced = self.fanout.enqueue(OutboundMessage::new(now_ns, image.encode_to_vec()));
        self.metrics.record_camera_frame();
        self.metrics.record_queue_overflow(displaced);
    }
}
