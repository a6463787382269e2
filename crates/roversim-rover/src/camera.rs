//! [`CameraStream`] – the Closed/Streaming state machine for one camera.
//!
//! Frame capture itself belongs to the rendering engine; this module only
//! owns the stream lifecycle and pacing. A [`FrameSource`] supplies raw
//! frame bytes on demand, and the stream wraps them into base64
//! `simCameraStreamReport` messages at the requested rate.
//!
//! Opening an already-open stream and closing an already-closed one are
//! warnings, not errors: the peer may legitimately retry.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use roversim_types::{Report, SimError};
use tracing::warn;

/// Parameters of an open stream, taken from the open request.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Flattened 3x3 intrinsic matrix, when the peer supplied one.
    pub intrinsics: Option<[f64; 9]>,
}

/// Supplies raw frame bytes for a streaming camera. Implemented by the
/// rendering collaborator; tests and headless runs use stubs.
pub trait FrameSource: Send {
    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, SimError>;
}

#[derive(Debug, Clone, PartialEq)]
enum StreamState {
    Closed,
    Streaming(StreamSettings),
}

/// A camera on the rover which may stream frames to the rover server.
#[derive(Debug)]
pub struct CameraStream {
    name: String,
    state: StreamState,
    next_frame: Instant,
}

impl CameraStream {
    pub fn new(name: impl Into<String>, now: Instant) -> Self {
        Self {
            name: name.into(),
            state: StreamState::Closed,
            next_frame: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, StreamState::Streaming(_))
    }

    pub fn settings(&self) -> Option<&StreamSettings> {
        match &self.state {
            StreamState::Closed => None,
            StreamState::Streaming(settings) => Some(settings),
        }
    }

    /// Transition `Closed → Streaming`. A no-op with a warning when the
    /// stream is already open or the requested rate is unusable.
    pub fn open(&mut self, settings: StreamSettings, now: Instant) {
        if self.is_streaming() {
            warn!(camera = %self.name, "attempted to stream camera that is already streaming");
            return;
        }
        if settings.fps <= 0.0 {
            warn!(camera = %self.name, fps = settings.fps, "ignoring stream request with non-positive fps");
            return;
        }
        self.state = StreamState::Streaming(settings);
        self.next_frame = now;
    }

    /// Transition `Streaming → Closed`. A no-op with a warning when the
    /// stream is already closed.
    pub fn close(&mut self) {
        if !self.is_streaming() {
            warn!(camera = %self.name, "attempted to close camera that is already closed");
            return;
        }
        self.state = StreamState::Closed;
    }

    /// Emit the next frame report if one is due. Capture failures are
    /// logged and skipped; the stream stays open.
    pub fn tick(&mut self, now: Instant, source: &mut dyn FrameSource) -> Option<Report> {
        let StreamState::Streaming(settings) = &self.state else {
            return None;
        };
        if now < self.next_frame {
            return None;
        }
        let frame = match source.capture(settings.width, settings.height) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(camera = %self.name, error = %e, "frame capture failed");
                return None;
            }
        };
        self.next_frame = now + Duration::from_secs_f64(1.0 / settings.fps);
        Some(Report::CameraStream {
            camera: self.name.clone(),
            data: BASE64.encode(frame),
        })
    }
}
