//! Camera capability: a real device driven through an external capture
//! program, or a deterministic synthetic frame generator.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use shared::error::CaptureError;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// `data:<mime>;base64,<payload>`
    pub data_uri: String,
}

impl CapturedImage {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            data_uri: format!("data:{mime_type};base64,{}", STANDARD.encode(bytes)),
        }
    }
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    fn name(&self) -> &str;
    async fn take_photo(&self) -> Result<CapturedImage, CaptureError>;
}

/// Camera selection, fixed when the capture stack is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraSettings {
    #[default]
    Synthetic,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_mime_type")]
        mime_type: String,
        #[serde(default = "default_command_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_mime_type() -> String {
    "image/jpeg".into()
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

pub fn build_camera(settings: &CameraSettings) -> Arc<dyn CameraDevice> {
    match settings {
        CameraSettings::Synthetic => Arc::new(SyntheticCamera::new()),
        CameraSettings::Command {
            program,
            args,
            mime_type,
            timeout_ms,
        } => Arc::new(CommandCamera::new(
            program.clone(),
            args.clone(),
            mime_type.clone(),
            Duration::from_millis(*timeout_ms),
        )),
    }
}

/// Runs an external capture program that writes one encoded image to stdout,
/// e.g. `fswebcam --no-banner -` or `libcamera-still -o - -n`.
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    mime_type: String,
    timeout: Duration,
}

impl CommandCamera {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        mime_type: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            mime_type: mime_type.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CameraDevice for CommandCamera {
    fn name(&self) -> &str {
        &self.program
    }

    async fn take_photo(&self) -> Result<CapturedImage, CaptureError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(CaptureError::Device(format!(
                    "failed to run '{}': {err}",
                    self.program
                )))
            }
            Err(_) => {
                warn!("camera: '{}' timed out after {:?}", self.program, self.timeout);
                return Err(CaptureError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Device(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::Device(format!(
                "'{}' returned no image data",
                self.program
            )));
        }

        debug!(
            "camera: '{}' produced {} bytes",
            self.program,
            output.stdout.len()
        );
        Ok(CapturedImage::from_bytes(&self.mime_type, &output.stdout))
    }
}

/// Placeholder frames for hosts without a camera. The n-th shot is always the
/// same image, so sessions captured with it are reproducible.
pub struct SyntheticCamera {
    shots: AtomicU64,
    width: u32,
    height: u32,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::with_size(640, 480)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            shots: AtomicU64::new(0),
            width,
            height,
        }
    }

    fn render(&self, shot: u64) -> String {
        let hue = (shot * 36) % 360;
        let (w, h) = (self.width, self.height);
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="hsl({hue},60%,45%)"/><text x="50%" y="50%" font-family="sans-serif" font-size="{size}" fill="#ffffff" text-anchor="middle" dominant-baseline="middle">Frame {number}</text></svg>"##,
            size = h / 8,
            number = shot + 1,
        )
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn take_photo(&self) -> Result<CapturedImage, CaptureError> {
        let shot = self.shots.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedImage::from_bytes(
            "image/svg+xml",
            self.render(shot).as_bytes(),
        ))
    }
}

#[cfg(test)]
#[path = "tests/camera_tests.rs"]
mod tests;
